use std::io::Cursor;
use byteorder::{
    LittleEndian,
    ReadBytesExt,
    WriteBytesExt,
};

use crate::chunk_header::{ChunkHeader, begin_chunk, finalize_chunk};
use crate::chunk_type::ChunkType;
use crate::error::Result;
use crate::res_package::ResId;

/* Size of the XML resource map header */
const RESOURCE_MAP_HEADER_SIZE: u16 = 8;

/**
 * XML resource map
 *
 * Maps the first strings of the document string pool (attribute names) to
 * resource ids: entry `i` is the id of the attribute named by string `i`.
 */
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceMap {
    ids: Vec<u32>,
}

impl ResourceMap {
    pub fn new(ids: Vec<u32>) -> Self {
        ResourceMap { ids }
    }

    /// Read the body of a resource map chunk whose header was already
    /// consumed. The cursor is left at the end of the chunk.
    pub fn from_chunk<T: AsRef<[u8]>>(axml_buff: &mut Cursor<T>,
                                      header: &ChunkHeader) -> Result<Self> {
        header.expect_type(ChunkType::XmlResourceMap)?;
        header.check_for_unread_header(axml_buff)?;

        let count = (header.end.saturating_sub(axml_buff.position())) / 4;
        let mut ids = Vec::with_capacity(count as usize);
        for _ in 0..count {
            ids.push(axml_buff.read_u32::<LittleEndian>()?);
        }
        header.skip_chunk(axml_buff)?;

        Ok(ResourceMap { ids })
    }

    /// Resource id of the attribute named by string `index`.
    pub fn get(&self, index: u32) -> Option<ResId> {
        self.ids.get(index as usize)
            .filter(|id| **id != 0)
            .map(|id| ResId(*id))
    }

    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn to_chunk(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(8 + 4 * self.ids.len());
        let start = begin_chunk(&mut buf, ChunkType::XmlResourceMap, RESOURCE_MAP_HEADER_SIZE)?;
        for id in self.ids.iter() {
            buf.write_u32::<LittleEndian>(*id)?;
        }
        finalize_chunk(&mut buf, start);

        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_ids_after_header() {
        let map = ResourceMap::new(vec![0x0101_0003, 0, 0x0101_020c]);
        let chunk = map.to_chunk().unwrap();
        assert_eq!(chunk.len(), 20);

        let mut cursor = Cursor::new(chunk);
        let header = ChunkHeader::read(&mut cursor).unwrap();
        let decoded = ResourceMap::from_chunk(&mut cursor, &header).unwrap();

        assert_eq!(decoded, map);
        assert_eq!(decoded.get(0), Some(ResId(0x0101_0003)));
        assert_eq!(decoded.get(1), None);
        assert_eq!(decoded.get(7), None);
        assert_eq!(cursor.position(), 20);
    }
}
