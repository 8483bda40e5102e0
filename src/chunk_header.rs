use std::fmt;
use std::io::{
    Read,
    Cursor,
};
use byteorder::{
    LittleEndian,
    ReadBytesExt,
    WriteBytesExt,
};
use log::{debug, warn};

use crate::chunk_type::{ChunkType, chunk_name};
use crate::error::{Error, Result};

/* Minimum size, for a chunk with no data */
pub const MINIMUM_HEADER_SIZE: u16 = 8;

/* Header that appears at the beginning of every chunk */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    /* Type identifier for this chunk.
     * The meaning of this value depends on the containing chunk. */
    pub chunk_type: u16,

    /* Size of the chunk header (in bytes).
     * Adding this value to the address of the chunk allows you to find
     * its associated data (if any). */
    pub header_size: u16,

    /* Total size of this chunk (in bytes).
     * This is the chunkSize plus the size of any data associated with the
     * chunk. Adding this value to the chunk allows you to completely skip
     * its contents (including any child chunks). If this value is the same
     * as chunkSize, there is no data associated with the chunk */
    pub size: u32,

    /* Offset of the first byte of the chunk in the stream */
    pub start: u64,

    /* start + size */
    pub end: u64,
}

impl ChunkHeader {

    /// Read a chunk header at the current position.
    ///
    /// A stream that ends exactly where the next chunk would start yields a
    /// header of type `ChunkType::None` with zero sizes. Running out of data
    /// after the first byte of a header is a truncation error.
    pub fn read<T: AsRef<[u8]>>(axml_buff: &mut Cursor<T>) -> Result<Self> {
        let start = axml_buff.position();
        let len = axml_buff.get_ref().as_ref().len() as u64;

        if start >= len {
            return Ok(Self::none(start));
        }

        let chunk_type = axml_buff.read_u16::<LittleEndian>()?;
        let header_size = axml_buff.read_u16::<LittleEndian>()?;
        let size = axml_buff.read_u32::<LittleEndian>()?;

        /* Exhaustive checks on the announced sizes */
        if header_size < MINIMUM_HEADER_SIZE {
            return Err(Error::format(start, format!(
                "{} header size {} is smaller than the minimum",
                chunk_name(chunk_type), header_size)));
        }

        if size < u32::from(header_size) {
            return Err(Error::format(start, format!(
                "{} total size {} is smaller than its header size {}",
                chunk_name(chunk_type), size, header_size)));
        }

        let header = ChunkHeader {
            chunk_type,
            header_size,
            size,
            start,
            end: start + u64::from(size),
        };
        debug!("{}", header);

        Ok(header)
    }

    /// Read a chunk header and fail unless it has the expected type.
    pub fn read_expected<T: AsRef<[u8]>>(axml_buff: &mut Cursor<T>,
                                         expected: ChunkType) -> Result<Self> {
        let header = Self::read(axml_buff)?;
        header.expect_type(expected)?;

        Ok(header)
    }

    pub fn none(offset: u64) -> Self {
        ChunkHeader {
            chunk_type: ChunkType::None.as_u16(),
            header_size: 0,
            size: 0,
            start: offset,
            end: offset,
        }
    }

    pub fn kind(&self) -> Option<ChunkType> {
        ChunkType::from_u16(self.chunk_type)
    }

    pub fn is(&self, chunk_type: ChunkType) -> bool {
        self.chunk_type == chunk_type.as_u16()
    }

    pub fn is_none(&self) -> bool {
        self.is(ChunkType::None) && self.size == 0
    }

    pub fn expect_type(&self, expected: ChunkType) -> Result<()> {
        if !self.is(expected) {
            return Err(Error::UnexpectedChunk {
                offset: self.start,
                expected: expected.name().to_string(),
                found: chunk_name(self.chunk_type),
            });
        }

        Ok(())
    }

    /// Offset of the chunk body, right after the header.
    pub fn data_start(&self) -> u64 {
        self.start + u64::from(self.header_size)
    }

    /// Move the cursor past the whole chunk.
    pub fn skip_chunk<T: AsRef<[u8]>>(&self, axml_buff: &mut Cursor<T>) -> Result<()> {
        let len = axml_buff.get_ref().as_ref().len() as u64;
        if self.end > len {
            return Err(Error::Truncated);
        }
        axml_buff.set_position(self.end);

        Ok(())
    }

    /// Skip header bytes the caller did not consume. Non-zero bytes are
    /// reported since they usually mean a newer header layout.
    pub fn check_for_unread_header<T: AsRef<[u8]>>(&self, axml_buff: &mut Cursor<T>) -> Result<()> {
        let header_end = self.data_start();
        let position = axml_buff.position();
        if position >= header_end {
            return Ok(());
        }

        let mut unread = vec![0u8; (header_end - position) as usize];
        axml_buff.read_exact(&mut unread)?;

        if unread.iter().all(|b| *b == 0) {
            debug!("Skipping {} zero bytes of {} header at 0x{:08X}",
                   unread.len(), chunk_name(self.chunk_type), position);
        } else {
            warn!("Skipping {} unknown bytes of {} header at 0x{:08X}",
                  unread.len(), chunk_name(self.chunk_type), position);
        }

        Ok(())
    }
}

impl fmt::Display for ChunkHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chunk {} at 0x{:08X}: header_size=0x{:02X} size=0x{:04X}",
               chunk_name(self.chunk_type), self.start, self.header_size, self.size)
    }
}

/// Start a chunk in `buf`: type, header size and a placeholder for the total
/// size. Returns the chunk start offset for `finalize_chunk`.
pub fn begin_chunk(buf: &mut Vec<u8>, chunk_type: ChunkType, header_size: u16) -> Result<usize> {
    let start = buf.len();
    buf.write_u16::<LittleEndian>(chunk_type.as_u16())?;
    buf.write_u16::<LittleEndian>(header_size)?;
    buf.write_u32::<LittleEndian>(0)?;

    Ok(start)
}

/// Pad the chunk to a four byte boundary and patch its total size.
pub fn finalize_chunk(buf: &mut Vec<u8>, chunk_start: usize) {
    align_to_four(buf);
    let size = (buf.len() - chunk_start) as u32;
    buf[chunk_start + 4..chunk_start + 8].copy_from_slice(&size.to_le_bytes());
}

pub fn align_to_four(buf: &mut Vec<u8>) {
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(chunk_type: u16, header_size: u16, size: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&chunk_type.to_le_bytes());
        buf.extend_from_slice(&header_size.to_le_bytes());
        buf.extend_from_slice(&size.to_le_bytes());
        buf
    }

    #[test]
    fn reads_header_and_end_offset() {
        let mut buf = vec![0xAA; 4];
        buf.extend(header_bytes(0x0002, 12, 0x20));
        let mut cursor = Cursor::new(buf);
        cursor.set_position(4);

        let header = ChunkHeader::read(&mut cursor).unwrap();
        assert!(header.is(ChunkType::Table));
        assert_eq!(header.header_size, 12);
        assert_eq!(header.start, 4);
        assert_eq!(header.end, 4 + 0x20);
        assert_eq!(header.data_start(), 16);
    }

    #[test]
    fn clean_eof_yields_none_header() {
        let buf = header_bytes(0x0001, 8, 8);
        let mut cursor = Cursor::new(buf);
        cursor.set_position(8);

        let header = ChunkHeader::read(&mut cursor).unwrap();
        assert!(header.is_none());
        assert_eq!(header.kind(), Some(ChunkType::None));
        assert_eq!(header.size, 0);
        assert_eq!(header.start, 8);
    }

    #[test]
    fn eof_inside_header_is_truncation() {
        let mut buf = header_bytes(0x0003, 8, 16);
        buf.truncate(5);
        let mut cursor = Cursor::new(buf);

        assert!(matches!(ChunkHeader::read(&mut cursor), Err(Error::Truncated)));
    }

    #[test]
    fn inconsistent_sizes_are_rejected() {
        let mut cursor = Cursor::new(header_bytes(0x0003, 16, 12));
        assert!(matches!(ChunkHeader::read(&mut cursor), Err(Error::Format { .. })));

        let mut cursor = Cursor::new(header_bytes(0x0003, 4, 12));
        assert!(matches!(ChunkHeader::read(&mut cursor), Err(Error::Format { .. })));
    }

    #[test]
    fn skip_and_unread_header() {
        let mut buf = header_bytes(0x0200, 12, 20);
        buf.extend_from_slice(&[0, 0, 0, 0]);
        buf.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let mut cursor = Cursor::new(buf);

        let header = ChunkHeader::read_expected(&mut cursor, ChunkType::TablePackage).unwrap();
        header.check_for_unread_header(&mut cursor).unwrap();
        assert_eq!(cursor.position(), 12);

        header.skip_chunk(&mut cursor).unwrap();
        assert_eq!(cursor.position(), 20);
    }

    #[test]
    fn wrong_type_is_reported() {
        let mut cursor = Cursor::new(header_bytes(0x0001, 8, 8));
        let err = ChunkHeader::read_expected(&mut cursor, ChunkType::Xml).unwrap_err();
        assert!(matches!(err, Error::UnexpectedChunk { .. }));
    }

    #[test]
    fn chunk_writer_patches_size() {
        let mut buf = Vec::new();
        let start = begin_chunk(&mut buf, ChunkType::XmlResourceMap, 8).unwrap();
        buf.extend_from_slice(&[1, 2, 3]);
        finalize_chunk(&mut buf, start);

        assert_eq!(buf.len(), 12);
        let mut cursor = Cursor::new(buf);
        let header = ChunkHeader::read(&mut cursor).unwrap();
        assert_eq!(header.size, 12);
        assert!(header.is(ChunkType::XmlResourceMap));
    }
}
