use std::io::{
    Cursor,
    Seek,
    SeekFrom,
};
use byteorder::{
    BigEndian,
    LittleEndian,
    ReadBytesExt,
};

use crate::error::{Error, Result};

/* PNG chunk tags */
pub const NP_TC: u32 = 0x6e70_5463;
pub const NP_LB: u32 = 0x6e70_4c62;

/* PNG file signature */
const PNG_SIGNATURE_SIZE: i64 = 8;

/**
 * Res_png_9patch, as serialized in the `npTc` chunk of a compiled PNG.
 *
 * Layout (big-endian):
 *   wasDeserialized u8, numXDivs u8, numYDivs u8, numColors u8,
 *   xDivsOffset u32, yDivsOffset u32,
 *   paddingLeft, paddingRight, paddingTop, paddingBottom i32,
 *   colorsOffset u32,
 *   xDivs[numXDivs] i32, yDivs[numYDivs] i32, colors[numColors] u32
 */
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NinePatchData {
    pub padding_left: i32,
    pub padding_right: i32,
    pub padding_top: i32,
    pub padding_bottom: i32,
    pub x_divs: Vec<i32>,
    pub y_divs: Vec<i32>,
}

impl NinePatchData {
    /// Decode the body of an `npTc` chunk.
    pub fn decode<T: AsRef<[u8]>>(buff: &mut Cursor<T>) -> Result<Self> {
        /* wasDeserialized */
        buff.seek(SeekFrom::Current(1))?;
        let num_x_divs = buff.read_u8()?;
        let num_y_divs = buff.read_u8()?;

        /* numColors, xDivsOffset, yDivsOffset */
        buff.seek(SeekFrom::Current(1 + 8))?;
        let padding_left = buff.read_i32::<BigEndian>()?;
        let padding_right = buff.read_i32::<BigEndian>()?;
        let padding_top = buff.read_i32::<BigEndian>()?;
        let padding_bottom = buff.read_i32::<BigEndian>()?;

        /* colorsOffset */
        buff.seek(SeekFrom::Current(4))?;
        let x_divs = read_ints(buff, num_x_divs)?;
        let y_divs = read_ints(buff, num_y_divs)?;

        Ok(NinePatchData {
            padding_left,
            padding_right,
            padding_top,
            padding_bottom,
            x_divs,
            y_divs,
        })
    }

    pub fn from_png(png: &[u8]) -> Result<Self> {
        Self::decode(&mut find_chunk(png, NP_TC)?)
    }
}

fn read_ints<T: AsRef<[u8]>>(buff: &mut Cursor<T>, count: u8) -> Result<Vec<i32>> {
    let mut values = Vec::with_capacity(count as usize);
    for _ in 0..count {
        values.push(buff.read_i32::<BigEndian>()?);
    }
    Ok(values)
}

/// Layout bounds stored in the `npLb` chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpticalInset {
    pub layout_bounds_left: i32,
    pub layout_bounds_top: i32,
    pub layout_bounds_right: i32,
    pub layout_bounds_bottom: i32,
}

impl OpticalInset {
    /// The ints of this chunk are written in host (little-endian) order,
    /// unlike the rest of the PNG.
    pub fn decode<T: AsRef<[u8]>>(buff: &mut Cursor<T>) -> Result<Self> {
        Ok(OpticalInset {
            layout_bounds_left: buff.read_i32::<LittleEndian>()?,
            layout_bounds_top: buff.read_i32::<LittleEndian>()?,
            layout_bounds_right: buff.read_i32::<LittleEndian>()?,
            layout_bounds_bottom: buff.read_i32::<LittleEndian>()?,
        })
    }

    pub fn from_png(png: &[u8]) -> Result<Self> {
        Self::decode(&mut find_chunk(png, NP_LB)?)
    }
}

/// Cursor over the data of the first PNG chunk tagged `magic`.
pub fn find_chunk(png: &[u8], magic: u32) -> Result<Cursor<&[u8]>> {
    let mut buff = Cursor::new(png);
    buff.seek(SeekFrom::Current(PNG_SIGNATURE_SIZE))?;

    loop {
        let (size, tag) = match (buff.read_u32::<BigEndian>(), buff.read_u32::<BigEndian>()) {
            (Ok(size), Ok(tag)) => (size, tag),
            _ => return Err(Error::NinePatchNotFound),
        };

        let data_start = buff.position() as usize;
        if tag == magic {
            let data_end = data_start.saturating_add(size as usize).min(png.len());
            return Ok(Cursor::new(&png[data_start..data_end]));
        }

        /* data and CRC */
        let next = data_start as u64 + u64::from(size) + 4;
        if next >= png.len() as u64 {
            return Err(Error::NinePatchNotFound);
        }
        buff.set_position(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;

    fn png_chunk(png: &mut Vec<u8>, tag: u32, data: &[u8]) {
        png.write_u32::<BigEndian>(data.len() as u32).unwrap();
        png.write_u32::<BigEndian>(tag).unwrap();
        png.extend_from_slice(data);
        png.write_u32::<BigEndian>(0).unwrap();
    }

    fn nine_patch_body() -> Vec<u8> {
        let mut data = vec![0, 2, 4, 0];
        for value in [0u32, 0, 1, 2, 3, 4, 0, 10, 20, 5, 6, 7, 8] {
            data.write_u32::<BigEndian>(value).unwrap();
        }
        data
    }

    #[test]
    fn decodes_nine_patch_chunk() {
        let mut png = b"\x89PNG\r\n\x1a\n".to_vec();
        png_chunk(&mut png, 0x4948_4452, &[0; 13]);
        png_chunk(&mut png, NP_TC, &nine_patch_body());

        let np = NinePatchData::from_png(&png).unwrap();
        assert_eq!((np.padding_left, np.padding_right, np.padding_top, np.padding_bottom), (1, 2, 3, 4));
        assert_eq!(np.x_divs, vec![10, 20]);
        assert_eq!(np.y_divs, vec![5, 6, 7, 8]);
    }

    #[test]
    fn optical_inset_is_little_endian() {
        let mut png = b"\x89PNG\r\n\x1a\n".to_vec();
        let mut data = Vec::new();
        for value in [1i32, -2, 3, 4] {
            data.write_i32::<LittleEndian>(value).unwrap();
        }
        png_chunk(&mut png, NP_LB, &data);

        let inset = OpticalInset::from_png(&png).unwrap();
        assert_eq!(inset, OpticalInset {
            layout_bounds_left: 1,
            layout_bounds_top: -2,
            layout_bounds_right: 3,
            layout_bounds_bottom: 4,
        });
    }

    #[test]
    fn missing_chunk_is_reported() {
        let mut png = b"\x89PNG\r\n\x1a\n".to_vec();
        png_chunk(&mut png, 0x4945_4e44, &[]);
        assert!(matches!(NinePatchData::from_png(&png), Err(Error::NinePatchNotFound)));
    }

    #[test]
    fn truncated_record_fails() {
        let mut buff = Cursor::new(vec![0u8, 2, 4, 0, 0]);
        assert!(matches!(NinePatchData::decode(&mut buff), Err(Error::Truncated)));
    }
}
