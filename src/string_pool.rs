use std::collections::HashMap;
use std::io::Cursor;
use byteorder::{
    LittleEndian,
    ReadBytesExt,
    WriteBytesExt,
};
use log::warn;

use crate::chunk_header::{ChunkHeader, begin_chunk, finalize_chunk, align_to_four};
use crate::chunk_type::ChunkType;
use crate::error::{Error, Result};
use crate::res_xml_encoders::escape_xml_chars;

pub const SORTED_FLAG: u32 = 1 << 0;
pub const UTF8_FLAG: u32 = 1 << 8;

/* Size of ResStringPool_header, chunk header included */
const STRING_POOL_HEADER_SIZE: u16 = 28;
const SPAN_END: u32 = 0xFFFF_FFFF;

/* A style span inside a string: the tag name is a pool index, first and
 * last are UTF-16 unit positions (inclusive). */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringSpan {
    pub name: u32,
    pub first: u32,
    pub last: u32,
}

/**
 * Header of a chunk representing a pool of strings
 *
 * Definition for a pool of strings.  The data of this chunk is an
 * array of uint32_t providing indices into the pool, relative to
 * stringsStart.  At stringsStart are all of the UTF-16 strings
 * concatenated together; each starts with a uint16_t of the string's
 * length and each ends with a 0x0000 terminator.  If a string is >
 * 32767 characters, the high bit of the length is set meaning to take
 * those 15 bits as a high word and it will be followed by another
 * uint16_t containing the low word.
 *
 * If styleCount is not zero, then immediately following the array of
 * uint32_t indices into the string table is another array of indices
 * into a style table starting at stylesStart.  Each entry in the
 * style table is an array of ResStringPool_span structures.
 */
#[derive(Debug, Clone, Default)]
pub struct StringPool {
    /* Flags. Can take two values:
     *      - SORTED_FLAG = 1<<0,
     *      - UTF8_FLAG = 1<<8
     *
     * If SORTED_FLAG is set, the string index is sorted by the string
     * values (based on strcmp16()).
     *
     * If UTF8_FLAG is set, the string pool is ended in UTF-8.  */
    flags: u32,

    strings: Vec<String>,

    /* One span list per styled string; styled strings come first */
    styles: Vec<Vec<StringSpan>>,
}

impl StringPool {

    /// Read a complete string pool chunk, header included.
    pub fn from_buff<T: AsRef<[u8]>>(axml_buff: &mut Cursor<T>) -> Result<Self> {
        let header = ChunkHeader::read_expected(axml_buff, ChunkType::StringPool)?;
        Self::from_chunk(axml_buff, &header)
    }

    /// Read the body of a string pool whose header was already consumed.
    /// The cursor is left at the end of the chunk.
    pub fn from_chunk<T: AsRef<[u8]>>(axml_buff: &mut Cursor<T>,
                                      header: &ChunkHeader) -> Result<Self> {
        header.expect_type(ChunkType::StringPool)?;

        let string_count = axml_buff.read_u32::<LittleEndian>()?;
        let style_count = axml_buff.read_u32::<LittleEndian>()?;
        let flags = axml_buff.read_u32::<LittleEndian>()?;
        let strings_start = axml_buff.read_u32::<LittleEndian>()?;
        let styles_start = axml_buff.read_u32::<LittleEndian>()?;
        header.check_for_unread_header(axml_buff)?;

        let is_utf8 = (flags & UTF8_FLAG) != 0;

        /* Offset arrays must not run into the string data */
        let data_limit = if strings_start != 0 {
            header.start + u64::from(strings_start)
        } else {
            header.end
        };
        let strings_offsets = read_safe_u32_array(axml_buff, string_count, data_limit)?;
        let styles_offsets = read_safe_u32_array(axml_buff, style_count, data_limit)?;

        let data = axml_buff.get_ref().as_ref();
        if header.end > data.len() as u64 {
            return Err(Error::Truncated);
        }

        /* Strings */
        let mut strings = Vec::with_capacity(strings_offsets.len());
        if strings_start != 0 {
            let strings_begin = (header.start + u64::from(strings_start)) as usize;
            let strings_end = (if style_count != 0 && styles_start > strings_start {
                header.start + u64::from(styles_start)
            } else {
                header.end
            }) as usize;

            if strings_begin > strings_end || strings_end > data.len() {
                return Err(Error::format(header.start, "string data lies outside of the pool"));
            }

            let region = &data[strings_begin..strings_end];
            for offset in strings_offsets.iter() {
                let decoded_string = Self::decode_string(region, *offset as usize, is_utf8)
                    .map_err(|e| match e {
                        Error::Format { message, .. } => {
                            Error::format(strings_begin as u64 + u64::from(*offset), message)
                        },
                        other => other,
                    })?;
                strings.push(decoded_string);
            }
        }

        /* Styles. Some pools carry a styles offset with no styles at all */
        let mut styles = Vec::new();
        if styles_start != 0 && style_count != 0 {
            let styles_begin = header.start + u64::from(styles_start);
            for offset in styles_offsets.iter() {
                axml_buff.set_position(styles_begin + u64::from(*offset));
                let mut spans = Vec::new();
                loop {
                    if axml_buff.position() + 4 > header.end {
                        warn!("Style span list runs past the end of the pool");
                        break;
                    }
                    let name = axml_buff.read_u32::<LittleEndian>()?;
                    if name == SPAN_END {
                        break;
                    }
                    let first = axml_buff.read_u32::<LittleEndian>()?;
                    let last = axml_buff.read_u32::<LittleEndian>()?;
                    spans.push(StringSpan { name, first, last });
                }
                styles.push(spans);
            }
        }

        axml_buff.set_position(header.end);

        Ok(StringPool {
            flags,
            strings,
            styles,
        })
    }

    /// Decode the string starting at `offset` inside the string data region.
    pub fn decode_string(data: &[u8], offset: usize, is_utf8: bool) -> Result<String> {
        let mut position = offset;

        if is_utf8 {
            /* UTF-16 length first, which we do not need */
            let _ = decode_length_utf8(data, &mut position)?;
            let u8len = decode_length_utf8(data, &mut position)? as usize;
            let end = position.checked_add(u8len)
                .filter(|end| *end <= data.len())
                .ok_or_else(|| Error::format(offset as u64,
                    format!("UTF-8 string of {} bytes overruns the pool", u8len)))?;

            Ok(decode_utf8(&data[position..end]))
        } else {
            let u16len = decode_length_utf16(data, &mut position)? as usize;
            let end = u16len.checked_mul(2)
                .and_then(|bytes| position.checked_add(bytes))
                .filter(|end| *end <= data.len())
                .ok_or_else(|| Error::format(offset as u64,
                    format!("UTF-16 string of {} units overruns the pool", u16len)))?;

            let units: Vec<u16> = data[position..end]
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect();

            Ok(String::from_utf16_lossy(&units))
        }
    }

    pub fn get(&self, index: u32) -> Option<&str> {
        self.strings.get(index as usize).map(|s| s.as_str())
    }

    /// Like `get`, but an out-of-range index is an error.
    pub fn string(&self, index: u32) -> Result<&str> {
        self.get(index).ok_or(Error::StringIndex {
            index,
            count: self.strings.len(),
        })
    }

    /// String at `index` with its style spans rendered as markup.
    pub fn get_html(&self, index: u32) -> Option<String> {
        let raw = self.get(index)?;
        let spans = match self.styles.get(index as usize) {
            Some(spans) if !spans.is_empty() => spans,
            _ => return Some(escape_xml_chars(raw)),
        };

        let mut spans = spans.clone();
        spans.sort_by(|a, b| a.first.cmp(&b.first).then(b.last.cmp(&a.last)));

        let units: Vec<u16> = raw.encode_utf16().collect();
        let mut html = String::with_capacity(raw.len() + 16 * spans.len());
        let mut open: Vec<StringSpan> = Vec::new();
        let mut next = 0;
        let mut i = 0;

        loop {
            while let Some(top) = open.last() {
                if (top.last as usize) < i {
                    self.push_tag(&mut html, top.name, true);
                    open.pop();
                } else {
                    break;
                }
            }
            if i >= units.len() {
                break;
            }

            while next < spans.len() && (spans[next].first as usize) <= i {
                if spans[next].first as usize == i {
                    self.push_tag(&mut html, spans[next].name, false);
                    open.push(spans[next]);
                }
                next += 1;
            }

            let width = if (0xD800..0xDC00).contains(&units[i]) && i + 1 < units.len() { 2 } else { 1 };
            html.push_str(&escape_xml_chars(&String::from_utf16_lossy(&units[i..i + width])));
            i += width;
        }

        while let Some(top) = open.pop() {
            self.push_tag(&mut html, top.name, true);
        }

        Some(html)
    }

    fn push_tag(&self, html: &mut String, name: u32, closing: bool) {
        let tag = self.get(name).unwrap_or("");
        let mut parts = tag.split(';');
        let tag_name = parts.next().unwrap_or("");

        if closing {
            html.push_str("</");
            html.push_str(tag_name);
            html.push('>');
            return;
        }

        html.push('<');
        html.push_str(tag_name);
        for attr in parts {
            match attr.split_once('=') {
                Some((key, value)) => {
                    html.push(' ');
                    html.push_str(key);
                    html.push_str("=\"");
                    html.push_str(&escape_xml_chars(value).replace('"', "&quot;"));
                    html.push('"');
                },
                None if !attr.is_empty() => {
                    html.push(' ');
                    html.push_str(attr);
                },
                None => {},
            }
        }
        html.push('>');
    }

    /// Append a string, keeping every existing index stable.
    pub fn push(&mut self, value: &str) -> u32 {
        self.strings.push(value.to_string());
        (self.strings.len() - 1) as u32
    }

    /// Index of the first string equal to `value`.
    pub fn find(&self, value: &str) -> Option<u32> {
        self.strings.iter().position(|s| s == value).map(|i| i as u32)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn is_utf8(&self) -> bool {
        (self.flags & UTF8_FLAG) != 0
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn strings(&self) -> &[String] {
        &self.strings
    }

    pub fn styles(&self, index: u32) -> &[StringSpan] {
        self.styles.get(index as usize).map(|s| s.as_slice()).unwrap_or(&[])
    }

    pub fn style_count(&self) -> usize {
        self.styles.len()
    }
}

fn read_safe_u32_array<T: AsRef<[u8]>>(axml_buff: &mut Cursor<T>,
                                       count: u32,
                                       limit: u64) -> Result<Vec<u32>> {
    let mut values = Vec::with_capacity(count.min(0x10000) as usize);
    for _ in 0..count {
        if axml_buff.position() + 4 > limit {
            warn!("String pool offset array truncated after {} of {} entries", values.len(), count);
            break;
        }
        values.push(axml_buff.read_u32::<LittleEndian>()?);
    }

    Ok(values)
}

/** FROM GOOGLE
 * Strings in UTF-8 format have length indicated by a length encoded in the
 * stored data. It is either 1 or 2 characters of length data. This allows a
 * maximum length of 0x7FFF (32767 bytes), but you should consider storing
 * text in another way if you're using that much data in a single string.
 *
 * If the high bit is set, then there are two characters or 2 bytes of length
 * data encoded. In that case, drop the high bit of the first character and
 * add it together with the next character.
 */
fn decode_length_utf8(data: &[u8], position: &mut usize) -> Result<u32> {
    let first = *data.get(*position).ok_or_else(|| length_overrun(*position))? as u32;
    *position += 1;

    if (first & 0x80) != 0 {
        let second = *data.get(*position).ok_or_else(|| length_overrun(*position))? as u32;
        *position += 1;
        return Ok(((first & 0x7F) << 8) | second);
    }

    Ok(first)
}

/** FROM GOOGLE
 * Strings in UTF-16 format have length indicated by a length encoded in the
 * stored data. It is either 1 or 2 characters of length data. This allows a
 * maximum length of 0x7FFFFFF (2147483647 bytes), but if you're storing that
 * much data in a string, you're abusing them.
 *
 * If the high bit is set, then there are two characters or 4 bytes of length
 * data encoded. In that case, drop the high bit of the first character and
 * add it together with the next character.
 */
fn decode_length_utf16(data: &[u8], position: &mut usize) -> Result<u32> {
    let first = read_unit(data, position)? as u32;

    if (first & 0x8000) != 0 {
        let second = read_unit(data, position)? as u32;
        return Ok(((first & 0x7FFF) << 16) | second);
    }

    Ok(first)
}

fn read_unit(data: &[u8], position: &mut usize) -> Result<u16> {
    let bytes = data.get(*position..*position + 2).ok_or_else(|| length_overrun(*position))?;
    *position += 2;

    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn length_overrun(position: usize) -> Error {
    Error::format(position as u64, "string length prefix overruns the pool")
}

/// Decode UTF-8 string data. Strict UTF-8 is tried first, then CESU-8
/// (surrogate pairs encoded as two 3-byte sequences), then a lenient
/// decoder that accepts any mix of both and replaces what remains invalid.
pub fn decode_utf8(bytes: &[u8]) -> String {
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }

    if let Ok(s) = cesu8::from_cesu8(bytes) {
        return s.into_owned();
    }

    decode_lenient_utf8(bytes)
}

fn decode_lenient_utf8(bytes: &[u8]) -> String {
    let is_continuation = |b: u8| (b & 0xC0) == 0x80;
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let len = bytes.len();
    let mut i = 0;

    while i < len {
        let b0 = bytes[i];

        if b0 < 0x80 {
            units.push(u16::from(b0));
            i += 1;
        } else if (b0 & 0xE0) == 0xC0 && i + 1 < len && is_continuation(bytes[i + 1]) {
            let cp = (u16::from(b0 & 0x1F) << 6) | u16::from(bytes[i + 1] & 0x3F);
            units.push(cp);
            i += 2;
        } else if (b0 & 0xF0) == 0xE0 && i + 2 < len
            && is_continuation(bytes[i + 1]) && is_continuation(bytes[i + 2]) {
            /* Surrogate halves land here and are paired up by the UTF-16 pass */
            let cp = (u16::from(b0 & 0x0F) << 12)
                | (u16::from(bytes[i + 1] & 0x3F) << 6)
                | u16::from(bytes[i + 2] & 0x3F);
            units.push(cp);
            i += 3;
        } else if (b0 & 0xF8) == 0xF0 && i + 3 < len
            && bytes[i + 1..i + 4].iter().all(|b| is_continuation(*b)) {
            let cp = (u32::from(b0 & 0x07) << 18)
                | (u32::from(bytes[i + 1] & 0x3F) << 12)
                | (u32::from(bytes[i + 2] & 0x3F) << 6)
                | u32::from(bytes[i + 3] & 0x3F);
            match char::from_u32(cp) {
                Some(c) => {
                    let mut pair = [0u16; 2];
                    units.extend_from_slice(c.encode_utf16(&mut pair));
                },
                None => units.push(0xFFFD),
            }
            i += 4;
        } else {
            units.push(0xFFFD);
            i += 1;
        }
    }

    String::from_utf16_lossy(&units)
}

/// Builds a string pool chunk. Indices of strings already present are
/// preserved; new strings are appended.
#[derive(Debug, Clone, Default)]
pub struct StringPoolBuilder {
    utf8: bool,
    sorted: bool,
    strings: Vec<String>,
    styles: Vec<Vec<StringSpan>>,
    index: HashMap<String, u32>,
}

impl StringPoolBuilder {
    pub fn new(utf8: bool) -> Self {
        StringPoolBuilder {
            utf8,
            ..Default::default()
        }
    }

    /// Seed the builder with every string and style of an existing pool.
    pub fn from_pool(pool: &StringPool) -> Self {
        let mut builder = StringPoolBuilder::new(pool.is_utf8());
        builder.sorted = (pool.flags() & SORTED_FLAG) != 0;
        for (i, s) in pool.strings().iter().enumerate() {
            builder.index.entry(s.clone()).or_insert(i as u32);
            builder.strings.push(s.clone());
        }
        builder.styles = pool.styles.clone();
        builder
    }

    /// Index of `value`, appending it when not present yet.
    pub fn intern(&mut self, value: &str) -> u32 {
        if let Some(index) = self.index.get(value) {
            return *index;
        }

        let index = self.strings.len() as u32;
        self.strings.push(value.to_string());
        self.index.insert(value.to_string(), index);
        self.sorted = false;
        index
    }

    /// Append a string even if an equal one exists, keeping pool slots
    /// that must stay distinct (resource-map backed names).
    pub fn push_unique(&mut self, value: &str) -> u32 {
        let index = self.strings.len() as u32;
        self.strings.push(value.to_string());
        self.index.entry(value.to_string()).or_insert(index);
        self.sorted = false;
        index
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Serialise the pool as a STRING_POOL chunk.
    pub fn to_chunk(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let start = begin_chunk(&mut buf, ChunkType::StringPool, STRING_POOL_HEADER_SIZE)?;

        let string_count = self.strings.len() as u32;
        let style_count = self.styles.len() as u32;
        let mut flags = 0;
        if self.utf8 {
            flags |= UTF8_FLAG;
        }
        if self.sorted {
            flags |= SORTED_FLAG;
        }

        let strings_start = u32::from(STRING_POOL_HEADER_SIZE) + 4 * (string_count + style_count);

        /* String data */
        let mut string_data = Vec::new();
        let mut string_offsets = Vec::with_capacity(self.strings.len());
        for s in self.strings.iter() {
            string_offsets.push(string_data.len() as u32);
            if self.utf8 {
                encode_utf8_string(&mut string_data, s)?;
            } else {
                encode_utf16_string(&mut string_data, s)?;
            }
        }
        align_to_four(&mut string_data);

        /* Style data */
        let mut style_data = Vec::new();
        let mut style_offsets = Vec::with_capacity(self.styles.len());
        for spans in self.styles.iter() {
            style_offsets.push(style_data.len() as u32);
            for span in spans {
                style_data.write_u32::<LittleEndian>(span.name)?;
                style_data.write_u32::<LittleEndian>(span.first)?;
                style_data.write_u32::<LittleEndian>(span.last)?;
            }
            style_data.write_u32::<LittleEndian>(SPAN_END)?;
        }
        if !self.styles.is_empty() {
            style_data.write_u32::<LittleEndian>(SPAN_END)?;
            style_data.write_u32::<LittleEndian>(SPAN_END)?;
        }

        let styles_start = if self.styles.is_empty() {
            0
        } else {
            strings_start + string_data.len() as u32
        };

        buf.write_u32::<LittleEndian>(string_count)?;
        buf.write_u32::<LittleEndian>(style_count)?;
        buf.write_u32::<LittleEndian>(flags)?;
        buf.write_u32::<LittleEndian>(if string_count == 0 { 0 } else { strings_start })?;
        buf.write_u32::<LittleEndian>(styles_start)?;
        for offset in string_offsets.iter().chain(style_offsets.iter()) {
            buf.write_u32::<LittleEndian>(*offset)?;
        }
        buf.extend_from_slice(&string_data);
        buf.extend_from_slice(&style_data);

        finalize_chunk(&mut buf, start);
        Ok(buf)
    }
}

fn encode_utf8_string(buf: &mut Vec<u8>, text: &str) -> Result<()> {
    let char_count = text.encode_utf16().count();
    let bytes = text.as_bytes();
    write_length_utf8(buf, char_count)?;
    write_length_utf8(buf, bytes.len())?;
    buf.extend_from_slice(bytes);
    buf.push(0);

    Ok(())
}

fn write_length_utf8(buf: &mut Vec<u8>, len: usize) -> Result<()> {
    if len > 0x7FFF {
        return Err(Error::format(buf.len() as u64,
            format!("string of length {} is too long for a UTF-8 pool", len)));
    }
    if len > 0x7F {
        buf.push(((len >> 8) as u8) | 0x80);
        buf.push((len & 0xFF) as u8);
    } else {
        buf.push(len as u8);
    }

    Ok(())
}

fn encode_utf16_string(buf: &mut Vec<u8>, text: &str) -> Result<()> {
    let units: Vec<u16> = text.encode_utf16().collect();
    let len = units.len();
    if len > 0x7FFF_FFFF {
        return Err(Error::format(buf.len() as u64, "string too long for a UTF-16 pool"));
    }
    if len > 0x7FFF {
        buf.write_u16::<LittleEndian>(0x8000 | ((len >> 16) as u16 & 0x7FFF))?;
        buf.write_u16::<LittleEndian>((len & 0xFFFF) as u16)?;
    } else {
        buf.write_u16::<LittleEndian>(len as u16)?;
    }
    for unit in units {
        buf.write_u16::<LittleEndian>(unit)?;
    }
    buf.write_u16::<LittleEndian>(0)?;

    Ok(())
}
