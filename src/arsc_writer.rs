use std::io::Cursor;
use byteorder::{
    LittleEndian,
    ReadBytesExt,
    WriteBytesExt,
};
use log::debug;

use crate::chunk_header::{begin_chunk, finalize_chunk};
use crate::chunk_type::ChunkType;
use crate::error::{Error, Result};
use crate::res_package::{
    EntryValue,
    ResEntry,
    ResPackage,
    ResType,
    ResTypeSpec,
    ENTRY_FLAG_COMPACT,
    ENTRY_FLAG_COMPLEX,
    SPEC_PUBLIC,
};
use crate::res_table::{
    ARSCData,
    DecodeOptions,
    FlagsOffset,
    NO_ENTRY,
    PACKAGE_HEADER_SIZE_WITH_OFFSET,
};
use crate::string_pool::StringPoolBuilder;

const TABLE_HEADER_SIZE: u16 = 12;
const LIBRARY_HEADER_SIZE: u16 = 12;
const STAGED_ALIAS_HEADER_SIZE: u16 = 12;
const TYPE_SPEC_HEADER_SIZE: u16 = 16;
const TYPE_HEADER_SIZE_WITHOUT_CONFIG: usize = 20;
const OVERLAYABLE_HEADER_SIZE: u16 = 8 + 2 * 2 * 256;
const OVERLAYABLE_POLICY_HEADER_SIZE: u16 = 16;

const SIMPLE_ENTRY_SIZE: u16 = 8;
const COMPLEX_ENTRY_SIZE: u16 = 16;

/// Serialises a decoded resource table. Every chunk size is recomputed;
/// string pools keep their indices. Type chunks are always written with
/// 32-bit offsets and regular entries.
pub struct ARSCWriter<'a> {
    data: &'a ARSCData,
}

impl<'a> ARSCWriter<'a> {
    pub fn new(data: &'a ARSCData) -> Self {
        ARSCWriter { data }
    }

    pub fn write(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let table_start = begin_chunk(&mut buf, ChunkType::Table, TABLE_HEADER_SIZE)?;
        buf.write_u32::<LittleEndian>(self.data.packages.len() as u32)?;

        buf.extend(StringPoolBuilder::from_pool(&self.data.strings).to_chunk()?);
        for package in self.data.packages.iter() {
            write_package(&mut buf, package)?;
        }

        finalize_chunk(&mut buf, table_start);
        debug!("Wrote resource table of {} bytes", buf.len());
        Ok(buf)
    }
}

fn write_package(buf: &mut Vec<u8>, package: &ResPackage) -> Result<()> {
    let start = begin_chunk(buf, ChunkType::TablePackage, PACKAGE_HEADER_SIZE_WITH_OFFSET)?;
    buf.write_u32::<LittleEndian>(package.id)?;
    write_utf16_name(buf, &package.name, 128)?;

    let type_strings_at = buf.len();
    buf.write_u32::<LittleEndian>(0)?;
    buf.write_u32::<LittleEndian>(package.last_public_type)?;
    let key_strings_at = buf.len();
    buf.write_u32::<LittleEndian>(0)?;
    buf.write_u32::<LittleEndian>(package.last_public_key)?;
    buf.write_u32::<LittleEndian>(package.type_id_offset)?;

    let type_strings = (buf.len() - start) as u32;
    patch_u32(buf, type_strings_at, type_strings);
    buf.extend(StringPoolBuilder::from_pool(&package.type_strings).to_chunk()?);
    let key_strings = (buf.len() - start) as u32;
    patch_u32(buf, key_strings_at, key_strings);
    buf.extend(StringPoolBuilder::from_pool(&package.key_strings).to_chunk()?);

    if !package.libraries.is_empty() {
        let library_start = begin_chunk(buf, ChunkType::TableLibrary, LIBRARY_HEADER_SIZE)?;
        buf.write_u32::<LittleEndian>(package.libraries.len() as u32)?;
        for library in package.libraries.iter() {
            buf.write_u32::<LittleEndian>(library.package_id)?;
            write_utf16_name(buf, &library.package_name, 128)?;
        }
        finalize_chunk(buf, library_start);
    }

    for spec in package.type_specs.iter() {
        let raw_id = type_id_with_offset(package, spec.id)?;
        write_type_spec(buf, spec, raw_id)?;
        for res_type in spec.types.iter() {
            write_type(buf, spec, res_type, raw_id)?;
        }
    }

    for overlayable in package.overlayables.iter() {
        let overlayable_start = begin_chunk(buf, ChunkType::TableOverlayable, OVERLAYABLE_HEADER_SIZE)?;
        write_utf16_name(buf, &overlayable.name, 256)?;
        write_utf16_name(buf, &overlayable.actor, 256)?;
        for policy in overlayable.policies.iter() {
            let policy_start = begin_chunk(buf, ChunkType::TableOverlayablePolicy,
                                           OVERLAYABLE_POLICY_HEADER_SIZE)?;
            buf.write_u32::<LittleEndian>(policy.flags)?;
            buf.write_u32::<LittleEndian>(policy.ids.len() as u32)?;
            for id in policy.ids.iter() {
                buf.write_u32::<LittleEndian>(id.0)?;
            }
            finalize_chunk(buf, policy_start);
        }
        finalize_chunk(buf, overlayable_start);
    }

    if !package.staged_aliases.is_empty() {
        let alias_start = begin_chunk(buf, ChunkType::TableStagedAlias, STAGED_ALIAS_HEADER_SIZE)?;
        buf.write_u32::<LittleEndian>(package.staged_aliases.len() as u32)?;
        for alias in package.staged_aliases.iter() {
            buf.write_u32::<LittleEndian>(alias.staged_id.0)?;
            buf.write_u32::<LittleEndian>(alias.finalized_id.0)?;
        }
        finalize_chunk(buf, alias_start);
    }

    finalize_chunk(buf, start);
    Ok(())
}

fn type_id_with_offset(package: &ResPackage, type_id: u8) -> Result<u8> {
    u8::try_from(u32::from(type_id) + package.type_id_offset)
        .map_err(|_| Error::format(0, format!(
            "type id {} does not fit with type id offset {}", type_id, package.type_id_offset)))
}

fn write_type_spec(buf: &mut Vec<u8>, spec: &ResTypeSpec, raw_id: u8) -> Result<()> {
    let entry_count = spec.entry_count();
    let start = begin_chunk(buf, ChunkType::TableTypeSpec, TYPE_SPEC_HEADER_SIZE)?;
    buf.write_u8(raw_id)?;
    buf.write_u8(0)?;
    buf.write_u16::<LittleEndian>(spec.types.len() as u16)?;
    buf.write_u32::<LittleEndian>(entry_count as u32)?;
    for i in 0..entry_count {
        buf.write_u32::<LittleEndian>(spec.flags.get(i).copied().unwrap_or(0))?;
    }
    finalize_chunk(buf, start);

    Ok(())
}

fn write_type(buf: &mut Vec<u8>, spec: &ResTypeSpec, res_type: &ResType, raw_id: u8) -> Result<()> {
    let last_entry = res_type.entries.keys().next_back().map_or(0, |k| u32::from(*k) + 1);
    let entry_count = res_type.entry_count.max(last_entry).max(spec.flags.len() as u32);

    let header_size = TYPE_HEADER_SIZE_WITHOUT_CONFIG + res_type.config.size();
    let header_size = u16::try_from(header_size)
        .map_err(|_| Error::format(0, format!("config of {} bytes is too large", res_type.config.size())))?;
    let entries_start = u32::from(header_size) + 4 * entry_count;

    let mut entries = Vec::new();
    let mut offsets = Vec::with_capacity(entry_count as usize);
    for index in 0..entry_count {
        match res_type.entries.get(&(index as u16)) {
            Some(entry) => {
                offsets.push(entries.len() as u32);
                write_entry(&mut entries, entry)?;
            },
            None => offsets.push(NO_ENTRY),
        }
    }

    let start = begin_chunk(buf, ChunkType::TableType, header_size)?;
    buf.write_u8(raw_id)?;
    buf.write_u8(0)?;
    buf.write_u16::<LittleEndian>(0)?;
    buf.write_u32::<LittleEndian>(entry_count)?;
    buf.write_u32::<LittleEndian>(entries_start)?;
    buf.extend_from_slice(res_type.config.as_bytes());
    for offset in offsets {
        buf.write_u32::<LittleEndian>(offset)?;
    }
    buf.extend(entries);
    finalize_chunk(buf, start);

    Ok(())
}

fn write_entry(buf: &mut Vec<u8>, entry: &ResEntry) -> Result<()> {
    let flags = entry.flags & !(ENTRY_FLAG_COMPLEX | ENTRY_FLAG_COMPACT);
    match &entry.value {
        EntryValue::Scalar(value) => {
            buf.write_u16::<LittleEndian>(SIMPLE_ENTRY_SIZE)?;
            buf.write_u16::<LittleEndian>(flags)?;
            buf.write_u32::<LittleEndian>(entry.key)?;
            value.write(buf)?;
        },
        EntryValue::Bag(bag) => {
            buf.write_u16::<LittleEndian>(COMPLEX_ENTRY_SIZE)?;
            buf.write_u16::<LittleEndian>(flags | ENTRY_FLAG_COMPLEX)?;
            buf.write_u32::<LittleEndian>(entry.key)?;
            buf.write_u32::<LittleEndian>(bag.parent.0)?;
            buf.write_u32::<LittleEndian>(bag.items.len() as u32)?;
            for (name, value) in bag.items.iter() {
                buf.write_u32::<LittleEndian>(name.0)?;
                value.write(buf)?;
            }
        },
    }

    Ok(())
}

fn write_utf16_name(buf: &mut Vec<u8>, name: &str, units: usize) -> Result<()> {
    let encoded: Vec<u16> = name.encode_utf16().take(units - 1).collect();
    for unit in encoded.iter() {
        buf.write_u16::<LittleEndian>(*unit)?;
    }
    for _ in encoded.len()..units {
        buf.write_u16::<LittleEndian>(0)?;
    }

    Ok(())
}

fn patch_u32(buf: &mut [u8], at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

/// Set the public bit on every flag word at the recorded offsets.
pub fn publicize_resources(bytes: &mut [u8], flags_offsets: &[FlagsOffset]) -> Result<()> {
    for flags_offset in flags_offsets {
        let start = flags_offset.offset as usize;
        let end = start + 4 * flags_offset.count as usize;
        if end > bytes.len() {
            return Err(Error::Truncated);
        }

        let mut cursor = Cursor::new(&bytes[start..end]);
        let mut words = Vec::with_capacity(flags_offset.count as usize);
        for _ in 0..flags_offset.count {
            words.push(cursor.read_u32::<LittleEndian>()? | SPEC_PUBLIC);
        }
        for (i, word) in words.iter().enumerate() {
            patch_u32(bytes, start + 4 * i, *word);
        }
    }

    Ok(())
}

/// Decode `bytes` only to locate its flag words, then mark every resource
/// public in place.
pub fn publicize_table(bytes: &mut [u8]) -> Result<()> {
    let options = DecodeOptions {
        store_flags_offsets: true,
        ..Default::default()
    };
    let flags_offsets = ARSCData::from_bytes(bytes, &options)?.flags_offsets;
    publicize_resources(bytes, &flags_offsets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publicize_patches_only_flag_words() {
        let mut bytes = vec![0u8; 16];
        bytes[4..8].copy_from_slice(&0x0000_0004u32.to_le_bytes());
        let offsets = [FlagsOffset { offset: 4, count: 2 }];

        publicize_resources(&mut bytes, &offsets).unwrap();

        assert_eq!(&bytes[0..4], &[0, 0, 0, 0]);
        assert_eq!(&bytes[4..8], &0x4000_0004u32.to_le_bytes());
        assert_eq!(&bytes[8..12], &0x4000_0000u32.to_le_bytes());
        assert_eq!(&bytes[12..16], &[0, 0, 0, 0]);
    }

    #[test]
    fn publicize_out_of_range() {
        let mut bytes = vec![0u8; 8];
        let offsets = [FlagsOffset { offset: 4, count: 2 }];
        assert!(matches!(publicize_resources(&mut bytes, &offsets), Err(Error::Truncated)));
    }

    #[test]
    fn names_are_padded_and_cut() {
        let mut buf = Vec::new();
        write_utf16_name(&mut buf, "abc", 4).unwrap();
        assert_eq!(buf, vec![b'a', 0, b'b', 0, b'c', 0, 0, 0]);

        let mut buf = Vec::new();
        write_utf16_name(&mut buf, "abcdef", 4).unwrap();
        assert_eq!(buf.len(), 8);
        assert_eq!(&buf[6..8], &[0, 0]);
    }
}
