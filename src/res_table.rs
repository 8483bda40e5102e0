use std::collections::{
    BTreeSet,
    HashMap,
};
use std::io::Cursor;
use byteorder::{
    LittleEndian,
    ReadBytesExt,
};
use log::{debug, info, warn};

use crate::chunk_header::ChunkHeader;
use crate::chunk_type::ChunkType;
use crate::data_value_type::DataValueType;
use crate::error::{Error, Result};
use crate::res_attr::{ResAttr, ResourceResolver};
use crate::res_config::ResConfig;
use crate::res_package::{
    EntryValue,
    LibraryEntry,
    Overlayable,
    OverlayablePolicy,
    ResBag,
    ResEntry,
    ResId,
    ResPackage,
    ResTypeSpec,
    StagedAlias,
    ENTRY_FLAG_COMPACT,
    ENTRY_FLAG_COMPLEX,
};
use crate::res_value::ResValue;
use crate::string_pool::StringPool;

/* ResTable_type flags */
pub const TYPE_FLAG_SPARSE: u8 = 0x01;
pub const TYPE_FLAG_OFFSET16: u8 = 0x02;

pub const NO_ENTRY: u32 = 0xFFFF_FFFF;
pub const NO_ENTRY_OFFSET16: u16 = 0xFFFF;

/* Package header size when typeIdOffset is present: 2+2+4+4+256+20 */
pub const PACKAGE_HEADER_SIZE_WITH_OFFSET: u16 = 288;

const PACKAGE_NAME_UNITS: usize = 128;
const OVERLAYABLE_NAME_UNITS: usize = 256;

/// Knobs of the resource table decoder.
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    /* Keep resources with invalid configurations or duplicate definitions
     * instead of failing or dropping them */
    pub keep_broken: bool,

    /* Give every id missing from a type chunk an `APKTOOL_DUMMY_` spec
     * holding @null */
    pub add_dummy_specs: bool,

    /* Remember where type spec flag words live, for `publicize_resources` */
    pub store_flags_offsets: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        DecodeOptions {
            keep_broken: false,
            add_dummy_specs: false,
            store_flags_offsets: true,
        }
    }
}

/// Location of the flag words of one type spec chunk in the decoded stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagsOffset {
    pub offset: u64,
    pub count: u32,
}

/**
 * Header for a resource table
 *
 * Its data contains a series of additional chunks:
 *   * A ResStringPool_header containing all table values.  This string pool
 *     contains all of the string values in the entire resource table (not
 *     the names of entries or type identifiers however).
 *   * One or more ResTable_package chunks.
 *
 * Specific entries within a resource table can be uniquely identified
 * with a single integer as defined by the ResTable_ref structure.
 */
#[derive(Debug, Clone, Default)]
pub struct ARSCData {
    /* Global value strings */
    pub strings: StringPool,

    pub packages: Vec<ResPackage>,
    pub flags_offsets: Vec<FlagsOffset>,

    /* Number of packages announced by the table header */
    pub package_count: u32,

    attrs: HashMap<ResId, ResAttr>,
    main_package: Option<usize>,
}

impl ARSCData {

    /// Decode a complete `resources.arsc` stream.
    pub fn decode<T: AsRef<[u8]>>(axml_buff: &mut Cursor<T>,
                                  options: &DecodeOptions) -> Result<Self> {
        let mut decoder = ARSCDecoder::new(axml_buff, options);
        decoder.read_table()?;
        let mut data = decoder.finish()?;
        data.main_package = data.find_package_with_most_res_specs();
        data.collect_attrs();

        Ok(data)
    }

    /// Table built in memory, e.g. before handing it to `ARSCWriter`.
    pub fn new(strings: StringPool, packages: Vec<ResPackage>) -> Self {
        let mut data = ARSCData {
            strings,
            package_count: packages.len() as u32,
            packages,
            ..Default::default()
        };
        data.main_package = data.find_package_with_most_res_specs();
        data.collect_attrs();
        data
    }

    pub fn from_bytes(bytes: &[u8], options: &DecodeOptions) -> Result<Self> {
        Self::decode(&mut Cursor::new(bytes), options)
    }

    /// Index of the package with the most resource specs. On a tie the
    /// first package wins.
    pub fn find_package_with_most_res_specs(&self) -> Option<usize> {
        let mut best: Option<(usize, usize)> = None;
        for (index, package) in self.packages.iter().enumerate() {
            let count = package.get_res_spec_count();
            match best {
                Some((_, best_count)) if count <= best_count => {},
                _ => best = Some((index, count)),
            }
        }

        best.map(|(index, _)| index)
    }

    /// The main package of the table. Tables with several packages resolve
    /// to the one holding the most resource specs.
    pub fn get_one_package(&self) -> Result<&ResPackage> {
        match self.packages.len() {
            0 => Err(Error::format(0, "Arsc file contains zero packages")),
            1 => Ok(&self.packages[0]),
            _ => {
                let index = self.find_package_with_most_res_specs().unwrap_or(0);
                let package = &self.packages[index];
                info!("Arsc file contains multiple packages. Using package {} as default.",
                      package.name);
                Ok(package)
            }
        }
    }

    pub fn package_by_id(&self, package_id: u8) -> Option<&ResPackage> {
        self.packages.iter().find(|p| p.package_byte() == package_id)
    }

    pub fn package_by_name(&self, name: &str) -> Option<&ResPackage> {
        self.packages.iter().find(|p| p.name == name)
    }

    /// Value string for a TYPE_STRING entry, with style markup.
    pub fn value_string(&self, index: u32) -> Option<String> {
        self.strings.get_html(index)
    }

    fn collect_attrs(&mut self) {
        let mut attrs = HashMap::new();
        for package in self.packages.iter() {
            for spec in package.type_specs.iter().filter(|s| s.name.starts_with("attr")) {
                for res_type in spec.types.iter() {
                    for (entry_id, entry) in res_type.entries.iter() {
                        let bag = match entry.bag() {
                            Some(bag) if !bag.items.is_empty() => bag,
                            _ => continue,
                        };
                        let id = ResId::new(package.package_byte(), spec.id, *entry_id);
                        match ResAttr::from_bag(bag) {
                            Ok(attr) => {
                                attrs.entry(id).or_insert(attr);
                            },
                            Err(e) => warn!("Cannot decode attr {}: {}", id, e),
                        }
                    }
                }
            }
        }
        self.attrs = attrs;
    }
}

impl ResourceResolver for ARSCData {
    fn spec_name(&self, id: ResId) -> Option<String> {
        self.package_by_id(id.package_id())?
            .spec(id)
            .map(|spec| spec.name.clone())
    }

    fn reference_name(&self, id: ResId) -> Option<String> {
        let index = self.packages.iter().position(|p| p.package_byte() == id.package_id())?;
        let package = &self.packages[index];
        let spec = package.spec(id)?;
        if Some(index) == self.main_package {
            Some(spec.full_name())
        } else {
            Some(format!("{}:{}", package.name, spec.full_name()))
        }
    }

    fn attribute(&self, id: ResId) -> Option<&ResAttr> {
        self.attrs.get(&id)
    }
}

/// Walks the chunks of a table. Chunks are read flat: a package header is
/// followed by its type string pool, key string pool and then by the spec,
/// type, library, overlayable and staged alias chunks that belong to it.
struct ARSCDecoder<'a, T: AsRef<[u8]>> {
    axml_buff: &'a mut Cursor<T>,
    options: &'a DecodeOptions,
    data: ARSCData,

    /* Ids declared by a type chunk without an entry, per package index */
    missing: BTreeSet<(usize, ResId)>,

    /* Counter for the -ERR qualifier of invalid configurations */
    err_counter: u32,
}

impl<'a, T: AsRef<[u8]>> ARSCDecoder<'a, T> {
    fn new(axml_buff: &'a mut Cursor<T>, options: &'a DecodeOptions) -> Self {
        ARSCDecoder {
            axml_buff,
            options,
            data: ARSCData::default(),
            missing: BTreeSet::new(),
            err_counter: 0,
        }
    }

    fn read_table(&mut self) -> Result<()> {
        let table = ChunkHeader::read_expected(self.axml_buff, ChunkType::Table)?;
        self.data.package_count = self.axml_buff.read_u32::<LittleEndian>()?;
        table.check_for_unread_header(self.axml_buff)?;

        let mut has_strings = false;
        while self.axml_buff.position() < table.end {
            let header = ChunkHeader::read(self.axml_buff)?;
            if header.is_none() {
                break;
            }

            match header.kind() {
                Some(ChunkType::Null) => self.read_unknown_chunk(&header)?,
                Some(ChunkType::StringPool) if !has_strings => {
                    self.data.strings = StringPool::from_chunk(self.axml_buff, &header)?;
                    has_strings = true;
                },
                Some(ChunkType::TablePackage) => self.read_package(&header)?,
                Some(ChunkType::TableTypeSpec) => self.read_type_spec(&header)?,
                Some(ChunkType::TableType) => self.read_type(&header)?,
                Some(ChunkType::TableLibrary) => self.read_library(&header)?,
                Some(ChunkType::TableOverlayable) => self.read_overlayable(&header)?,
                Some(ChunkType::TableOverlayablePolicy) => self.read_overlayable_policy(&header)?,
                Some(ChunkType::TableStagedAlias) => self.read_staged_alias(&header)?,
                _ => {
                    warn!("Unexpected {}, skipping it", header);
                    header.skip_chunk(self.axml_buff)?;
                },
            }
        }

        if self.data.packages.len() as u32 != self.data.package_count {
            warn!("Table header announces {} packages, found {}",
                  self.data.package_count, self.data.packages.len());
        }

        Ok(())
    }

    fn finish(mut self) -> Result<ARSCData> {
        if self.options.add_dummy_specs {
            self.add_missing_res_specs()?;
        }

        Ok(self.data)
    }

    fn read_unknown_chunk(&mut self, header: &ChunkHeader) -> Result<()> {
        header.check_for_unread_header(self.axml_buff)?;
        warn!("Skipping unknown chunk data of size {}", header.end - header.data_start());
        header.skip_chunk(self.axml_buff)
    }

    fn current_package(&mut self, header: &ChunkHeader) -> Result<&mut ResPackage> {
        match self.data.packages.last_mut() {
            Some(package) => Ok(package),
            None => Err(Error::format(header.start, format!("{} outside of a package", header))),
        }
    }

    fn read_package(&mut self, header: &ChunkHeader) -> Result<()> {
        let id = self.axml_buff.read_u32::<LittleEndian>()?;
        let name = read_utf16_name(self.axml_buff, PACKAGE_NAME_UNITS)?;
        let type_strings = self.axml_buff.read_u32::<LittleEndian>()?;
        let last_public_type = self.axml_buff.read_u32::<LittleEndian>()?;
        let key_strings = self.axml_buff.read_u32::<LittleEndian>()?;
        let last_public_key = self.axml_buff.read_u32::<LittleEndian>()?;

        let mut type_id_offset = 0;
        if header.header_size == PACKAGE_HEADER_SIZE_WITH_OFFSET {
            type_id_offset = self.axml_buff.read_u32::<LittleEndian>()?;
            if type_id_offset > 0 {
                warn!("Please report this application to the maintainers, as it declares a type id offset of {}",
                      type_id_offset);
            }
        }
        header.check_for_unread_header(self.axml_buff)?;

        if id == 0 {
            info!("Package {} has id 0, treating it as a shared library", name);
        }

        /* Both pools normally follow the header back to back */
        let mut pools_end = self.axml_buff.position();
        if type_strings != 0 {
            self.axml_buff.set_position(header.start + u64::from(type_strings));
        }
        let type_pool = StringPool::from_buff(self.axml_buff)?;
        pools_end = pools_end.max(self.axml_buff.position());

        if key_strings != 0 {
            self.axml_buff.set_position(header.start + u64::from(key_strings));
        }
        let key_pool = StringPool::from_buff(self.axml_buff)?;
        pools_end = pools_end.max(self.axml_buff.position());
        self.axml_buff.set_position(pools_end);

        debug!("Package 0x{:02x} {}: {} types, {} keys", id, name, type_pool.len(), key_pool.len());

        let mut package = ResPackage::new(id, &name);
        package.type_strings = type_pool;
        package.key_strings = key_pool;
        package.last_public_type = last_public_type;
        package.last_public_key = last_public_key;
        package.type_id_offset = type_id_offset;
        self.data.packages.push(package);

        Ok(())
    }

    fn read_library(&mut self, header: &ChunkHeader) -> Result<()> {
        let count = self.axml_buff.read_u32::<LittleEndian>()?;
        header.check_for_unread_header(self.axml_buff)?;

        let mut libraries = Vec::with_capacity(count.min(0x100) as usize);
        for _ in 0..count {
            let package_id = self.axml_buff.read_u32::<LittleEndian>()?;
            let package_name = read_utf16_name(self.axml_buff, PACKAGE_NAME_UNITS)?;
            info!("Decoding Shared Library ({}), pkgId: {}", package_name, package_id);
            libraries.push(LibraryEntry { package_id, package_name });
        }

        self.current_package(header)?.libraries.extend(libraries);
        header.skip_chunk(self.axml_buff)
    }

    fn read_staged_alias(&mut self, header: &ChunkHeader) -> Result<()> {
        let count = self.axml_buff.read_u32::<LittleEndian>()?;
        header.check_for_unread_header(self.axml_buff)?;

        let mut aliases = Vec::with_capacity(count.min(0x1000) as usize);
        for _ in 0..count {
            let staged_id = ResId(self.axml_buff.read_u32::<LittleEndian>()?);
            let finalized_id = ResId(self.axml_buff.read_u32::<LittleEndian>()?);
            debug!("Staged alias: {} - {}", staged_id, finalized_id);
            aliases.push(StagedAlias { staged_id, finalized_id });
        }

        self.current_package(header)?.staged_aliases.extend(aliases);
        header.skip_chunk(self.axml_buff)
    }

    /// Overlayable chunks hold their policy chunks as children, so only the
    /// header is consumed here.
    fn read_overlayable(&mut self, header: &ChunkHeader) -> Result<()> {
        let name = read_utf16_name(self.axml_buff, OVERLAYABLE_NAME_UNITS)?;
        let actor = read_utf16_name(self.axml_buff, OVERLAYABLE_NAME_UNITS)?;
        header.check_for_unread_header(self.axml_buff)?;
        debug!("Overlayable {} (actor {})", name, actor);

        self.current_package(header)?.overlayables.push(Overlayable {
            name,
            actor,
            policies: Vec::new(),
        });

        Ok(())
    }

    fn read_overlayable_policy(&mut self, header: &ChunkHeader) -> Result<()> {
        let flags = self.axml_buff.read_u32::<LittleEndian>()?;
        let count = self.axml_buff.read_u32::<LittleEndian>()?;
        header.check_for_unread_header(self.axml_buff)?;

        let mut ids = Vec::with_capacity(count.min(0x1000) as usize);
        for _ in 0..count {
            ids.push(ResId(self.axml_buff.read_u32::<LittleEndian>()?));
        }

        let package = self.current_package(header)?;
        match package.overlayables.last_mut() {
            Some(overlayable) => overlayable.policies.push(OverlayablePolicy { flags, ids }),
            None => warn!("Overlayable policy outside of an overlayable, dropping {} ids", count),
        }
        header.skip_chunk(self.axml_buff)
    }

    /// Type id as used in resource ids; split packages store it shifted
    /// by the package's type id offset in both TYPE_SPEC and TYPE chunks.
    fn logical_type_id(&mut self, header: &ChunkHeader, raw_id: u8) -> Result<u8> {
        let type_id_offset = self.current_package(header)?.type_id_offset;
        u32::from(raw_id).checked_sub(type_id_offset)
            .and_then(|id| u8::try_from(id).ok())
            .ok_or_else(|| Error::format(header.start, format!(
                "type id {} is below the package type id offset {}", raw_id, type_id_offset)))
    }

    fn read_type_spec(&mut self, header: &ChunkHeader) -> Result<()> {
        let raw_id = self.axml_buff.read_u8()?;
        let _res0 = self.axml_buff.read_u8()?;
        let _types_count = self.axml_buff.read_u16::<LittleEndian>()?;
        let entry_count = self.axml_buff.read_u32::<LittleEndian>()?;
        header.check_for_unread_header(self.axml_buff)?;
        let id = self.logical_type_id(header, raw_id)?;

        if self.options.store_flags_offsets {
            self.data.flags_offsets.push(FlagsOffset {
                offset: self.axml_buff.position(),
                count: entry_count,
            });
        }

        let available = (header.end.saturating_sub(self.axml_buff.position()) / 4) as u32;
        if entry_count > available {
            return Err(Error::format(header.start, format!(
                "type spec announces {} entries but only has room for {}", entry_count, available)));
        }
        let mut flags = Vec::with_capacity(entry_count as usize);
        for _ in 0..entry_count {
            flags.push(self.axml_buff.read_u32::<LittleEndian>()?);
        }

        let package = self.current_package(header)?;
        let name = package.type_name(id);
        debug!("Type spec 0x{:02x} {} with {} entries", id, name, entry_count);
        match package.type_spec_mut(id) {
            Some(spec) => spec.flags = flags,
            None => {
                let mut spec = ResTypeSpec::new(id, &name, 0);
                spec.flags = flags;
                package.type_specs.push(spec);
            },
        }

        header.skip_chunk(self.axml_buff)
    }

    fn read_type(&mut self, header: &ChunkHeader) -> Result<()> {
        let raw_id = self.axml_buff.read_u8()?;
        let type_flags = self.axml_buff.read_u8()?;
        let _reserved = self.axml_buff.read_u16::<LittleEndian>()?;
        let entry_count = self.axml_buff.read_u32::<LittleEndian>()?;
        let entries_start = self.axml_buff.read_u32::<LittleEndian>()?;

        let type_id = self.logical_type_id(header, raw_id)?;

        let mut config = ResConfig::from_buff(self.axml_buff)?;
        header.check_for_unread_header(self.axml_buff)?;

        /* (entry index, offset from entries_start) */
        let mut offsets = Vec::with_capacity(entry_count.min(0x10000) as usize);
        if (type_flags & TYPE_FLAG_SPARSE) != 0 {
            for _ in 0..entry_count {
                let index = self.axml_buff.read_u16::<LittleEndian>()?;
                let offset = u32::from(self.axml_buff.read_u16::<LittleEndian>()?) * 4;
                offsets.push((index, offset));
            }
        } else if (type_flags & TYPE_FLAG_OFFSET16) != 0 {
            for index in 0..entry_count {
                let index = entry_index(header, index)?;
                let offset = self.axml_buff.read_u16::<LittleEndian>()?;
                let offset = if offset == NO_ENTRY_OFFSET16 { NO_ENTRY } else { u32::from(offset) * 4 };
                offsets.push((index, offset));
            }
        } else {
            for index in 0..entry_count {
                let index = entry_index(header, index)?;
                offsets.push((index, self.axml_buff.read_u32::<LittleEndian>()?));
            }
        }

        let options = self.options;
        let package_index = self.data.packages.len() - 1;
        let package = self.current_package(header)?;
        let package_byte = package.package_byte();
        if package.type_spec(type_id).is_none() {
            let name = package.type_name(type_id);
            debug!("Type chunk 0x{:02x} {} without a type spec", type_id, name);
            package.type_specs.push(ResTypeSpec::new(type_id, &name, 0));
        }

        if config.is_invalid() {
            let res_name = format!("{}{}", package.type_name(type_id), config.qualifiers());
            if options.keep_broken {
                warn!("Invalid config flags detected: {}", res_name);
                config.set_err_index(self.err_counter);
                self.err_counter += 1;
            } else {
                warn!("Invalid config flags detected. Dropping resources: {}", res_name);
                return header.skip_chunk(self.axml_buff);
            }
        }

        if let Some(spec) = self.current_package(header)?.type_spec_mut(type_id) {
            let res_type = spec.type_for_config_mut(&config);
            res_type.entry_count = res_type.entry_count.max(entry_count);
        }

        let entries_base = header.start + u64::from(entries_start);
        let mut furthest = self.axml_buff.position();
        for (i, (index, offset)) in offsets.iter().enumerate() {
            let id = ResId::new(package_byte, type_id, *index);
            if *offset == NO_ENTRY {
                self.missing.insert((package_index, id));
                continue;
            }

            let position = entries_base + u64::from(*offset);
            if position >= header.end {
                warn!("End of chunk hit. Skipping remaining entries ({}) in type: {}",
                      offsets.len() - i, type_id);
                break;
            }

            self.axml_buff.set_position(position);
            let entry = self.read_entry(header)?;
            furthest = furthest.max(self.axml_buff.position());
            match entry {
                Some(entry) => self.add_entry(header, id, &config, entry)?,
                None => {
                    self.missing.insert((package_index, id));
                },
            }
        }

        if furthest < header.end {
            let extra = header.end - furthest;
            if extra >= 4 {
                warn!("Unknown data detected. Skipping: {} byte(s)", extra);
            }
        }

        header.skip_chunk(self.axml_buff)
    }

    fn add_entry(&mut self,
                 header: &ChunkHeader,
                 id: ResId,
                 config: &ResConfig,
                 entry: ResEntry) -> Result<()> {
        let keep_broken = self.options.keep_broken;
        let package = self.current_package(header)?;
        if !package.has_spec(id) {
            let name = package.key_strings.get(entry.key).unwrap_or("").to_string();
            package.add_spec(id, &name);
        }
        package.add_entry(id, config, entry, keep_broken)
            .map_err(|e| match e {
                Error::Format { message, .. } => Error::format(header.start, message),
                other => other,
            })
    }

    /// Read an entry at the current position. `None` marks an entry that is
    /// absent or too broken to keep.
    fn read_entry(&mut self, header: &ChunkHeader) -> Result<Option<ResEntry>> {
        let size = self.axml_buff.read_u16::<LittleEndian>()?;
        let flags = self.axml_buff.read_u16::<LittleEndian>()?;
        let key = self.axml_buff.read_u32::<LittleEndian>()?;

        let is_compact = (flags & ENTRY_FLAG_COMPACT) != 0;
        if key == NO_ENTRY && !is_compact {
            return Ok(None);
        }

        if is_compact {
            /* Key index in the size field, type in the high flag byte and the
             * data in place of the key */
            let value = ResValue {
                size: ResValue::SIZE,
                res0: 0,
                data_type: (flags >> 8) as u8,
                data: key,
            };
            return Ok(Some(ResEntry {
                flags: flags & 0x00FF & !ENTRY_FLAG_COMPACT,
                key: u32::from(size),
                value: EntryValue::Scalar(value),
            }));
        }

        let value = if (flags & ENTRY_FLAG_COMPLEX) != 0 {
            EntryValue::Bag(self.read_complex_entry(header)?)
        } else {
            match self.read_value()? {
                Some(value) => EntryValue::Scalar(value),
                None => return Ok(None),
            }
        };

        Ok(Some(ResEntry { flags, key, value }))
    }

    fn read_complex_entry(&mut self, header: &ChunkHeader) -> Result<ResBag> {
        let parent = ResId(self.axml_buff.read_u32::<LittleEndian>()?);
        let count = self.axml_buff.read_u32::<LittleEndian>()?;

        let available = header.end.saturating_sub(self.axml_buff.position()) / 12;
        if u64::from(count) > available {
            return Err(Error::format(self.axml_buff.position(), format!(
                "bag announces {} items but only has room for {}", count, available)));
        }

        let mut items = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name = ResId(self.axml_buff.read_u32::<LittleEndian>()?);
            /* Malformed duplicates are skipped like the platform does */
            if let Some(value) = self.read_value()? {
                items.push((name, value));
            }
        }

        Ok(ResBag { parent, items })
    }

    fn read_value(&mut self) -> Result<Option<ResValue>> {
        let start = self.axml_buff.position();
        let size = self.axml_buff.read_u16::<LittleEndian>()?;
        if size < ResValue::SIZE {
            self.axml_buff.set_position(start + u64::from(ResValue::SIZE));
            return Ok(None);
        }
        self.axml_buff.set_position(start);
        let value = ResValue::from_buff(self.axml_buff)?;
        if value.data_type == DataValueType::TypeString.as_u8()
            && self.data.strings.get(value.data).is_none() {
            warn!("String value index {} at 0x{:08X} is outside of the table strings", value.data, start);
        }

        Ok(Some(value))
    }

    /// Give every id left empty by its type chunks a placeholder spec, so
    /// that the id range of each type has no holes.
    fn add_missing_res_specs(&mut self) -> Result<()> {
        let missing = std::mem::take(&mut self.missing);
        for (package_index, id) in missing {
            let package = &mut self.data.packages[package_index];
            if package.has_spec(id) {
                continue;
            }

            let name = format!("APKTOOL_DUMMY_{:x}", id.entry_id());
            let key = package.key_strings.find(&name)
                .unwrap_or_else(|| package.key_strings.push(&name));
            package.add_spec(id, &name);
            let entry = ResEntry {
                flags: 0,
                key,
                value: EntryValue::Scalar(ResValue::new(DataValueType::TypeReference, 0)),
            };
            package.add_entry(id, &ResConfig::default(), entry, true)?;
        }

        Ok(())
    }
}

/// Entry index of the `index`-th slot of a type chunk's offset table.
fn entry_index(header: &ChunkHeader, index: u32) -> Result<u16> {
    u16::try_from(index)
        .map_err(|_| Error::format(header.start, format!("entry index {} does not fit in an id", index)))
}

/// Fixed-size, NUL-padded UTF-16 name field.
fn read_utf16_name<T: AsRef<[u8]>>(axml_buff: &mut Cursor<T>, units: usize) -> Result<String> {
    let mut name = Vec::with_capacity(units);
    let mut ended = false;
    for _ in 0..units {
        let unit = axml_buff.read_u16::<LittleEndian>()?;
        if unit == 0 {
            ended = true;
        }
        if !ended {
            name.push(unit);
        }
    }

    Ok(String::from_utf16_lossy(&name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use crate::arsc_writer::ARSCWriter;
    use crate::chunk_header::{begin_chunk, finalize_chunk};
    use crate::res_package::ResType;

    fn package(id: u32, name: &str, specs: usize) -> ResPackage {
        let mut builder = crate::string_pool::StringPoolBuilder::new(false);
        builder.intern("string");
        let mut keys = crate::string_pool::StringPoolBuilder::new(true);
        for i in 0..specs {
            keys.intern(&format!("s{}", i));
        }

        let mut package = ResPackage::new(id, name);
        package.type_strings = StringPool::from_buff(&mut Cursor::new(builder.to_chunk().unwrap())).unwrap();
        package.key_strings = StringPool::from_buff(&mut Cursor::new(keys.to_chunk().unwrap())).unwrap();

        let mut spec = ResTypeSpec::new(1, "string", specs);
        let mut res_type = ResType::new(ResConfig::default(), specs as u32);
        for i in 0..specs {
            res_type.entries.insert(i as u16, ResEntry {
                flags: 0,
                key: i as u32,
                value: EntryValue::Scalar(ResValue::new(DataValueType::TypeIntDec, i as u32)),
            });
        }
        spec.types.push(res_type);
        package.type_specs.push(spec);
        package
    }

    #[test]
    fn picks_package_with_most_specs() {
        let table = ARSCData {
            packages: vec![
                package(0x7f, "a", 3),
                package(0x7e, "b", 7),
                package(0x7d, "c", 7),
            ],
            ..Default::default()
        };
        let bytes = ARSCWriter::new(&table).write().unwrap();
        let decoded = ARSCData::from_bytes(&bytes, &DecodeOptions::default()).unwrap();

        let counts: Vec<usize> = decoded.packages.iter().map(|p| p.get_res_spec_count()).collect();
        assert_eq!(counts, vec![3, 7, 7]);
        assert_eq!(decoded.find_package_with_most_res_specs(), Some(1));
        assert_eq!(decoded.get_one_package().unwrap().name, "b");
    }

    #[test]
    fn zero_packages_is_an_error() {
        let table = ARSCData::default();
        let bytes = ARSCWriter::new(&table).write().unwrap();
        let decoded = ARSCData::from_bytes(&bytes, &DecodeOptions::default()).unwrap();
        assert!(matches!(decoded.get_one_package(), Err(Error::Format { .. })));
    }

    #[test]
    fn not_a_table() {
        let bytes = [0x03u8, 0x00, 0x08, 0x00, 0x08, 0x00, 0x00, 0x00];
        assert!(matches!(ARSCData::from_bytes(&bytes, &DecodeOptions::default()),
                         Err(Error::UnexpectedChunk { .. })));
    }

    fn write(data: &ARSCData) -> Vec<u8> {
        ARSCWriter::new(data).write().unwrap()
    }

    /// Table with one package whose `string` type has three entries and no
    /// type chunk.
    fn table_without_types(type_id_offset: u32) -> Vec<u8> {
        let mut package = package(0x7f, "p", 3);
        package.type_specs[0].types.clear();
        package.type_id_offset = type_id_offset;
        write(&ARSCData::new(StringPool::default(), vec![package]))
    }

    fn int_entry(buf: &mut Vec<u8>, key: u32, data: u32) {
        buf.write_u16::<LittleEndian>(8).unwrap();
        buf.write_u16::<LittleEndian>(0).unwrap();
        buf.write_u32::<LittleEndian>(key).unwrap();
        ResValue::new(DataValueType::TypeIntDec, data).write(buf).unwrap();
    }

    fn type_chunk(raw_id: u8, type_flags: u8, entry_count: u32, offsets: &[u8], entries: &[u8]) -> Vec<u8> {
        let config = ResConfig::default();
        let header_size = 20 + config.size();
        let mut buf = Vec::new();
        let start = begin_chunk(&mut buf, ChunkType::TableType, header_size as u16).unwrap();
        buf.write_u8(raw_id).unwrap();
        buf.write_u8(type_flags).unwrap();
        buf.write_u16::<LittleEndian>(0).unwrap();
        buf.write_u32::<LittleEndian>(entry_count).unwrap();
        buf.write_u32::<LittleEndian>((header_size + offsets.len()) as u32).unwrap();
        buf.extend_from_slice(config.as_bytes());
        buf.extend_from_slice(offsets);
        buf.extend_from_slice(entries);
        finalize_chunk(&mut buf, start);
        buf
    }

    /* Appends `chunk` to the single package of `table`, patching both sizes */
    fn append_to_package(table: &mut Vec<u8>, chunk: &[u8]) {
        let read_u32 = |buf: &[u8], at: usize| u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        let package_start = 12 + read_u32(table, 16) as usize;
        let grow = chunk.len() as u32;
        let table_size = read_u32(table, 4) + grow;
        let package_size = read_u32(table, package_start + 4) + grow;
        table[4..8].copy_from_slice(&table_size.to_le_bytes());
        table[package_start + 4..package_start + 8].copy_from_slice(&package_size.to_le_bytes());
        table.extend_from_slice(chunk);
    }

    fn int_at(package: &ResPackage, id: u32) -> Option<u32> {
        package.entry(ResId(id), &ResConfig::default())
            .and_then(|e| e.scalar())
            .map(|v| v.data)
    }

    #[test]
    fn sparse_type_chunk() {
        let mut offsets = Vec::new();
        for (index, offset) in [(0u16, 0u16), (2, 4)] {
            offsets.write_u16::<LittleEndian>(index).unwrap();
            offsets.write_u16::<LittleEndian>(offset).unwrap();
        }
        let mut entries = Vec::new();
        int_entry(&mut entries, 0, 10);
        int_entry(&mut entries, 2, 12);

        let mut bytes = table_without_types(0);
        append_to_package(&mut bytes, &type_chunk(1, TYPE_FLAG_SPARSE, 2, &offsets, &entries));
        let data = ARSCData::from_bytes(&bytes, &DecodeOptions::default()).unwrap();
        let package = &data.packages[0];

        assert_eq!(int_at(package, 0x7f01_0000), Some(10));
        assert_eq!(int_at(package, 0x7f01_0002), Some(12));
        assert!(!package.has_spec(ResId(0x7f01_0001)));
        assert_eq!(package.spec(ResId(0x7f01_0002)).map(|s| s.name.as_str()), Some("s2"));
    }

    #[test]
    fn offset16_type_chunk() {
        let mut offsets = Vec::new();
        for offset in [0u16, NO_ENTRY_OFFSET16, 4] {
            offsets.write_u16::<LittleEndian>(offset).unwrap();
        }
        let mut entries = Vec::new();
        int_entry(&mut entries, 0, 20);
        int_entry(&mut entries, 2, 22);

        let mut bytes = table_without_types(0);
        append_to_package(&mut bytes, &type_chunk(1, TYPE_FLAG_OFFSET16, 3, &offsets, &entries));

        let data = ARSCData::from_bytes(&bytes, &DecodeOptions::default()).unwrap();
        let package = &data.packages[0];
        assert_eq!(int_at(package, 0x7f01_0000), Some(20));
        assert_eq!(int_at(package, 0x7f01_0002), Some(22));
        assert!(!package.has_spec(ResId(0x7f01_0001)));

        let options = DecodeOptions {
            add_dummy_specs: true,
            ..Default::default()
        };
        let data = ARSCData::from_bytes(&bytes, &options).unwrap();
        assert_eq!(data.packages[0].spec(ResId(0x7f01_0001)).map(|s| s.name.as_str()),
                   Some("APKTOOL_DUMMY_1"));
    }

    #[test]
    fn type_ids_are_shifted_by_the_package_offset() {
        let mut offsets = Vec::new();
        offsets.write_u32::<LittleEndian>(0).unwrap();
        let mut entries = Vec::new();
        int_entry(&mut entries, 0, 30);

        /* The spec chunk is written as type 3; the type chunk must match */
        let mut bytes = table_without_types(2);
        append_to_package(&mut bytes, &type_chunk(3, 0, 1, &offsets, &entries));

        let data = ARSCData::from_bytes(&bytes, &DecodeOptions::default()).unwrap();
        let package = &data.packages[0];
        assert_eq!(package.type_id_offset, 2);
        assert_eq!(package.type_specs.len(), 1);
        assert_eq!(package.type_specs[0].id, 1);
        assert_eq!(package.type_specs[0].name, "string");
        assert_eq!(int_at(package, 0x7f01_0000), Some(30));
    }

    #[test]
    fn type_id_offset_survives_a_rewrite() {
        let mut package = package(0x7f, "p", 1);
        package.type_id_offset = 2;
        package.type_specs[0].flags = vec![0x4];
        let bytes = write(&ARSCData::new(StringPool::default(), vec![package]));

        let decoded = ARSCData::from_bytes(&bytes, &DecodeOptions::default()).unwrap();
        let specs: Vec<(u8, Vec<u32>, usize)> = decoded.packages[0].type_specs.iter()
            .map(|s| (s.id, s.flags.clone(), s.types.len()))
            .collect();
        assert_eq!(specs, vec![(1, vec![0x4], 1)]);
        assert_eq!(write(&decoded), bytes);
    }

    #[test]
    fn type_below_the_offset_is_rejected() {
        let mut offsets = Vec::new();
        offsets.write_u32::<LittleEndian>(NO_ENTRY).unwrap();
        let mut bytes = table_without_types(2);
        append_to_package(&mut bytes, &type_chunk(1, 0, 1, &offsets, &[]));
        assert!(matches!(ARSCData::from_bytes(&bytes, &DecodeOptions::default()),
                         Err(Error::Format { .. })));
    }

    #[test]
    fn entry_count_beyond_u16_ids_is_rejected() {
        let offsets = vec![0xFFu8; 0x10000 * 4];
        let mut bytes = table_without_types(0);
        append_to_package(&mut bytes, &type_chunk(1, 0, 0x10001, &offsets, &[]));
        assert!(matches!(ARSCData::from_bytes(&bytes, &DecodeOptions::default()),
                         Err(Error::Format { .. })));
    }

    #[test]
    fn utf16_name_stops_at_nul() {
        let mut bytes = Vec::new();
        for unit in "pkg".encode_utf16().chain([0, b'x' as u16]) {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let mut cursor = Cursor::new(bytes);
        assert_eq!(read_utf16_name(&mut cursor, 5).unwrap(), "pkg");
        assert_eq!(cursor.position(), 10);
    }
}
