use std::collections::{
    BTreeMap,
    HashSet,
};
use std::fmt;
use log::warn;

use crate::error::{Error, Result};
use crate::res_config::ResConfig;
use crate::res_value::ResValue;
use crate::string_pool::StringPool;

/* ResTable_entry flags */
pub const ENTRY_FLAG_COMPLEX: u16 = 0x0001;
pub const ENTRY_FLAG_PUBLIC: u16 = 0x0002;
pub const ENTRY_FLAG_WEAK: u16 = 0x0004;
pub const ENTRY_FLAG_COMPACT: u16 = 0x0008;

/* ResTable_typeSpec flag: the resource is public */
pub const SPEC_PUBLIC: u32 = 0x4000_0000;

/// Resource identifier, `0xPPTTEEEE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ResId(pub u32);

impl ResId {
    pub fn new(package_id: u8, type_id: u8, entry_id: u16) -> Self {
        ResId(u32::from(package_id) << 24 | u32::from(type_id) << 16 | u32::from(entry_id))
    }

    pub fn package_id(self) -> u8 {
        (self.0 >> 24) as u8
    }

    pub fn type_id(self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub fn entry_id(self) -> u16 {
        self.0 as u16
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ResId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// Complex entry: an optional parent and ordered (name, value) pairs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResBag {
    pub parent: ResId,
    pub items: Vec<(ResId, ResValue)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryValue {
    Scalar(ResValue),
    Bag(ResBag),
}

/// One entry of a type chunk. `key` indexes the package key string pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResEntry {
    pub flags: u16,
    pub key: u32,
    pub value: EntryValue,
}

impl ResEntry {
    pub fn is_complex(&self) -> bool {
        matches!(self.value, EntryValue::Bag(_))
    }

    pub fn is_public(&self) -> bool {
        (self.flags & ENTRY_FLAG_PUBLIC) != 0
    }

    pub fn is_weak(&self) -> bool {
        (self.flags & ENTRY_FLAG_WEAK) != 0
    }

    pub fn scalar(&self) -> Option<&ResValue> {
        match &self.value {
            EntryValue::Scalar(value) => Some(value),
            EntryValue::Bag(_) => None,
        }
    }

    pub fn bag(&self) -> Option<&ResBag> {
        match &self.value {
            EntryValue::Bag(bag) => Some(bag),
            EntryValue::Scalar(_) => None,
        }
    }
}

/// Entries of one type under one configuration (a `ResTable_type` chunk).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResType {
    pub config: ResConfig,

    /* Number of entry slots, present or not */
    pub entry_count: u32,

    pub entries: BTreeMap<u16, ResEntry>,
}

impl ResType {
    pub fn new(config: ResConfig, entry_count: u32) -> Self {
        ResType {
            config,
            entry_count,
            entries: BTreeMap::new(),
        }
    }

    pub fn entry(&self, entry_id: u16) -> Option<&ResEntry> {
        self.entries.get(&entry_id)
    }
}

/// A resource type (`drawable`, `string`, ...) with its per-entry
/// configuration-change flags and every configuration it is defined for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResTypeSpec {
    pub id: u8,
    pub name: String,

    /* One word per entry: configuration axes the entry varies on, plus
     * SPEC_PUBLIC */
    pub flags: Vec<u32>,

    pub types: Vec<ResType>,
}

impl ResTypeSpec {
    pub fn new(id: u8, name: &str, entry_count: usize) -> Self {
        ResTypeSpec {
            id,
            name: name.to_string(),
            flags: vec![0; entry_count],
            types: Vec::new(),
        }
    }

    pub fn entry_count(&self) -> usize {
        let types_max = self.types.iter().map(|t| t.entry_count as usize).max().unwrap_or(0);
        self.flags.len().max(types_max)
    }

    pub fn type_for_config(&self, config: &ResConfig) -> Option<&ResType> {
        self.types.iter().find(|t| t.config == *config)
    }

    /// Type chunk for `config`, appended when missing.
    pub fn type_for_config_mut(&mut self, config: &ResConfig) -> &mut ResType {
        let index = match self.types.iter().position(|t| t.config == *config) {
            Some(index) => index,
            None => {
                let entry_count = self.entry_count() as u32;
                self.types.push(ResType::new(config.clone(), entry_count));
                self.types.len() - 1
            },
        };
        &mut self.types[index]
    }
}

/// Named resource, unique per package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResSpec {
    pub id: ResId,
    pub name: String,
    pub type_name: String,
}

impl ResSpec {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.type_name, self.name)
    }
}

/* Entry of a RES_TABLE_LIBRARY chunk: a package id assigned at runtime */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryEntry {
    pub package_id: u32,
    pub package_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagedAlias {
    pub staged_id: ResId,
    pub finalized_id: ResId,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OverlayablePolicy {
    pub flags: u32,
    pub ids: Vec<ResId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Overlayable {
    pub name: String,
    pub actor: String,
    pub policies: Vec<OverlayablePolicy>,
}

/**
 * A collection of resource data types within a package.
 *
 * Type specs are kept in table order; names are assigned to specs as entries
 * are decoded, so that every id maps to exactly one unique name.
 */
#[derive(Debug, Clone, Default)]
pub struct ResPackage {
    /* If this is a base package, its ID.  Package IDs start
     * at 1 (corresponding to the value of the package bits in a
     * resource identifier).  0 means this is not a base package. */
    pub id: u32,

    pub name: String,

    /* Resource type symbol table */
    pub type_strings: StringPool,

    /* Resource key symbol table */
    pub key_strings: StringPool,

    pub last_public_type: u32,
    pub last_public_key: u32,

    /* Split packages number their types from an offset */
    pub type_id_offset: u32,

    pub type_specs: Vec<ResTypeSpec>,
    pub libraries: Vec<LibraryEntry>,
    pub staged_aliases: Vec<StagedAlias>,
    pub overlayables: Vec<Overlayable>,

    specs: BTreeMap<ResId, ResSpec>,
    spec_names: HashSet<(u8, String)>,
}

impl ResPackage {
    pub fn new(id: u32, name: &str) -> Self {
        ResPackage {
            id,
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Package byte used in the resource ids of this package.
    pub fn package_byte(&self) -> u8 {
        self.id as u8
    }

    pub fn type_spec(&self, type_id: u8) -> Option<&ResTypeSpec> {
        self.type_specs.iter().find(|s| s.id == type_id)
    }

    pub fn type_spec_mut(&mut self, type_id: u8) -> Option<&mut ResTypeSpec> {
        self.type_specs.iter_mut().find(|s| s.id == type_id)
    }

    pub fn type_spec_by_name(&self, name: &str) -> Option<&ResTypeSpec> {
        self.type_specs.iter().find(|s| s.name == name)
    }

    /// Name of a type id from the type string pool (`type id - 1`).
    pub fn type_name(&self, type_id: u8) -> String {
        type_id.checked_sub(1)
            .and_then(|index| self.type_strings.get(u32::from(index)))
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("type{:02x}", type_id))
    }

    pub fn get_res_spec_count(&self) -> usize {
        self.specs.len()
    }

    pub fn has_spec(&self, id: ResId) -> bool {
        self.specs.contains_key(&id)
    }

    pub fn spec(&self, id: ResId) -> Option<&ResSpec> {
        self.specs.get(&id)
    }

    pub fn specs(&self) -> impl Iterator<Item = &ResSpec> {
        self.specs.values()
    }

    /// Entry for `id` under `config`.
    pub fn entry(&self, id: ResId, config: &ResConfig) -> Option<&ResEntry> {
        self.type_spec(id.type_id())?
            .type_for_config(config)?
            .entry(id.entry_id())
    }

    /// Entry for `id` under the default configuration, else under the first
    /// configuration that defines it.
    pub fn any_entry(&self, id: ResId) -> Option<&ResEntry> {
        let spec = self.type_spec(id.type_id())?;
        let default = ResConfig::default();
        spec.type_for_config(&default)
            .and_then(|t| t.entry(id.entry_id()))
            .or_else(|| spec.types.iter().find_map(|t| t.entry(id.entry_id())))
    }

    /// Register the name of a resource the first time one of its entries is
    /// seen. A name already taken inside the type gets a
    /// `_APKTOOL_DUPLICATENAME_` suffix, an empty one becomes
    /// `APKTOOL_DUMMYVAL_<id>`.
    pub fn add_spec(&mut self, id: ResId, name: &str) -> &ResSpec {
        if !self.specs.contains_key(&id) {
            let type_id = id.type_id();
            let name = if name.is_empty() {
                format!("APKTOOL_DUMMYVAL_{}", id)
            } else if self.spec_names.contains(&(type_id, name.to_string())) {
                let renamed = format!("{}_APKTOOL_DUPLICATENAME_{}", name, id);
                warn!("Duplicate resource name {} in type {}, renamed to {}",
                      name, self.type_name(type_id), renamed);
                renamed
            } else {
                name.to_string()
            };

            self.spec_names.insert((type_id, name.clone()));
            let type_name = self.type_spec(type_id)
                .map(|s| s.name.clone())
                .unwrap_or_else(|| self.type_name(type_id));
            self.specs.insert(id, ResSpec { id, name, type_name });
        }

        &self.specs[&id]
    }

    /// Store a decoded entry. Defining the same id twice for one
    /// configuration is an error unless `keep_broken` is set, in which case
    /// the first definition stays.
    pub fn add_entry(&mut self,
                     id: ResId,
                     config: &ResConfig,
                     entry: ResEntry,
                     keep_broken: bool) -> Result<()> {
        let type_id = id.type_id();
        let type_name = self.type_name(type_id);
        let spec = match self.type_spec_mut(type_id) {
            Some(spec) => spec,
            None => {
                return Err(Error::format(0, format!("no type spec for resource {}", id)));
            }
        };

        let res_type = spec.type_for_config_mut(config);
        if res_type.entries.contains_key(&id.entry_id()) {
            let message = format!("Multiple resources: {} {} in config {}",
                                  type_name, id, config);
            if !keep_broken {
                return Err(Error::format(0, message));
            }
            warn!("{}", message);
            return Ok(());
        }
        res_type.entries.insert(id.entry_id(), entry);

        Ok(())
    }
}
