//! Attribute definitions (`<attr>` bags) and the lazily named symbols of
//! enum and flag attributes.

use log::warn;
use once_cell::unsync::OnceCell;

use crate::data_value_type::DataValueType;
use crate::error::{Error, Result};
use crate::res_package::{ResBag, ResId};
use crate::res_value::ResValue;

/* Bag keys with a special meaning inside an attr bag */
pub const ATTR_TYPE: u32 = 0x0100_0000;
pub const ATTR_MIN: u32 = 0x0100_0001;
pub const ATTR_MAX: u32 = 0x0100_0002;
pub const ATTR_L10N: u32 = 0x0100_0003;

/* Accepted value formats, low 16 bits of the ATTR_TYPE value */
pub const TYPE_REFERENCE: u32 = 0x01;
pub const TYPE_STRING: u32 = 0x02;
pub const TYPE_INT: u32 = 0x04;
pub const TYPE_BOOL: u32 = 0x08;
pub const TYPE_COLOR: u32 = 0x10;
pub const TYPE_FLOAT: u32 = 0x20;
pub const TYPE_DIMEN: u32 = 0x40;
pub const TYPE_FRACTION: u32 = 0x80;
pub const TYPE_ANY: u32 = 0xFFFF;

pub const TYPE_ENUM: u32 = 0x0001_0000;
pub const TYPE_FLAGS: u32 = 0x0002_0000;

const TYPE_NAMES: [(u32, &str); 8] = [
    (TYPE_REFERENCE, "reference"),
    (TYPE_STRING, "string"),
    (TYPE_INT, "integer"),
    (TYPE_BOOL, "boolean"),
    (TYPE_COLOR, "color"),
    (TYPE_FLOAT, "float"),
    (TYPE_DIMEN, "dimension"),
    (TYPE_FRACTION, "fraction"),
];

/// Name lookups needed to turn ids back into text.
pub trait ResourceResolver {
    /// Bare entry name of a resource, e.g. `vertical`.
    fn spec_name(&self, id: ResId) -> Option<String>;

    /// `type/name`, prefixed with `package:` when the resource lives outside
    /// the main package.
    fn reference_name(&self, id: ResId) -> Option<String>;

    /// Attribute definition for an attr resource id.
    fn attribute(&self, id: ResId) -> Option<&ResAttr>;

    /// False when there is no table behind the resolver; references are
    /// then written numerically instead of as missing names.
    fn has_names(&self) -> bool {
        true
    }
}

/// Resolver that knows nothing; references stay numeric.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoResolver;

impl ResourceResolver for NoResolver {
    fn spec_name(&self, _id: ResId) -> Option<String> {
        None
    }

    fn reference_name(&self, _id: ResId) -> Option<String> {
        None
    }

    fn attribute(&self, _id: ResId) -> Option<&ResAttr> {
        None
    }

    fn has_names(&self) -> bool {
        false
    }
}

/// Enum or flag symbol: a value bound to a name through a resource
/// reference. The name is looked up on first use and then cached.
#[derive(Debug, Clone)]
pub struct FlagItem {
    pub reference: ResId,
    pub flag: u32,
    name: OnceCell<String>,
}

impl FlagItem {
    pub fn new(reference: ResId, flag: u32) -> Self {
        FlagItem {
            reference,
            flag,
            name: OnceCell::new(),
        }
    }

    /// Name of the symbol, failing when the reference does not resolve.
    pub fn try_value(&self, resolver: &dyn ResourceResolver) -> Result<&str> {
        self.name
            .get_or_try_init(|| {
                resolver.spec_name(self.reference)
                    .ok_or(Error::UnresolvedReference(self.reference.0))
            })
            .map(|s| s.as_str())
    }

    /// Name of the symbol. An unresolved reference is replaced by an
    /// `APKTOOL_MISSING_` placeholder, which is cached like a real name.
    pub fn value(&self, resolver: &dyn ResourceResolver) -> &str {
        if let Err(e) = self.try_value(resolver) {
            warn!("{}", e);
            let _ = self.name.set(format!("APKTOOL_MISSING_{}", self.reference));
        }
        self.name.get().map(|s| s.as_str()).unwrap_or("")
    }
}

#[derive(Debug, Clone)]
pub enum AttrSymbols {
    None,
    Enum(Vec<FlagItem>),
    Flags(Vec<FlagItem>),
}

/// Decoded `<attr>` definition.
#[derive(Debug, Clone)]
pub struct ResAttr {
    pub parent: ResId,

    /* Accepted formats, TYPE_* bits */
    pub type_mask: u32,

    pub min: Option<i32>,
    pub max: Option<i32>,
    pub l10n: Option<bool>,
    pub symbols: AttrSymbols,
}

impl ResAttr {
    /// Read an attr bag. The first item must be the ATTR_TYPE entry; min,
    /// max and l10n may follow, every remaining item is an enum or flag
    /// symbol.
    pub fn from_bag(bag: &ResBag) -> Result<Self> {
        let (first_key, first_value) = match bag.items.first() {
            Some(first) => first,
            None => return Err(Error::format(0, "attr bag without items")),
        };
        if first_key.0 != ATTR_TYPE {
            return Err(Error::format(0, format!("attr bag starts with key {}", first_key)));
        }

        let raw_type = first_value.data;
        let mut min = None;
        let mut max = None;
        let mut l10n = None;

        let mut rest = bag.items[1..].iter().peekable();
        while let Some((key, value)) = rest.peek() {
            match key.0 {
                ATTR_MIN => min = Some(value.data as i32),
                ATTR_MAX => max = Some(value.data as i32),
                ATTR_L10N => l10n = Some(value.data != 0),
                _ => break,
            }
            rest.next();
        }

        let items: Vec<FlagItem> = rest.map(|(key, value)| FlagItem::new(*key, value.data)).collect();
        let symbols = if items.is_empty() {
            AttrSymbols::None
        } else {
            match raw_type & 0x00FF_0000 {
                TYPE_ENUM => AttrSymbols::Enum(items),
                TYPE_FLAGS => AttrSymbols::Flags(items),
                _ => return Err(Error::format(0, "Could not decode attr value")),
            }
        };

        Ok(ResAttr {
            parent: bag.parent,
            type_mask: raw_type & 0xFFFF,
            min,
            max,
            l10n,
            symbols,
        })
    }

    /// `format` attribute of a values-file `<attr>`, e.g. `reference|color`.
    pub fn type_as_string(&self) -> Option<String> {
        let names: Vec<&str> = TYPE_NAMES.iter()
            .filter(|(bit, _)| (self.type_mask & bit) != 0)
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            None
        } else {
            Some(names.join("|"))
        }
    }

    /// Render an attribute value through the attr's symbols. Returns `None`
    /// when the symbols do not apply and plain coercion should be used.
    pub fn convert_to_res_xml_format(&self,
                                     value: &ResValue,
                                     resolver: &dyn ResourceResolver) -> Option<String> {
        let is_int = value.value_type().map_or(false, |t| t.is_int());
        match &self.symbols {
            AttrSymbols::None => None,
            AttrSymbols::Enum(items) => {
                if !is_int {
                    return None;
                }
                items.iter()
                    .find(|item| item.flag == value.data)
                    .map(|item| item.value(resolver).to_string())
            },
            AttrSymbols::Flags(items) => {
                if value.is_reference() || !is_int {
                    return None;
                }
                render_flags(items, value.data, resolver)
            },
        }
    }
}

/// Zero flags render only for a zero value. Otherwise every flag fully
/// contained in the value is listed, widest first, skipping flags that are
/// already covered by a listed one. `None` when no flag matches, so the
/// value is written as a number.
fn render_flags(items: &[FlagItem], value: u32, resolver: &dyn ResourceResolver) -> Option<String> {
    let (zero_flags, mut flags): (Vec<&FlagItem>, Vec<&FlagItem>) =
        items.iter().partition(|item| item.flag == 0);

    if value == 0 {
        return join_flags(&zero_flags, resolver);
    }

    /* Stable: equal bit counts keep declaration order */
    flags.sort_by(|a, b| b.flag.count_ones().cmp(&a.flag.count_ones()));

    let mut picked: Vec<&FlagItem> = Vec::new();
    for item in flags {
        if (value & item.flag) != item.flag {
            continue;
        }
        if picked.iter().any(|p| (p.flag & item.flag) == item.flag) {
            continue;
        }
        picked.push(item);
    }

    join_flags(&picked, resolver)
}

fn join_flags(items: &[&FlagItem], resolver: &dyn ResourceResolver) -> Option<String> {
    if items.is_empty() {
        return None;
    }
    Some(items.iter().map(|item| item.value(resolver)).collect::<Vec<_>>().join("|"))
}

/// Reference or attribute text for `value` through `resolver`, or `None`
/// when `value` is no reference.
pub fn resolve_reference(value: &ResValue, resolver: &dyn ResourceResolver) -> Option<String> {
    let value_type = value.value_type()?;
    let prefix = match value_type {
        DataValueType::TypeReference | DataValueType::TypeDynamicReference => '@',
        DataValueType::TypeAttribute | DataValueType::TypeDynamicAttribute => '?',
        _ => return None,
    };
    if value.data == 0 || !resolver.has_names() {
        return None;
    }

    let id = ResId(value.data);
    Some(match resolver.reference_name(id) {
        Some(name) => format!("{}{}", prefix, name),
        None => {
            warn!("{}", Error::UnresolvedReference(id.0));
            format!("{}APKTOOL_MISSING_{}", prefix, id)
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::HashMap;

    struct MapResolver {
        names: HashMap<u32, &'static str>,
        lookups: Cell<usize>,
    }

    impl ResourceResolver for MapResolver {
        fn spec_name(&self, id: ResId) -> Option<String> {
            self.lookups.set(self.lookups.get() + 1);
            self.names.get(&id.0).map(|s| s.to_string())
        }

        fn reference_name(&self, id: ResId) -> Option<String> {
            self.names.get(&id.0).map(|s| format!("id/{}", s))
        }

        fn attribute(&self, _id: ResId) -> Option<&ResAttr> {
            None
        }
    }

    fn resolver() -> MapResolver {
        let mut names = HashMap::new();
        names.insert(0x7f05_0000, "none");
        names.insert(0x7f05_0001, "top");
        names.insert(0x7f05_0002, "bottom");
        names.insert(0x7f05_0003, "vertical");
        MapResolver { names, lookups: Cell::new(0) }
    }

    fn int(data: u32) -> ResValue {
        ResValue::new(DataValueType::TypeIntHex, data)
    }

    fn flags_attr() -> ResAttr {
        let bag = ResBag {
            parent: ResId(0),
            items: vec![
                (ResId(ATTR_TYPE), int(TYPE_FLAGS)),
                (ResId(0x7f05_0000), int(0)),
                (ResId(0x7f05_0001), int(0x1)),
                (ResId(0x7f05_0002), int(0x2)),
                (ResId(0x7f05_0003), int(0x3)),
            ],
        };
        ResAttr::from_bag(&bag).unwrap()
    }

    #[test]
    fn flag_item_is_memoised() {
        let resolver = resolver();
        let item = FlagItem::new(ResId(0x7f05_0001), 1);
        assert_eq!(item.value(&resolver), "top");
        assert_eq!(item.value(&resolver), "top");
        assert_eq!(resolver.lookups.get(), 1);
    }

    #[test]
    fn unresolved_flag_item() {
        let resolver = resolver();
        let item = FlagItem::new(ResId(0x7f05_00ff), 1);
        assert!(matches!(item.try_value(&resolver), Err(Error::UnresolvedReference(0x7f05_00ff))));
        assert_eq!(item.value(&resolver), "APKTOOL_MISSING_0x7f0500ff");
    }

    #[test]
    fn flags_render_widest_first() {
        let resolver = resolver();
        let attr = flags_attr();
        assert_eq!(attr.convert_to_res_xml_format(&int(0), &resolver).as_deref(), Some("none"));
        assert_eq!(attr.convert_to_res_xml_format(&int(3), &resolver).as_deref(), Some("vertical"));
        assert_eq!(attr.convert_to_res_xml_format(&int(2), &resolver).as_deref(), Some("bottom"));
        let reference = ResValue::new(DataValueType::TypeReference, 0x7f05_0001);
        assert_eq!(attr.convert_to_res_xml_format(&reference, &resolver), None);
    }

    #[test]
    fn unmatched_flags_fall_back_to_the_number() {
        let resolver = resolver();
        let attr = flags_attr();
        assert_eq!(attr.convert_to_res_xml_format(&int(4), &resolver), None);
        assert_eq!(int(4).coerce_to_string().as_deref(), Some("0x4"));
    }

    #[test]
    fn enum_and_attr_fields() {
        let resolver = resolver();
        let bag = ResBag {
            parent: ResId(0),
            items: vec![
                (ResId(ATTR_TYPE), int(TYPE_ENUM | TYPE_INT | TYPE_REFERENCE)),
                (ResId(ATTR_MIN), int(1)),
                (ResId(ATTR_L10N), int(1)),
                (ResId(0x7f05_0001), int(7)),
            ],
        };
        let attr = ResAttr::from_bag(&bag).unwrap();
        assert_eq!(attr.min, Some(1));
        assert_eq!(attr.max, None);
        assert_eq!(attr.l10n, Some(true));
        assert_eq!(attr.type_as_string().as_deref(), Some("reference|integer"));
        assert_eq!(attr.convert_to_res_xml_format(&int(7), &resolver).as_deref(), Some("top"));
        assert_eq!(attr.convert_to_res_xml_format(&int(8), &resolver), None);
    }

    #[test]
    fn references_through_resolver() {
        let resolver = resolver();
        let reference = ResValue::new(DataValueType::TypeReference, 0x7f05_0002);
        assert_eq!(resolve_reference(&reference, &resolver).as_deref(), Some("@id/bottom"));
        let attribute = ResValue::new(DataValueType::TypeAttribute, 0x7f05_0009);
        assert_eq!(resolve_reference(&attribute, &resolver).as_deref(),
                   Some("?APKTOOL_MISSING_0x7f050009"));
        assert_eq!(resolve_reference(&int(3), &resolver), None);
    }
}
