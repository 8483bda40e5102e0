use std::io::Cursor;
use byteorder::{
    LittleEndian,
    ReadBytesExt,
    WriteBytesExt,
};
use log::warn;

use crate::data_value_type::DataValueType;
use crate::error::{Error, Result};
use crate::res_xml_encoders::coerce_to_string;

/* Complex data: bit location of unit information */
const COMPLEX_UNIT_SHIFT: u32 = 0;
const COMPLEX_UNIT_MASK: u32 = 0xf;

/* Complex data: where the radix information is, telling where the decimal
 * place appears in the mantissa. */
const COMPLEX_RADIX_SHIFT: u32 = 4;
const COMPLEX_RADIX_MASK: u32 = 0x3;

const COMPLEX_RADIX_23P0: u32 = 0;
const COMPLEX_RADIX_16P7: u32 = 1;
const COMPLEX_RADIX_8P15: u32 = 2;
const COMPLEX_RADIX_0P23: u32 = 3;

/* Complex data: bit location of mantissa information */
const COMPLEX_MANTISSA_SHIFT: u32 = 8;
const COMPLEX_MANTISSA_MASK: u32 = 0xffffff;

const MANTISSA_MULT: f32 = 1.0 / (1 << COMPLEX_MANTISSA_SHIFT) as f32;
const RADIX_MULTS: [f32; 4] = [
    MANTISSA_MULT,
    1.0 / (1 << 7) as f32 * MANTISSA_MULT,
    1.0 / (1 << 15) as f32 * MANTISSA_MULT,
    1.0 / (1 << 23) as f32 * MANTISSA_MULT,
];

const DIMENSION_UNIT_STRS: [&str; 6] = ["px", "dip", "sp", "pt", "in", "mm"];
const FRACTION_UNIT_STRS: [&str; 2] = ["%", "%p"];

/* Representation of a value in a resource, supplying type
 * information.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResValue {
    /* Number of bytes in this structure */
    pub size: u16,

    /* Always set to 0 */
    pub res0: u8,

    pub data_type: u8,
    pub data: u32,
}

impl ResValue {
    pub const SIZE: u16 = 8;

    pub fn new(data_type: DataValueType, data: u32) -> Self {
        ResValue {
            size: Self::SIZE,
            res0: 0,
            data_type: data_type.as_u8(),
            data,
        }
    }

    pub fn string(index: u32) -> Self {
        Self::new(DataValueType::TypeString, index)
    }

    pub fn from_buff<T: AsRef<[u8]>>(axml_buff: &mut Cursor<T>) -> Result<Self> {
        let start = axml_buff.position();
        let size = axml_buff.read_u16::<LittleEndian>()?;
        let res0 = axml_buff.read_u8()?;
        let data_type = axml_buff.read_u8()?;
        let data = axml_buff.read_u32::<LittleEndian>()?;

        if size < Self::SIZE {
            return Err(Error::format(start, format!("Res_value size {} is below 8", size)));
        }
        if res0 != 0 {
            warn!("Res_value at 0x{:08X} has non-zero res0 0x{:02X}", start, res0);
        }
        if size > Self::SIZE {
            axml_buff.set_position(start + u64::from(size));
        }

        Ok(ResValue {
            size,
            res0,
            data_type,
            data,
        })
    }

    pub fn write(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.write_u16::<LittleEndian>(Self::SIZE)?;
        buf.write_u8(0)?;
        buf.write_u8(self.data_type)?;
        buf.write_u32::<LittleEndian>(self.data)?;

        Ok(())
    }

    pub fn value_type(&self) -> Option<DataValueType> {
        DataValueType::from_val(self.data_type)
    }

    pub fn is_string(&self) -> bool {
        self.data_type == DataValueType::TypeString.as_u8()
    }

    pub fn is_reference(&self) -> bool {
        self.value_type().map_or(false, |t| t.is_reference())
    }

    pub fn is_attribute(&self) -> bool {
        self.value_type().map_or(false, |t| t.is_attribute())
    }

    /// Text form of a non-string value, without resource name resolution.
    pub fn coerce_to_string(&self) -> Option<String> {
        coerce_to_string(self.data_type, self.data)
    }

    /// Infer a typed value from attribute text, the way aapt compiles it.
    /// Returns `None` when the text has to be kept as a string. Only
    /// canonical spellings are accepted so that decoding gives back the
    /// same text.
    pub fn parse_typed(text: &str) -> Option<Self> {
        match text {
            "" => return None,
            "@null" => return Some(Self::new(DataValueType::TypeReference, 0)),
            "@empty" => return Some(Self::new(DataValueType::TypeNull, DataValueType::DATA_NULL_EMPTY)),
            "true" => return Some(Self::new(DataValueType::TypeIntBoolean, 0xFFFF_FFFF)),
            "false" => return Some(Self::new(DataValueType::TypeIntBoolean, 0)),
            _ => {},
        }

        if let Some(id) = text.strip_prefix('@').and_then(parse_canonical_i32) {
            return Some(Self::new(DataValueType::TypeReference, id as u32));
        }
        if let Some(id) = text.strip_prefix('?').and_then(parse_canonical_i32) {
            return Some(Self::new(DataValueType::TypeAttribute, id as u32));
        }
        if let Some(hex) = text.strip_prefix('#') {
            return parse_color(hex);
        }
        if let Some(hex) = text.strip_prefix("0x") {
            return u32::from_str_radix(hex, 16).ok()
                .filter(|v| format!("{:x}", v) == hex)
                .map(|v| Self::new(DataValueType::TypeIntHex, v));
        }
        if let Some(v) = parse_canonical_i32(text) {
            return Some(Self::new(DataValueType::TypeIntDec, v as u32));
        }

        for (unit, name) in FRACTION_UNIT_STRS.iter().enumerate().rev() {
            if let Some(number) = text.strip_suffix(name) {
                let value = parse_canonical_float(number)?;
                let complex = float_to_complex(value / 100.0)? | (unit as u32) << COMPLEX_UNIT_SHIFT;
                return Some(Self::new(DataValueType::TypeFraction, complex))
                    .filter(|v| v.coerce_to_string().as_deref() == Some(text));
            }
        }
        for (unit, name) in DIMENSION_UNIT_STRS.iter().enumerate() {
            if let Some(number) = text.strip_suffix(name).or_else(|| {
                if *name == "dip" { text.strip_suffix("dp") } else { None }
            }) {
                if let Some(value) = parse_canonical_float(number) {
                    let complex = float_to_complex(value)? | (unit as u32) << COMPLEX_UNIT_SHIFT;
                    return Some(Self::new(DataValueType::TypeDimension, complex));
                }
            }
        }

        parse_canonical_float(text)
            .filter(|_| text.contains(['.', 'E']))
            .map(|v| Self::new(DataValueType::TypeFloat, v.to_bits()))
    }
}

fn parse_canonical_i32(text: &str) -> Option<i32> {
    text.parse::<i32>().ok().filter(|v| v.to_string() == text)
}

fn parse_canonical_float(text: &str) -> Option<f32> {
    text.parse::<f32>().ok().filter(|v| format_float(*v) == text)
}

fn parse_color(hex: &str) -> Option<ResValue> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()) {
        return None;
    }
    let value = u32::from_str_radix(hex, 16).ok()?;
    let nibble = |shift: u32| ((value >> shift) & 0xF) * 0x11;

    match hex.len() {
        8 => Some(ResValue::new(DataValueType::TypeIntColorArgb8, value)),
        6 => Some(ResValue::new(DataValueType::TypeIntColorRgb8, 0xFF00_0000 | value)),
        4 => Some(ResValue::new(DataValueType::TypeIntColorArgb4,
            nibble(12) << 24 | nibble(8) << 16 | nibble(4) << 8 | nibble(0))),
        3 => Some(ResValue::new(DataValueType::TypeIntColorRgb4,
            0xFF00_0000 | nibble(8) << 16 | nibble(4) << 8 | nibble(0))),
        _ => None,
    }
}

/// Value held by a complex (dimension or fraction) data word.
pub fn complex_to_float(complex: u32) -> f32 {
    let mantissa = (complex & (COMPLEX_MANTISSA_MASK << COMPLEX_MANTISSA_SHIFT)) as i32;
    mantissa as f32 * RADIX_MULTS[((complex >> COMPLEX_RADIX_SHIFT) & COMPLEX_RADIX_MASK) as usize]
}

/// Encode a float as a complex data word with an empty unit. Values out
/// of the 24-bit mantissa range give `None`.
pub fn float_to_complex(value: f32) -> Option<u32> {
    let max = COMPLEX_MANTISSA_MASK as f32;
    if !value.is_finite() || value < -max - 0.5 || value >= max + 0.5 {
        return None;
    }

    let abs = value.abs();
    let (mantissa, radix) = if value == (value as i32) as f32 {
        (value as i32, COMPLEX_RADIX_23P0)
    } else if abs < 1.0 {
        ((value * (1 << 23) as f32).round() as i32, COMPLEX_RADIX_0P23)
    } else if abs < (1 << 8) as f32 {
        ((value * (1 << 15) as f32).round() as i32, COMPLEX_RADIX_8P15)
    } else if abs < (1 << 16) as f32 {
        ((value * (1 << 7) as f32).round() as i32, COMPLEX_RADIX_16P7)
    } else {
        (value.round() as i32, COMPLEX_RADIX_23P0)
    };

    if !(-0x80_0000..0x80_0000).contains(&mantissa) {
        return None;
    }

    Some(((mantissa as u32 & COMPLEX_MANTISSA_MASK) << COMPLEX_MANTISSA_SHIFT)
        | (radix << COMPLEX_RADIX_SHIFT))
}

pub fn complex_to_dimension_string(complex: u32) -> String {
    let unit = ((complex >> COMPLEX_UNIT_SHIFT) & COMPLEX_UNIT_MASK) as usize;
    format!("{}{}", format_float(complex_to_float(complex)),
            DIMENSION_UNIT_STRS.get(unit).copied().unwrap_or(""))
}

pub fn complex_to_fraction_string(complex: u32) -> String {
    let unit = ((complex >> COMPLEX_UNIT_SHIFT) & COMPLEX_UNIT_MASK) as usize;
    format!("{}{}", format_float(complex_to_float(complex) * 100.0),
            FRACTION_UNIT_STRS.get(unit).copied().unwrap_or(""))
}

/// Format a float the way resource files spell them: always a fractional
/// part, scientific notation outside of [1e-3, 1e7).
pub fn format_float(value: f32) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() };
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0.0".to_string() } else { "0.0".to_string() };
    }

    let abs = value.abs();
    if (1e-3..1e7).contains(&abs) {
        let text = value.to_string();
        if text.contains('.') { text } else { text + ".0" }
    } else {
        let text = format!("{:e}", value);
        match text.split_once('e') {
            Some((mantissa, exponent)) if mantissa.contains('.') => format!("{}E{}", mantissa, exponent),
            Some((mantissa, exponent)) => format!("{}.0E{}", mantissa, exponent),
            None => text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_and_writes_value() {
        let mut buf = Vec::new();
        ResValue::new(DataValueType::TypeIntColorRgb8, 0xFF112233).write(&mut buf).unwrap();
        assert_eq!(buf, [8, 0, 0, 0x1d, 0x33, 0x22, 0x11, 0xFF]);

        let value = ResValue::from_buff(&mut Cursor::new(buf)).unwrap();
        assert_eq!(value.value_type(), Some(DataValueType::TypeIntColorRgb8));
        assert_eq!(value.coerce_to_string().unwrap(), "#112233");
    }

    #[test]
    fn undersized_value_is_rejected() {
        let buf = vec![4, 0, 0, 0x10, 1, 0, 0, 0];
        assert!(matches!(ResValue::from_buff(&mut Cursor::new(buf)), Err(Error::Format { .. })));
    }

    #[test]
    fn dimensions_and_fractions() {
        /* 16dip, radix 23p0 */
        let complex = (16 << 8) | 1;
        assert_eq!(complex_to_dimension_string(complex), "16.0dip");

        let half = float_to_complex(0.5).unwrap();
        assert_eq!(complex_to_float(half), 0.5);
        assert_eq!(complex_to_fraction_string(half | 1), "50.0%p");

        let value = ResValue::parse_typed("1.5sp").unwrap();
        assert_eq!(value.value_type(), Some(DataValueType::TypeDimension));
        assert_eq!(value.coerce_to_string().unwrap(), "1.5sp");

        let value = ResValue::parse_typed("-3.0px").unwrap();
        assert_eq!(value.coerce_to_string().unwrap(), "-3.0px");
    }

    #[test]
    fn float_formatting() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(0.25), "0.25");
        assert_eq!(format_float(-2.5), "-2.5");
        assert_eq!(format_float(1.0e7), "1.0E7");
        assert_eq!(format_float(1.5e-5), "1.5E-5");
    }

    #[test]
    fn typed_value_inference() {
        let cases = [
            ("@null", DataValueType::TypeReference),
            ("@empty", DataValueType::TypeNull),
            ("@2130771968", DataValueType::TypeReference),
            ("?16842752", DataValueType::TypeAttribute),
            ("true", DataValueType::TypeIntBoolean),
            ("#ff00ff00", DataValueType::TypeIntColorArgb8),
            ("#123456", DataValueType::TypeIntColorRgb8),
            ("#fabc", DataValueType::TypeIntColorArgb4),
            ("#abc", DataValueType::TypeIntColorRgb4),
            ("0x1f", DataValueType::TypeIntHex),
            ("-42", DataValueType::TypeIntDec),
            ("0.75", DataValueType::TypeFloat),
            ("12.0dip", DataValueType::TypeDimension),
            ("50.0%", DataValueType::TypeFraction),
        ];
        for (text, expected) in cases {
            let value = ResValue::parse_typed(text).unwrap_or_else(|| panic!("{} not typed", text));
            assert_eq!(value.value_type(), Some(expected), "type of {}", text);
            assert_eq!(value.coerce_to_string().as_deref(), Some(text), "text of {}", text);
        }
    }

    #[test]
    fn strings_stay_strings() {
        for text in ["hello", "007", "@string/app_name", "#GGG", "1.50", "", "12 dp"] {
            assert!(ResValue::parse_typed(text).is_none(), "{} should stay a string", text);
        }
    }
}
