//! Text encodings applied to resource strings when they are written as XML.

use log::warn;

use crate::data_value_type::DataValueType;
use crate::res_value::{complex_to_dimension_string, complex_to_fraction_string, format_float};

/// Render a typed value that does not live in a string pool.
///
/// References and attributes come out numerically (`@2130837504`); callers
/// with access to a resource table should resolve them first.
pub fn coerce_to_string(data_type: u8, data: u32) -> Option<String> {
    let value_type = match DataValueType::from_val(data_type) {
        Some(value_type) => value_type,
        None => {
            warn!("Unsupported data type: 0x{:02x}", data_type);
            return None;
        }
    };

    let text = match value_type {
        DataValueType::TypeNull => {
            if data == DataValueType::DATA_NULL_EMPTY { "@empty".to_string() } else { "@null".to_string() }
        },
        DataValueType::TypeReference | DataValueType::TypeDynamicReference => {
            if data != 0 { format!("@{}", data as i32) } else { "@null".to_string() }
        },
        DataValueType::TypeAttribute | DataValueType::TypeDynamicAttribute => format!("?{}", data as i32),
        DataValueType::TypeString => return None,
        DataValueType::TypeFloat => format_float(f32::from_bits(data)),
        DataValueType::TypeDimension => complex_to_dimension_string(data),
        DataValueType::TypeFraction => complex_to_fraction_string(data),
        DataValueType::TypeIntColorArgb8 => format!("#{:08x}", data),
        DataValueType::TypeIntColorRgb8 => format!("#{:06x}", data & 0xFF_FFFF),
        DataValueType::TypeIntColorArgb4 => format!("#{:x}{:x}{:x}{:x}",
            (data >> 28) & 0xF, (data >> 20) & 0xF, (data >> 12) & 0xF, (data >> 4) & 0xF),
        DataValueType::TypeIntColorRgb4 => format!("#{:x}{:x}{:x}",
            (data >> 20) & 0xF, (data >> 12) & 0xF, (data >> 4) & 0xF),
        DataValueType::TypeIntDec => (data as i32).to_string(),
        DataValueType::TypeIntHex => format!("0x{:x}", data),
        DataValueType::TypeIntBoolean => if data != 0 { "true".to_string() } else { "false".to_string() },
    };

    Some(text)
}

/// Encode a string for use as the text of a value-file element
/// (`<string name="x">...</string>`). Leading/trailing/doubled spaces,
/// apostrophes and newlines force the value to be quoted.
pub fn encode_as_xml_value(value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }

    let chars: Vec<char> = value.chars().collect();
    let mut out = String::with_capacity(value.len() + 10);

    if matches!(chars[0], '#' | '@' | '?') {
        out.push('\\');
    }

    let mut in_style_tag = false;
    let mut start_pos = 0;
    let mut enclose = false;
    let mut was_space = true;

    for (i, ch) in chars.iter().copied().enumerate() {
        if in_style_tag {
            if ch == '>' {
                in_style_tag = false;
                start_pos = out.len() + 1;
                enclose = false;
            }
        } else if ch == ' ' {
            if was_space {
                enclose = true;
            }
            was_space = true;
        } else {
            was_space = false;
            match ch {
                '\\' | '"' => out.push('\\'),
                '\'' | '\n' => enclose = true,
                '<' => {
                    in_style_tag = true;
                    if enclose {
                        out.insert(start_pos, '"');
                        out.push('"');
                    }
                },
                _ if !is_printable_char(ch) => {
                    /* A trailing NUL is dropped */
                    if ch == '\0' && i + 1 == chars.len() {
                        continue;
                    }
                    out.push_str(&format!("\\u{:04x}", ch as u32));
                    continue;
                },
                _ => {},
            }
        }
        out.push(ch);
    }

    if enclose || was_space {
        out.insert(start_pos, '"');
        out.push('"');
    }

    out
}

/// Encode a string for use as an attribute value in decoded binary XML.
pub fn encode_as_res_xml_attr_value(value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }

    let mut out = String::with_capacity(value.len() + 10);
    if value.starts_with(['#', '@', '?']) {
        out.push('\\');
    }

    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("&quot;"),
            '\n' => out.push_str("\\n"),
            _ if !is_printable_char(ch) => out.push_str(&format!("\\u{:04x}", ch as u32)),
            _ => out.push(ch),
        }
    }

    out
}

/// Undo `encode_as_res_xml_attr_value` once the XML layer has already
/// replaced entities.
pub fn decode_res_xml_attr_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }

        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('u') => {
                let hex: String = chars.clone().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().filter(|_| hex.len() == 4) {
                    Some(code) => {
                        out.push(char::from_u32(code).unwrap_or('\u{FFFD}'));
                        for _ in 0..4 {
                            chars.next();
                        }
                    },
                    None => out.push('u'),
                }
            },
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }

    out
}

pub fn escape_xml_chars(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace("]]>", "]]&gt;")
}

/// True when the format string mixes a non-positional `%` substitution with
/// any other substitution (aapt rejects such strings).
pub fn has_multiple_non_positional_substitutions(value: &str) -> bool {
    let (non_positional, positional) = find_substitutions(value, 4);
    !non_positional.is_empty() && non_positional.len() + positional.len() > 1
}

/// Rewrite `%s %d` into `%1$s %2$d` when a string carries more than one
/// substitution and some are non-positional.
pub fn enumerate_non_positional_substitutions_if_required(value: &str) -> String {
    let (non_positional, positional) = find_substitutions(value, 4);
    if non_positional.is_empty() || non_positional.len() + positional.len() < 2 {
        return value.to_string();
    }

    let chars: Vec<char> = value.chars().collect();
    let mut out = String::with_capacity(value.len() + 2 * non_positional.len());
    let mut pos = 0;
    for (count, offset) in non_positional.iter().enumerate() {
        let next = offset + 1;
        out.extend(&chars[pos..next]);
        out.push_str(&(count + 1).to_string());
        out.push('$');
        pos = next;
    }
    out.extend(&chars[pos..]);

    out
}

/* Offsets (in chars) of non-positional and positional substitutions.
 * Non-positional is any '%' which is neither "%%" nor "%<digits>$". */
fn find_substitutions(value: &str, non_pos_max: usize) -> (Vec<usize>, Vec<usize>) {
    let chars: Vec<char> = value.chars().collect();
    let len = chars.len();
    let mut non_positional = Vec::new();
    let mut positional = Vec::new();
    let mut pos2 = 0;

    while let Some(found) = chars[pos2..].iter().position(|c| *c == '%') {
        let pos = pos2 + found;
        pos2 = pos + 1;
        if pos2 == len {
            non_positional.push(pos);
            break;
        }

        let mut ch = chars[pos2];
        pos2 += 1;
        if ch == '%' {
            continue;
        }

        if ch.is_ascii_digit() && pos2 < len {
            loop {
                ch = chars[pos2];
                pos2 += 1;
                if !(ch.is_ascii_digit() && pos2 < len) {
                    break;
                }
            }
            if ch == '$' {
                positional.push(pos);
                continue;
            }
        }

        non_positional.push(pos);
        if non_positional.len() >= non_pos_max {
            break;
        }
    }

    (non_positional, positional)
}

fn is_printable_char(ch: char) -> bool {
    !ch.is_control() && !('\u{FFF0}'..='\u{FFFF}').contains(&ch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attr_value_escapes() {
        assert_eq!(encode_as_res_xml_attr_value("@string/foo"), "\\@string/foo");
        assert_eq!(encode_as_res_xml_attr_value("#fff"), "\\#fff");
        assert_eq!(encode_as_res_xml_attr_value("say \"hi\""), "say &quot;hi&quot;");
        assert_eq!(encode_as_res_xml_attr_value("a\\b"), "a\\\\b");
        assert_eq!(encode_as_res_xml_attr_value("one\ntwo"), "one\\ntwo");
        assert_eq!(encode_as_res_xml_attr_value("tab\there"), "tab\\u0009here");
        assert_eq!(encode_as_res_xml_attr_value(""), "");
    }

    #[test]
    fn attr_value_unescape_inverts_encoding() {
        for raw in ["@foo \"bar\"\nbaz", "?attr", "back\\slash", "tab\there", "plain"] {
            let encoded = encode_as_res_xml_attr_value(raw).replace("&quot;", "\"");
            assert_eq!(decode_res_xml_attr_value(&encoded), raw, "value {:?}", raw);
        }
    }

    #[test]
    fn xml_value_quoting() {
        assert_eq!(encode_as_xml_value("simple"), "simple");
        assert_eq!(encode_as_xml_value(" leading"), "\" leading\"");
        assert_eq!(encode_as_xml_value("trailing "), "\"trailing \"");
        assert_eq!(encode_as_xml_value("double  space"), "\"double  space\"");
        assert_eq!(encode_as_xml_value("it's"), "\"it's\"");
        assert_eq!(encode_as_xml_value("say \"x\""), "say \\\"x\\\"");
        assert_eq!(encode_as_xml_value("@null"), "\\@null");
        assert_eq!(encode_as_xml_value("<b>bold</b> it's"), "<b>bold</b>\" it's\"");
    }

    #[test]
    fn xml_chars() {
        assert_eq!(escape_xml_chars("a&b<c]]>"), "a&amp;b&lt;c]]&gt;");
        assert_eq!(escape_xml_chars("a > b"), "a > b");
    }

    #[test]
    fn coercion() {
        assert_eq!(coerce_to_string(0x00, 1).unwrap(), "@empty");
        assert_eq!(coerce_to_string(0x00, 0).unwrap(), "@null");
        assert_eq!(coerce_to_string(0x01, 0x7f010000).unwrap(), "@2130771968");
        assert_eq!(coerce_to_string(0x01, 0).unwrap(), "@null");
        assert_eq!(coerce_to_string(0x02, 0x01010000).unwrap(), "?16842752");
        assert_eq!(coerce_to_string(0x10, 0xFFFF_FFFF).unwrap(), "-1");
        assert_eq!(coerce_to_string(0x11, 0x1F).unwrap(), "0x1f");
        assert_eq!(coerce_to_string(0x12, 0xFFFF_FFFF).unwrap(), "true");
        assert_eq!(coerce_to_string(0x12, 0).unwrap(), "false");
        assert_eq!(coerce_to_string(0x1c, 0xFF00FF00).unwrap(), "#ff00ff00");
        assert_eq!(coerce_to_string(0x1d, 0xFF123456).unwrap(), "#123456");
        assert_eq!(coerce_to_string(0x1e, 0xFFAABBCC).unwrap(), "#fabc");
        assert_eq!(coerce_to_string(0x1f, 0xFFAABBCC).unwrap(), "#abc");
        assert_eq!(coerce_to_string(0x04, 1.5f32.to_bits()).unwrap(), "1.5");
        assert!(coerce_to_string(0x03, 0).is_none());
        assert!(coerce_to_string(0x0b, 0).is_none());
    }

    #[test]
    fn substitutions() {
        assert!(!has_multiple_non_positional_substitutions("%s"));
        assert!(has_multiple_non_positional_substitutions("%s of %d"));
        assert!(has_multiple_non_positional_substitutions("%1$s of %d"));
        assert!(!has_multiple_non_positional_substitutions("%1$s of %2$d"));
        assert!(!has_multiple_non_positional_substitutions("100%% sure %s"));

        assert_eq!(enumerate_non_positional_substitutions_if_required("%s of %d"), "%1$s of %2$d");
        assert_eq!(enumerate_non_positional_substitutions_if_required("only %s"), "only %s");
    }
}
