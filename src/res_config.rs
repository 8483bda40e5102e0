use std::fmt;
use std::io::{
    Read,
    Cursor,
};
use byteorder::{
    LittleEndian,
    ReadBytesExt,
};
use log::{debug, warn};

use crate::error::{Error, Result};

/* Bytes of ResTable_config this decoder understands, size field included */
pub const KNOWN_CONFIG_BYTES: usize = 64;

pub const DENSITY_DEFAULT: u16 = 0;
pub const DENSITY_LOW: u16 = 120;
pub const DENSITY_MEDIUM: u16 = 160;
pub const DENSITY_TV: u16 = 213;
pub const DENSITY_HIGH: u16 = 240;
pub const DENSITY_XHIGH: u16 = 320;
pub const DENSITY_XXHIGH: u16 = 480;
pub const DENSITY_XXXHIGH: u16 = 640;
pub const DENSITY_ANY: u16 = 0xFFFE;
pub const DENSITY_NONE: u16 = 0xFFFF;

const MNC_ZERO: u16 = 0xFFFF;

const MASK_LAYOUTDIR: u8 = 0xc0;
const SCREENLAYOUT_LAYOUTDIR_LTR: u8 = 0x40;
const SCREENLAYOUT_LAYOUTDIR_RTL: u8 = 0x80;
const MASK_SCREENSIZE: u8 = 0x0f;
const MASK_SCREENLONG: u8 = 0x30;
const MASK_SCREENROUND: u8 = 0x03;
const MASK_KEYSHIDDEN: u8 = 0x03;
const MASK_NAVHIDDEN: u8 = 0x0c;
const MASK_UI_MODE_TYPE: u8 = 0x0f;
const MASK_UI_MODE_NIGHT: u8 = 0x30;
const UI_MODE_TYPE_VR_HEADSET: u8 = 0x07;
const COLOR_HDR_MASK: u8 = 0x0c;
const COLOR_WIDE_MASK: u8 = 0x03;

const SDK_DONUT: u16 = 4;
const SDK_FROYO: u16 = 8;
const SDK_HONEYCOMB_MR2: u16 = 13;
const SDK_LOLLIPOP: u16 = 21;
const SDK_MNC: u16 = 23;
const SDK_OREO: u16 = 26;
const SDK_UPSIDEDOWN_CAKE: u16 = 34;

/* Field offsets inside ResTable_config, counted from the size field */
const OFF_MCC: usize = 4;
const OFF_MNC: usize = 6;
const OFF_LANGUAGE: usize = 8;
const OFF_COUNTRY: usize = 10;
const OFF_ORIENTATION: usize = 12;
const OFF_TOUCHSCREEN: usize = 13;
const OFF_DENSITY: usize = 14;
const OFF_KEYBOARD: usize = 16;
const OFF_NAVIGATION: usize = 17;
const OFF_INPUT_FLAGS: usize = 18;
const OFF_GRAMMATICAL_INFLECTION: usize = 19;
const OFF_SCREEN_WIDTH: usize = 20;
const OFF_SCREEN_HEIGHT: usize = 22;
const OFF_SDK_VERSION: usize = 24;
const OFF_MINOR_VERSION: usize = 26;
const OFF_SCREEN_LAYOUT: usize = 28;
const OFF_UI_MODE: usize = 29;
const OFF_SMALLEST_SCREEN_WIDTH_DP: usize = 30;
const OFF_SCREEN_WIDTH_DP: usize = 32;
const OFF_SCREEN_HEIGHT_DP: usize = 34;
const OFF_LOCALE_SCRIPT: usize = 36;
const OFF_LOCALE_VARIANT: usize = 40;
const OFF_SCREEN_LAYOUT2: usize = 48;
const OFF_COLOR_MODE: usize = 49;
const OFF_LOCALE_NUMBERING_SYSTEM: usize = 52;

/**
 * Describes a particular resource configuration (ResTable_config).
 *
 * The descriptor is kept as the bytes found in the stream, size field
 * included, so that it is written back unchanged; fields are read on
 * demand. Fields beyond the stored size read as zero.
 */
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ResConfig {
    data: Vec<u8>,

    /* Set by the table decoder for configurations it could not make sense of */
    err_index: Option<u32>,
}

impl Default for ResConfig {
    fn default() -> Self {
        let mut data = vec![0u8; KNOWN_CONFIG_BYTES];
        data[..4].copy_from_slice(&(KNOWN_CONFIG_BYTES as u32).to_le_bytes());
        ResConfig { data, err_index: None }
    }
}

impl ResConfig {
    pub fn from_buff<T: AsRef<[u8]>>(axml_buff: &mut Cursor<T>) -> Result<Self> {
        let start = axml_buff.position();
        let size = axml_buff.read_u32::<LittleEndian>()? as usize;
        if size < 8 {
            return Err(Error::format(start, format!("config size {} < 8", size)));
        }

        let mut data = vec![0u8; size];
        data[..4].copy_from_slice(&(size as u32).to_le_bytes());
        axml_buff.read_exact(&mut data[4..])?;

        let config = ResConfig { data, err_index: None };
        if size > KNOWN_CONFIG_BYTES {
            if config.exceeding_bytes().iter().all(|b| *b == 0) {
                debug!("Config flags size > {}, but exceeding bytes are all zero", KNOWN_CONFIG_BYTES);
            } else {
                warn!("Config flags size > {}. Size = {}. Exceeding bytes: {:02X?}",
                      KNOWN_CONFIG_BYTES, size, config.exceeding_bytes());
            }
        }

        Ok(config)
    }

    /// Raw descriptor, size field included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    fn exceeding_bytes(&self) -> &[u8] {
        self.data.get(KNOWN_CONFIG_BYTES..).unwrap_or(&[])
    }

    fn u8_at(&self, offset: usize) -> u8 {
        self.data.get(offset).copied().unwrap_or(0)
    }

    fn u16_at(&self, offset: usize) -> u16 {
        match self.data.get(offset..offset + 2) {
            Some(b) => u16::from_le_bytes([b[0], b[1]]),
            None => 0,
        }
    }

    fn ascii_at(&self, offset: usize, len: usize) -> String {
        match self.data.get(offset..offset + len) {
            Some(bytes) => bytes.iter()
                .take_while(|b| **b != 0)
                .map(|b| *b as char)
                .collect(),
            None => String::new(),
        }
    }

    fn set_u8(&mut self, offset: usize, value: u8) {
        self.grow_to(offset + 1);
        self.data[offset] = value;
    }

    fn set_u16(&mut self, offset: usize, value: u16) {
        self.grow_to(offset + 2);
        self.data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    }

    fn grow_to(&mut self, len: usize) {
        if self.data.len() < len {
            self.data.resize(len, 0);
            let size = self.data.len() as u32;
            self.data[..4].copy_from_slice(&size.to_le_bytes());
        }
    }

    pub fn mcc(&self) -> u16 { self.u16_at(OFF_MCC) }
    pub fn mnc(&self) -> u16 { self.u16_at(OFF_MNC) }
    pub fn orientation(&self) -> u8 { self.u8_at(OFF_ORIENTATION) }
    pub fn touchscreen(&self) -> u8 { self.u8_at(OFF_TOUCHSCREEN) }
    pub fn density(&self) -> u16 { self.u16_at(OFF_DENSITY) }
    pub fn keyboard(&self) -> u8 { self.u8_at(OFF_KEYBOARD) }
    pub fn navigation(&self) -> u8 { self.u8_at(OFF_NAVIGATION) }
    pub fn input_flags(&self) -> u8 { self.u8_at(OFF_INPUT_FLAGS) }
    pub fn grammatical_inflection(&self) -> u8 { self.u8_at(OFF_GRAMMATICAL_INFLECTION) }
    pub fn screen_width(&self) -> u16 { self.u16_at(OFF_SCREEN_WIDTH) }
    pub fn screen_height(&self) -> u16 { self.u16_at(OFF_SCREEN_HEIGHT) }
    pub fn sdk_version(&self) -> u16 { self.u16_at(OFF_SDK_VERSION) }
    pub fn minor_version(&self) -> u16 { self.u16_at(OFF_MINOR_VERSION) }
    pub fn screen_layout(&self) -> u8 { self.u8_at(OFF_SCREEN_LAYOUT) }
    pub fn ui_mode(&self) -> u8 { self.u8_at(OFF_UI_MODE) }
    pub fn smallest_screen_width_dp(&self) -> u16 { self.u16_at(OFF_SMALLEST_SCREEN_WIDTH_DP) }
    pub fn screen_width_dp(&self) -> u16 { self.u16_at(OFF_SCREEN_WIDTH_DP) }
    pub fn screen_height_dp(&self) -> u16 { self.u16_at(OFF_SCREEN_HEIGHT_DP) }
    pub fn screen_layout2(&self) -> u8 { self.u8_at(OFF_SCREEN_LAYOUT2) }
    pub fn color_mode(&self) -> u8 { self.u8_at(OFF_COLOR_MODE) }

    pub fn language(&self) -> String {
        self.unpack_language_or_region(OFF_LANGUAGE, b'a')
    }

    pub fn region(&self) -> String {
        self.unpack_language_or_region(OFF_COUNTRY, b'0')
    }

    pub fn locale_script(&self) -> String { self.ascii_at(OFF_LOCALE_SCRIPT, 4) }
    pub fn locale_variant(&self) -> String { self.ascii_at(OFF_LOCALE_VARIANT, 8) }
    pub fn locale_numbering_system(&self) -> String { self.ascii_at(OFF_LOCALE_NUMBERING_SYSTEM, 8) }

    /* Two bytes hold either two letters or, with the high bit set, three
     * 5-bit letters relative to `base`. */
    fn unpack_language_or_region(&self, offset: usize, base: u8) -> String {
        let b0 = self.u8_at(offset);
        let b1 = self.u8_at(offset + 1);
        if b0 == 0 {
            return String::new();
        }
        if (b0 & 0x80) != 0 {
            let first = base + (b1 & 0x1F);
            let second = base + ((b1 & 0xE0) >> 5) + ((b0 & 0x03) << 3);
            let third = base + ((b0 & 0x7C) >> 2);
            return [first, second, third].iter().map(|b| *b as char).collect();
        }
        [b0, b1].iter().take_while(|b| **b != 0).map(|b| *b as char).collect()
    }

    pub fn with_density(mut self, density: u16) -> Self {
        self.set_u16(OFF_DENSITY, density);
        self
    }

    pub fn with_sdk_version(mut self, sdk_version: u16) -> Self {
        self.set_u16(OFF_SDK_VERSION, sdk_version);
        self
    }

    pub fn with_orientation(mut self, orientation: u8) -> Self {
        self.set_u8(OFF_ORIENTATION, orientation);
        self
    }

    pub fn with_screen_layout(mut self, screen_layout: u8) -> Self {
        self.set_u8(OFF_SCREEN_LAYOUT, screen_layout);
        self
    }

    /// Two-letter language and optional two-letter region.
    pub fn with_locale(mut self, language: &str, region: &str) -> Self {
        let lang = language.as_bytes();
        let reg = region.as_bytes();
        self.set_u8(OFF_LANGUAGE, lang.first().copied().unwrap_or(0));
        self.set_u8(OFF_LANGUAGE + 1, lang.get(1).copied().unwrap_or(0));
        self.set_u8(OFF_COUNTRY, reg.first().copied().unwrap_or(0));
        self.set_u8(OFF_COUNTRY + 1, reg.get(1).copied().unwrap_or(0));
        self
    }

    pub fn set_err_index(&mut self, index: u32) {
        self.err_index = Some(index);
    }

    /// Values outside of their documented ranges, or unknown non-zero
    /// trailing bytes.
    pub fn is_invalid(&self) -> bool {
        self.orientation() > 3
            || self.touchscreen() > 3
            || self.keyboard() > 3
            || self.navigation() > 4
            || self.exceeding_bytes().iter().any(|b| *b != 0)
    }

    pub fn is_default(&self) -> bool {
        self.qualifiers().is_empty()
    }

    /// Resource directory qualifiers, e.g. `-fr-rCA-hdpi-v21`.
    pub fn qualifiers(&self) -> String {
        let mut q = String::new();
        let (mcc, mnc) = (self.mcc(), self.mnc());

        if mcc != 0 {
            q.push_str(&format!("-mcc{:03}", mcc));
            if mnc == MNC_ZERO {
                q.push_str("-mnc00");
            } else if mnc != 0 {
                q.push_str("-mnc");
                if self.size() <= 32 {
                    if mnc < 10 {
                        q.push_str(&format!("{:02}", mnc));
                    } else {
                        q.push_str(&format!("{:03}", mnc));
                    }
                } else {
                    q.push_str(&mnc.to_string());
                }
            }
        } else if mnc != 0 {
            q.push_str(&format!("-mnc{}", mnc));
        }

        q.push_str(&self.locale_string());

        match self.grammatical_inflection() {
            1 => q.push_str("-neuter"),
            2 => q.push_str("-feminine"),
            3 => q.push_str("-masculine"),
            _ => {},
        }

        match self.screen_layout() & MASK_LAYOUTDIR {
            SCREENLAYOUT_LAYOUTDIR_RTL => q.push_str("-ldrtl"),
            SCREENLAYOUT_LAYOUTDIR_LTR => q.push_str("-ldltr"),
            _ => {},
        }
        if self.smallest_screen_width_dp() != 0 {
            q.push_str(&format!("-sw{}dp", self.smallest_screen_width_dp()));
        }
        if self.screen_width_dp() != 0 {
            q.push_str(&format!("-w{}dp", self.screen_width_dp()));
        }
        if self.screen_height_dp() != 0 {
            q.push_str(&format!("-h{}dp", self.screen_height_dp()));
        }
        match self.screen_layout() & MASK_SCREENSIZE {
            1 => q.push_str("-small"),
            2 => q.push_str("-normal"),
            3 => q.push_str("-large"),
            4 => q.push_str("-xlarge"),
            _ => {},
        }
        match self.screen_layout() & MASK_SCREENLONG {
            0x20 => q.push_str("-long"),
            0x10 => q.push_str("-notlong"),
            _ => {},
        }
        match self.screen_layout2() & MASK_SCREENROUND {
            1 => q.push_str("-notround"),
            2 => q.push_str("-round"),
            _ => {},
        }
        match self.color_mode() & COLOR_HDR_MASK {
            0x8 => q.push_str("-highdr"),
            0x4 => q.push_str("-lowdr"),
            _ => {},
        }
        match self.color_mode() & COLOR_WIDE_MASK {
            2 => q.push_str("-widecg"),
            1 => q.push_str("-nowidecg"),
            _ => {},
        }
        match self.orientation() {
            1 => q.push_str("-port"),
            2 => q.push_str("-land"),
            3 => q.push_str("-square"),
            _ => {},
        }
        match self.ui_mode() & MASK_UI_MODE_TYPE {
            0x02 => q.push_str("-desk"),
            0x03 => q.push_str("-car"),
            0x04 => q.push_str("-television"),
            0x05 => q.push_str("-appliance"),
            0x06 => q.push_str("-watch"),
            0x07 => q.push_str("-vrheadset"),
            0x0b => q.push_str("-godzillaui"),
            0x0c => q.push_str("-smallui"),
            0x0d => q.push_str("-mediumui"),
            0x0e => q.push_str("-largeui"),
            0x0f => q.push_str("-hugeui"),
            _ => {},
        }
        match self.ui_mode() & MASK_UI_MODE_NIGHT {
            0x20 => q.push_str("-night"),
            0x10 => q.push_str("-notnight"),
            _ => {},
        }
        match self.density() {
            DENSITY_DEFAULT => {},
            DENSITY_LOW => q.push_str("-ldpi"),
            DENSITY_MEDIUM => q.push_str("-mdpi"),
            DENSITY_HIGH => q.push_str("-hdpi"),
            DENSITY_TV => q.push_str("-tvdpi"),
            DENSITY_XHIGH => q.push_str("-xhdpi"),
            DENSITY_XXHIGH => q.push_str("-xxhdpi"),
            DENSITY_XXXHIGH => q.push_str("-xxxhdpi"),
            DENSITY_ANY => q.push_str("-anydpi"),
            DENSITY_NONE => q.push_str("-nodpi"),
            other => q.push_str(&format!("-{}dpi", other)),
        }
        match self.touchscreen() {
            1 => q.push_str("-notouch"),
            2 => q.push_str("-stylus"),
            3 => q.push_str("-finger"),
            _ => {},
        }
        match self.input_flags() & MASK_KEYSHIDDEN {
            1 => q.push_str("-keysexposed"),
            2 => q.push_str("-keyshidden"),
            3 => q.push_str("-keyssoft"),
            _ => {},
        }
        match self.keyboard() {
            1 => q.push_str("-nokeys"),
            2 => q.push_str("-qwerty"),
            3 => q.push_str("-12key"),
            _ => {},
        }
        match self.input_flags() & MASK_NAVHIDDEN {
            0x4 => q.push_str("-navexposed"),
            0x8 => q.push_str("-navhidden"),
            _ => {},
        }
        match self.navigation() {
            1 => q.push_str("-nonav"),
            2 => q.push_str("-dpad"),
            3 => q.push_str("-trackball"),
            4 => q.push_str("-wheel"),
            _ => {},
        }
        let (width, height) = (self.screen_width(), self.screen_height());
        if width != 0 && height != 0 {
            q.push_str(&format!("-{}x{}", width.max(height), width.min(height)));
        }
        let sdk = self.sdk_version();
        if sdk > 0 && sdk >= self.natural_sdk_version_requirement() {
            q.push_str(&format!("-v{}", sdk));
        }
        if let Some(index) = self.err_index {
            q.push_str(&format!("-ERR{}", index));
        }

        q
    }

    fn natural_sdk_version_requirement(&self) -> u16 {
        if self.grammatical_inflection() != 0 {
            return SDK_UPSIDEDOWN_CAKE;
        }
        if (self.ui_mode() & MASK_UI_MODE_TYPE) == UI_MODE_TYPE_VR_HEADSET
            || (self.color_mode() & COLOR_WIDE_MASK) != 0
            || (self.color_mode() & COLOR_HDR_MASK) != 0 {
            return SDK_OREO;
        }
        if (self.screen_layout2() & MASK_SCREENROUND) != 0 {
            return SDK_MNC;
        }
        if self.density() == DENSITY_ANY {
            return SDK_LOLLIPOP;
        }
        if self.smallest_screen_width_dp() != 0 || self.screen_width_dp() != 0 || self.screen_height_dp() != 0 {
            return SDK_HONEYCOMB_MR2;
        }
        if (self.ui_mode() & (MASK_UI_MODE_TYPE | MASK_UI_MODE_NIGHT)) != 0 {
            return SDK_FROYO;
        }
        if (self.screen_layout() & (MASK_SCREENSIZE | MASK_SCREENLONG)) != 0 || self.density() != DENSITY_DEFAULT {
            return SDK_DONUT;
        }
        0
    }

    fn locale_string(&self) -> String {
        let language = self.language();
        let region = self.region();
        let script = self.locale_script();
        let variant = self.locale_variant();
        let numbering = self.locale_numbering_system();

        if language.is_empty() && region.is_empty() {
            return String::new();
        }

        /* Old style values-xx-rXX tags, unless BCP 47 parts are present */
        if script.is_empty() && variant.is_empty() && region.len() != 3 {
            let mut locale = format!("-{}", language);
            if !region.is_empty() {
                locale.push_str("-r");
                locale.push_str(&region);
            }
            return locale;
        }

        let mut locale = String::from("-b+");
        locale.push_str(&language);
        if script.len() == 4 {
            locale.push('+');
            locale.push_str(&script);
        }
        if region.len() == 2 || region.len() == 3 {
            locale.push('+');
            locale.push_str(&region);
        }
        if variant.len() >= 5 {
            locale.push('+');
            locale.push_str(&variant.to_uppercase());
        }
        if !numbering.is_empty() {
            locale.push_str("+u+nu+");
            locale.push_str(&numbering);
        }
        locale
    }
}

impl fmt::Debug for ResConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResConfig({})", self)
    }
}

impl fmt::Display for ResConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let qualifiers = self.qualifiers();
        if qualifiers.is_empty() {
            f.write_str("[DEFAULT]")
        } else {
            f.write_str(&qualifiers)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_qualifiers() {
        let config = ResConfig::default();
        assert_eq!(config.size(), 64);
        assert!(config.is_default());
        assert_eq!(config.to_string(), "[DEFAULT]");
    }

    #[test]
    fn qualifiers_follow_directory_order() {
        let config = ResConfig::default()
            .with_locale("fr", "CA")
            .with_orientation(2)
            .with_density(DENSITY_HIGH)
            .with_sdk_version(21);
        assert_eq!(config.qualifiers(), "-fr-rCA-land-hdpi-v21");

        /* Versions below what the density already requires are dropped */
        let config = ResConfig::default().with_density(DENSITY_XHIGH).with_sdk_version(3);
        assert_eq!(config.qualifiers(), "-xhdpi");
        let config = ResConfig::default().with_density(DENSITY_XHIGH).with_sdk_version(4);
        assert_eq!(config.qualifiers(), "-xhdpi-v4");

        let config = ResConfig::default().with_screen_layout(0x80).with_density(400);
        assert_eq!(config.qualifiers(), "-ldrtl-400dpi");
    }

    #[test]
    fn packed_three_letter_language() {
        /* "fil" packed: f=5, i=8, l=11 relative to 'a' */
        let (first, second, third) = (5u8, 8u8, 11u8);
        let b1 = first | ((second & 0x07) << 5);
        let b0 = 0x80 | (third << 2) | (second >> 3);
        let mut config = ResConfig::default();
        config.set_u8(OFF_LANGUAGE, b0);
        config.set_u8(OFF_LANGUAGE + 1, b1);
        assert_eq!(config.language(), "fil");
        assert_eq!(config.qualifiers(), "-fil");
    }

    #[test]
    fn reads_short_and_long_descriptors() {
        let mut bytes = 28u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0u8; 24]);
        bytes[OFF_DENSITY] = 0xA0;
        let config = ResConfig::from_buff(&mut Cursor::new(bytes.clone())).unwrap();
        assert_eq!(config.density(), 160);
        assert_eq!(config.screen_width_dp(), 0);
        assert_eq!(config.as_bytes(), &bytes[..]);

        let mut bytes = 68u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0u8; 64]);
        bytes[66] = 1;
        let config = ResConfig::from_buff(&mut Cursor::new(bytes)).unwrap();
        assert!(config.is_invalid());
    }

    #[test]
    fn undersized_descriptor_is_rejected() {
        let bytes = 4u32.to_le_bytes().to_vec();
        assert!(matches!(ResConfig::from_buff(&mut Cursor::new(bytes)), Err(Error::Format { .. })));
    }
}
