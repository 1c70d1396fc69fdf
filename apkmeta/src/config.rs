//! Resource configurations (`ResTable_config`) and best-match selection.
//!
//! A configuration is a set of qualifiers; a zero (or empty) field means the
//! qualifier is not specified. A table configuration *matches* a requested one
//! when every qualifier it specifies is satisfied by the request, and among
//! matching configurations the most specific one wins.

use crate::endianness::{push_u16, push_u32, push_u8, slice_at, u16_at, u32_at, u8_at};
use crate::error::{Error, Result};
use std::fmt;

pub const DENSITY_LDPI: u16 = 120;
pub const DENSITY_MDPI: u16 = 160;
pub const DENSITY_TVDPI: u16 = 213;
pub const DENSITY_HDPI: u16 = 240;
pub const DENSITY_XHDPI: u16 = 320;
pub const DENSITY_XXHDPI: u16 = 480;
pub const DENSITY_XXXHDPI: u16 = 640;
pub const DENSITY_ANY: u16 = 0xfffe;
pub const DENSITY_NONE: u16 = 0xffff;

pub const SCREEN_ROUND_NO: u8 = 0x01;
pub const SCREEN_ROUND_YES: u8 = 0x02;
const SCREEN_ROUND_MASK: u8 = 0x03;

pub const WIDE_COLOR_GAMUT_NO: u8 = 0x01;
pub const WIDE_COLOR_GAMUT_YES: u8 = 0x02;
const WIDE_COLOR_GAMUT_MASK: u8 = 0x03;
pub const HDR_NO: u8 = 0x04;
pub const HDR_YES: u8 = 0x08;
const HDR_MASK: u8 = 0x0c;

/// Size of the configuration this crate writes.
const WRITTEN_SIZE: u32 = 64;

#[derive(Debug, Clone, Default, Eq, PartialEq, Hash)]
pub struct Configuration {
    pub mcc: u16,
    pub mnc: u16,
    /// Lower case ISO 639 code, empty when unspecified.
    pub language: String,
    /// Upper case ISO 3166 code (or UN M.49 digits), empty when unspecified.
    pub region: String,
    pub orientation: u8,
    pub touchscreen: u8,
    pub density: u16,
    pub keyboard: u8,
    pub navigation: u8,
    pub input_flags: u8,
    pub screen_width: u16,
    pub screen_height: u16,
    pub sdk_version: u16,
    pub minor_version: u16,
    pub screen_layout: u8,
    pub ui_mode: u8,
    pub smallest_screen_width_dp: u16,
    pub screen_width_dp: u16,
    pub screen_height_dp: u16,
    /// ISO 15924 script, e.g. `Latn`, empty when unspecified.
    pub locale_script: String,
    pub locale_variant: String,
    pub screen_layout2: u8,
    pub color_mode: u8,
    pub locale_numbering_system: String,
}

impl Configuration {
    pub fn with_locale(language: &str, region: &str) -> Configuration {
        Configuration {
            language: language.to_ascii_lowercase(),
            region: region.to_ascii_uppercase(),
            ..Configuration::default()
        }
    }

    pub fn with_density(density: u16) -> Configuration {
        Configuration {
            density,
            ..Configuration::default()
        }
    }

    /// Parse a locale tag such as `en`, `zh-CN`, `zh_CN`, `zh-rCN` or
    /// `sr-Latn-RS`.
    pub fn from_locale_tag(tag: &str) -> Result<Configuration> {
        let invalid = || Error::format(format!("invalid locale tag {:?}", tag));
        let mut parts = tag.split(|c: char| c == '-' || c == '_').peekable();
        let language = parts.next().unwrap_or_default();
        if !(2..=3).contains(&language.len()) || !language.chars().all(|c| c.is_ascii_alphabetic())
        {
            return Err(invalid());
        }
        let mut script = match parts.peek() {
            Some(s) if s.len() == 4 && s.chars().all(|c| c.is_ascii_alphabetic()) => {
                s.to_ascii_lowercase()
            }
            _ => String::new(),
        };
        if !script.is_empty() {
            script[..1].make_ascii_uppercase();
            parts.next();
        }
        let region = match parts.next() {
            None => "",
            Some(r) if r.len() == 3 && r.starts_with('r') => &r[1..],
            Some(r) => r,
        };
        let region_ok = region.is_empty()
            || (region.len() == 2 && region.chars().all(|c| c.is_ascii_alphabetic()))
            || (region.len() == 3 && region.chars().all(|c| c.is_ascii_digit()));
        if !region_ok || parts.next().is_some() {
            return Err(invalid());
        }
        let mut config = Configuration::with_locale(language, region);
        config.locale_script = script;
        Ok(config)
    }

    /// Decode the `ResTable_config` at `offset`; returns it with its size.
    ///
    /// Older files carry shorter configurations: fields beyond the declared
    /// size read as unspecified.
    pub fn parse(bytes: &[u8], offset: usize) -> Result<(Configuration, usize)> {
        let size = u32_at(bytes, offset)? as usize;
        if size < 4 {
            return Err(Error::format(format!("configuration size {} too small", size)));
        }
        let raw = slice_at(bytes, offset, size)?;
        let byte = |at: usize| if at < size { u8_at(raw, at).unwrap_or(0) } else { 0 };
        let short = |at: usize| {
            if at + 2 <= size {
                u16_at(raw, at).unwrap_or(0)
            } else {
                0
            }
        };

        let text = |at: usize, len: usize| {
            let end = (at + len).min(size);
            if at >= end {
                return String::new();
            }
            raw[at..end]
                .iter()
                .take_while(|&&c| c != 0)
                .map(|&c| c as char)
                .collect::<String>()
        };
        // a script filled in from the language is not a qualifier of its own
        let script_computed = byte(52) != 0;

        let config = Configuration {
            mcc: short(4),
            mnc: short(6),
            language: unpack_code([byte(8), byte(9)], b'a'),
            region: unpack_code([byte(10), byte(11)], b'0'),
            orientation: byte(12),
            touchscreen: byte(13),
            density: short(14),
            keyboard: byte(16),
            navigation: byte(17),
            input_flags: byte(18),
            screen_width: short(20),
            screen_height: short(22),
            sdk_version: short(24),
            minor_version: short(26),
            screen_layout: byte(28),
            ui_mode: byte(29),
            smallest_screen_width_dp: short(30),
            screen_width_dp: short(32),
            screen_height_dp: short(34),
            locale_script: if script_computed {
                String::new()
            } else {
                text(36, 4)
            },
            locale_variant: text(40, 8),
            screen_layout2: byte(48),
            color_mode: byte(49),
            locale_numbering_system: text(53, 8),
        };
        Ok((config, size))
    }

    /// Append the configuration in its current 64 byte layout.
    pub fn write(&self, buf: &mut Vec<u8>) {
        let start = buf.len();
        push_u32(buf, WRITTEN_SIZE);
        push_u16(buf, self.mcc);
        push_u16(buf, self.mnc);
        buf.extend_from_slice(&pack_code(&self.language, b'a'));
        buf.extend_from_slice(&pack_code(&self.region, b'0'));
        push_u8(buf, self.orientation);
        push_u8(buf, self.touchscreen);
        push_u16(buf, self.density);
        push_u8(buf, self.keyboard);
        push_u8(buf, self.navigation);
        push_u8(buf, self.input_flags);
        push_u8(buf, 0);
        push_u16(buf, self.screen_width);
        push_u16(buf, self.screen_height);
        push_u16(buf, self.sdk_version);
        push_u16(buf, self.minor_version);
        push_u8(buf, self.screen_layout);
        push_u8(buf, self.ui_mode);
        push_u16(buf, self.smallest_screen_width_dp);
        push_u16(buf, self.screen_width_dp);
        push_u16(buf, self.screen_height_dp);
        push_fixed(buf, &self.locale_script, 4);
        push_fixed(buf, &self.locale_variant, 8);
        push_u8(buf, self.screen_layout2);
        push_u8(buf, self.color_mode);
        push_u16(buf, 0);
        push_u8(buf, 0);
        push_fixed(buf, &self.locale_numbering_system, 8);
        buf.resize(start + WRITTEN_SIZE as usize, 0);
    }

    pub fn is_default(&self) -> bool {
        *self == Configuration::default()
    }

    fn has_locale_extension(&self) -> bool {
        !self.locale_script.is_empty()
            || !self.locale_variant.is_empty()
            || !self.locale_numbering_system.is_empty()
    }

    fn other_qualifiers(&self) -> [u32; 17] {
        [
            self.mcc as u32,
            self.mnc as u32,
            self.orientation as u32,
            self.touchscreen as u32,
            self.keyboard as u32,
            self.navigation as u32,
            self.input_flags as u32,
            self.screen_width as u32,
            self.screen_height as u32,
            self.screen_layout as u32,
            self.ui_mode as u32,
            self.smallest_screen_width_dp as u32,
            self.screen_width_dp as u32,
            self.screen_height_dp as u32,
            (self.screen_layout2 & SCREEN_ROUND_MASK) as u32,
            (self.color_mode & WIDE_COLOR_GAMUT_MASK) as u32,
            (self.color_mode & HDR_MASK) as u32,
        ]
    }

    /// Whether every qualifier specified by `self` is satisfied by `requested`.
    pub fn matches(&self, requested: &Configuration) -> bool {
        if !self.language.is_empty() && self.language != requested.language {
            return false;
        }
        if !self.region.is_empty() && self.region != requested.region {
            return false;
        }
        let extensions = [
            (&self.locale_script, &requested.locale_script),
            (&self.locale_variant, &requested.locale_variant),
            (&self.locale_numbering_system, &requested.locale_numbering_system),
        ];
        if extensions
            .iter()
            .any(|(mine, theirs)| !mine.is_empty() && mine != theirs)
        {
            return false;
        }
        if self.density != 0 && self.density != requested.density {
            return false;
        }
        // a request without a platform version accepts any versioned value
        if self.sdk_version != 0
            && requested.sdk_version != 0
            && self.sdk_version > requested.sdk_version
        {
            return false;
        }
        self.other_qualifiers()
            .iter()
            .zip(requested.other_qualifiers().iter())
            .all(|(mine, theirs)| *mine == 0 || mine == theirs)
    }

    /// Ordering key: number of specified qualifiers, then locale, region,
    /// density and other qualifiers by precedence, then platform version.
    fn specificity(&self) -> (usize, bool, bool, bool, bool, usize, u16) {
        let others = self.other_qualifiers().iter().filter(|q| **q != 0).count();
        let has_language = !self.language.is_empty();
        let has_region = !self.region.is_empty();
        let has_extension = self.has_locale_extension();
        let has_density = self.density != 0;
        let count = has_language as usize
            + has_region as usize
            + has_extension as usize
            + has_density as usize
            + (self.sdk_version != 0) as usize
            + others;
        (
            count,
            has_language,
            has_region,
            has_extension,
            has_density,
            others,
            self.sdk_version,
        )
    }

    pub fn is_more_specific_than(&self, other: &Configuration) -> bool {
        self.specificity() > other.specificity()
    }
}

/// Pick the value whose configuration matches `requested` and is the most
/// specific; on equal specificity the earliest candidate wins.
pub fn best_match<'c, T, I>(candidates: I, requested: &Configuration) -> Option<T>
where
    I: IntoIterator<Item = (&'c Configuration, T)>,
{
    let mut best: Option<(&'c Configuration, T)> = None;
    for (config, value) in candidates {
        if !config.matches(requested) {
            continue;
        }
        let replace = match best {
            None => true,
            Some((current, _)) => config.is_more_specific_than(current),
        };
        if replace {
            best = Some((config, value));
        }
    }
    best.map(|(_, value)| value)
}

fn unpack_code(raw: [u8; 2], base: u8) -> String {
    if raw[0] & 0x80 != 0 {
        // three letters packed into two bytes, five bits each
        let first = raw[0];
        let second = raw[1];
        let chars = [
            (second & 0x1f) + base,
            ((second & 0xe0) >> 5) + ((first & 0x03) << 3) + base,
            ((first & 0x7c) >> 2) + base,
        ];
        chars.iter().map(|&c| c as char).collect()
    } else {
        raw.iter()
            .take_while(|&&c| c != 0)
            .map(|&c| c as char)
            .collect()
    }
}

fn pack_code(code: &str, base: u8) -> [u8; 2] {
    let bytes = code.as_bytes();
    match bytes.len() {
        2 => [bytes[0], bytes[1]],
        3 => {
            let c0 = bytes[0].wrapping_sub(base) & 0x1f;
            let c1 = bytes[1].wrapping_sub(base) & 0x1f;
            let c2 = bytes[2].wrapping_sub(base) & 0x1f;
            [0x80 | (c2 << 2) | (c1 >> 3), ((c1 & 0x07) << 5) | c0]
        }
        _ => [0, 0],
    }
}

fn push_fixed(buf: &mut Vec<u8>, text: &str, len: usize) {
    let start = buf.len();
    buf.extend(text.bytes().take(len));
    buf.resize(start + len, 0);
}

fn density_name(density: u16) -> String {
    match density {
        DENSITY_LDPI => "ldpi".to_owned(),
        DENSITY_MDPI => "mdpi".to_owned(),
        DENSITY_TVDPI => "tvdpi".to_owned(),
        DENSITY_HDPI => "hdpi".to_owned(),
        DENSITY_XHDPI => "xhdpi".to_owned(),
        DENSITY_XXHDPI => "xxhdpi".to_owned(),
        DENSITY_XXXHDPI => "xxxhdpi".to_owned(),
        DENSITY_ANY => "anydpi".to_owned(),
        DENSITY_NONE => "nodpi".to_owned(),
        d => format!("{}dpi", d),
    }
}

impl fmt::Display for Configuration {
    /// Qualifier string in resource directory notation, e.g. `zh-rCN-xhdpi-v26`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.mcc != 0 {
            parts.push(format!("mcc{}", self.mcc));
        }
        if self.mnc != 0 {
            parts.push(format!("mnc{}", self.mnc));
        }
        if self.has_locale_extension() {
            // BCP 47 form, e.g. `b+sr+Latn`
            let mut tag = format!("b+{}", self.language);
            for sub in &[
                &self.locale_script,
                &self.region,
                &self.locale_variant,
                &self.locale_numbering_system,
            ] {
                if !sub.is_empty() {
                    tag.push('+');
                    tag.push_str(sub);
                }
            }
            parts.push(tag);
        } else {
            if !self.language.is_empty() {
                parts.push(self.language.clone());
            }
            if !self.region.is_empty() {
                parts.push(format!("r{}", self.region));
            }
        }
        if self.smallest_screen_width_dp != 0 {
            parts.push(format!("sw{}dp", self.smallest_screen_width_dp));
        }
        if self.screen_width_dp != 0 {
            parts.push(format!("w{}dp", self.screen_width_dp));
        }
        if self.screen_height_dp != 0 {
            parts.push(format!("h{}dp", self.screen_height_dp));
        }
        match self.screen_layout2 & SCREEN_ROUND_MASK {
            SCREEN_ROUND_NO => parts.push("notround".to_owned()),
            SCREEN_ROUND_YES => parts.push("round".to_owned()),
            _ => {}
        }
        match self.color_mode & WIDE_COLOR_GAMUT_MASK {
            WIDE_COLOR_GAMUT_NO => parts.push("nowidecg".to_owned()),
            WIDE_COLOR_GAMUT_YES => parts.push("widecg".to_owned()),
            _ => {}
        }
        match self.color_mode & HDR_MASK {
            HDR_NO => parts.push("lowdr".to_owned()),
            HDR_YES => parts.push("highdr".to_owned()),
            _ => {}
        }
        match self.orientation {
            1 => parts.push("port".to_owned()),
            2 => parts.push("land".to_owned()),
            _ => {}
        }
        if self.density != 0 {
            parts.push(density_name(self.density));
        }
        if self.sdk_version != 0 {
            parts.push(format!("v{}", self.sdk_version));
        }
        if parts.is_empty() {
            f.write_str("default")
        } else {
            f.write_str(&parts.join("-"))
        }
    }
}
