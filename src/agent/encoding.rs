//! Text decoding for `read_export`.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Encodings `read_export` can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextEncoding {
    Utf8,
    Ascii,
    Latin1,
    Utf16Le,
    Utf16Be,
}

impl FromStr for TextEncoding {
    type Err = Error;

    /// Accepts common aliases, ignoring case, `-` and `_`.
    fn from_str(label: &str) -> Result<Self> {
        let key: String = label
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match key.as_str() {
            "utf8" => Ok(TextEncoding::Utf8),
            "ascii" | "usascii" => Ok(TextEncoding::Ascii),
            "latin1" | "iso88591" | "l1" => Ok(TextEncoding::Latin1),
            "utf16le" | "utf16" => Ok(TextEncoding::Utf16Le),
            "utf16be" => Ok(TextEncoding::Utf16Be),
            _ => Err(Error::Decode {
                encoding: label.to_string(),
                reason: "unknown encoding".to_string(),
            }),
        }
    }
}

impl TextEncoding {
    pub fn label(self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Ascii => "ascii",
            TextEncoding::Latin1 => "latin-1",
            TextEncoding::Utf16Le => "utf-16le",
            TextEncoding::Utf16Be => "utf-16be",
        }
    }

    /// Decodes `bytes` strictly.
    ///
    /// When `truncated` is set the bytes were cut at an arbitrary offset, so
    /// an incomplete sequence at the very end is dropped instead of failing.
    pub fn decode(self, bytes: &[u8], truncated: bool) -> Result<String> {
        match self {
            TextEncoding::Utf8 => self.decode_utf8(bytes, truncated),
            TextEncoding::Ascii => match bytes.iter().position(|b| !b.is_ascii()) {
                Some(offset) => Err(self.invalid(format!(
                    "byte 0x{:02x} at offset {} is not ascii",
                    bytes[offset], offset
                ))),
                None => Ok(bytes.iter().map(|&b| b as char).collect()),
            },
            TextEncoding::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
            TextEncoding::Utf16Le => self.decode_utf16(bytes, truncated, u16::from_le_bytes),
            TextEncoding::Utf16Be => self.decode_utf16(bytes, truncated, u16::from_be_bytes),
        }
    }

    fn decode_utf8(self, bytes: &[u8], truncated: bool) -> Result<String> {
        match std::str::from_utf8(bytes) {
            Ok(text) => Ok(text.to_string()),
            // error_len() is None only for a sequence cut off by end of input.
            Err(e) if truncated && e.error_len().is_none() => {
                Ok(String::from_utf8_lossy(&bytes[..e.valid_up_to()]).into_owned())
            }
            Err(e) => Err(self.invalid(format!(
                "invalid sequence at offset {}",
                e.valid_up_to()
            ))),
        }
    }

    fn decode_utf16(
        self,
        bytes: &[u8],
        truncated: bool,
        unit: fn([u8; 2]) -> u16,
    ) -> Result<String> {
        let mut bytes = bytes;
        if bytes.len() % 2 == 1 {
            if !truncated {
                return Err(self.invalid("odd number of bytes".to_string()));
            }
            bytes = &bytes[..bytes.len() - 1];
        }

        let mut units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| unit([pair[0], pair[1]]))
            .collect();
        if truncated && units.last().is_some_and(|u| (0xD800..0xDC00).contains(u)) {
            units.pop();
        }

        let text: std::result::Result<String, _> = char::decode_utf16(units).collect();
        let text = text.map_err(|e| {
            self.invalid(format!("unpaired surrogate 0x{:04x}", e.unpaired_surrogate()))
        })?;
        Ok(text.strip_prefix('\u{feff}').map(str::to_string).unwrap_or(text))
    }

    fn invalid(self, reason: String) -> Error {
        Error::Decode {
            encoding: self.label().to_string(),
            reason,
        }
    }
}
