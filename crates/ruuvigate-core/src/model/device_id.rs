// ── Device identifiers ──
//
// A RuuviTag is addressed by its 6-byte hardware address. The textual form
// is validated on the way in and then kept exactly as supplied: the
// registry file and remote clients see the same spelling they sent.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A validated RuuviTag MAC address, stored verbatim.
///
/// Accepted forms are six 2-hex-digit groups joined by `:`, `-`, or
/// nothing, with the same separator at every boundary. Hex digits are
/// case-insensitive. Equality is on the verbatim text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceId(String);

impl DeviceId {
    /// Validate `raw` and wrap it unchanged.
    pub fn parse(raw: impl Into<String>) -> Result<Self, CoreError> {
        let raw = raw.into();
        if Self::is_valid(&raw) {
            Ok(Self(raw))
        } else {
            Err(CoreError::InvalidDeviceId { value: raw })
        }
    }

    /// Whether `raw` is a well-formed MAC address.
    pub fn is_valid(raw: &str) -> bool {
        let bytes = raw.as_bytes();
        match bytes.len() {
            12 => bytes.iter().all(u8::is_ascii_hexdigit),
            17 => {
                let sep = bytes[2];
                if sep != b':' && sep != b'-' {
                    return false;
                }
                bytes.chunks(3).all(|group| match group {
                    [a, b, s] => a.is_ascii_hexdigit() && b.is_ascii_hexdigit() && *s == sep,
                    [a, b] => a.is_ascii_hexdigit() && b.is_ascii_hexdigit(),
                    _ => false,
                })
            }
            _ => false,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for DeviceId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DeviceId {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.0
    }
}
