//! Client hardware addresses.

use crate::error::ClientError;
use std::{fmt, str::FromStr};

pub const ETH_ALEN: usize = 6;

/// A 6-byte Ethernet hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddr([u8; ETH_ALEN]);

impl MacAddr {
    pub const fn new(octets: [u8; ETH_ALEN]) -> Self {
        Self(octets)
    }

    /// Generates a random unicast address with the locally-administered bit
    /// set, so it never collides with a vendor-assigned one.
    pub fn random() -> Self {
        let mut octets: [u8; ETH_ALEN] = rand::random();
        octets[0] = (octets[0] | 0x02) & !0x01;
        Self(octets)
    }

    pub fn octets(&self) -> [u8; ETH_ALEN] {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Uppercase hex with no separators, e.g. `0A1B2C3D4E5F`.
    pub fn to_hex_upper(&self) -> String {
        self.0.iter().map(|b| format!("{b:02X}")).collect()
    }
}

impl From<[u8; ETH_ALEN]> for MacAddr {
    fn from(octets: [u8; ETH_ALEN]) -> Self {
        Self(octets)
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

/// Parses `0a:1b:2c:3d:4e:5f`.
impl FromStr for MacAddr {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; ETH_ALEN];
        let mut count = 0;
        for byte_str in s.trim().split(':') {
            if count == ETH_ALEN {
                return Err(ClientError::MacParse(format!(
                    "'{s}' has more than {ETH_ALEN} octets"
                )));
            }
            octets[count] = u8::from_str_radix(byte_str, 16)
                .map_err(|e| ClientError::MacParse(format!("'{s}': {e}")))?;
            count += 1;
        }
        if count != ETH_ALEN {
            return Err(ClientError::MacParse(format!(
                "'{s}' has {count} octets, expected {ETH_ALEN}"
            )));
        }
        Ok(Self(octets))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let mac: MacAddr = "0a:1B:2c:3d:4e:5f".parse().unwrap();
        assert_eq!(mac.octets(), [0x0a, 0x1b, 0x2c, 0x3d, 0x4e, 0x5f]);
        assert_eq!(mac.to_string(), "0a:1b:2c:3d:4e:5f");
        assert_eq!(mac.to_hex_upper(), "0A1B2C3D4E5F");
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!("0a:1b:2c".parse::<MacAddr>().is_err());
        assert!("0a:1b:2c:3d:4e:5f:60".parse::<MacAddr>().is_err());
        assert!("zz:1b:2c:3d:4e:5f".parse::<MacAddr>().is_err());
        assert!("".parse::<MacAddr>().is_err());
    }

    #[test]
    fn test_random_is_local_unicast() {
        for _ in 0..64 {
            let first = MacAddr::random().octets()[0];
            assert_eq!(first & 0x02, 0x02);
            assert_eq!(first & 0x01, 0x00);
        }
    }
}
