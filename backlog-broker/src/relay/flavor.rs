//! Relay protocol flavors and the settings that select them.

use super::error::RelayError;
use std::fmt::{Display, Formatter};

/// Version prefix exchanged by TinyOS 2.x serial-forwarder peers.
pub const PLATFORM_HANDSHAKE: &[u8; 2] = b"U ";
/// Version prefix exchanged by TinyOS 1.x serial-forwarder peers.
pub const LEGACY_HANDSHAKE: &[u8; 2] = b"T!";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RelayFlavor {
    Platform,
    /// TinyOS 1.x framing; peers also expect the numeric platform id.
    LegacyPlatform { platform: u32 },
}

impl RelayFlavor {
    /// Bytes the relay writes to every accepted client.
    pub fn server_handshake(&self) -> Vec<u8> {
        match self {
            RelayFlavor::Platform => PLATFORM_HANDSHAKE.to_vec(),
            RelayFlavor::LegacyPlatform { platform } => {
                let mut handshake = LEGACY_HANDSHAKE.to_vec();
                handshake.extend_from_slice(&platform.to_le_bytes());
                handshake
            }
        }
    }

    /// Prefix every accepted client must send back.
    pub fn expected_client_prefix(&self) -> &'static [u8; 2] {
        match self {
            RelayFlavor::Platform => PLATFORM_HANDSHAKE,
            RelayFlavor::LegacyPlatform { .. } => LEGACY_HANDSHAKE,
        }
    }
}

impl Display for RelayFlavor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayFlavor::Platform => write!(f, "platform"),
            RelayFlavor::LegacyPlatform { platform } => write!(f, "legacy-platform({platform})"),
        }
    }
}

/// Requested relay: listening port and flavor.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RelaySpec {
    pub port: u16,
    pub flavor: RelayFlavor,
}

impl RelaySpec {
    pub fn new(port: u16, flavor: RelayFlavor) -> Self {
        Self { port, flavor }
    }

    /// Builds a spec from deployment setting values; a platform id selects
    /// the legacy flavor.
    pub fn parse(port: &str, legacy_platform: Option<&str>) -> Result<Self, RelayError> {
        let port = port
            .trim()
            .parse::<u16>()
            .map_err(|_| RelayError::InvalidPort(port.to_string()))?;
        let flavor = match legacy_platform {
            None => RelayFlavor::Platform,
            Some(platform) => RelayFlavor::LegacyPlatform {
                platform: platform
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| RelayError::InvalidPlatform(platform.to_string()))?,
            },
        };
        Ok(Self { port, flavor })
    }
}

#[cfg(test)]
mod tests {
    use super::{RelayFlavor, RelaySpec};
    use crate::relay::RelayError;

    #[test]
    fn platform_id_selects_the_legacy_flavor() {
        assert_eq!(
            RelaySpec::parse("9002", None).expect("valid spec"),
            RelaySpec::new(9002, RelayFlavor::Platform)
        );
        assert_eq!(
            RelaySpec::parse(" 9002 ", Some("1")).expect("valid spec"),
            RelaySpec::new(9002, RelayFlavor::LegacyPlatform { platform: 1 })
        );
    }

    #[test]
    fn malformed_values_are_reported() {
        assert!(matches!(
            RelaySpec::parse("ninety", None),
            Err(RelayError::InvalidPort(_))
        ));
        assert!(matches!(
            RelaySpec::parse("70000", None),
            Err(RelayError::InvalidPort(_))
        ));
        assert!(matches!(
            RelaySpec::parse("9002", Some("telos")),
            Err(RelayError::InvalidPlatform(_))
        ));
    }

    #[test]
    fn legacy_handshake_carries_little_endian_platform() {
        let handshake = RelayFlavor::LegacyPlatform { platform: 0x0102 }.server_handshake();

        assert_eq!(handshake, vec![b'T', b'!', 0x02, 0x01, 0x00, 0x00]);
        assert_eq!(RelayFlavor::Platform.server_handshake(), b"U ".to_vec());
    }
}
