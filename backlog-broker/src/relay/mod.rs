//! Optional per-deployment serial-forwarder relay.

mod error;
mod flavor;
mod serial_forwarder;

pub use error::RelayError;
pub use flavor::{RelayFlavor, RelaySpec, LEGACY_HANDSHAKE, PLATFORM_HANDSHAKE};
pub use serial_forwarder::{SerialForwarderRelay, MAX_RELAY_PACKET_LEN};
