use backlog_broker::relay::{LEGACY_HANDSHAKE, PLATFORM_HANDSHAKE};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Minimal serial-forwarder peer for exercising a relay.
pub struct SerialForwarderTestClient {
    stream: TcpStream,
    server_handshake: Vec<u8>,
}

impl SerialForwarderTestClient {
    /// Connects and completes the handshake. `legacy` selects the TinyOS 1.x
    /// prefix, whose server handshake carries a 4-byte platform id.
    pub async fn connect(addr: SocketAddr, legacy: bool) -> std::io::Result<Self> {
        let mut stream = TcpStream::connect(("127.0.0.1", addr.port())).await?;
        let (prefix, handshake_len) = if legacy {
            (LEGACY_HANDSHAKE, LEGACY_HANDSHAKE.len() + 4)
        } else {
            (PLATFORM_HANDSHAKE, PLATFORM_HANDSHAKE.len())
        };

        let mut server_handshake = vec![0u8; handshake_len];
        stream.read_exact(&mut server_handshake).await?;
        stream.write_all(prefix).await?;

        Ok(Self {
            stream,
            server_handshake,
        })
    }

    pub fn server_handshake(&self) -> &[u8] {
        &self.server_handshake
    }

    /// Next `[len][payload]` packet from the relay, or `None` on timeout or EOF.
    pub async fn next_packet(&mut self, within: Duration) -> Option<Vec<u8>> {
        timeout(within, async {
            let len = self.stream.read_u8().await.ok()? as usize;
            let mut payload = vec![0u8; len];
            self.stream.read_exact(&mut payload).await.ok()?;
            Some(payload)
        })
        .await
        .ok()
        .flatten()
    }

    pub async fn send_packet(&mut self, payload: &[u8]) -> std::io::Result<()> {
        let len = u8::try_from(payload.len()).map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "packet longer than 255 bytes")
        })?;
        self.stream.write_u8(len).await?;
        self.stream.write_all(payload).await
    }
}
