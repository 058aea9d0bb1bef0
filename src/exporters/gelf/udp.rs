// SPDX-License-Identifier: Apache-2.0

use crate::exporters::gelf::config::{Compression, GelfExporterConfig};
use crate::exporters::gelf::encode::{self, MessageIds};
use crate::exporters::gelf::error::{Error, Result};
use crate::exporters::gelf::transport::Transport;
use crate::gelf::Envelope;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::net::{UdpSocket, lookup_host};
use tracing::debug;

/// Sends every envelope as one GELF datagram, or as a chunked series when the
/// compressed body does not fit.
pub struct GelfUdpTransport {
    socket: UdpSocket,
    compression: Compression,
    chunk_size: usize,
    ids: MessageIds,
}

impl GelfUdpTransport {
    /// Resolves the collector and connects a UDP socket to the first address
    /// that accepts it.
    pub async fn connect(config: &GelfExporterConfig) -> Result<Self> {
        config.validate()?;

        let mut last_error: Option<io::Error> = None;
        for addr in lookup_host((config.server.as_str(), config.port)).await? {
            match connect_socket(addr).await {
                Ok(socket) => {
                    debug!(
                        collector = %addr,
                        local = ?socket.local_addr().ok(),
                        "Connected GELF transport"
                    );
                    return Ok(Self {
                        socket,
                        compression: config.compression,
                        chunk_size: config.chunk_size,
                        ids: MessageIds::default(),
                    });
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(match last_error {
            Some(e) => Error::Io(e),
            None => Error::Config(format!(
                "{} did not resolve to any address",
                config.address()
            )),
        })
    }
}

async fn connect_socket(addr: SocketAddr) -> io::Result<UdpSocket> {
    let local: SocketAddr = if addr.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let socket = UdpSocket::bind(local).await?;
    socket.connect(addr).await?;
    Ok(socket)
}

impl Transport for GelfUdpTransport {
    async fn send(&mut self, envelope: &Envelope) -> Result<()> {
        let payload = encode::compress(encode::encode_json(envelope)?, self.compression)?;

        if payload.len() <= self.chunk_size {
            self.socket.send(&payload).await?;
            return Ok(());
        }

        let datagrams = encode::chunk(&payload, self.chunk_size, self.ids.next_id())?;
        debug!(
            chunks = datagrams.len(),
            size = payload.len(),
            "Sending chunked message"
        );
        for datagram in datagrams {
            self.socket.send(&datagram).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporters::gelf::config::CHUNK_HEADER_LEN;
    use serde_json::{Value, json};
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    async fn collector() -> (UdpSocket, GelfExporterConfig) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let config = GelfExporterConfig {
            server: "127.0.0.1".to_string(),
            port: socket.local_addr().unwrap().port(),
            compression: Compression::None,
            ..Default::default()
        };
        (socket, config)
    }

    async fn recv(socket: &UdpSocket) -> Vec<u8> {
        let mut buf = vec![0u8; 65536];
        let n = timeout(WAIT, socket.recv(&mut buf)).await.unwrap().unwrap();
        buf.truncate(n);
        buf
    }

    #[tokio::test]
    async fn sends_single_datagram() {
        let (collector, config) = collector().await;
        let mut transport = GelfUdpTransport::connect(&config).await.unwrap();
        let peer = transport.socket.peer_addr().unwrap();
        assert_eq!(collector.local_addr().unwrap(), peer);

        let mut envelope = Envelope::text("hello");
        envelope.extra.insert("status".to_string(), json!(404));
        transport.send(&envelope).await.unwrap();

        let body: Value = serde_json::from_slice(&recv(&collector).await).unwrap();
        assert_eq!("hello", body["short_message"]);
        assert_eq!(404, body["_status"]);
        assert_eq!("unknown", body["host"]);
    }

    #[tokio::test]
    async fn large_messages_are_chunked() {
        let (collector, mut config) = collector().await;
        config.chunk_size = 512;
        let mut transport = GelfUdpTransport::connect(&config).await.unwrap();

        let envelope = Envelope::text("x".repeat(2000));
        transport.send(&envelope).await.unwrap();

        let first = recv(&collector).await;
        let count = first[11] as usize;
        assert!(count >= 4);
        assert_eq!([0x1e_u8, 0x0f], first[..2]);

        let mut parts = vec![Vec::new(); count];
        parts[first[10] as usize] = first[CHUNK_HEADER_LEN..].to_vec();
        for _ in 1..count {
            let datagram = recv(&collector).await;
            assert!(datagram.len() <= 512);
            assert_eq!(first[2..10], datagram[2..10]);
            parts[datagram[10] as usize] = datagram[CHUNK_HEADER_LEN..].to_vec();
        }

        let body: Value = serde_json::from_slice(&parts.concat()).unwrap();
        assert_eq!("x".repeat(2000), body["short_message"]);
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let config = GelfExporterConfig {
            port: 0,
            ..Default::default()
        };
        assert!(matches!(
            GelfUdpTransport::connect(&config).await,
            Err(Error::Config(_))
        ));
    }
}
