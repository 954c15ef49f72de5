//! Moteur SSDP côté control point : écoute des annonces et envoi des
//! M-SEARCH.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::message::build_msearch;
use super::{multicast_target, rebind_backoff, SsdpMessage, SSDP_MULTICAST_ADDR};
use crate::errors::UpnpError;
use crate::types::server_token;

/// Événement typé émis vers l'orchestrateur du control point.
#[derive(Debug, Clone)]
pub enum SsdpEvent {
    ResourceAvailable {
        usn: String,
        nt: String,
        location: String,
        server: String,
        max_age: u32,
        from: SocketAddr,
    },
    ResourceUnavailable {
        usn: String,
        nt: String,
        from: SocketAddr,
    },
    ResourceUpdate {
        usn: String,
        nt: String,
        location: String,
        from: SocketAddr,
    },
    DiscoveryResponse {
        usn: String,
        st: String,
        location: String,
        server: String,
        max_age: u32,
        from: SocketAddr,
    },
}

/// Écouteur SSDP d'un control point.
pub struct SsdpListener {
    socket: Arc<UdpSocket>,
    shutdown: CancellationToken,
}

impl SsdpListener {
    /// Lie un port éphémère, rejoint le groupe multicast sur chaque
    /// interface IPv4 non-loopback, et démarre la boucle de réception.
    ///
    /// # Returns
    ///
    /// L'écouteur et le récepteur d'événements typés.
    ///
    /// # Errors
    ///
    /// `CommunicationsError` si le bind échoue.
    pub fn start(
        shutdown: CancellationToken,
    ) -> Result<(Self, mpsc::Receiver<SsdpEvent>), UpnpError> {
        let socket = bind_listen_socket()
            .map_err(|e| UpnpError::CommunicationsError(format!("SSDP bind: {}", e)))?;
        let socket = Arc::new(socket);

        info!("✅ SSDP listener ready (ephemeral port)");

        let (tx, rx) = mpsc::channel(64);
        let listener = Self {
            socket: socket.clone(),
            shutdown: shutdown.clone(),
        };

        tokio::spawn(receive_loop(socket, tx, shutdown));

        Ok((listener, rx))
    }

    /// Envoie un M-SEARCH multicast. L'échec d'envoi est journalisé et
    /// avalé : UDP est avec perte par contrat.
    pub async fn search(&self, st: &str, mx: u32) {
        let msg = build_msearch(st, mx, &server_token());
        match self
            .socket
            .send_to(msg.as_bytes(), multicast_target())
            .await
        {
            Ok(_) => debug!("📤 M-SEARCH sent (ST={}, MX={})", st, mx),
            Err(e) => warn!("❌ Failed to send M-SEARCH: {}", e),
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

async fn receive_loop(
    mut socket: Arc<UdpSocket>,
    tx: mpsc::Sender<SsdpEvent>,
    shutdown: CancellationToken,
) {
    let mut buf = [0u8; 8192];
    let mut consecutive_errors: u32 = 0;

    loop {
        let received = tokio::select! {
            r = socket.recv_from(&mut buf) => r,
            _ = shutdown.cancelled() => break,
        };

        let (n, from) = match received {
            Ok(ok) => {
                consecutive_errors = 0;
                ok
            }
            Err(e) => {
                // Réinitialisation du socket avec backoff : 1 s, 2 s, 4 s…
                // plafonné à 30 s.
                warn!("❌ SSDP listener read error: {}, rebinding", e);
                tokio::time::sleep(rebind_backoff(consecutive_errors)).await;
                consecutive_errors = consecutive_errors.saturating_add(1);

                match bind_listen_socket() {
                    Ok(fresh) => {
                        socket = Arc::new(fresh);
                        info!("✅ SSDP listener rebound");
                    }
                    Err(e) => warn!("❌ SSDP rebind failed: {}", e),
                }
                continue;
            }
        };

        let Some(message) = SsdpMessage::parse(&buf[..n]) else {
            trace!("unparseable SSDP datagram from {}", from);
            continue;
        };

        let event = match message {
            SsdpMessage::Alive {
                nt,
                usn,
                location,
                server,
                max_age,
            } => SsdpEvent::ResourceAvailable {
                usn,
                nt,
                location,
                server,
                max_age,
                from,
            },
            SsdpMessage::ByeBye { nt, usn } => SsdpEvent::ResourceUnavailable { usn, nt, from },
            SsdpMessage::Update { nt, usn, location } => SsdpEvent::ResourceUpdate {
                usn,
                nt,
                location,
                from,
            },
            SsdpMessage::SearchResponse {
                st,
                usn,
                location,
                server,
                max_age,
            } => SsdpEvent::DiscoveryResponse {
                usn,
                st,
                location,
                server,
                max_age,
                from,
            },
            // Un autre control point nous interroge : nous ne sommes pas un
            // device, on ignore.
            SsdpMessage::SearchRequest { .. } => continue,
        };

        debug!("📥 SSDP event from {}: {:?}", from, event);
        if tx.send(event).await.is_err() {
            break;
        }
    }
}

/// Socket d'écoute : port éphémère, membre du groupe multicast sur chaque
/// interface IPv4 non-loopback.
fn bind_listen_socket() -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;

    let addr: SocketAddr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0));
    socket.bind(&addr.into())?;
    socket.set_multicast_loop_v4(true)?;
    socket.set_nonblocking(true)?;

    let socket = UdpSocket::from_std(socket.into())?;

    match get_if_addrs::get_if_addrs() {
        Ok(interfaces) => {
            for iface in interfaces {
                if let std::net::IpAddr::V4(ipv4) = iface.ip() {
                    if ipv4.is_loopback() {
                        continue;
                    }
                    match socket.join_multicast_v4(SSDP_MULTICAST_ADDR, ipv4) {
                        Ok(()) => debug!("SSDP: joined {} on {}", SSDP_MULTICAST_ADDR, ipv4),
                        Err(e) => {
                            warn!("SSDP: failed to join {} on {}: {}", SSDP_MULTICAST_ADDR, ipv4, e)
                        }
                    }
                }
            }
        }
        Err(e) => warn!("❌ Interface enumeration failed: {}", e),
    }

    Ok(socket)
}
