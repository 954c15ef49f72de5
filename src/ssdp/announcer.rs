//! Moteur SSDP côté device host : annonces et réponses aux recherches.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use rand::Rng;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::message::{build_alive, build_byebye, build_search_response};
use super::{multicast_target, rebind_backoff, SsdpMessage, SSDP_MULTICAST_ADDR, SSDP_PORT};
use crate::devices::{Device, VisitMode};
use crate::errors::UpnpError;
use crate::types::{server_token, ResourceType};

/// Un créneau d'annonce : une paire `NT`/`USN` publiée pour un root device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisementSlot {
    pub nt: String,
    pub usn: String,
}

/// Les créneaux d'annonce d'un arbre : `upnp:rootdevice`, l'UDN et le type de
/// chaque device, et chaque type de service.
pub fn advertisement_slots(root: &Arc<Device>) -> Vec<AdvertisementSlot> {
    let root_udn = root.udn().as_str().to_string();
    let mut slots = vec![AdvertisementSlot {
        nt: "upnp:rootdevice".to_string(),
        usn: format!("{}::upnp:rootdevice", root_udn),
    }];

    for device in root.embedded_devices(VisitMode::ThisRecursively) {
        let udn = device.udn().as_str().to_string();

        slots.push(AdvertisementSlot {
            nt: udn.clone(),
            usn: udn.clone(),
        });
        slots.push(AdvertisementSlot {
            nt: device.device_type().to_string(),
            usn: format!("{}::{}", udn, device.device_type()),
        });

        let mut seen_types = Vec::new();
        for service in device.services() {
            let service_type = service.service_type().to_string();
            if seen_types.contains(&service_type) {
                continue;
            }
            seen_types.push(service_type.clone());
            slots.push(AdvertisementSlot {
                nt: service_type.clone(),
                usn: format!("{}::{}", udn, service_type),
            });
        }
    }

    slots
}

struct RootAdvertisement {
    slots: Vec<AdvertisementSlot>,
    location: Url,
    max_age: u32,
    cancel: CancellationToken,
}

/// Moteur d'annonces SSDP d'un device host.
pub struct SsdpAnnouncer {
    socket: Arc<UdpSocket>,
    server_header: String,
    advertisement_count: u32,
    roots: Arc<RwLock<HashMap<String, Arc<RootAdvertisement>>>>,
    shutdown: CancellationToken,
}

impl SsdpAnnouncer {
    /// Lie le socket multicast et démarre l'écoute des M-SEARCH.
    ///
    /// # Errors
    ///
    /// `CommunicationsError` si le bind échoue — fatal pour le démarrage du
    /// moteur.
    pub async fn start(
        advertisement_count: u32,
        shutdown: CancellationToken,
    ) -> Result<Self, UpnpError> {
        let socket = bind_announce_socket()
            .map_err(|e| UpnpError::CommunicationsError(format!("SSDP bind: {}", e)))?;

        info!("✅ SSDP announcer bound on 0.0.0.0:{}", SSDP_PORT);

        let announcer = Self {
            socket: Arc::new(socket),
            server_header: server_token(),
            advertisement_count: super::clamp_advertisement_count(advertisement_count),
            roots: Arc::new(RwLock::new(HashMap::new())),
            shutdown,
        };

        announcer.spawn_responder();
        Ok(announcer)
    }

    /// Enregistre un root device : annonces initiales puis ré-annonces à
    /// `max_age / 2` (la règle de demi-vie garantit le rafraîchissement des
    /// caches distants avant expiration).
    pub fn add_root(&self, device: &Arc<Device>, location: Url, max_age: u32) {
        let max_age = super::clamp_max_age(max_age);
        let advertisement = Arc::new(RootAdvertisement {
            slots: advertisement_slots(device),
            location,
            max_age,
            cancel: self.shutdown.child_token(),
        });

        self.roots
            .write()
            .unwrap()
            .insert(device.udn().as_str().to_string(), advertisement.clone());

        // Flux sériel par root : annonces initiales puis timer de demi-vie.
        let socket = self.socket.clone();
        let server = self.server_header.clone();
        let count = self.advertisement_count;
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_secs(u64::from(max_age / 2).max(1)));
            let mut first = true;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        // Au démarrage : `count` annonces par créneau ; ensuite
                        // une ré-annonce par demi-vie.
                        let repeats = if first { count.max(1) } else { 1 };
                        first = false;
                        for _ in 0..repeats {
                            send_alive_for(&socket, &advertisement, &server).await;
                        }
                    }
                    _ = advertisement.cancel.cancelled() => break,
                }
            }
        });
    }

    /// Retire un root : arrête son timer et émet un byebye par créneau.
    pub async fn remove_root(&self, udn: &str) {
        let advertisement = self.roots.write().unwrap().remove(udn);
        if let Some(advertisement) = advertisement {
            advertisement.cancel.cancel();
            self.send_byebye_for(&advertisement).await;
        }
    }

    /// Arrêt gracieux : un byebye par créneau de chaque root.
    pub async fn shutdown(&self) {
        info!("👋 SSDP announcer shutting down, sending byebye for all roots");
        let roots: Vec<Arc<RootAdvertisement>> =
            self.roots.write().unwrap().drain().map(|(_, a)| a).collect();
        for advertisement in roots {
            advertisement.cancel.cancel();
            self.send_byebye_for(&advertisement).await;
        }
    }

    async fn send_byebye_for(&self, advertisement: &RootAdvertisement) {
        for slot in &advertisement.slots {
            let msg = build_byebye(&slot.nt, &slot.usn);
            match self.socket.send_to(msg.as_bytes(), multicast_target()).await {
                Ok(_) => debug!("👋 byebye {} (NT={})", slot.usn, slot.nt),
                Err(e) => warn!("❌ Failed to send byebye for {}: {}", slot.usn, e),
            }
        }
    }

    /// Tâche de réponse aux M-SEARCH.
    fn spawn_responder(&self) {
        let socket = self.socket.clone();
        let roots = self.roots.clone();
        let server = self.server_header.clone();
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
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
                        // UDP est avec perte : on journalise, on temporise,
                        // on repart.
                        warn!("❌ SSDP announcer read error: {}", e);
                        let backoff = rebind_backoff(consecutive_errors);
                        consecutive_errors = consecutive_errors.saturating_add(1);
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                };

                let Some(SsdpMessage::SearchRequest { st, mx }) =
                    SsdpMessage::parse(&buf[..n])
                else {
                    continue;
                };

                debug!("📥 M-SEARCH (ST={}, MX={}) from {}", st, mx, from);

                let matched = matching_slots(&roots, &st);
                if matched.is_empty() {
                    continue;
                }

                // Réponses unicast différées uniformément dans
                // [0, min(MX, 5)] pour éviter les tempêtes de réponses.
                let window = mx.min(5).max(1);
                for (slot, location, max_age) in matched {
                    let socket = socket.clone();
                    let server = server.clone();
                    let st_echo = if st == "ssdp:all" { slot.nt.clone() } else { st.clone() };
                    let delay_ms = rand::thread_rng().gen_range(0..window * 1000);

                    tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_millis(u64::from(delay_ms))).await;
                        let msg = build_search_response(
                            &st_echo,
                            &slot.usn,
                            location.as_str(),
                            &server,
                            max_age,
                        );
                        match socket.send_to(msg.as_bytes(), from).await {
                            Ok(_) => debug!("📤 M-SEARCH response to {} (ST={})", from, st_echo),
                            Err(e) => {
                                warn!("❌ Failed to send M-SEARCH response to {}: {}", from, e)
                            }
                        }
                    });
                }
            }
        });
    }
}

async fn send_alive_for(
    socket: &UdpSocket,
    advertisement: &RootAdvertisement,
    server: &str,
) {
    for slot in &advertisement.slots {
        let msg = build_alive(
            &slot.nt,
            &slot.usn,
            advertisement.location.as_str(),
            server,
            advertisement.max_age,
        );
        match socket.send_to(msg.as_bytes(), multicast_target()).await {
            Ok(_) => debug!("📤 alive {} (NT={})", slot.usn, slot.nt),
            Err(e) => warn!("❌ Failed to send alive for {}: {}", slot.usn, e),
        }
    }
}

/// Les créneaux qui répondent à un `ST` donné, avec leur localisation et
/// leur max-age.
fn matching_slots(
    roots: &RwLock<HashMap<String, Arc<RootAdvertisement>>>,
    st: &str,
) -> Vec<(AdvertisementSlot, Url, u32)> {
    let requested_type: Option<ResourceType> = st.parse().ok();
    let mut out = Vec::new();

    for advertisement in roots.read().unwrap().values() {
        for slot in &advertisement.slots {
            let matches = match st {
                "ssdp:all" => true,
                "upnp:rootdevice" => slot.nt == "upnp:rootdevice",
                _ if st.starts_with("uuid:") => slot.nt == st,
                _ => match (&requested_type, slot.nt.parse::<ResourceType>()) {
                    (Some(requested), Ok(advertised)) => {
                        advertised.is_compatible_with(requested)
                    }
                    _ => false,
                },
            };

            if matches {
                out.push((
                    slot.clone(),
                    advertisement.location.clone(),
                    advertisement.max_age,
                ));
            }
        }
    }

    out
}

/// Socket d'annonce : 0.0.0.0:1900, `SO_REUSEADDR`, membre du groupe
/// multicast.
fn bind_announce_socket() -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;

    let addr: SocketAddr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, SSDP_PORT));
    socket.bind(&addr.into())?;

    // Seul l'échec du bind est fatal ; un groupe injoignable laisse le
    // répondeur unicast opérationnel.
    if let Err(e) = socket.join_multicast_v4(&SSDP_MULTICAST_ADDR, &Ipv4Addr::UNSPECIFIED) {
        warn!("❌ Multicast join failed: {}", e);
    }
    let _ = socket.set_multicast_loop_v4(true);
    socket.set_nonblocking(true)?;

    UdpSocket::from_std(socket.into())
}
