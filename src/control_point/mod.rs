//! Orchestrateur control point.
//!
//! Consomme les événements typés du moteur SSDP : les annonces alimentent
//! les tâches de construction de devices, les byebye et l'expiration du
//! `max-age` évincent les arbres. Le serveur HTTP local reçoit les NOTIFY
//! GENA sur `/event-sink`.

mod build_task;
mod config;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use build_task::{BuildContext, DeviceBuildTask};
pub use config::ControlPointConfiguration;

use crate::description::{DescriptionFetcher, HttpFetcher, IconFetcher};
use crate::devices::{Device, DeviceStorage, VisitMode};
use crate::errors::UpnpError;
use crate::eventing::{EventSubscriptionManager, SubscriptionEvent};
use crate::http::{HttpClient, HttpServer};
use crate::services::Service;
use crate::ssdp::{SsdpEvent, SsdpListener};
use crate::types::{ProductTokens, Udn, ValidationLevel};

/// Événements émis vers l'application.
#[derive(Debug, Clone)]
pub enum ControlPointEvent {
    RootDeviceOnline(Arc<Device>),
    RootDeviceOffline(Udn),
    SubscriptionFailed { service_key: String, reason: String },
}

/// Annonce connue d'un device distant.
#[derive(Debug, Clone)]
struct Advert {
    location: Url,
    max_age: u32,
    refreshed_at: Instant,
}

/// Control point UPnP.
pub struct ControlPoint {
    config: ControlPointConfiguration,
    started: bool,
    server: Option<HttpServer>,
    listener: Option<Arc<SsdpListener>>,
    storage: Arc<DeviceStorage>,
    subscriptions: Option<Arc<EventSubscriptionManager>>,
    fetcher: Option<Arc<dyn DescriptionFetcher>>,
    icon_fetcher: Option<Arc<dyn IconFetcher>>,
    events: broadcast::Sender<ControlPointEvent>,
    known: Arc<Mutex<HashMap<String, Advert>>>,
    shutdown: CancellationToken,
}

impl ControlPoint {
    pub fn new(config: ControlPointConfiguration) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            config,
            started: false,
            server: None,
            listener: None,
            storage: Arc::new(DeviceStorage::new()),
            subscriptions: None,
            fetcher: None,
            icon_fetcher: None,
            events,
            known: Arc::new(Mutex::new(HashMap::new())),
            shutdown: CancellationToken::new(),
        }
    }

    /// Remplace le transport de récupération des descriptions (tests,
    /// caches). Par défaut : HTTP.
    pub fn set_description_fetcher(&mut self, fetcher: Arc<dyn DescriptionFetcher>) {
        self.fetcher = Some(fetcher);
    }

    /// Active la récupération des octets d'icônes pendant la construction
    /// des devices. Désactivée par défaut.
    pub fn set_icon_fetcher(&mut self, fetcher: Arc<dyn IconFetcher>) {
        self.icon_fetcher = Some(fetcher);
    }

    /// Flux des événements du control point.
    pub fn subscribe_events(&self) -> broadcast::Receiver<ControlPointEvent> {
        self.events.subscribe()
    }

    /// Les devices distants connus.
    pub fn storage(&self) -> &Arc<DeviceStorage> {
        &self.storage
    }

    /// Le gestionnaire d'abonnements, une fois démarré.
    pub fn subscriptions(&self) -> Option<&Arc<EventSubscriptionManager>> {
        self.subscriptions.as_ref()
    }

    /// Démarre le control point : serveur de callbacks, écouteur SSDP,
    /// boucle d'événements, découverte automatique.
    pub async fn init(&mut self) -> Result<(), UpnpError> {
        if self.started {
            return Err(UpnpError::AlreadyInitialized);
        }

        // Serveur HTTP local pour les NOTIFY.
        let mut server = HttpServer::new("upnp-cp", self.config.http_port);
        let addr = server
            .bind()
            .await
            .map_err(|e| UpnpError::UndefinedFailure(format!("HTTP bind: {}", e)))?;
        self.shutdown = server.shutdown_token();

        let host_ip = match &self.config.host_ip {
            Some(ip) => ip.clone(),
            None => super::host::detect_host_ip(),
        };
        let base_url = Url::parse(&format!("http://{}:{}", host_ip, addr.port()))
            .map_err(|e| UpnpError::InvalidConfiguration(e.to_string()))?;

        let http = HttpClient::new(self.shutdown.clone());
        let manager = Arc::new(EventSubscriptionManager::new(
            http.clone(),
            self.shutdown.clone(),
        ));
        manager.set_callback_roots(vec![base_url]);

        server
            .add_any_handler_with_state("/event-sink", notify_handler, manager.clone())
            .await;
        server
            .serve()
            .await
            .map_err(|e| UpnpError::UndefinedFailure(e.to_string()))?;
        self.server = Some(server);

        // Les échecs d'abonnement remontent à l'application.
        forward_subscription_failures(&manager, self.events.clone(), self.shutdown.clone());

        // Moteur SSDP ; en cas d'échec le serveur déjà démarré est arrêté.
        let (listener, ssdp_rx) = match SsdpListener::start(self.shutdown.clone()) {
            Ok(started) => started,
            Err(e) => {
                self.shutdown.cancel();
                if let Some(mut server) = self.server.take() {
                    server.stop().await;
                }
                return Err(e);
            }
        };
        let listener = Arc::new(listener);

        let fetcher: Arc<dyn DescriptionFetcher> = match &self.fetcher {
            Some(fetcher) => fetcher.clone(),
            None => Arc::new(HttpFetcher::new(http.clone())),
        };

        let context = Arc::new(BuildContext {
            storage: self.storage.clone(),
            fetcher,
            icon_fetcher: self.icon_fetcher.clone(),
            events: self.events.clone(),
            building: Mutex::new(Default::default()),
            semaphore: Semaphore::new(self.config.device_build_parallelism.max(1)),
        });

        // Boucle d'événements : toute mutation d'état protocolaire se fait
        // dans cette tâche.
        tokio::spawn(event_loop(
            ssdp_rx,
            context,
            self.storage.clone(),
            manager.clone(),
            self.events.clone(),
            self.known.clone(),
            self.shutdown.clone(),
        ));

        // Découverte automatique.
        if self.config.auto_discovery {
            let listener = listener.clone();
            let interval = Duration::from_secs(self.config.scan_interval_secs.max(1));
            let shutdown = self.shutdown.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => listener.search("ssdp:all", 2).await,
                        _ = shutdown.cancelled() => break,
                    }
                }
            });
        }

        self.listener = Some(listener);
        self.subscriptions = Some(manager);
        self.started = true;

        info!("✅ Control point started");
        Ok(())
    }

    /// Émet un M-SEARCH immédiat.
    pub async fn scan(&self, st: &str, mx: u32) -> Result<(), UpnpError> {
        let listener = self.listener.as_ref().ok_or(UpnpError::NotStarted)?;
        listener.search(st, mx).await;
        Ok(())
    }

    /// Souscrit aux événements d'un service distant.
    pub async fn subscribe(&self, service: &Arc<Service>) -> Result<String, UpnpError> {
        let manager = self.subscriptions.as_ref().ok_or(UpnpError::NotStarted)?;
        manager
            .subscribe(service, self.config.subscription_timeout_hint)
            .await
    }

    /// Arrête le control point : abonnements abandonnés sans UNSUBSCRIBE
    /// pour les devices disparus, résiliés sinon, serveurs fermés.
    pub async fn quit(&mut self) -> Result<(), UpnpError> {
        if !self.started {
            return Err(UpnpError::NotStarted);
        }

        if let Some(manager) = &self.subscriptions {
            for root in self.storage.roots() {
                manager.remove(&root, VisitMode::ThisRecursively, true).await;
            }
        }

        self.shutdown.cancel();
        if let Some(mut server) = self.server.take() {
            server.stop().await;
        }
        self.listener = None;
        self.subscriptions = None;
        for device in self.storage.drain() {
            device.dispose();
        }
        self.known.lock().unwrap().clear();
        self.started = false;

        info!("👋 Control point stopped");
        Ok(())
    }
}

/// Boucle d'événements du control point.
async fn event_loop(
    mut ssdp_rx: mpsc::Receiver<SsdpEvent>,
    context: Arc<BuildContext>,
    storage: Arc<DeviceStorage>,
    manager: Arc<EventSubscriptionManager>,
    events: broadcast::Sender<ControlPointEvent>,
    known: Arc<Mutex<HashMap<String, Advert>>>,
    shutdown: CancellationToken,
) {
    let mut sweep = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            event = ssdp_rx.recv() => {
                let Some(event) = event else { break };
                handle_ssdp_event(event, &context, &storage, &manager, &events, &known).await;
            }
            _ = sweep.tick() => {
                sweep_expired(&storage, &manager, &events, &known).await;
            }
            _ = shutdown.cancelled() => break,
        }
    }
}

async fn handle_ssdp_event(
    event: SsdpEvent,
    context: &Arc<BuildContext>,
    storage: &Arc<DeviceStorage>,
    manager: &Arc<EventSubscriptionManager>,
    events: &broadcast::Sender<ControlPointEvent>,
    known: &Arc<Mutex<HashMap<String, Advert>>>,
) {
    match event {
        SsdpEvent::ResourceAvailable {
            usn,
            location,
            server,
            max_age,
            ..
        }
        | SsdpEvent::DiscoveryResponse {
            usn,
            location,
            server,
            max_age,
            ..
        } => {
            let tokens = ProductTokens::parse(&server);
            if !tokens.is_valid() {
                debug!("❓ Peer without a valid UPnP token: '{}'", server);
            }

            let Some(udn) = udn_of_usn(&usn) else { return };
            let Ok(location) = Url::parse(&location) else {
                debug!("❓ Unusable LOCATION '{}' in advert", location);
                return;
            };

            if should_fetch(known, &udn, &location, max_age)
                && storage.device_by_udn(&udn).is_none()
            {
                let task = DeviceBuildTask {
                    context: context.clone(),
                    udn_hint: udn.as_str().to_string(),
                    location,
                };
                tokio::spawn(task.run());
            }
        }
        SsdpEvent::ResourceUpdate { usn, location, .. } => {
            // Alive avec nouvelle localisation : éviction puis reconstruction
            // au prochain passage si la localisation a changé.
            let Some(udn) = udn_of_usn(&usn) else { return };
            let Ok(location) = Url::parse(&location) else { return };

            let moved = known
                .lock()
                .unwrap()
                .get(udn.as_str())
                .map(|a| a.location != location)
                .unwrap_or(false);
            if moved {
                info!("🔀 {} moved to {}", udn, location);
                evict_root(&udn, storage, manager, events, known).await;
            }
        }
        SsdpEvent::ResourceUnavailable { usn, .. } => {
            let Some(udn) = udn_of_usn(&usn) else { return };
            evict_root(&udn, storage, manager, events, known).await;
        }
    }
}

/// `shouldFetch` : USN inconnu, localisation changée, ou `max-age` étendu.
/// L'horodatage de fraîcheur est rafraîchi dans tous les cas.
fn should_fetch(
    known: &Arc<Mutex<HashMap<String, Advert>>>,
    udn: &Udn,
    location: &Url,
    max_age: u32,
) -> bool {
    let mut known = known.lock().unwrap();
    match known.get_mut(udn.as_str()) {
        None => {
            known.insert(
                udn.as_str().to_string(),
                Advert {
                    location: location.clone(),
                    max_age,
                    refreshed_at: Instant::now(),
                },
            );
            true
        }
        Some(advert) => {
            let fetch = advert.location != *location || max_age > advert.max_age;
            advert.location = location.clone();
            advert.max_age = max_age;
            advert.refreshed_at = Instant::now();
            fetch
        }
    }
}

/// Évince la racine portant (ou contenant) cet UDN : abonnements abandonnés
/// sans UNSUBSCRIBE (le distant a disparu), arbre disposé,
/// `rootDeviceOffline` émis.
async fn evict_root(
    udn: &Udn,
    storage: &Arc<DeviceStorage>,
    manager: &Arc<EventSubscriptionManager>,
    events: &broadcast::Sender<ControlPointEvent>,
    known: &Arc<Mutex<HashMap<String, Advert>>>,
) {
    let Some(node) = storage.device_by_udn(udn) else {
        known.lock().unwrap().remove(udn.as_str());
        return;
    };
    let root = node.root();
    let root_udn = root.udn().clone();

    let Some(root) = storage.remove_root(&root_udn) else {
        return;
    };

    manager.remove(&root, VisitMode::ThisRecursively, false).await;
    root.dispose();

    {
        let mut known = known.lock().unwrap();
        for device in root.embedded_devices(VisitMode::ThisRecursively) {
            known.remove(device.udn().as_str());
        }
    }

    info!("👋 Root device offline: {}", root_udn);
    let _ = events.send(ControlPointEvent::RootDeviceOffline(root_udn));
}

/// Éviction des racines dont le `max-age` annoncé est écoulé sans
/// rafraîchissement.
async fn sweep_expired(
    storage: &Arc<DeviceStorage>,
    manager: &Arc<EventSubscriptionManager>,
    events: &broadcast::Sender<ControlPointEvent>,
    known: &Arc<Mutex<HashMap<String, Advert>>>,
) {
    let now = Instant::now();

    let stale: Vec<Udn> = storage
        .roots()
        .into_iter()
        .filter(|root| {
            let Some(location) = storage.location_of(root.udn()) else {
                return false;
            };
            let known = known.lock().unwrap();
            // Frais tant qu'une annonce de cet arbre est dans son max-age.
            !known.values().any(|advert| {
                advert.location == location
                    && now.duration_since(advert.refreshed_at)
                        <= Duration::from_secs(u64::from(advert.max_age))
            })
        })
        .map(|root| root.udn().clone())
        .collect();

    for udn in stale {
        warn!("⏳ Advert cache expired for {}, evicting", udn);
        evict_root(&udn, storage, manager, events, known).await;
    }
}

/// Relaye `subscriptionFailed` du gestionnaire vers le flux du control
/// point.
fn forward_subscription_failures(
    manager: &Arc<EventSubscriptionManager>,
    events: broadcast::Sender<ControlPointEvent>,
    shutdown: CancellationToken,
) {
    let mut rx = manager.subscribe_events();
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                e = rx.recv() => e,
                _ = shutdown.cancelled() => break,
            };
            match event {
                Ok(SubscriptionEvent::Failed { service_key, reason }) => {
                    let _ = events.send(ControlPointEvent::SubscriptionFailed {
                        service_key,
                        reason,
                    });
                }
                Ok(SubscriptionEvent::Established { .. }) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

/// Handler des NOTIFY entrants sur `/event-sink`.
async fn notify_handler(
    State(manager): State<Arc<EventSubscriptionManager>>,
    request: Request,
) -> Response {
    if request.method().as_str() != "NOTIFY" {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let sid = header_value(&request, "SID");
    let seq = header_value(&request, "SEQ");

    let body = match axum::body::to_bytes(request.into_body(), 1 << 20).await {
        Ok(bytes) => bytes,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    let status = manager.on_notify(sid.as_deref(), seq.as_deref(), &body);
    StatusCode::from_u16(status)
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
        .into_response()
}

fn header_value(request: &Request, name: &str) -> Option<String> {
    request
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
}

/// L'UDN (partie `uuid:` d'un USN, avant `::`).
fn udn_of_usn(usn: &str) -> Option<Udn> {
    let udn_part = usn.split("::").next()?;
    Udn::parse(udn_part, ValidationLevel::Lenient).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_udn_extraction_from_usn() {
        let udn = udn_of_usn(
            "uuid:00000000-0000-0000-0000-000000000001::urn:schemas-upnp-org:device:Basic:1",
        )
        .unwrap();
        assert_eq!(udn.as_str(), "uuid:00000000-0000-0000-0000-000000000001");

        let bare = udn_of_usn("uuid:00000000-0000-0000-0000-000000000001").unwrap();
        assert_eq!(bare.as_str(), "uuid:00000000-0000-0000-0000-000000000001");

        assert!(udn_of_usn("not-a-usn").is_none());
    }

    #[test]
    fn test_should_fetch_logic() {
        let known = Arc::new(Mutex::new(HashMap::new()));
        let udn = Udn::parse(
            "uuid:00000000-0000-0000-0000-000000000001",
            ValidationLevel::Strict,
        )
        .unwrap();
        let location = Url::parse("http://192.168.1.9:8080/description.xml").unwrap();

        // Inconnu : fetch.
        assert!(should_fetch(&known, &udn, &location, 1800));
        // Rafraîchissement identique : pas de fetch.
        assert!(!should_fetch(&known, &udn, &location, 1800));
        // max-age étendu : fetch.
        assert!(should_fetch(&known, &udn, &location, 3600));
        // Localisation changée : fetch.
        let moved = Url::parse("http://192.168.1.10:8080/description.xml").unwrap();
        assert!(should_fetch(&known, &udn, &moved, 3600));
    }

    #[tokio::test]
    async fn test_scan_before_init_is_not_started() {
        let cp = ControlPoint::new(ControlPointConfiguration::new());
        assert!(matches!(
            cp.scan("ssdp:all", 2).await,
            Err(UpnpError::NotStarted)
        ));
    }
}
