//! Gestionnaire d'abonnements GENA côté control point.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::{next_seq, parse_timeout_header, parse_propertyset};
use crate::devices::{Device, VisitMode};
use crate::errors::{SubscriptionError, UpnpError};
use crate::http::{subscribe_method, unsubscribe_method, HttpClient};
use crate::services::Service;

/// Fenêtre réseau d'un SUBSCRIBE/UNSUBSCRIBE.
const SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(10);

/// État d'un abonnement côté control point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubscriptionStatus {
    #[default]
    Unsubscribed,
    Subscribing,
    Subscribed,
    Unsubscribing,
}

/// Événements émis par le gestionnaire.
#[derive(Debug, Clone)]
pub enum SubscriptionEvent {
    Established { service_key: String, sid: String },
    Failed { service_key: String, reason: String },
}

struct ClientSubscription {
    id: String,
    service: Weak<Service>,
    service_key: String,
    event_url: Url,
    delivery_url: Url,
    requested_timeout: u32,
    granted_timeout: u32,
    sid: Option<String>,
    last_seq: Option<u32>,
    status: SubscriptionStatus,
    renew_cancel: Option<CancellationToken>,
}

#[derive(Default)]
struct ManagerInner {
    by_sid: HashMap<String, Arc<Mutex<ClientSubscription>>>,
    by_service: HashMap<String, Arc<Mutex<ClientSubscription>>>,
    by_udn: HashMap<String, Vec<String>>,
}

/// Gestionnaire des abonnements sortants d'un control point.
///
/// Les abonnements sont indexés par SID et par device (`udn → [sub]`). Le
/// renouvellement est planifié à la moitié du timeout accordé ; un échec est
/// réessayé une fois immédiatement, puis l'abonnement retombe à
/// `Unsubscribed` et `subscriptionFailed` est émis.
pub struct EventSubscriptionManager {
    http: HttpClient,
    inner: Arc<Mutex<ManagerInner>>,
    events: broadcast::Sender<SubscriptionEvent>,
    callback_roots: RwLock<Vec<Url>>,
    shutdown: CancellationToken,
}

impl EventSubscriptionManager {
    pub fn new(http: HttpClient, shutdown: CancellationToken) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            http,
            inner: Arc::new(Mutex::new(ManagerInner::default())),
            events,
            callback_roots: RwLock::new(Vec::new()),
            shutdown,
        }
    }

    /// Déclare les racines du serveur HTTP local qui reçoivent les NOTIFY.
    pub fn set_callback_roots(&self, roots: Vec<Url>) {
        *self.callback_roots.write().unwrap() = roots;
    }

    /// Flux des événements d'abonnement.
    pub fn subscribe_events(&self) -> broadcast::Receiver<SubscriptionEvent> {
        self.events.subscribe()
    }

    /// Souscrit aux événements d'un service distant.
    ///
    /// # Errors
    ///
    /// - `SubscriptionError::NotEvented` si le service ne publie rien ;
    /// - `SubscriptionError::AlreadySubscribed` si un abonnement actif
    ///   existe ; un abonnement présent mais retombé est réémis ;
    /// - `SubscriptionError::BadCallback` si aucune racine de callback n'est
    ///   déclarée ;
    /// - les erreurs de transport sinon.
    pub async fn subscribe(
        &self,
        service: &Arc<Service>,
        timeout_secs: u32,
    ) -> Result<String, UpnpError> {
        if !service.is_evented() {
            return Err(SubscriptionError::NotEvented.into());
        }

        let device = service
            .device()
            .ok_or_else(|| UpnpError::UndefinedFailure("service without device".into()))?;

        let event_url = resolve_service_url(&device, &service.event_sub_url())?;
        let delivery_url = self
            .choose_delivery_url(&event_url)
            .ok_or(SubscriptionError::BadCallback)?;

        let service_key = service.key();
        let record = {
            let mut inner = self.inner.lock().unwrap();
            match inner.by_service.get(&service_key) {
                Some(existing) => {
                    let mut sub = existing.lock().unwrap();
                    match sub.status {
                        SubscriptionStatus::Subscribed => {
                            return Err(SubscriptionError::AlreadySubscribed.into());
                        }
                        // Présent mais pas abonné : on réémet avec le même
                        // enregistrement, URLs rafraîchies.
                        _ => {
                            sub.status = SubscriptionStatus::Subscribing;
                            sub.event_url = event_url.clone();
                            sub.delivery_url = delivery_url.clone();
                            sub.requested_timeout = timeout_secs;
                        }
                    }
                    existing.clone()
                }
                None => {
                    let id = format!("sub:{}", uuid::Uuid::new_v4());
                    debug!("🔖 New subscription record {} for {}", id, service_key);
                    let record = Arc::new(Mutex::new(ClientSubscription {
                        id,
                        service: Arc::downgrade(service),
                        service_key: service_key.clone(),
                        event_url: event_url.clone(),
                        delivery_url: delivery_url.clone(),
                        requested_timeout: timeout_secs,
                        granted_timeout: 0,
                        sid: None,
                        last_seq: None,
                        status: SubscriptionStatus::Subscribing,
                        renew_cancel: None,
                    }));
                    inner.by_service.insert(service_key.clone(), record.clone());
                    inner
                        .by_udn
                        .entry(device.udn().as_str().to_string())
                        .or_default()
                        .push(service_key.clone());
                    record
                }
            }
        };

        let (target, callback) = {
            let sub = record.lock().unwrap();
            (sub.event_url.clone(), sub.delivery_url.clone())
        };

        match self.send_subscribe(&target, &callback, timeout_secs).await {
            Ok((sid, granted)) => {
                {
                    let mut sub = record.lock().unwrap();
                    sub.sid = Some(sid.clone());
                    sub.granted_timeout = granted;
                    sub.last_seq = None;
                    sub.status = SubscriptionStatus::Subscribed;
                }
                self.inner
                    .lock()
                    .unwrap()
                    .by_sid
                    .insert(sid.clone(), record.clone());

                self.spawn_renewal(record.clone(), granted);

                info!("🔒 Subscribed to {} (SID={}, {}s)", service_key, sid, granted);
                let _ = self.events.send(SubscriptionEvent::Established {
                    service_key,
                    sid: sid.clone(),
                });
                Ok(sid)
            }
            Err(e) => {
                record.lock().unwrap().status = SubscriptionStatus::Unsubscribed;
                Err(e)
            }
        }
    }

    /// L'état de l'abonnement tenu pour ce service.
    pub fn subscription_status(&self, service: &Arc<Service>) -> SubscriptionStatus {
        self.inner
            .lock()
            .unwrap()
            .by_service
            .get(&service.key())
            .map(|r| r.lock().unwrap().status)
            .unwrap_or(SubscriptionStatus::Unsubscribed)
    }

    /// Résilie l'abonnement d'un service.
    pub async fn unsubscribe(&self, service: &Arc<Service>) -> Result<(), UpnpError> {
        let record = self
            .inner
            .lock()
            .unwrap()
            .by_service
            .get(&service.key())
            .cloned();

        let Some(record) = record else {
            return Err(SubscriptionError::PreconditionFailed.into());
        };

        let (sid, event_url) = {
            let mut sub = record.lock().unwrap();
            if sub.status != SubscriptionStatus::Subscribed {
                return Err(SubscriptionError::PreconditionFailed.into());
            }
            sub.status = SubscriptionStatus::Unsubscribing;
            if let Some(cancel) = sub.renew_cancel.take() {
                cancel.cancel();
            }
            (sub.sid.clone(), sub.event_url.clone())
        };

        if let Some(sid) = &sid {
            let result = self
                .http
                .request(
                    unsubscribe_method(),
                    &event_url,
                    &[("SID", sid.clone())],
                    None,
                    SUBSCRIBE_TIMEOUT,
                )
                .await;
            if let Err(e) = result {
                warn!("❌ UNSUBSCRIBE {} failed: {}", sid, e);
            }
        }

        self.mark_unsubscribed(&record);
        Ok(())
    }

    /// Parcourt un sous-arbre et résilie ses abonnements.
    ///
    /// `send_unsubscribe = false` quand le device distant a déjà disparu :
    /// seul l'état local retombe à `Unsubscribed`.
    pub async fn cancel(
        &self,
        device: &Arc<Device>,
        mode: VisitMode,
        send_unsubscribe: bool,
    ) {
        for node in device.embedded_devices(mode) {
            for service in node.services() {
                let record = self
                    .inner
                    .lock()
                    .unwrap()
                    .by_service
                    .get(&service.key())
                    .cloned();
                let Some(record) = record else { continue };

                if send_unsubscribe {
                    let (sid, event_url, subscribed) = {
                        let sub = record.lock().unwrap();
                        (
                            sub.sid.clone(),
                            sub.event_url.clone(),
                            sub.status == SubscriptionStatus::Subscribed,
                        )
                    };
                    if let (Some(sid), true) = (sid, subscribed) {
                        let _ = self
                            .http
                            .request(
                                unsubscribe_method(),
                                &event_url,
                                &[("SID", sid)],
                                None,
                                SUBSCRIBE_TIMEOUT,
                            )
                            .await;
                    }
                }

                self.mark_unsubscribed(&record);
            }
        }
    }

    /// Comme [`cancel`](Self::cancel), mais supprime aussi les
    /// enregistrements locaux.
    pub async fn remove(&self, device: &Arc<Device>, mode: VisitMode, send_unsubscribe: bool) {
        self.cancel(device, mode, send_unsubscribe).await;

        let mut inner = self.inner.lock().unwrap();
        for node in device.embedded_devices(mode) {
            let udn = node.udn().as_str().to_string();
            if let Some(keys) = inner.by_udn.remove(&udn) {
                for key in keys {
                    inner.by_service.remove(&key);
                }
            }
        }
    }

    /// Traite un NOTIFY entrant.
    ///
    /// # Returns
    ///
    /// Le statut HTTP à renvoyer : 200, 400 (corps inanalysable) ou 412 (SID
    /// inconnu).
    pub fn on_notify(&self, sid: Option<&str>, seq: Option<&str>, body: &[u8]) -> u16 {
        let Some(sid) = sid else {
            return 412;
        };
        let record = self.inner.lock().unwrap().by_sid.get(sid).cloned();
        let Some(record) = record else {
            debug!("❓ NOTIFY with unknown SID {}", sid);
            return 412;
        };

        let seq_value: Option<u32> = seq.and_then(|s| s.trim().parse().ok());

        {
            let mut sub = record.lock().unwrap();

            match (sub.last_seq, seq_value) {
                // SEQ absent : l'attente retombe à 0.
                (_, None) => sub.last_seq = Some(0),
                (None, Some(s)) => sub.last_seq = Some(s),
                (Some(last), Some(s)) => {
                    let expected = next_seq(last);
                    if s == expected {
                        sub.last_seq = Some(s);
                    } else if s <= last && last != u32::MAX {
                        // Duplicata ou réordonnancement : ignoré.
                        debug!("❓ NOTIFY SEQ={} after {} on {}, dropped", s, last, sid);
                        return 200;
                    } else {
                        warn!(
                            "❓ NOTIFY SEQ gap on {}: expected {}, got {} — resyncing",
                            sid, expected, s
                        );
                        sub.last_seq = Some(s);
                    }
                }
            }
        }

        let pairs = match parse_propertyset(body) {
            Ok(pairs) => pairs,
            Err(e) => {
                warn!("❌ Unparseable NOTIFY body on {}: {}", sid, e);
                return 400;
            }
        };

        if let Some(service) = record.lock().unwrap().service.upgrade() {
            service.apply_remote_values(&pairs);
        }

        200
    }

    fn mark_unsubscribed(&self, record: &Arc<Mutex<ClientSubscription>>) {
        // Verrou d'enregistrement relâché avant de prendre celui des index.
        let sid = {
            let mut sub = record.lock().unwrap();
            if let Some(cancel) = sub.renew_cancel.take() {
                cancel.cancel();
            }
            sub.last_seq = None;
            sub.status = SubscriptionStatus::Unsubscribed;
            sub.sid.take()
        };
        if let Some(sid) = sid {
            self.inner.lock().unwrap().by_sid.remove(&sid);
        }
    }

    async fn send_subscribe(
        &self,
        event_url: &Url,
        delivery_url: &Url,
        timeout_secs: u32,
    ) -> Result<(String, u32), UpnpError> {
        let response = self
            .http
            .request(
                subscribe_method(),
                event_url,
                &[
                    ("NT", "upnp:event".to_string()),
                    ("CALLBACK", format!("<{}>", delivery_url)),
                    ("TIMEOUT", format!("Second-{}", timeout_secs)),
                ],
                None,
                SUBSCRIBE_TIMEOUT,
            )
            .await?;

        if !response.is_success() {
            return Err(SubscriptionError::PreconditionFailed.into());
        }

        let sid = response
            .header("sid")
            .map(|s| s.to_string())
            .ok_or_else(|| UpnpError::MalformedMessage("SUBSCRIBE response without SID".into()))?;

        let granted = response
            .header("timeout")
            .and_then(parse_timeout_header)
            .map(|t| t.unwrap_or(timeout_secs))
            .unwrap_or(timeout_secs);

        Ok((sid, granted))
    }

    /// Planifie le renouvellement à la moitié du timeout accordé.
    fn spawn_renewal(&self, record: Arc<Mutex<ClientSubscription>>, granted: u32) {
        let cancel = self.shutdown.child_token();
        record.lock().unwrap().renew_cancel = Some(cancel.clone());

        let manager_inner = self.inner.clone();
        let events = self.events.clone();
        let http = self.http.clone();
        let this = ManagerHandle {
            http,
            inner: manager_inner,
            events,
        };

        tokio::spawn(async move {
            let mut wait = Duration::from_secs(u64::from(granted / 2).max(1));
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = cancel.cancelled() => return,
                }

                let (event_url, sid, requested, service_key, record_id) = {
                    let sub = record.lock().unwrap();
                    if sub.status != SubscriptionStatus::Subscribed {
                        return;
                    }
                    let Some(sid) = sub.sid.clone() else { return };
                    (
                        sub.event_url.clone(),
                        sid,
                        sub.requested_timeout,
                        sub.service_key.clone(),
                        sub.id.clone(),
                    )
                };

                let mut granted = this.renew(&event_url, &sid, requested).await;
                if granted.is_err() {
                    // Un échec de renouvellement est réessayé une fois,
                    // immédiatement.
                    granted = this.renew(&event_url, &sid, requested).await;
                }

                match granted {
                    Ok(secs) => {
                        record.lock().unwrap().granted_timeout = secs;
                        wait = Duration::from_secs(u64::from(secs / 2).max(1));
                        debug!("♻️ Renewed {} for {}s", sid, secs);
                    }
                    Err(e) => {
                        warn!("❌ Renewal of {} ({}) failed twice: {}", sid, record_id, e);
                        {
                            let mut sub = record.lock().unwrap();
                            sub.status = SubscriptionStatus::Unsubscribed;
                            sub.sid = None;
                            sub.last_seq = None;
                        }
                        this.inner.lock().unwrap().by_sid.remove(&sid);
                        let _ = this.events.send(SubscriptionEvent::Failed {
                            service_key,
                            reason: e.to_string(),
                        });
                        return;
                    }
                }
            }
        });
    }

    /// Choisit la racine de callback sur le même sous-réseau que le device,
    /// sinon la première.
    fn choose_delivery_url(&self, device_url: &Url) -> Option<Url> {
        let roots = self.callback_roots.read().unwrap();
        if roots.is_empty() {
            return None;
        }

        let chosen = device_url
            .host_str()
            .and_then(|device_host| {
                roots
                    .iter()
                    .find(|root| {
                        root.host_str()
                            .map(|h| same_subnet(h, device_host))
                            .unwrap_or(false)
                    })
                    .cloned()
            })
            .unwrap_or_else(|| roots[0].clone());

        chosen.join("event-sink").ok()
    }
}

/// Poignée réduite utilisée par les tâches de renouvellement.
struct ManagerHandle {
    http: HttpClient,
    inner: Arc<Mutex<ManagerInner>>,
    events: broadcast::Sender<SubscriptionEvent>,
}

impl ManagerHandle {
    async fn renew(&self, event_url: &Url, sid: &str, timeout_secs: u32) -> Result<u32, UpnpError> {
        let response = self
            .http
            .request(
                subscribe_method(),
                event_url,
                &[
                    ("SID", sid.to_string()),
                    ("TIMEOUT", format!("Second-{}", timeout_secs)),
                ],
                None,
                SUBSCRIBE_TIMEOUT,
            )
            .await?;

        if !response.is_success() {
            return Err(SubscriptionError::PreconditionFailed.into());
        }

        Ok(response
            .header("timeout")
            .and_then(parse_timeout_header)
            .map(|t| t.unwrap_or(timeout_secs))
            .unwrap_or(timeout_secs))
    }
}

fn resolve_service_url(device: &Arc<Device>, url: &str) -> Result<Url, UpnpError> {
    match Url::parse(url) {
        Ok(absolute) => Ok(absolute),
        Err(_) => device
            .base_url()
            .join(url)
            .map_err(|e| UpnpError::MalformedMessage(format!("bad service URL '{}': {}", url, e))),
    }
}

/// Heuristique de sous-réseau : mêmes trois premiers octets IPv4.
fn same_subnet(a: &str, b: &str) -> bool {
    let prefix = |host: &str| -> Option<[u8; 3]> {
        let ip: std::net::Ipv4Addr = host.parse().ok()?;
        let o = ip.octets();
        Some([o[0], o[1], o[2]])
    };
    match (prefix(a), prefix(b)) {
        (Some(a), Some(b)) => a == b,
        _ => a == b,
    }
}
