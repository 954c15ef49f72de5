//! Publication GENA côté device host.
//!
//! Chaque abonnement possède sa file de sortie et son worker de livraison :
//! les NOTIFY d'un abonnement partent en ordre SEQ strict, la contre-pression
//! s'applique par la file, et un débordement ou un échec de livraison expire
//! l'abonnement (pas de file de réessai). Le balayage périodique retire les
//! abonnements expirés ou non renouvelés.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::http::HeaderMap;
use axum::response::Response;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use super::{
    build_propertyset, next_seq, parse_timeout_header, DEFAULT_MAX_TIMEOUT, DEFAULT_MIN_TIMEOUT,
    NON_EVENTED_TIMEOUT, NOTIFY_QUEUE_DEPTH,
};
use crate::http::{notify_method, responses, HttpClient};
use crate::services::Service;

/// Timeout d'acquittement de la notification initiale.
const INITIAL_NOTIFY_TIMEOUT: Duration = Duration::from_secs(3);

/// Timeout d'acquittement des notifications suivantes.
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(30);

/// Période du balayage d'expiration.
const SWEEP_PERIOD: Duration = Duration::from_secs(30);

struct NotifyJob {
    seq: u32,
    body: String,
}

struct ServerSubscription {
    sid: String,
    callbacks: Vec<Url>,
    service_key: String,
    timeout_secs: AtomicU32,
    last_renewed: Mutex<Instant>,
    expired: AtomicBool,
    /// Prochain SEQ à attribuer ; 0 est réservé à la notification initiale.
    seq: AtomicU32,
    queue: mpsc::Sender<NotifyJob>,
}

impl ServerSubscription {
    fn take_next_seq(&self) -> u32 {
        // fetch_update retourne l'ancienne valeur : c'est le SEQ à émettre.
        self.seq
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| Some(next_seq(c)))
            .unwrap_or(0)
    }

    fn is_expired(&self, now: Instant) -> bool {
        if self.expired.load(Ordering::SeqCst) {
            return true;
        }
        let deadline = *self.last_renewed.lock().unwrap()
            + Duration::from_secs(u64::from(self.timeout_secs.load(Ordering::SeqCst)));
        now > deadline
    }

    fn enqueue(&self, body: String) {
        let job = NotifyJob {
            seq: self.take_next_seq(),
            body,
        };
        if self.queue.try_send(job).is_err() {
            // File pleine ou worker mort : l'abonnement expire.
            warn!("❌ Notify queue overflow for {}, expiring subscription", self.sid);
            self.expired.store(true, Ordering::SeqCst);
        }
    }
}

#[derive(Default)]
struct PublisherInner {
    by_sid: HashMap<String, Arc<ServerSubscription>>,
    /// clé de service → SIDs abonnés ; chaque SID apparaît dans exactement
    /// une liste.
    by_service: HashMap<String, Vec<String>>,
}

/// Gestionnaire des abonnements entrants d'un device host.
pub struct EventPublisher {
    http: HttpClient,
    inner: Arc<Mutex<PublisherInner>>,
    max_timeout: u32,
    shutdown: CancellationToken,
}

impl EventPublisher {
    pub fn new(http: HttpClient, shutdown: CancellationToken) -> Self {
        Self {
            http,
            inner: Arc::new(Mutex::new(PublisherInner::default())),
            max_timeout: DEFAULT_MAX_TIMEOUT,
            shutdown,
        }
    }

    /// Branche le flux de changements d'un service sur le notifier.
    pub fn attach_service(&self, service: &Arc<Service>) {
        if !service.is_evented() {
            return;
        }

        let mut rx = service.subscribe_changes();
        let inner = self.inner.clone();
        let service_key = service.key();
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            loop {
                let change = tokio::select! {
                    c = rx.recv() => c,
                    _ = shutdown.cancelled() => break,
                };

                match change {
                    Ok(change) => {
                        let body =
                            build_propertyset(&[(change.variable, change.value)]);
                        let subscribers = snapshot_subscribers(&inner, &service_key);
                        for subscription in subscribers {
                            subscription.enqueue(body.clone());
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("❌ Change stream lagged by {} on {}", missed, service_key);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    /// Démarre le balayage périodique des abonnements expirés.
    pub fn start_sweeper(&self) {
        let inner = self.inner.clone();
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_PERIOD);
            loop {
                tokio::select! {
                    _ = ticker.tick() => sweep(&inner),
                    _ = shutdown.cancelled() => break,
                }
            }
        });
    }

    /// Traite une requête SUBSCRIBE/UNSUBSCRIBE reçue sur l'URL
    /// d'événements d'un service.
    pub async fn handle_event_request(
        &self,
        service: Arc<Service>,
        method: &str,
        headers: &HeaderMap,
    ) -> Response {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim().to_string())
        };

        match method {
            "SUBSCRIBE" => {
                let sid = get("SID");
                let nt = get("NT");
                let callback = get("CALLBACK");
                let timeout = get("TIMEOUT");

                match sid {
                    None => self.subscribe(service, nt, callback, timeout).await,
                    Some(sid) => {
                        // Un renouvellement ne porte ni NT ni CALLBACK.
                        if nt.is_some() || callback.is_some() {
                            return responses::bad_request();
                        }
                        self.renew(&sid, timeout)
                    }
                }
            }
            "UNSUBSCRIBE" => match get("SID") {
                Some(sid) => self.unsubscribe(&sid),
                None => responses::precondition_failed(),
            },
            _ => responses::method_not_allowed(),
        }
    }

    async fn subscribe(
        &self,
        service: Arc<Service>,
        nt: Option<String>,
        callback: Option<String>,
        timeout: Option<String>,
    ) -> Response {
        if nt.as_deref() != Some("upnp:event") {
            return responses::precondition_failed();
        }

        let callbacks = callback
            .as_deref()
            .map(parse_callback_urls)
            .unwrap_or_default();
        if callbacks.is_empty() {
            return responses::precondition_failed();
        }

        // Les services sans variable événementielle sont acceptés : timeout
        // de 24 h, jamais notifiés.
        let granted = if service.is_evented() {
            self.clamp_timeout(timeout.as_deref())
        } else {
            NON_EVENTED_TIMEOUT
        };

        let sid = format!("uuid:{}", Uuid::new_v4());
        let (tx, rx) = mpsc::channel(NOTIFY_QUEUE_DEPTH);

        let subscription = Arc::new(ServerSubscription {
            sid: sid.clone(),
            callbacks,
            service_key: service.key(),
            timeout_secs: AtomicU32::new(granted),
            last_renewed: Mutex::new(Instant::now()),
            expired: AtomicBool::new(false),
            seq: AtomicU32::new(0),
            queue: tx,
        });

        {
            let mut inner = self.inner.lock().unwrap();
            inner.by_sid.insert(sid.clone(), subscription.clone());
            inner
                .by_service
                .entry(subscription.service_key.clone())
                .or_default()
                .push(sid.clone());
        }

        tokio::spawn(delivery_worker(
            self.http.clone(),
            subscription.clone(),
            rx,
        ));

        // Notification initiale : la valeur courante de chaque variable
        // événementielle, SEQ 0, après la réponse.
        let initial: Vec<(String, String)> = service
            .variables()
            .iter()
            .filter(|v| v.is_evented())
            .map(|v| (v.name().to_string(), v.value_string()))
            .collect();
        if !initial.is_empty() {
            subscription.enqueue(build_propertyset(&initial));
        }

        info!(
            "🔒 New subscription {} on {} (timeout {}s)",
            sid,
            service.short_id(),
            granted
        );

        responses::ok_with_headers(&[
            ("SID", sid),
            ("TIMEOUT", format!("Second-{}", granted)),
        ])
    }

    fn renew(&self, sid: &str, timeout: Option<String>) -> Response {
        let inner = self.inner.lock().unwrap();
        let Some(subscription) = inner.by_sid.get(sid) else {
            return responses::precondition_failed();
        };
        if subscription.expired.load(Ordering::SeqCst) {
            return responses::precondition_failed();
        }

        let granted = self.clamp_timeout(timeout.as_deref());
        subscription.timeout_secs.store(granted, Ordering::SeqCst);
        *subscription.last_renewed.lock().unwrap() = Instant::now();

        info!("♻️ Renewed subscription {} for {}s", sid, granted);

        responses::ok_with_headers(&[
            ("SID", sid.to_string()),
            ("TIMEOUT", format!("Second-{}", granted)),
        ])
    }

    fn unsubscribe(&self, sid: &str) -> Response {
        let mut inner = self.inner.lock().unwrap();
        let Some(subscription) = inner.by_sid.remove(sid) else {
            return responses::precondition_failed();
        };
        detach_from_service(&mut inner, &subscription);

        info!("❌ Unsubscribed {}", sid);
        responses::ok_with_headers(&[])
    }

    /// Retire tous les abonnements d'un service (destruction du device).
    pub fn remove_service_subscriptions(&self, service_key: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(sids) = inner.by_service.remove(service_key) {
            for sid in sids {
                inner.by_sid.remove(&sid);
            }
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.lock().unwrap().by_sid.len()
    }

    pub fn has_subscription(&self, sid: &str) -> bool {
        self.inner.lock().unwrap().by_sid.contains_key(sid)
    }

    fn clamp_timeout(&self, header: Option<&str>) -> u32 {
        let requested = header
            .and_then(parse_timeout_header)
            // Forme inconnue ou infinite : le maximum configuré.
            .unwrap_or(None);
        match requested {
            Some(secs) => secs.clamp(DEFAULT_MIN_TIMEOUT, self.max_timeout),
            None => self.max_timeout,
        }
    }
}

fn snapshot_subscribers(
    inner: &Mutex<PublisherInner>,
    service_key: &str,
) -> Vec<Arc<ServerSubscription>> {
    // Instantané sous verrou : l'itération (et les envois) se fait hors
    // verrou pour éviter toute invalidation et toute ré-entrance.
    let now = Instant::now();
    let inner = inner.lock().unwrap();
    inner
        .by_service
        .get(service_key)
        .map(|sids| {
            sids.iter()
                .filter_map(|sid| inner.by_sid.get(sid))
                // Un abonnement au-delà de son timeout ne reçoit plus rien,
                // même avant le passage du balayage.
                .filter(|s| !s.is_expired(now))
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

fn detach_from_service(inner: &mut PublisherInner, subscription: &ServerSubscription) {
    if let Some(sids) = inner.by_service.get_mut(&subscription.service_key) {
        sids.retain(|s| s != &subscription.sid);
        if sids.is_empty() {
            inner.by_service.remove(&subscription.service_key);
        }
    }
}

fn sweep(inner: &Mutex<PublisherInner>) {
    let now = Instant::now();
    let mut guard = inner.lock().unwrap();

    let stale: Vec<String> = guard
        .by_sid
        .values()
        .filter(|s| s.is_expired(now))
        .map(|s| s.sid.clone())
        .collect();

    for sid in stale {
        if let Some(subscription) = guard.by_sid.remove(&sid) {
            detach_from_service(&mut guard, &subscription);
            debug!("🧹 Swept expired subscription {}", sid);
        }
    }
}

/// Worker de livraison d'un abonnement : ordre SEQ strict, arrêt à la
/// première livraison impossible.
async fn delivery_worker(
    http: HttpClient,
    subscription: Arc<ServerSubscription>,
    mut rx: mpsc::Receiver<NotifyJob>,
) {
    while let Some(job) = rx.recv().await {
        if subscription.expired.load(Ordering::SeqCst) {
            break;
        }

        let timeout = if job.seq == 0 {
            // La notification initiale ne part qu'après la réponse SUBSCRIBE.
            tokio::time::sleep(Duration::from_millis(100)).await;
            INITIAL_NOTIFY_TIMEOUT
        } else {
            NOTIFY_TIMEOUT
        };

        let mut delivered = false;
        for callback in &subscription.callbacks {
            let result = http
                .request(
                    notify_method(),
                    callback,
                    &[
                        ("Content-Type", "text/xml; charset=\"utf-8\"".to_string()),
                        ("NT", "upnp:event".to_string()),
                        ("NTS", "upnp:propchange".to_string()),
                        ("SID", subscription.sid.clone()),
                        ("SEQ", job.seq.to_string()),
                    ],
                    Some(job.body.clone()),
                    timeout,
                )
                .await;

            match result {
                Ok(response) if response.is_success() => {
                    debug!(
                        "✅ NOTIFY SEQ={} delivered to {} ({})",
                        job.seq, callback, subscription.sid
                    );
                    delivered = true;
                    break;
                }
                Ok(response) => {
                    warn!(
                        "❌ NOTIFY SEQ={} to {} got HTTP {}",
                        job.seq, callback, response.status
                    );
                }
                Err(e) => {
                    warn!("❌ NOTIFY SEQ={} to {} failed: {}", job.seq, callback, e);
                }
            }
        }

        if !delivered {
            // Pas de file de réessai : l'abonnement expire et sera balayé.
            subscription.expired.store(true, Ordering::SeqCst);
            break;
        }
    }
}

fn parse_callback_urls(value: &str) -> Vec<Url> {
    let mut urls = Vec::new();
    let mut rest = value;
    while let Some(start) = rest.find('<') {
        let Some(end) = rest[start..].find('>') else {
            break;
        };
        let candidate = &rest[start + 1..start + end];
        match Url::parse(candidate) {
            Ok(url) if url.scheme() == "http" => urls.push(url),
            _ => warn!("❓ Unusable callback URL '{}'", candidate),
        }
        rest = &rest[start + end + 1..];
    }
    urls
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_callback_urls() {
        let urls = parse_callback_urls(
            "<http://192.168.1.3:3400/event-sink> <http://192.168.1.3:3401/alt>",
        );
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[0].port(), Some(3400));

        assert!(parse_callback_urls("no urls here").is_empty());
        assert!(parse_callback_urls("<ftp://bad.example/>").is_empty());
    }

    #[test]
    fn test_take_next_seq_starts_at_zero_and_wraps() {
        let (tx, _rx) = mpsc::channel(1);
        let sub = ServerSubscription {
            sid: "uuid:test".into(),
            callbacks: vec![],
            service_key: "k".into(),
            timeout_secs: AtomicU32::new(1800),
            last_renewed: Mutex::new(Instant::now()),
            expired: AtomicBool::new(false),
            seq: AtomicU32::new(0),
            queue: tx,
        };

        assert_eq!(sub.take_next_seq(), 0);
        assert_eq!(sub.take_next_seq(), 1);
        assert_eq!(sub.take_next_seq(), 2);

        sub.seq.store(u32::MAX, Ordering::SeqCst);
        assert_eq!(sub.take_next_seq(), u32::MAX);
        // Après 2³²−1, le suivant est 1 : jamais 0 à nouveau.
        assert_eq!(sub.take_next_seq(), 1);
    }

    #[test]
    fn test_expiry_by_timeout() {
        let (tx, _rx) = mpsc::channel(1);
        let sub = ServerSubscription {
            sid: "uuid:test".into(),
            callbacks: vec![],
            service_key: "k".into(),
            timeout_secs: AtomicU32::new(0),
            last_renewed: Mutex::new(Instant::now() - Duration::from_secs(5)),
            expired: AtomicBool::new(false),
            seq: AtomicU32::new(0),
            queue: tx,
        };
        assert!(sub.is_expired(Instant::now()));
    }
}
