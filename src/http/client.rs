//! Client HTTP du runtime.
//!
//! Enrobe `reqwest` avec la discipline UPnP : timeout « pas de données » par
//! appel, abandon rapide sur arrêt gracieux (≤ 500 ms), méthodes d'extension
//! GENA, et `Connection: close` quand le keep-alive est désactivé.

use std::collections::HashMap;
use std::time::Duration;

use once_cell::sync::Lazy;
use reqwest::Method;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::HttpError;
use crate::types::server_token;

static SUBSCRIBE: Lazy<Method> = Lazy::new(|| Method::from_bytes(b"SUBSCRIBE").unwrap());
static UNSUBSCRIBE: Lazy<Method> = Lazy::new(|| Method::from_bytes(b"UNSUBSCRIBE").unwrap());
static NOTIFY: Lazy<Method> = Lazy::new(|| Method::from_bytes(b"NOTIFY").unwrap());

/// Méthode GENA `SUBSCRIBE`.
pub fn subscribe_method() -> Method {
    SUBSCRIBE.clone()
}

/// Méthode GENA `UNSUBSCRIBE`.
pub fn unsubscribe_method() -> Method {
    UNSUBSCRIBE.clone()
}

/// Méthode GENA `NOTIFY`.
pub fn notify_method() -> Method {
    NOTIFY.clone()
}

/// Réponse aplatie : statut, en-têtes, corps.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Valeur d'en-tête, nom insensible à la casse.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(|s| s.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }
}

/// Client HTTP partagé d'un orchestrateur.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    shutdown: CancellationToken,
    keep_alive: bool,
}

impl HttpClient {
    /// Crée un client lié au drapeau d'arrêt de l'orchestrateur.
    pub fn new(shutdown: CancellationToken) -> Self {
        Self::with_keep_alive(shutdown, true)
    }

    pub fn with_keep_alive(shutdown: CancellationToken, keep_alive: bool) -> Self {
        let mut builder = reqwest::Client::builder().user_agent(server_token());
        if !keep_alive {
            builder = builder.pool_max_idle_per_host(0);
        }

        Self {
            // Le builder n'échoue que sur une configuration TLS invalide,
            // absente ici.
            inner: builder.build().unwrap_or_default(),
            shutdown,
            keep_alive,
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// GET simple (descriptions, SCPD, icônes).
    pub async fn get(&self, url: &Url, timeout: Duration) -> Result<HttpResponse, HttpError> {
        self.request(Method::GET, url, &[], None, timeout).await
    }

    /// Requête générique.
    ///
    /// # Errors
    ///
    /// - `Timeout` si le pair reste silencieux au-delà de `timeout` ;
    /// - `ShutdownInProgress` si le drapeau d'arrêt est levé pendant l'appel ;
    /// - `Socket` pour les échecs de connexion et de transport.
    pub async fn request(
        &self,
        method: Method,
        url: &Url,
        headers: &[(&str, String)],
        body: Option<String>,
        timeout: Duration,
    ) -> Result<HttpResponse, HttpError> {
        let mut request = self
            .inner
            .request(method, url.clone())
            .timeout(timeout)
            .header("Date", super::responses::http_date());

        if !self.keep_alive {
            request = request.header("Connection", "close");
        }
        for (name, value) in headers {
            request = request.header(*name, value);
        }
        if let Some(body) = body {
            request = request.body(body);
        }

        let send = async {
            let response = request.send().await.map_err(|e| classify(e, timeout))?;
            let status = response.status().as_u16();

            let mut headers = HashMap::new();
            for (name, value) in response.headers() {
                if let Ok(value) = value.to_str() {
                    headers.insert(name.as_str().to_ascii_lowercase(), value.to_string());
                }
            }

            let body = response.bytes().await.map_err(|e| classify(e, timeout))?.to_vec();
            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        };

        // L'arrêt gracieux doit interrompre les lectures en vol en moins de
        // 500 ms : l'annulation du token répond immédiatement.
        tokio::select! {
            result = send => result,
            _ = self.shutdown.cancelled() => Err(HttpError::ShutdownInProgress),
        }
    }
}

fn classify(e: reqwest::Error, timeout: Duration) -> HttpError {
    if e.is_timeout() {
        HttpError::Timeout(timeout)
    } else {
        HttpError::Socket(e.to_string())
    }
}
