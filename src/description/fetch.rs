//! Capacités de récupération des documents et des icônes.
//!
//! Le transport de récupération est un collaborateur externe : le runtime ne
//! dépend que de ces traits, et fournit une implémentation HTTP par défaut.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use url::Url;

use super::IconFetchError;
use crate::errors::UpnpError;
use crate::http::HttpClient;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Récupération d'un document de description ou de SCPD.
pub trait DescriptionFetcher: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<String, UpnpError>>;
}

/// Récupération des octets d'une icône.
pub trait IconFetcher: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<Vec<u8>, IconFetchError>>;
}

/// Fenêtre réseau d'une récupération de document.
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Implémentation HTTP par défaut des deux capacités.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: HttpClient,
}

impl HttpFetcher {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

impl DescriptionFetcher for HttpFetcher {
    fn fetch<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<String, UpnpError>> {
        Box::pin(async move {
            let response = self.http.get(url, FETCH_TIMEOUT).await?;
            if !response.is_success() {
                return Err(UpnpError::Description(
                    super::DescriptionError::device(
                        url.as_str(),
                        format!("HTTP {} fetching description", response.status),
                    ),
                ));
            }
            Ok(response.body_string())
        })
    }
}

impl IconFetcher for HttpFetcher {
    fn fetch<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<Vec<u8>, IconFetchError>> {
        Box::pin(async move {
            let response = self
                .http
                .get(url, FETCH_TIMEOUT)
                .await
                .map_err(|e| IconFetchError::FetchFailed(e.to_string()))?;

            match response.status {
                404 => Err(IconFetchError::NotFound),
                s if (200..300).contains(&s) => Ok(response.body),
                s => Err(IconFetchError::FetchFailed(format!("HTTP {}", s))),
            }
        })
    }
}
