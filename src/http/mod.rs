//! Messagerie HTTP du runtime.
//!
//! Le transport TCP lui-même est porté par axum (serveur) et reqwest
//! (client) ; ce module fournit la grammaire et la discipline UPnP
//! au-dessus :
//!
//! - [`HttpHeader`] : analyse des messages « HTTP/1.1-like » bruts (datagrammes
//!   SSDP, tests GENA), en-têtes insensibles à la casse, inférence keep-alive,
//!   framing `Content-Length` / `chunked` ;
//! - [`responses`] : réponses types (200…503 et les codes fault UPnP
//!   600–605, 608) avec `DATE` et `SERVER` injectés ;
//! - [`HttpClient`] : timeouts « pas de données » par appel, abandon ≤ 500 ms
//!   sur arrêt, méthodes d'extension `SUBSCRIBE`/`UNSUBSCRIBE`/`NOTIFY`.

mod client;
mod header;
pub mod responses;
mod server;

use std::time::Duration;

use thiserror::Error;

pub use client::{notify_method, subscribe_method, unsubscribe_method, HttpClient, HttpResponse};
pub use header::{decode_chunked, encode_chunked, parse_message, HttpHeader};
pub use server::HttpServer;

/// Erreurs de la couche de messagerie.
#[derive(Debug, Clone, Error)]
pub enum HttpError {
    /// Connexion refusée, réinitialisée ou tuyau cassé.
    #[error("socket failure: {0}")]
    Socket(String),

    /// Aucune donnée dans la fenêtre impartie.
    #[error("no data within {0:?}")]
    Timeout(Duration),

    /// Le drapeau d'arrêt partagé a interrompu l'attente.
    #[error("shutdown in progress")]
    ShutdownInProgress,

    #[error("malformed message: {0}")]
    MalformedMessage(String),
}
