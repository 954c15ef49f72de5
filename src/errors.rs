//! Taxonomie d'erreurs du runtime.
//!
//! Chaque module porte son propre enum `thiserror` ; `UpnpError` agrège les
//! familles visibles à la frontière de la crate (orchestrateurs, API
//! publique). La politique de propagation est :
//!
//! - échec par message SSDP : avalé (UDP est avec perte par contrat) ;
//! - échec par connexion HTTP : la connexion est fermée, l'erreur remonte ;
//! - échec par abonnement : l'abonnement expire, le gestionnaire survit ;
//! - échec d'initialisation : retour complet à `Uninitialized`.

use thiserror::Error;

use crate::actions::ActionError;
use crate::description::DescriptionError;
use crate::http::HttpError;

/// Erreur agrégée du runtime UPnP.
#[derive(Debug, Error)]
pub enum UpnpError {
    /// Connexion refusée, réinitialisée ou tuyau cassé.
    #[error("socket failure: {0}")]
    Socket(String),

    /// Le pair est resté silencieux au-delà de la fenêtre configurée.
    #[error("operation timed out")]
    Timeout,

    /// Échec d'analyse HTTP/SOAP/SSDP.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// Description de device ou de service invalide.
    #[error(transparent)]
    Description(#[from] DescriptionError),

    /// Configuration vide, UDN dupliqué, chemin invalide…
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Échec de bind multicast.
    #[error("communications error: {0}")]
    CommunicationsError(String),

    #[error("already initialized")]
    AlreadyInitialized,

    #[error("not started")]
    NotStarted,

    /// Fault SOAP renvoyé par un device.
    #[error(transparent)]
    Action(#[from] ActionError),

    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    /// Un arrêt gracieux a interrompu l'appel.
    #[error("shutdown in progress")]
    ShutdownInProgress,

    /// Tout ce qui n'est pas classifié ailleurs.
    #[error("undefined failure: {0}")]
    UndefinedFailure(String),
}

/// Erreurs du gestionnaire d'abonnements (côté control point).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    /// Le service ne publie aucun événement.
    #[error("service is not evented")]
    NotEvented,

    /// Un abonnement actif existe déjà pour ce service.
    #[error("already subscribed")]
    AlreadySubscribed,

    /// L'URL de callback est absente ou inexploitable.
    #[error("bad callback URL")]
    BadCallback,

    /// SID inconnu ou en-têtes SUBSCRIBE incohérents.
    #[error("precondition failed")]
    PreconditionFailed,
}

impl From<HttpError> for UpnpError {
    fn from(e: HttpError) -> Self {
        match e {
            HttpError::Socket(s) => UpnpError::Socket(s),
            HttpError::Timeout(_) => UpnpError::Timeout,
            HttpError::ShutdownInProgress => UpnpError::ShutdownInProgress,
            HttpError::MalformedMessage(s) => UpnpError::MalformedMessage(s),
        }
    }
}
