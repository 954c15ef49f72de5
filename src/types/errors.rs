use thiserror::Error;

/// Erreurs d'analyse des identifiants UPnP.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    #[error("invalid resource type URN: {0}")]
    InvalidResourceType(String),

    #[error("invalid UDN: {0}")]
    InvalidUdn(String),
}
