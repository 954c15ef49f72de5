use thiserror::Error;

/// Erreurs du modèle de devices et de son stockage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("a root device with UDN {0} is already stored")]
    DuplicateUdn(String),

    #[error("device {0} not found")]
    NotFound(String),

    /// Le device a été retiré : opérations sans effet.
    #[error("device is disposed")]
    Disposed,
}
