use thiserror::Error;

/// Échec d'analyse ou de validation d'une description.
///
/// Chaque variante porte une raison lisible et un pointeur vers l'élément
/// fautif.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptionError {
    #[error("invalid device description ({element}): {reason}")]
    InvalidDeviceDescription { reason: String, element: String },

    #[error("invalid service description ({element}): {reason}")]
    InvalidServiceDescription { reason: String, element: String },
}

impl DescriptionError {
    pub fn device(element: &str, reason: impl Into<String>) -> Self {
        DescriptionError::InvalidDeviceDescription {
            reason: reason.into(),
            element: element.to_string(),
        }
    }

    pub fn service(element: &str, reason: impl Into<String>) -> Self {
        DescriptionError::InvalidServiceDescription {
            reason: reason.into(),
            element: element.to_string(),
        }
    }
}

/// Échec de récupération d'une icône. Non fatal : l'icône est abandonnée.
#[derive(Debug, Clone, Error)]
pub enum IconFetchError {
    #[error("icon not found")]
    NotFound,

    #[error("icon fetch failed: {0}")]
    FetchFailed(String),
}
