use thiserror::Error;

/// Erreurs de conversion de valeurs de variables d'état.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("unknown UPnP data type: {0}")]
    UnknownType(String),

    #[error("value '{value}' is not a valid {type_name}")]
    InvalidValue { type_name: String, value: String },
}

impl ValueError {
    pub fn invalid(type_name: &str, value: &str) -> Self {
        ValueError::InvalidValue {
            type_name: type_name.to_string(),
            value: value.to_string(),
        }
    }
}
