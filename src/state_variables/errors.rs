use thiserror::Error;

use crate::variable_types::ValueError;

/// Erreurs de validation et de mise à jour des variables d'état.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateVariableError {
    #[error(transparent)]
    Value(#[from] ValueError),

    #[error("variable '{variable}': value has type {got}, expected {expected}")]
    TypeMismatch {
        variable: String,
        expected: String,
        got: String,
    },

    #[error("variable '{variable}': value '{value}' is out of the allowed range")]
    OutOfRange { variable: String, value: String },

    #[error("variable '{variable}': value '{value}' is not in the allowed list")]
    NotAllowed { variable: String, value: String },
}
