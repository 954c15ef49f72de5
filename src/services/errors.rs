use thiserror::Error;

use crate::state_variables::StateVariableError;

/// Erreurs du modèle de service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("duplicate state variable '{0}'")]
    DuplicateVariable(String),

    #[error("duplicate action '{0}'")]
    DuplicateAction(String),

    #[error("action '{action}' references unknown state variable '{variable}'")]
    UnknownStateVariable { action: String, variable: String },

    #[error("unknown state variable '{0}'")]
    UnknownVariable(String),

    #[error("unknown action '{0}'")]
    UnknownAction(String),

    /// Le device parent a été retiré : le service est terminal.
    #[error("service is disposed")]
    Disposed,

    #[error(transparent)]
    Variable(#[from] StateVariableError),
}
