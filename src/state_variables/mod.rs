mod errors;
mod instance_methods;
mod variable_methods;

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

pub use errors::StateVariableError;

use crate::value_ranges::{AllowedValueList, ValueRange};
use crate::variable_types::{Value, VarType};

/// Mode d'événementiel d'une variable d'état.
///
/// `Multicast` (UDA 1.1) est porté comme donnée : la diffusion multicast des
/// événements n'est pas implémentée, la variable est traitée comme `Yes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventingMode {
    No,
    #[default]
    Yes,
    Multicast,
}

/// Définition d'une variable d'état, telle que déclarée dans la table d'état
/// d'un SCPD.
#[derive(Debug, Clone)]
pub struct StateVariable {
    name: String,
    var_type: VarType,
    eventing: EventingMode,
    default_value: Option<Value>,
    allowed_values: Option<AllowedValueList>,
    range: Option<ValueRange>,
}

/// Variable d'état vivante : la définition plus la valeur courante.
///
/// La mutation hors exécution d'action passe uniquement par le chemin de mise
/// à jour du service propriétaire, qui déclenche le notifier d'événements si
/// la variable est événementielle.
#[derive(Debug)]
pub struct StateVarInstance {
    definition: Arc<StateVariable>,
    value: RwLock<Value>,
    last_modified: RwLock<DateTime<Utc>>,
}
