mod errors;
mod service_methods;
mod update_methods;

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, RwLock, Weak};

use tokio::sync::broadcast;

pub use errors::ServiceError;

use crate::actions::{Action, ActionHandler};
use crate::devices::Device;
use crate::state_variables::StateVarInstance;
use crate::types::ResourceType;

/// Capacité du flux de changements d'état d'un service.
const CHANGE_STREAM_CAPACITY: usize = 64;

/// Les trois URL d'un service, relatives à la base du device.
#[derive(Debug, Clone)]
pub struct ServiceUrls {
    pub scpd: String,
    pub control: String,
    pub event_sub: String,
}

/// Changement de variable d'état, publié sur le flux du service.
#[derive(Debug, Clone)]
pub struct StateChange {
    pub variable: String,
    pub value: String,
}

/// Service UPnP : identité, signature (actions + table d'état) et état vivant.
///
/// Côté device host, les actions portent des [`ActionHandler`] et les mises à
/// jour de variables alimentent le flux de changements consommé par le
/// notifier GENA. Côté control point, le même type porte l'état observé du
/// service distant.
pub struct Service {
    /// serviceId complet (ex: `urn:upnp-org:serviceId:AVTransport`)
    id: String,

    service_type: ResourceType,

    urls: RwLock<ServiceUrls>,

    /// Actions, dans l'ordre de déclaration du SCPD
    actions: Vec<Arc<Action>>,
    action_index: HashMap<String, usize>,

    /// Entités invocables, installées côté host
    handlers: RwLock<HashMap<String, ActionHandler>>,

    variables: Vec<Arc<StateVarInstance>>,
    variable_index: HashMap<String, usize>,

    /// Device parent : relation + lookup, jamais une possession
    parent: RwLock<Weak<Device>>,

    /// Verrou du chemin de mise à jour des variables
    update_lock: Mutex<()>,

    changes: broadcast::Sender<StateChange>,

    disposed: AtomicBool,
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("id", &self.id)
            .field("service_type", &self.service_type.to_string())
            .field("actions", &self.actions.len())
            .field("variables", &self.variables.len())
            .finish()
    }
}
