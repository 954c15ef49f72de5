mod device_methods;
mod errors;
mod storage;

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, RwLock, Weak};

use url::Url;

pub use errors::DeviceError;
pub use storage::DeviceStorage;

use crate::services::Service;
use crate::types::{ResourceType, Udn};

/// Mode de parcours d'un sous-arbre de devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitMode {
    ThisOnly,
    ThisAndDirectChildren,
    ThisRecursively,
}

/// Attributs descriptifs immuables d'un device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub device_type: ResourceType,
    pub friendly_name: String,
    pub manufacturer: String,
    pub manufacturer_url: Option<String>,
    pub model_description: Option<String>,
    pub model_name: String,
    pub model_number: Option<String>,
    pub model_url: Option<String>,
    pub serial_number: Option<String>,
    pub upc: Option<String>,
    pub presentation_url: Option<String>,
}

/// Icône déclarée dans la description d'un device.
///
/// `data` n'est rempli que si un `IconFetcher` a été fourni et a réussi.
#[derive(Debug, Clone)]
pub struct Icon {
    pub mimetype: String,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub url: String,
    pub data: Option<Vec<u8>>,
}

/// Nœud de l'arbre de devices.
///
/// Les références parent sont des `Weak` : relation + lookup, jamais un cycle
/// de possession. L'arbre est construit de bas en haut par le parseur de
/// descriptions puis rendu visible atomiquement via [`DeviceStorage`].
pub struct Device {
    udn: Udn,
    info: DeviceInfo,
    icons: Vec<Icon>,

    /// URL de base contre laquelle les URL relatives ont été résolues
    base_url: Url,

    services: Vec<Arc<Service>>,
    embedded: Vec<Arc<Device>>,
    parent: RwLock<Weak<Device>>,

    disposed: AtomicBool,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("udn", &self.udn.as_str())
            .field("device_type", &self.info.device_type.to_string())
            .field("friendly_name", &self.info.friendly_name)
            .field("services", &self.services.len())
            .field("embedded", &self.embedded.len())
            .finish()
    }
}
