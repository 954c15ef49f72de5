//! Configuration du device host.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::services::{Service, ServiceError};
use crate::ssdp::{clamp_advertisement_count, clamp_max_age, DEFAULT_MAX_AGE};

/// Source du document de description d'un device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DescriptionSource {
    /// Chemin vers un fichier XML.
    File(PathBuf),
    /// Document XML en mémoire.
    Inline(String),
}

/// Capacité de peuplement d'un device : appelée pour chaque service après le
/// montage de l'arbre, typiquement pour installer les entités invocables des
/// actions.
pub trait DeviceCreator: Send + Sync {
    fn setup_service(&self, service: &Arc<Service>) -> Result<(), ServiceError>;
}

/// Hook utilisateur exécuté en fin d'initialisation ; un échec déroule tout.
pub type HostHook = Arc<dyn Fn() -> Result<(), String> + Send + Sync>;

/// Configuration d'un device publié.
#[derive(Clone, Serialize, Deserialize)]
pub struct DeviceConfiguration {
    pub description: DescriptionSource,

    /// SCPD en mémoire, indexés par le `SCPDURL` écrit dans la description.
    /// Requis avec `DescriptionSource::Inline` ; avec `File`, les SCPD
    /// absents d'ici sont lus à côté du fichier de description.
    #[serde(default)]
    pub scpd_documents: Vec<(String, String)>,

    /// `CACHE-CONTROL: max-age` des annonces, borné à `[5, 86400]`.
    #[serde(default = "default_max_age")]
    pub cache_control_max_age: u32,

    /// Capacité de peuplement, fournie par l'application.
    #[serde(skip)]
    pub device_creator: Option<Arc<dyn DeviceCreator>>,
}

impl std::fmt::Debug for DeviceConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceConfiguration")
            .field("description", &self.description)
            .field("cache_control_max_age", &self.cache_control_max_age)
            .field("device_creator", &self.device_creator.is_some())
            .finish()
    }
}

impl DeviceConfiguration {
    pub fn new(description: DescriptionSource) -> Self {
        Self {
            description,
            scpd_documents: Vec::new(),
            cache_control_max_age: DEFAULT_MAX_AGE,
            device_creator: None,
        }
    }

    /// Ajoute un SCPD en mémoire, indexé par son `SCPDURL`.
    pub fn with_scpd(mut self, scpd_url: &str, xml: &str) -> Self {
        self.scpd_documents
            .push((scpd_url.to_string(), xml.to_string()));
        self
    }

    pub fn with_max_age(mut self, secs: u32) -> Self {
        self.cache_control_max_age = clamp_max_age(secs);
        self
    }

    pub fn with_creator(mut self, creator: Arc<dyn DeviceCreator>) -> Self {
        self.device_creator = Some(creator);
        self
    }
}

/// Configuration du device host.
#[derive(Clone, Serialize, Deserialize)]
pub struct DeviceHostConfiguration {
    pub devices: Vec<DeviceConfiguration>,

    /// Nombre d'annonces initiales par créneau, borné à `[1, 5]`.
    #[serde(default = "default_advertisement_count")]
    pub individual_advertisement_count: u32,

    /// Port du serveur HTTP ; `0` pour un port éphémère.
    #[serde(default)]
    pub http_port: u16,

    /// IP annoncée dans les URL de localisation ; détectée si absente.
    #[serde(default)]
    pub host_ip: Option<String>,

    #[serde(skip)]
    pub on_init: Option<HostHook>,
}

impl std::fmt::Debug for DeviceHostConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHostConfiguration")
            .field("devices", &self.devices)
            .field(
                "individual_advertisement_count",
                &self.individual_advertisement_count,
            )
            .field("http_port", &self.http_port)
            .field("host_ip", &self.host_ip)
            .finish()
    }
}

impl Default for DeviceHostConfiguration {
    fn default() -> Self {
        Self {
            devices: Vec::new(),
            individual_advertisement_count: default_advertisement_count(),
            http_port: 0,
            host_ip: None,
            on_init: None,
        }
    }
}

impl DeviceHostConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_device(mut self, device: DeviceConfiguration) -> Self {
        self.devices.push(device);
        self
    }

    pub fn with_advertisement_count(mut self, count: u32) -> Self {
        self.individual_advertisement_count = clamp_advertisement_count(count);
        self
    }

    pub fn with_http_port(mut self, port: u16) -> Self {
        self.http_port = port;
        self
    }
}

fn default_max_age() -> u32 {
    DEFAULT_MAX_AGE
}

fn default_advertisement_count() -> u32 {
    2
}
