//! Configuration du control point.

use serde::{Deserialize, Serialize};

/// Configuration d'un control point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlPointConfiguration {
    /// Timeout demandé lors des SUBSCRIBE (secondes).
    #[serde(default = "default_subscription_timeout")]
    pub subscription_timeout_hint: u32,

    /// Découverte automatique : M-SEARCH périodique `ssdp:all`.
    #[serde(default = "default_true")]
    pub auto_discovery: bool,

    /// Période du balayage de découverte automatique (secondes).
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,

    /// Nombre de constructions de devices menées en parallèle.
    #[serde(default = "default_build_parallelism")]
    pub device_build_parallelism: usize,

    /// Port du serveur HTTP de callbacks ; `0` pour un port éphémère.
    #[serde(default)]
    pub http_port: u16,

    /// IP locale annoncée dans les URL de callback ; détectée si absente.
    #[serde(default)]
    pub host_ip: Option<String>,
}

impl Default for ControlPointConfiguration {
    fn default() -> Self {
        Self {
            subscription_timeout_hint: default_subscription_timeout(),
            auto_discovery: true,
            scan_interval_secs: default_scan_interval(),
            device_build_parallelism: default_build_parallelism(),
            http_port: 0,
            host_ip: None,
        }
    }
}

impl ControlPointConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without_auto_discovery(mut self) -> Self {
        self.auto_discovery = false;
        self
    }
}

fn default_subscription_timeout() -> u32 {
    1800
}

fn default_true() -> bool {
    true
}

fn default_scan_interval() -> u64 {
    60
}

fn default_build_parallelism() -> usize {
    4
}
