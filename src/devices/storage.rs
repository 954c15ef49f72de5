//! Stockage des arbres de root devices.
//!
//! Chaque arbre est indexé par l'UDN de sa racine, avec des index
//! secondaires par URL de localisation et par serviceId. L'insertion et le
//! retrait sont atomiques à la granularité d'une racine : les lecteurs voient
//! toujours un arbre cohérent.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use url::Url;

use super::{Device, DeviceError, VisitMode};
use crate::services::Service;
use crate::types::Udn;

struct StoredRoot {
    device: Arc<Device>,
    location: Url,
}

#[derive(Default)]
struct StorageInner {
    roots: HashMap<String, StoredRoot>,
    /// location URL → UDN racine
    by_location: HashMap<String, String>,
    /// serviceId complet → UDN racines qui le portent
    by_service: HashMap<String, Vec<String>>,
}

/// Ensemble des arbres de devices connus d'un orchestrateur.
#[derive(Default)]
pub struct DeviceStorage {
    inner: RwLock<StorageInner>,
}

impl DeviceStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insère un arbre racine.
    ///
    /// # Errors
    ///
    /// `DuplicateUdn` si une racine avec le même UDN est déjà stockée.
    pub fn insert_root(&self, device: Arc<Device>, location: Url) -> Result<(), DeviceError> {
        let udn = device.udn().as_str().to_string();
        let mut inner = self.inner.write().unwrap();

        if inner.roots.contains_key(&udn) {
            return Err(DeviceError::DuplicateUdn(udn));
        }

        for service in device.all_services() {
            inner
                .by_service
                .entry(service.id().to_string())
                .or_default()
                .push(udn.clone());
        }
        inner.by_location.insert(location.to_string(), udn.clone());
        inner.roots.insert(udn, StoredRoot { device, location });

        Ok(())
    }

    /// Retire un arbre racine et le retourne.
    ///
    /// Le retrait ne dispose pas l'arbre : c'est une décision de
    /// l'orchestrateur.
    pub fn remove_root(&self, udn: &Udn) -> Option<Arc<Device>> {
        let mut inner = self.inner.write().unwrap();
        let stored = inner.roots.remove(udn.as_str())?;

        inner.by_location.remove(&stored.location.to_string());
        for sids in inner.by_service.values_mut() {
            sids.retain(|u| u != udn.as_str());
        }
        inner.by_service.retain(|_, v| !v.is_empty());

        Some(stored.device)
    }

    /// Recherche un device (racine ou embarqué) par UDN.
    pub fn device_by_udn(&self, udn: &Udn) -> Option<Arc<Device>> {
        let inner = self.inner.read().unwrap();

        if let Some(stored) = inner.roots.get(udn.as_str()) {
            if stored.device.is_disposed() {
                return None;
            }
            return Some(stored.device.clone());
        }

        inner
            .roots
            .values()
            .find_map(|stored| stored.device.find_device(udn))
    }

    /// La racine publiée à cette URL de localisation.
    pub fn root_by_location(&self, location: &Url) -> Option<Arc<Device>> {
        let inner = self.inner.read().unwrap();
        let udn = inner.by_location.get(&location.to_string())?;
        inner.roots.get(udn).map(|s| s.device.clone())
    }

    /// L'URL de localisation d'une racine.
    pub fn location_of(&self, udn: &Udn) -> Option<Url> {
        let inner = self.inner.read().unwrap();
        inner.roots.get(udn.as_str()).map(|s| s.location.clone())
    }

    /// Premier service portant ce serviceId, toutes racines confondues.
    pub fn service_by_id(&self, service_id: &str) -> Option<Arc<Service>> {
        let inner = self.inner.read().unwrap();
        let udns = inner.by_service.get(service_id)?;
        for udn in udns {
            if let Some(stored) = inner.roots.get(udn) {
                for device in stored.device.embedded_devices(VisitMode::ThisRecursively) {
                    if let Some(service) = device.service_by_id(service_id) {
                        return Some(service);
                    }
                }
            }
        }
        None
    }

    /// Toutes les racines, dans un ordre quelconque.
    pub fn roots(&self) -> Vec<Arc<Device>> {
        self.inner
            .read()
            .unwrap()
            .roots
            .values()
            .map(|s| s.device.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Vide le stockage et retourne les racines retirées (pour disposal par
    /// l'appelant).
    pub fn drain(&self) -> Vec<Arc<Device>> {
        let mut inner = self.inner.write().unwrap();
        inner.by_location.clear();
        inner.by_service.clear();
        inner.roots.drain().map(|(_, s)| s.device).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::device_methods::test_support::device_with_children;
    use super::*;

    fn location(n: u16) -> Url {
        Url::parse(&format!("http://192.168.1.{}:8080/description.xml", n)).unwrap()
    }

    #[test]
    fn test_duplicate_root_udn_is_rejected() {
        let storage = DeviceStorage::new();
        let device = device_with_children(vec![]);

        storage.insert_root(device.clone(), location(1)).unwrap();
        let err = storage.insert_root(device, location(2)).unwrap_err();
        assert!(matches!(err, DeviceError::DuplicateUdn(_)));
    }

    #[test]
    fn test_lookup_by_udn_and_location() {
        let storage = DeviceStorage::new();
        let child = device_with_children(vec![]);
        let child_udn = child.udn().clone();
        let root = device_with_children(vec![child]);

        storage.insert_root(root.clone(), location(1)).unwrap();

        assert!(storage.device_by_udn(root.udn()).is_some());
        // Les devices embarqués sont trouvés eux aussi.
        assert!(storage.device_by_udn(&child_udn).is_some());
        assert!(storage.root_by_location(&location(1)).is_some());
        assert!(storage.root_by_location(&location(2)).is_none());
    }

    #[test]
    fn test_remove_cleans_indices() {
        let storage = DeviceStorage::new();
        let root = device_with_children(vec![]);
        let udn = root.udn().clone();

        storage.insert_root(root, location(1)).unwrap();
        assert_eq!(storage.len(), 1);

        let removed = storage.remove_root(&udn);
        assert!(removed.is_some());
        assert!(storage.is_empty());
        assert!(storage.root_by_location(&location(1)).is_none());
        // Un second retrait est sans effet.
        assert!(storage.remove_root(&udn).is_none());
    }

    #[test]
    fn test_disposed_root_is_invisible() {
        let storage = DeviceStorage::new();
        let root = device_with_children(vec![]);
        let udn = root.udn().clone();

        storage.insert_root(root.clone(), location(1)).unwrap();
        root.dispose();

        assert!(storage.device_by_udn(&udn).is_none());
    }
}
