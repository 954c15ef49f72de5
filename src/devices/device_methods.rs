//! Construction et parcours de l'arbre de devices.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, Weak};

use url::Url;

use super::{Device, DeviceInfo, Icon, VisitMode};
use crate::services::Service;
use crate::types::{ResourceType, Udn};

impl Device {
    /// Assemble un nœud et câble les liens parent de ses services et de ses
    /// sous-devices.
    ///
    /// Les enfants sont construits d'abord (montage de bas en haut) ; cette
    /// méthode pose ensuite les back-références `Weak` vers le nouveau nœud.
    pub fn assemble(
        udn: Udn,
        info: DeviceInfo,
        icons: Vec<Icon>,
        base_url: Url,
        services: Vec<Arc<Service>>,
        embedded: Vec<Arc<Device>>,
    ) -> Arc<Self> {
        let device = Arc::new(Self {
            udn,
            info,
            icons,
            base_url,
            services,
            embedded,
            parent: RwLock::new(Weak::new()),
            disposed: AtomicBool::new(false),
        });

        for service in &device.services {
            service.set_parent(&device);
        }
        for child in &device.embedded {
            *child.parent.write().unwrap() = Arc::downgrade(&device);
        }

        device
    }

    pub fn udn(&self) -> &Udn {
        &self.udn
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn device_type(&self) -> &ResourceType {
        &self.info.device_type
    }

    pub fn friendly_name(&self) -> &str {
        &self.info.friendly_name
    }

    pub fn icons(&self) -> &[Icon] {
        &self.icons
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn parent(&self) -> Option<Arc<Device>> {
        self.parent.read().unwrap().upgrade()
    }

    /// Vrai si ce device est la racine de son arbre.
    pub fn is_root(&self) -> bool {
        self.parent().is_none()
    }

    /// La racine de l'arbre auquel ce device appartient.
    pub fn root(self: &Arc<Self>) -> Arc<Device> {
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    pub fn services(&self) -> &[Arc<Service>] {
        &self.services
    }

    /// Les sous-devices directs.
    pub fn embedded(&self) -> &[Arc<Device>] {
        &self.embedded
    }

    /// Service de ce device par serviceId (complet ou segment final).
    pub fn service_by_id(&self, id: &str) -> Option<Arc<Service>> {
        if self.is_disposed() {
            return None;
        }
        self.services
            .iter()
            .find(|s| s.id() == id || s.short_id() == id)
            .cloned()
    }

    /// Les devices couverts par un parcours depuis ce nœud.
    pub fn embedded_devices(self: &Arc<Self>, mode: VisitMode) -> Vec<Arc<Device>> {
        match mode {
            VisitMode::ThisOnly => vec![self.clone()],
            VisitMode::ThisAndDirectChildren => {
                let mut out = vec![self.clone()];
                out.extend(self.embedded.iter().cloned());
                out
            }
            VisitMode::ThisRecursively => {
                let mut out = Vec::new();
                self.collect_recursive(&mut out);
                out
            }
        }
    }

    fn collect_recursive(self: &Arc<Self>, out: &mut Vec<Arc<Device>>) {
        out.push(self.clone());
        for child in &self.embedded {
            child.collect_recursive(out);
        }
    }

    /// Recherche un device par UDN dans ce sous-arbre.
    pub fn find_device(self: &Arc<Self>, udn: &Udn) -> Option<Arc<Device>> {
        if self.is_disposed() {
            return None;
        }
        self.embedded_devices(VisitMode::ThisRecursively)
            .into_iter()
            .find(|d| d.udn() == udn)
    }

    /// Tous les services du sous-arbre.
    pub fn all_services(self: &Arc<Self>) -> Vec<Arc<Service>> {
        self.embedded_devices(VisitMode::ThisRecursively)
            .iter()
            .flat_map(|d| d.services.iter().cloned())
            .collect()
    }

    /// Passe le sous-arbre entier à l'état terminal.
    ///
    /// Les références externes restent déréférençables mais toutes les
    /// opérations deviennent sans effet ; la mémoire n'est libérée qu'au
    /// dernier `Arc`.
    pub fn dispose(self: &Arc<Self>) {
        for device in self.embedded_devices(VisitMode::ThisRecursively) {
            device.disposed.store(true, Ordering::SeqCst);
            for service in &device.services {
                service.dispose();
            }
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn minimal_info(type_name: &str) -> DeviceInfo {
        DeviceInfo {
            device_type: format!("urn:schemas-upnp-org:device:{}:1", type_name)
                .parse()
                .unwrap(),
            friendly_name: format!("Test {}", type_name),
            manufacturer: "PMO Project".to_string(),
            manufacturer_url: None,
            model_description: None,
            model_name: type_name.to_string(),
            model_number: None,
            model_url: None,
            serial_number: None,
            upc: None,
            presentation_url: None,
        }
    }

    pub fn device_with_children(children: Vec<Arc<Device>>) -> Arc<Device> {
        Device::assemble(
            Udn::random(),
            minimal_info("Root"),
            vec![],
            Url::parse("http://192.168.1.10:8080/").unwrap(),
            vec![],
            children,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_parent_links() {
        let child = device_with_children(vec![]);
        let root = device_with_children(vec![child.clone()]);

        assert!(root.is_root());
        assert!(!child.is_root());
        assert_eq!(child.root().udn(), root.udn());
    }

    #[test]
    fn test_visit_modes() {
        let grandchild = device_with_children(vec![]);
        let child = device_with_children(vec![grandchild]);
        let root = device_with_children(vec![child]);

        assert_eq!(root.embedded_devices(VisitMode::ThisOnly).len(), 1);
        assert_eq!(
            root.embedded_devices(VisitMode::ThisAndDirectChildren).len(),
            2
        );
        assert_eq!(root.embedded_devices(VisitMode::ThisRecursively).len(), 3);
    }

    #[test]
    fn test_find_device_by_udn() {
        let child = device_with_children(vec![]);
        let udn = child.udn().clone();
        let root = device_with_children(vec![child]);

        assert!(root.find_device(&udn).is_some());
        assert!(root.find_device(&Udn::random()).is_none());
    }

    #[test]
    fn test_dispose_is_recursive_and_terminal() {
        let child = device_with_children(vec![]);
        let root = device_with_children(vec![child.clone()]);
        let udn = child.udn().clone();

        root.dispose();

        assert!(root.is_disposed());
        assert!(child.is_disposed());
        assert!(root.find_device(&udn).is_none());
    }
}
