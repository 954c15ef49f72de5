//! Tâche de construction d'un device découvert.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, Semaphore};
use tracing::{debug, info, warn};
use url::Url;

use super::ControlPointEvent;
use crate::description::{
    build_device, parse_device_description, DescriptionFetcher, DeviceNode, IconFetcher, Scpd,
};
use crate::devices::DeviceStorage;
use crate::types::ValidationLevel;

/// Contexte partagé des tâches de construction.
pub(super) struct BuildContext {
    pub storage: Arc<DeviceStorage>,
    pub fetcher: Arc<dyn DescriptionFetcher>,
    /// Récupération des octets d'icônes, si l'application l'a demandée ; un
    /// échec abandonne l'icône sans faire échouer la construction.
    pub icon_fetcher: Option<Arc<dyn IconFetcher>>,
    pub events: broadcast::Sender<ControlPointEvent>,
    /// Verrou de création par UDN : une tâche concurrente pour le même UDN
    /// observe l'arbre committé (ou la construction en cours) et abandonne.
    pub building: Mutex<HashSet<String>>,
    /// Parallélisme borné des constructions.
    pub semaphore: Semaphore,
}

/// Construction d'un arbre de device depuis son URL de localisation :
/// description, puis chaque SCPD, puis validation et commit atomique.
pub(super) struct DeviceBuildTask {
    pub context: Arc<BuildContext>,
    pub udn_hint: String,
    pub location: Url,
}

impl DeviceBuildTask {
    pub async fn run(self) {
        let Ok(_permit) = self.context.semaphore.acquire().await else {
            return;
        };

        // Verrou de création : une seule tâche par UDN.
        {
            let mut building = self.context.building.lock().unwrap();
            if !building.insert(self.udn_hint.clone()) {
                debug!("⏭️ Build already in flight for {}", self.udn_hint);
                return;
            }
        }

        let result = self.build().await;

        self.context
            .building
            .lock()
            .unwrap()
            .remove(&self.udn_hint);

        if let Err(e) = result {
            warn!("❌ Device build from {} failed: {}", self.location, e);
        }
    }

    async fn build(&self) -> Result<(), crate::errors::UpnpError> {
        // L'arbre est peut-être déjà committé par une tâche antérieure.
        if self.context.storage.root_by_location(&self.location).is_some() {
            return Ok(());
        }

        // 1. Description du device.
        let xml = self.context.fetcher.fetch(&self.location).await?;
        let mut description = parse_device_description(
            xml.as_bytes(),
            &self.location,
            ValidationLevel::Lenient,
        )?;

        if let Some(icon_fetcher) = &self.context.icon_fetcher {
            let base = description.base_url.clone();
            fetch_icons(&mut description.root, icon_fetcher, &base).await;
        }

        // 2. Le SCPD de chaque service du sous-arbre.
        let mut scpds: HashMap<String, Scpd> = HashMap::new();
        for (_, stub) in description.root.all_service_stubs() {
            if scpds.contains_key(stub.scpd_url.as_str()) {
                continue;
            }
            let scpd_xml = self.context.fetcher.fetch(&stub.scpd_url).await?;
            let scpd = crate::description::parse_scpd(scpd_xml.as_bytes())?;
            scpds.insert(stub.scpd_url.as_str().to_string(), scpd);
        }

        // 3+4. Validation, montage, commit atomique.
        let device = build_device(&description, &scpds)?;
        let udn = device.udn().clone();

        if let Err(e) = self
            .context
            .storage
            .insert_root(device.clone(), self.location.clone())
        {
            // Une tâche concurrente a committé le même UDN : on abandonne.
            debug!("⏭️ Build of {} aborted: {}", udn, e);
            return Ok(());
        }

        info!("✅ Root device online: {} ({})", device.friendly_name(), udn);

        // 5. Signal aux applications.
        let _ = self
            .context
            .events
            .send(ControlPointEvent::RootDeviceOnline(device));

        Ok(())
    }
}

/// Remplit `icon.data` pour tout le sous-arbre ; les échecs ne sont que des
/// avertissements, l'icône reste sans données.
async fn fetch_icons(node: &mut DeviceNode, fetcher: &Arc<dyn IconFetcher>, base: &Url) {
    let mut stack: Vec<&mut DeviceNode> = vec![node];
    while let Some(current) = stack.pop() {
        for icon in &mut current.icons {
            let url = match base.join(&icon.url) {
                Ok(url) => url,
                Err(e) => {
                    warn!("🖼️ Unresolvable icon URL '{}': {}", icon.url, e);
                    continue;
                }
            };
            match fetcher.fetch(&url).await {
                Ok(data) => icon.data = Some(data),
                Err(e) => warn!("🖼️ Icon {} dropped: {}", url, e),
            }
        }
        stack.extend(current.children.iter_mut());
    }
}
