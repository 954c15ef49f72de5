//! Construction et accesseurs de `Service`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use tokio::sync::broadcast;

use super::{Service, ServiceError, ServiceUrls, StateChange, CHANGE_STREAM_CAPACITY};
use crate::actions::{Action, ActionHandler};
use crate::devices::Device;
use crate::state_variables::{StateVarInstance, StateVariable};
use crate::types::ResourceType;

impl Service {
    /// Construit un service validé.
    ///
    /// # Errors
    ///
    /// - `DuplicateVariable` / `DuplicateAction` si un nom apparaît deux fois ;
    /// - `UnknownStateVariable` si un argument d'action référence une
    ///   variable absente de la table d'état.
    pub fn build(
        id: &str,
        service_type: ResourceType,
        urls: ServiceUrls,
        actions: Vec<Action>,
        variables: Vec<StateVariable>,
    ) -> Result<Arc<Self>, ServiceError> {
        let mut variable_index = HashMap::new();
        let mut var_instances = Vec::with_capacity(variables.len());
        for (i, def) in variables.into_iter().enumerate() {
            let name = def.name().to_string();
            if variable_index.insert(name.clone(), i).is_some() {
                return Err(ServiceError::DuplicateVariable(name));
            }
            var_instances.push(Arc::new(StateVarInstance::new(Arc::new(def))));
        }

        let mut action_index = HashMap::new();
        let mut action_arcs = Vec::with_capacity(actions.len());
        for (i, action) in actions.into_iter().enumerate() {
            let name = action.name().to_string();
            if action_index.insert(name.clone(), i).is_some() {
                return Err(ServiceError::DuplicateAction(name));
            }
            for arg in action.arguments() {
                if !variable_index.contains_key(arg.related_state_variable()) {
                    return Err(ServiceError::UnknownStateVariable {
                        action: name.clone(),
                        variable: arg.related_state_variable().to_string(),
                    });
                }
            }
            action_arcs.push(Arc::new(action));
        }

        let (changes, _) = broadcast::channel(CHANGE_STREAM_CAPACITY);

        Ok(Arc::new(Self {
            id: id.to_string(),
            service_type,
            urls: RwLock::new(urls),
            actions: action_arcs,
            action_index,
            handlers: RwLock::new(HashMap::new()),
            variables: var_instances,
            variable_index,
            parent: RwLock::new(Weak::new()),
            update_lock: Mutex::new(()),
            changes,
            disposed: AtomicBool::new(false),
        }))
    }

    /// Le serviceId complet.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Le dernier segment du serviceId (`AVTransport` pour
    /// `urn:upnp-org:serviceId:AVTransport`).
    pub fn short_id(&self) -> &str {
        self.id.rsplit(':').next().unwrap_or(&self.id)
    }

    pub fn service_type(&self) -> &ResourceType {
        &self.service_type
    }

    pub fn urls(&self) -> ServiceUrls {
        self.urls.read().unwrap().clone()
    }

    pub fn scpd_url(&self) -> String {
        self.urls.read().unwrap().scpd.clone()
    }

    pub fn control_url(&self) -> String {
        self.urls.read().unwrap().control.clone()
    }

    pub fn event_sub_url(&self) -> String {
        self.urls.read().unwrap().event_sub.clone()
    }

    /// Réécrit les URL du service (utilisé par le host pour imposer sa
    /// topologie de routes).
    pub(crate) fn set_urls(&self, urls: ServiceUrls) {
        *self.urls.write().unwrap() = urls;
    }

    pub fn actions(&self) -> &[Arc<Action>] {
        &self.actions
    }

    pub fn action(&self, name: &str) -> Option<Arc<Action>> {
        if self.is_disposed() {
            return None;
        }
        self.action_index.get(name).map(|i| self.actions[*i].clone())
    }

    pub fn variables(&self) -> &[Arc<StateVarInstance>] {
        &self.variables
    }

    pub fn state_variable(&self, name: &str) -> Option<Arc<StateVarInstance>> {
        if self.is_disposed() {
            return None;
        }
        self.variable_index
            .get(name)
            .map(|i| self.variables[*i].clone())
    }

    /// Vrai si au moins une variable d'état déclare des événements.
    pub fn is_evented(&self) -> bool {
        self.variables.iter().any(|v| v.is_evented())
    }

    /// Installe l'entité invocable d'une action.
    pub fn set_action_handler(&self, name: &str, handler: ActionHandler) -> Result<(), ServiceError> {
        if !self.action_index.contains_key(name) {
            return Err(ServiceError::UnknownAction(name.to_string()));
        }
        self.handlers
            .write()
            .unwrap()
            .insert(name.to_string(), handler);
        Ok(())
    }

    pub(crate) fn handler(&self, name: &str) -> Option<ActionHandler> {
        self.handlers.read().unwrap().get(name).cloned()
    }

    pub(crate) fn set_parent(&self, device: &Arc<Device>) {
        *self.parent.write().unwrap() = Arc::downgrade(device);
    }

    /// Le device parent, s'il est encore vivant.
    pub fn device(&self) -> Option<Arc<Device>> {
        self.parent.read().unwrap().upgrade()
    }

    /// L'USN de ce service : `<udn>::<serviceType>`.
    pub fn usn(&self) -> String {
        match self.device() {
            Some(d) => format!("{}::{}", d.udn(), self.service_type),
            None => format!("::{}", self.service_type),
        }
    }

    /// Clé stable (UDN + serviceId) utilisée par les index d'abonnements.
    pub fn key(&self) -> String {
        match self.device() {
            Some(d) => format!("{}/{}", d.udn(), self.id),
            None => format!("?/{}", self.id),
        }
    }

    /// Flux des changements de variables événementielles.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<StateChange> {
        self.changes.subscribe()
    }

    pub(crate) fn publish_change(&self, change: StateChange) {
        // Personne à l'écoute n'est pas une erreur.
        let _ = self.changes.send(change);
    }

    pub(crate) fn update_lock(&self) -> &Mutex<()> {
        &self.update_lock
    }

    /// Passe le service à l'état terminal : les recherches retournent vide et
    /// les opérations échouent avec `Disposed`.
    pub(crate) fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{Argument, Direction};
    use crate::state_variables::EventingMode;
    use crate::variable_types::VarType;

    fn sample_urls() -> ServiceUrls {
        ServiceUrls {
            scpd: "/svc/scpd.xml".into(),
            control: "/svc/control".into(),
            event_sub: "/svc/event".into(),
        }
    }

    #[test]
    fn test_build_rejects_duplicate_variables() {
        let result = Service::build(
            "urn:upnp-org:serviceId:Test",
            "urn:schemas-upnp-org:service:Test:1".parse().unwrap(),
            sample_urls(),
            vec![],
            vec![
                StateVariable::new("A", VarType::Ui4),
                StateVariable::new("A", VarType::String),
            ],
        );
        assert!(matches!(result, Err(ServiceError::DuplicateVariable(_))));
    }

    #[test]
    fn test_build_checks_argument_references() {
        let action = Action::new(
            "Get",
            vec![Argument::new("Value", Direction::Out, "Missing")],
        )
        .unwrap();

        let result = Service::build(
            "urn:upnp-org:serviceId:Test",
            "urn:schemas-upnp-org:service:Test:1".parse().unwrap(),
            sample_urls(),
            vec![action],
            vec![StateVariable::new("Present", VarType::Ui4)],
        );
        assert!(matches!(
            result,
            Err(ServiceError::UnknownStateVariable { .. })
        ));
    }

    #[test]
    fn test_evented_iff_a_variable_events() {
        let silent = Service::build(
            "urn:upnp-org:serviceId:Silent",
            "urn:schemas-upnp-org:service:Silent:1".parse().unwrap(),
            sample_urls(),
            vec![],
            vec![StateVariable::new("A", VarType::Ui4)
                .with_eventing(EventingMode::No)],
        )
        .unwrap();
        assert!(!silent.is_evented());

        let chatty = Service::build(
            "urn:upnp-org:serviceId:Chatty",
            "urn:schemas-upnp-org:service:Chatty:1".parse().unwrap(),
            sample_urls(),
            vec![],
            vec![StateVariable::new("A", VarType::Ui4)
                .with_eventing(EventingMode::Yes)],
        )
        .unwrap();
        assert!(chatty.is_evented());
    }

    #[test]
    fn test_short_id() {
        let svc = Service::build(
            "urn:upnp-org:serviceId:AVTransport",
            "urn:schemas-upnp-org:service:AVTransport:1".parse().unwrap(),
            sample_urls(),
            vec![],
            vec![],
        )
        .unwrap();
        assert_eq!(svc.short_id(), "AVTransport");
    }

    #[test]
    fn test_disposed_lookups_return_empty() {
        let svc = Service::build(
            "urn:upnp-org:serviceId:Test",
            "urn:schemas-upnp-org:service:Test:1".parse().unwrap(),
            sample_urls(),
            vec![],
            vec![StateVariable::new("A", VarType::Ui4)],
        )
        .unwrap();

        assert!(svc.state_variable("A").is_some());
        svc.dispose();
        assert!(svc.state_variable("A").is_none());
    }
}
