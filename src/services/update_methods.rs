//! Chemin de mise à jour des variables d'état et invocation locale des
//! actions.

use std::sync::Arc;

use tracing::warn;

use super::{Service, ServiceError, StateChange};
use crate::actions::{ActionError, ActionInputs, ActionOutputs};
use crate::state_variables::{StateVarInstance, StateVariableError};
use crate::variable_types::Value;

impl Service {
    /// Met à jour une variable depuis sa forme texte.
    ///
    /// La valeur est validée contre le type et les contraintes de la
    /// variable, posée sous le verrou de mise à jour du service, puis — si la
    /// variable est événementielle — un changement est publié vers le
    /// notifier.
    pub fn update(&self, name: &str, value: &str) -> Result<(), ServiceError> {
        let var = self.lookup_for_update(name)?;
        let parsed = Value::parse(value, var.definition().var_type())
            .map_err(StateVariableError::from)?;
        self.apply_update(&var, parsed, true)
    }

    /// Variante typée de [`update`](Self::update).
    pub fn update_value(&self, name: &str, value: Value) -> Result<(), ServiceError> {
        let var = self.lookup_for_update(name)?;
        self.apply_update(&var, value, true)
    }

    /// Mise à jour par lot, tout-ou-rien.
    ///
    /// Chaque paire est validée avant toute application : au premier échec,
    /// aucune variable n'a changé. `send_event` contrôle la publication vers
    /// le notifier.
    pub fn update_many(
        &self,
        pairs: &[(&str, &str)],
        send_event: bool,
    ) -> Result<(), ServiceError> {
        if self.is_disposed() {
            return Err(ServiceError::Disposed);
        }

        let mut staged: Vec<(Arc<StateVarInstance>, Value)> = Vec::with_capacity(pairs.len());
        for (name, value) in pairs {
            let var = self
                .state_variable(name)
                .ok_or_else(|| ServiceError::UnknownVariable(name.to_string()))?;
            let parsed = Value::parse(value, var.definition().var_type())
                .map_err(StateVariableError::from)?;
            var.definition().validate(&parsed)?;
            staged.push((var, parsed));
        }

        {
            let _guard = self.update_lock().lock().unwrap();
            for (var, value) in &staged {
                var.set(value.clone())?;
            }
        }

        if send_event {
            for (var, value) in &staged {
                if var.is_evented() {
                    self.publish_change(StateChange {
                        variable: var.name().to_string(),
                        value: value.to_upnp_string(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Applique un propertyset reçu d'un device distant (côté control point).
    ///
    /// Les valeurs inconvertibles sont ignorées avec un avertissement : un
    /// device bavard ne doit pas faire échouer la réception d'événements.
    pub(crate) fn apply_remote_values(&self, pairs: &[(String, String)]) {
        for (name, value) in pairs {
            let Some(var) = self.state_variable(name) else {
                warn!("❓ NOTIFY carries unknown variable '{}', ignored", name);
                continue;
            };
            let parsed = match Value::parse(value, var.definition().var_type()) {
                Ok(v) => v,
                Err(e) => {
                    warn!("❓ NOTIFY value for '{}' unusable: {}", name, e);
                    continue;
                }
            };
            if let Err(e) = self.apply_update(&var, parsed, true) {
                warn!("❓ NOTIFY value for '{}' rejected: {}", name, e);
            }
        }
    }

    fn lookup_for_update(&self, name: &str) -> Result<Arc<StateVarInstance>, ServiceError> {
        if self.is_disposed() {
            return Err(ServiceError::Disposed);
        }
        self.state_variable(name)
            .ok_or_else(|| ServiceError::UnknownVariable(name.to_string()))
    }

    fn apply_update(
        &self,
        var: &Arc<StateVarInstance>,
        value: Value,
        send_event: bool,
    ) -> Result<(), ServiceError> {
        let text = value.to_upnp_string();
        {
            let _guard = self.update_lock().lock().unwrap();
            var.set(value)?;
        }
        if send_event && var.is_evented() {
            self.publish_change(StateChange {
                variable: var.name().to_string(),
                value: text,
            });
        }
        Ok(())
    }

    /// Invoque localement une action (côté device host) depuis des entrées
    /// texte, dans l'ordre reçu du dispatch SOAP.
    ///
    /// Les entrées sont validées contre la signature SCPD : argument manquant
    /// → 402, valeur inconvertible → 600, contrainte violée → 601/600.
    pub async fn invoke(
        &self,
        name: &str,
        raw_inputs: &[(String, String)],
    ) -> Result<ActionOutputs, ActionError> {
        if self.is_disposed() {
            return Err(ActionError::action_failed("service is disposed"));
        }

        let action = self.action(name).ok_or_else(ActionError::invalid_action)?;

        let handler = self
            .handler(name)
            .ok_or_else(ActionError::optional_action_not_implemented)?;

        let mut inputs = ActionInputs::new();
        for arg in action.in_arguments() {
            let raw = raw_inputs
                .iter()
                .find(|(n, _)| n == arg.name())
                .map(|(_, v)| v.as_str())
                .ok_or_else(ActionError::invalid_args)?;

            // La variable liée existe : vérifié à la construction du service.
            let var = self
                .state_variable(arg.related_state_variable())
                .ok_or_else(|| ActionError::action_failed("dangling state variable"))?;
            let def = var.definition();

            let value = Value::parse(raw, def.var_type())
                .map_err(|_| ActionError::argument_value_invalid())?;

            def.validate(&value).map_err(|e| match e {
                StateVariableError::OutOfRange { .. } => {
                    ActionError::argument_value_out_of_range()
                }
                _ => ActionError::argument_value_invalid(),
            })?;

            inputs.insert(arg.name().to_string(), value);
        }

        let mut outputs = handler(inputs).await?;

        // Les sorties sont renvoyées dans l'ordre de déclaration du SCPD.
        let declared: Vec<&str> = action.out_arguments().map(|a| a.name()).collect();
        outputs.sort_by_key(|(name, _)| {
            declared
                .iter()
                .position(|d| d == name)
                .unwrap_or(usize::MAX)
        });

        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{Action, Argument, Direction};
    use crate::services::ServiceUrls;
    use crate::state_variables::{EventingMode, StateVariable};
    use crate::value_ranges::ValueRange;
    use crate::variable_types::VarType;

    fn volume_service() -> Arc<Service> {
        let set = Action::new(
            "SetVolume",
            vec![Argument::new("DesiredVolume", Direction::In, "Volume")],
        )
        .unwrap();
        let get = Action::new(
            "GetVolume",
            vec![Argument::new("CurrentVolume", Direction::Out, "Volume").as_retval()],
        )
        .unwrap();

        Service::build(
            "urn:upnp-org:serviceId:RenderingControl",
            "urn:schemas-upnp-org:service:RenderingControl:1".parse().unwrap(),
            ServiceUrls {
                scpd: "/s/scpd.xml".into(),
                control: "/s/control".into(),
                event_sub: "/s/event".into(),
            },
            vec![set, get],
            vec![StateVariable::new("Volume", VarType::Ui2)
                .with_eventing(EventingMode::Yes)
                .with_range(
                    ValueRange::from_strings(VarType::Ui2, "0", "100", Some("1")).unwrap(),
                )],
        )
        .unwrap()
    }

    #[test]
    fn test_update_validates_and_publishes() {
        let svc = volume_service();
        let mut rx = svc.subscribe_changes();

        svc.update("Volume", "42").unwrap();
        assert_eq!(svc.state_variable("Volume").unwrap().value_string(), "42");

        let change = rx.try_recv().unwrap();
        assert_eq!(change.variable, "Volume");
        assert_eq!(change.value, "42");
    }

    #[test]
    fn test_update_rejects_out_of_range() {
        let svc = volume_service();
        assert!(svc.update("Volume", "200").is_err());
        assert_eq!(svc.state_variable("Volume").unwrap().value_string(), "0");
    }

    #[test]
    fn test_update_many_is_atomic() {
        let svc = volume_service();
        let mut rx = svc.subscribe_changes();

        // Le second élément est invalide : rien ne doit changer.
        let result = svc.update_many(&[("Volume", "10"), ("Volume", "500")], true);
        assert!(result.is_err());
        assert_eq!(svc.state_variable("Volume").unwrap().value_string(), "0");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_invoke_missing_argument_is_402() {
        let svc = volume_service();
        svc.set_action_handler(
            "SetVolume",
            Arc::new(|_inputs| Box::pin(async { Ok(vec![]) })),
        )
        .unwrap();

        let err = svc.invoke("SetVolume", &[]).await.unwrap_err();
        assert_eq!(err.code, 402);
    }

    #[tokio::test]
    async fn test_invoke_out_of_range_is_601() {
        let svc = volume_service();
        svc.set_action_handler(
            "SetVolume",
            Arc::new(|_inputs| Box::pin(async { Ok(vec![]) })),
        )
        .unwrap();

        let err = svc
            .invoke(
                "SetVolume",
                &[("DesiredVolume".to_string(), "180".to_string())],
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, 601);
    }

    #[tokio::test]
    async fn test_invoke_without_handler_is_602() {
        let svc = volume_service();
        let err = svc.invoke("GetVolume", &[]).await.unwrap_err();
        assert_eq!(err.code, 602);
    }

    #[tokio::test]
    async fn test_invoke_unknown_action_is_401() {
        let svc = volume_service();
        let err = svc.invoke("NoSuchAction", &[]).await.unwrap_err();
        assert_eq!(err.code, 401);
    }
}
