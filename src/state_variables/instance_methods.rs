//! Méthodes de `StateVarInstance`.

use std::sync::{Arc, RwLock};

use chrono::Utc;

use super::{StateVarInstance, StateVariable, StateVariableError};
use crate::variable_types::Value;

impl StateVarInstance {
    /// Instancie la définition avec sa valeur initiale.
    pub fn new(definition: Arc<StateVariable>) -> Self {
        let initial = definition.initial_value();
        Self {
            definition,
            value: RwLock::new(initial),
            last_modified: RwLock::new(Utc::now()),
        }
    }

    pub fn name(&self) -> &str {
        self.definition.name()
    }

    pub fn definition(&self) -> &Arc<StateVariable> {
        &self.definition
    }

    pub fn is_evented(&self) -> bool {
        self.definition.is_evented()
    }

    /// La valeur courante.
    pub fn value(&self) -> Value {
        self.value.read().unwrap().clone()
    }

    /// La valeur courante, dans sa forme texte réseau.
    pub fn value_string(&self) -> String {
        self.value.read().unwrap().to_upnp_string()
    }

    /// Pose une nouvelle valeur, après validation contre la définition.
    ///
    /// Réservé au chemin de mise à jour du service (`crate`) : c'est lui qui
    /// tient le verrou de mise à jour et déclenche le notifier.
    pub(crate) fn set(&self, value: Value) -> Result<(), StateVariableError> {
        self.definition.validate(&value)?;
        *self.value.write().unwrap() = value;
        *self.last_modified.write().unwrap() = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable_types::VarType;

    #[test]
    fn test_instance_starts_at_default() {
        let def = Arc::new(
            StateVariable::new("A", VarType::Ui4).with_default(Value::Ui4(7)),
        );
        let inst = StateVarInstance::new(def);
        assert_eq!(inst.value(), Value::Ui4(7));
    }

    #[test]
    fn test_set_validates() {
        let def = Arc::new(StateVariable::new("A", VarType::Ui4));
        let inst = StateVarInstance::new(def);

        inst.set(Value::Ui4(3)).unwrap();
        assert_eq!(inst.value_string(), "3");

        assert!(inst.set(Value::String("3".into())).is_err());
        assert_eq!(inst.value(), Value::Ui4(3));
    }
}
