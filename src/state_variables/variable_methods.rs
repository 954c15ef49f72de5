//! Méthodes de `StateVariable`.

use super::{EventingMode, StateVariable, StateVariableError};
use crate::value_ranges::{AllowedValueList, ValueRange};
use crate::variable_types::{Value, VarType};

impl StateVariable {
    /// Crée une définition minimale ; les contraintes s'ajoutent avec les
    /// méthodes `with_*`.
    pub fn new(name: &str, var_type: VarType) -> Self {
        Self {
            name: name.to_string(),
            var_type,
            eventing: EventingMode::No,
            default_value: None,
            allowed_values: None,
            range: None,
        }
    }

    pub fn with_eventing(mut self, eventing: EventingMode) -> Self {
        self.eventing = eventing;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn with_allowed_values(mut self, list: AllowedValueList) -> Self {
        self.allowed_values = Some(list);
        self
    }

    pub fn with_range(mut self, range: ValueRange) -> Self {
        self.range = Some(range);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn var_type(&self) -> VarType {
        self.var_type
    }

    pub fn eventing(&self) -> EventingMode {
        self.eventing
    }

    /// Vrai si les changements de cette variable déclenchent des NOTIFY.
    pub fn is_evented(&self) -> bool {
        !matches!(self.eventing, EventingMode::No)
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default_value.as_ref()
    }

    pub fn allowed_values(&self) -> Option<&AllowedValueList> {
        self.allowed_values.as_ref()
    }

    pub fn range(&self) -> Option<&ValueRange> {
        self.range.as_ref()
    }

    /// Valeur initiale : la `defaultValue` déclarée, sinon le zéro du type.
    pub fn initial_value(&self) -> Value {
        self.default_value
            .clone()
            .unwrap_or_else(|| self.var_type.zero_value())
    }

    /// Valide une valeur candidate contre le type et les contraintes.
    ///
    /// # Errors
    ///
    /// - `TypeMismatch` si la valeur n'a pas le type déclaré ;
    /// - `OutOfRange` si un `allowedValueRange` est déclaré et violé ;
    /// - `NotAllowed` si un `allowedValueList` est déclaré et violé.
    pub fn validate(&self, value: &Value) -> Result<(), StateVariableError> {
        if value.var_type() != self.var_type {
            return Err(StateVariableError::TypeMismatch {
                variable: self.name.clone(),
                expected: self.var_type.name().to_string(),
                got: value.var_type().name().to_string(),
            });
        }

        if let Some(range) = &self.range {
            if !range.contains(value) {
                return Err(StateVariableError::OutOfRange {
                    variable: self.name.clone(),
                    value: value.to_upnp_string(),
                });
            }
        }

        if let Some(list) = &self.allowed_values {
            if !list.is_empty() && !list.contains(&value.to_upnp_string()) {
                return Err(StateVariableError::NotAllowed {
                    variable: self.name.clone(),
                    value: value.to_upnp_string(),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_against_range() {
        let var = StateVariable::new("Volume", VarType::Ui2)
            .with_range(ValueRange::from_strings(VarType::Ui2, "0", "100", Some("1")).unwrap());

        assert!(var.validate(&Value::Ui2(50)).is_ok());
        assert!(matches!(
            var.validate(&Value::Ui2(101)),
            Err(StateVariableError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_validation_against_list() {
        let var = StateVariable::new("TransportState", VarType::String)
            .with_allowed_values(AllowedValueList::new(vec![
                "PLAYING".into(),
                "STOPPED".into(),
            ]));

        assert!(var.validate(&Value::String("PLAYING".into())).is_ok());
        assert!(matches!(
            var.validate(&Value::String("PAUSED".into())),
            Err(StateVariableError::NotAllowed { .. })
        ));
    }

    #[test]
    fn test_type_mismatch() {
        let var = StateVariable::new("Volume", VarType::Ui2);
        assert!(matches!(
            var.validate(&Value::String("10".into())),
            Err(StateVariableError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_initial_value_prefers_default() {
        let var = StateVariable::new("Mode", VarType::String)
            .with_default(Value::String("NORMAL".into()));
        assert_eq!(var.initial_value(), Value::String("NORMAL".into()));

        let bare = StateVariable::new("Count", VarType::Ui4);
        assert_eq!(bare.initial_value(), Value::Ui4(0));
    }
}
