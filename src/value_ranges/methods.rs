//! Construction et validation des plages et listes de valeurs.

use super::{AllowedValueList, ValueRange};
use crate::variable_types::{Value, ValueError, VarType};

impl ValueRange {
    /// Construit une plage validée.
    ///
    /// # Errors
    ///
    /// Échoue si le type n'est pas numérique, si `min > max`, ou si `step`
    /// est présent et non strictement positif.
    pub fn new(min: Value, max: Value, step: Option<Value>) -> Result<Self, ValueError> {
        let ty = min.var_type();

        let (min_f, max_f) = match (min.as_f64(), max.as_f64()) {
            (Some(a), Some(b)) => (a, b),
            _ => return Err(ValueError::invalid(ty.name(), "allowedValueRange")),
        };

        if min_f > max_f {
            return Err(ValueError::invalid(ty.name(), "min > max"));
        }

        if let Some(step) = &step {
            match step.as_f64() {
                Some(s) if s > 0.0 => {}
                _ => return Err(ValueError::invalid(ty.name(), "step <= 0")),
            }
        }

        Ok(Self { min, max, step })
    }

    /// Analyse les trois champs texte d'un `allowedValueRange` SCPD.
    pub fn from_strings(
        ty: VarType,
        min: &str,
        max: &str,
        step: Option<&str>,
    ) -> Result<Self, ValueError> {
        let min = Value::parse(min, ty)?;
        let max = Value::parse(max, ty)?;
        let step = step.map(|s| Value::parse(s, ty)).transpose()?;
        Self::new(min, max, step)
    }

    /// Vrai si `value` tombe dans `[min, max]`.
    pub fn contains(&self, value: &Value) -> bool {
        match (value.as_f64(), self.min.as_f64(), self.max.as_f64()) {
            (Some(v), Some(min), Some(max)) => v >= min && v <= max,
            _ => false,
        }
    }

    pub fn min(&self) -> &Value {
        &self.min
    }

    pub fn max(&self) -> &Value {
        &self.max
    }

    pub fn step(&self) -> Option<&Value> {
        self.step.as_ref()
    }
}

impl AllowedValueList {
    pub fn new(values: Vec<String>) -> Self {
        Self { values }
    }

    pub fn contains(&self, value: &str) -> bool {
        self.values.iter().any(|v| v == value)
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_bounds() {
        let range =
            ValueRange::from_strings(VarType::Ui2, "0", "100", Some("1")).unwrap();

        assert!(range.contains(&Value::Ui2(0)));
        assert!(range.contains(&Value::Ui2(100)));
        assert!(!range.contains(&Value::Ui2(101)));
    }

    #[test]
    fn test_inverted_range_is_rejected() {
        assert!(ValueRange::from_strings(VarType::I4, "10", "-10", None).is_err());
    }

    #[test]
    fn test_zero_step_is_rejected() {
        assert!(ValueRange::from_strings(VarType::I4, "0", "10", Some("0")).is_err());
        assert!(ValueRange::from_strings(VarType::I4, "0", "10", Some("-1")).is_err());
    }

    #[test]
    fn test_allowed_list() {
        let list = AllowedValueList::new(vec!["PLAYING".into(), "STOPPED".into()]);
        assert!(list.contains("PLAYING"));
        assert!(!list.contains("PAUSED"));
    }
}
