//! Méthodes de `Action` et `Argument`.

use std::collections::HashSet;

use super::{Action, ActionError, Argument, Direction};

impl Argument {
    pub fn new(name: &str, direction: Direction, related_state_variable: &str) -> Self {
        Self {
            name: name.to_string(),
            direction,
            related_state_variable: related_state_variable.to_string(),
            retval: false,
        }
    }

    /// Marque cet argument de sortie comme valeur de retour.
    pub fn as_retval(mut self) -> Self {
        self.retval = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn related_state_variable(&self) -> &str {
        &self.related_state_variable
    }

    pub fn is_retval(&self) -> bool {
        self.retval
    }
}

impl Action {
    /// Construit une action validée.
    ///
    /// # Errors
    ///
    /// Fault 402 si deux arguments portent le même nom ou si plus d'un
    /// argument de sortie est marqué retval.
    pub fn new(name: &str, arguments: Vec<Argument>) -> Result<Self, ActionError> {
        let mut seen = HashSet::new();
        for arg in &arguments {
            if !seen.insert(arg.name.as_str()) {
                return Err(ActionError::new(
                    402,
                    &format!("duplicate argument '{}' in action '{}'", arg.name, name),
                ));
            }
        }

        let retval_count = arguments
            .iter()
            .filter(|a| a.retval && a.direction == Direction::Out)
            .count();
        if retval_count > 1 {
            return Err(ActionError::new(
                402,
                &format!("action '{}' declares more than one retval", name),
            ));
        }

        Ok(Self {
            name: name.to_string(),
            arguments,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    /// Arguments d'entrée, dans l'ordre de déclaration.
    pub fn in_arguments(&self) -> impl Iterator<Item = &Argument> {
        self.arguments
            .iter()
            .filter(|a| a.direction == Direction::In)
    }

    /// Arguments de sortie, dans l'ordre de déclaration.
    pub fn out_arguments(&self) -> impl Iterator<Item = &Argument> {
        self.arguments
            .iter()
            .filter(|a| a.direction == Direction::Out)
    }

    pub fn argument(&self, name: &str) -> Option<&Argument> {
        self.arguments.iter().find(|a| a.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argument_order_is_preserved() {
        let action = Action::new(
            "Seek",
            vec![
                Argument::new("InstanceID", Direction::In, "A_ARG_TYPE_InstanceID"),
                Argument::new("Unit", Direction::In, "A_ARG_TYPE_SeekMode"),
                Argument::new("Target", Direction::In, "A_ARG_TYPE_SeekTarget"),
            ],
        )
        .unwrap();

        let names: Vec<_> = action.in_arguments().map(|a| a.name()).collect();
        assert_eq!(names, ["InstanceID", "Unit", "Target"]);
    }

    #[test]
    fn test_duplicate_argument_is_rejected() {
        assert!(Action::new(
            "Bad",
            vec![
                Argument::new("X", Direction::In, "V"),
                Argument::new("X", Direction::Out, "V"),
            ],
        )
        .is_err());
    }

    #[test]
    fn test_single_retval_allowed() {
        let ok = Action::new(
            "Get",
            vec![Argument::new("Value", Direction::Out, "V").as_retval()],
        );
        assert!(ok.is_ok());

        let bad = Action::new(
            "Get",
            vec![
                Argument::new("A", Direction::Out, "V").as_retval(),
                Argument::new("B", Direction::Out, "V").as_retval(),
            ],
        );
        assert!(bad.is_err());
    }
}
