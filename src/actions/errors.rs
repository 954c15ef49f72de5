//! Fault UPnP d'une invocation d'action.
//!
//! Table des codes (UDA §3.2.2) et correspondance HTTP appliquée par le
//! dispatch SOAP :
//!
//! | code | signification | HTTP |
//! |---|---|---|
//! | 401 | Invalid Action | 401 |
//! | 402 | Invalid Args | 402 |
//! | 501 | Action Failed | 501 |
//! | 600 | Argument Value Invalid | 600 |
//! | 601 | Argument Value Out of Range | 601 |
//! | 602 | Optional Action Not Implemented | 602 |
//! | 603 | Out of Memory | 603 |
//! | 604 | Human Intervention Required | 604 |
//! | 605 | String Argument Too Long | 605 |
//! | ≥ 606 | vendor | passthrough |

use thiserror::Error;

/// Erreur d'action SOAP : code UPnP et description lisible.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("UPnP error {code}: {description}")]
pub struct ActionError {
    pub code: u32,
    pub description: String,
}

impl ActionError {
    pub fn new(code: u32, description: &str) -> Self {
        Self {
            code,
            description: description.to_string(),
        }
    }

    pub fn invalid_action() -> Self {
        Self::new(401, "Invalid Action")
    }

    pub fn invalid_args() -> Self {
        Self::new(402, "Invalid Args")
    }

    pub fn action_failed(reason: &str) -> Self {
        Self::new(501, &format!("Action Failed: {}", reason))
    }

    pub fn argument_value_invalid() -> Self {
        Self::new(600, "Argument Value Invalid")
    }

    pub fn argument_value_out_of_range() -> Self {
        Self::new(601, "Argument Value Out of Range")
    }

    pub fn optional_action_not_implemented() -> Self {
        Self::new(602, "Optional Action Not Implemented")
    }

    pub fn out_of_memory() -> Self {
        Self::new(603, "Out of Memory")
    }

    pub fn human_intervention_required() -> Self {
        Self::new(604, "Human Intervention Required")
    }

    pub fn string_argument_too_long() -> Self {
        Self::new(605, "String Argument Too Long")
    }

    /// Le statut HTTP porté par la réponse fault.
    pub fn http_status(&self) -> u16 {
        match self.code {
            401 => 401,
            402 => 402,
            501 => 501,
            600..=999 => self.code as u16,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(ActionError::invalid_args().http_status(), 402);
        assert_eq!(ActionError::action_failed("boom").http_status(), 501);
        assert_eq!(ActionError::argument_value_out_of_range().http_status(), 601);
        // Passthrough des codes vendor.
        assert_eq!(ActionError::new(714, "No such object").http_status(), 714);
        // Les codes hors plage retombent sur 500.
        assert_eq!(ActionError::new(42, "odd").http_status(), 500);
    }
}
