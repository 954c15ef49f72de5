//! Unique Device Name.
//!
//! Un UDN est la chaîne `uuid:<uuid>`. En mode strict, seul l'hexadécimal en
//! minuscules est accepté ; en mode tolérant, la casse est libre et l'UDN est
//! normalisé en minuscules.

use std::fmt;

use uuid::Uuid;

use super::TypeError;

/// Niveau de validation appliqué aux documents et identifiants reçus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationLevel {
    #[default]
    Strict,
    Lenient,
}

/// UDN validé, conservé sous forme canonique `uuid:<hex minuscule>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Udn {
    value: String,
}

impl Udn {
    /// Analyse un UDN.
    ///
    /// # Errors
    ///
    /// `TypeError::InvalidUdn` si le préfixe `uuid:` manque, si l'UUID est
    /// invalide, ou — en mode strict — si l'hexadécimal n'est pas en
    /// minuscules.
    pub fn parse(s: &str, level: ValidationLevel) -> Result<Self, TypeError> {
        let err = || TypeError::InvalidUdn(s.to_string());

        let trimmed = s.trim();
        let rest = trimmed.strip_prefix("uuid:").ok_or_else(err)?;

        let uuid = Uuid::parse_str(rest).map_err(|_| err())?;

        if level == ValidationLevel::Strict && rest.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(err());
        }

        Ok(Self {
            value: format!("uuid:{}", uuid.as_hyphenated()),
        })
    }

    /// Génère un UDN aléatoire (UUID v4).
    pub fn random() -> Self {
        Self {
            value: format!("uuid:{}", Uuid::new_v4().as_hyphenated()),
        }
    }

    /// La forme complète `uuid:<uuid>`.
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// La partie UUID seule, sans le préfixe.
    pub fn uuid_str(&self) -> &str {
        &self.value["uuid:".len()..]
    }
}

impl fmt::Display for Udn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_accepts_lowercase() {
        let udn = Udn::parse(
            "uuid:00000000-0000-0000-0000-000000000001",
            ValidationLevel::Strict,
        )
        .unwrap();
        assert_eq!(udn.uuid_str(), "00000000-0000-0000-0000-000000000001");
    }

    #[test]
    fn test_strict_rejects_uppercase() {
        assert!(Udn::parse(
            "uuid:ABCDEF00-0000-0000-0000-000000000001",
            ValidationLevel::Strict,
        )
        .is_err());
    }

    #[test]
    fn test_lenient_normalizes_case() {
        let udn = Udn::parse(
            "uuid:ABCDEF00-0000-0000-0000-000000000001",
            ValidationLevel::Lenient,
        )
        .unwrap();
        assert_eq!(udn.as_str(), "uuid:abcdef00-0000-0000-0000-000000000001");
    }

    #[test]
    fn test_rejects_missing_prefix() {
        assert!(Udn::parse(
            "00000000-0000-0000-0000-000000000001",
            ValidationLevel::Lenient,
        )
        .is_err());
    }
}
