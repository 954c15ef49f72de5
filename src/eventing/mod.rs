//! Événements GENA : publication côté device host, abonnements côté control
//! point.

mod manager;
mod propertyset;
mod publisher;

pub use manager::{EventSubscriptionManager, SubscriptionEvent, SubscriptionStatus};
pub use propertyset::{build_propertyset, parse_propertyset};
pub use publisher::EventPublisher;

/// Timeout maximal accordé par défaut (secondes).
pub const DEFAULT_MAX_TIMEOUT: u32 = 1800;

/// Timeout minimal accordé (secondes).
pub const DEFAULT_MIN_TIMEOUT: u32 = 1;

/// Timeout accordé aux abonnements sur services non événementiels : 24 h,
/// jamais notifiés.
pub const NON_EVENTED_TIMEOUT: u32 = 86400;

/// Profondeur de la file de notifications d'un abonnement ; le débordement
/// expire l'abonnement.
pub const NOTIFY_QUEUE_DEPTH: usize = 64;

/// Analyse un en-tête `TIMEOUT: Second-<n>` ou `Second-infinite`.
///
/// `None` si la forme est inconnue ; `Some(None)` pour `infinite`.
pub fn parse_timeout_header(value: &str) -> Option<Option<u32>> {
    let rest = value.trim().strip_prefix("Second-")?;
    if rest.eq_ignore_ascii_case("infinite") {
        return Some(None);
    }
    rest.parse().ok().map(Some)
}

/// Le SEQ suivant : incrément modulo 2³², avec retour à 1 (jamais 0 après la
/// notification initiale).
pub fn next_seq(current: u32) -> u32 {
    if current == u32::MAX {
        1
    } else {
        current + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_header_forms() {
        assert_eq!(parse_timeout_header("Second-1800"), Some(Some(1800)));
        assert_eq!(parse_timeout_header("Second-infinite"), Some(None));
        assert_eq!(parse_timeout_header("Second-INFINITE"), Some(None));
        assert_eq!(parse_timeout_header("1800"), None);
        assert_eq!(parse_timeout_header("Second-"), None);
    }

    #[test]
    fn test_seq_wraps_to_one() {
        assert_eq!(next_seq(0), 1);
        assert_eq!(next_seq(41), 42);
        assert_eq!(next_seq(u32::MAX), 1);
    }
}
