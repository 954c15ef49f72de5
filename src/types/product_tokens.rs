//! Jetons de produit des en-têtes `SERVER` et `USER-AGENT`.
//!
//! La grammaire UDA est `OS/version UPnP/1.x produit/version [extra…]`,
//! délimitée par des espaces. Beaucoup d'implémentations délimitent par des
//! virgules : l'analyse réessaie alors avec les virgules remplacées, puis en
//! dernier recours récupère un jeton `UPnP/x.y` isolé dans la chaîne brute.

use std::fmt;

/// Un jeton `produit/version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductToken {
    pub product: String,
    pub version: String,
}

impl ProductToken {
    fn parse(s: &str) -> Option<Self> {
        let (product, version) = s.split_once('/')?;
        let product = product.trim();
        let version = version.trim();
        if product.is_empty() || version.is_empty() {
            return None;
        }
        Some(Self {
            product: product.to_string(),
            version: version.to_string(),
        })
    }

    /// Vrai si ce jeton est un jeton UPnP de version `1.0` ou `1.1`.
    pub fn is_valid_upnp_token(&self) -> bool {
        self.product.eq_ignore_ascii_case("UPnP")
            && matches!(self.version.as_str(), "1.0" | "1.1")
    }
}

impl fmt::Display for ProductToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.product, self.version)
    }
}

/// L'en-tête `SERVER` analysé.
#[derive(Debug, Clone)]
pub struct ProductTokens {
    tokens: Vec<ProductToken>,
    original: String,
}

impl ProductTokens {
    /// Analyse tolérante : ne retourne jamais d'erreur, [`is_valid`](Self::is_valid)
    /// indique si un jeton UPnP exploitable a été trouvé.
    pub fn parse(s: &str) -> Self {
        let original = s.trim().to_string();

        // 1. Grammaire nominale, délimitée par des espaces.
        if let Some(tokens) = Self::split_tokens(&original) {
            return Self { tokens, original };
        }

        // 2. Délimiteur virgule (non standard mais répandu).
        let decommaed = original.replace(',', " ");
        if let Some(tokens) = Self::split_tokens(&decommaed) {
            return Self { tokens, original };
        }

        // 3. Dernier recours : récupérer le seul jeton UPnP/x.y.
        let tokens = Self::scan_upnp_token(&original)
            .map(|t| vec![t])
            .unwrap_or_default();

        Self { tokens, original }
    }

    fn split_tokens(s: &str) -> Option<Vec<ProductToken>> {
        let mut tokens = Vec::new();
        for word in s.split_whitespace() {
            tokens.push(ProductToken::parse(word)?);
        }
        if tokens.is_empty() {
            return None;
        }
        Some(tokens)
    }

    fn scan_upnp_token(s: &str) -> Option<ProductToken> {
        for (idx, _) in s.match_indices("UPnP/") {
            // Le jeton doit commencer en début de chaîne ou après un séparateur.
            if idx > 0 {
                let prev = s[..idx].chars().next_back().unwrap_or(' ');
                if !prev.is_whitespace() && prev != ',' {
                    continue;
                }
            }
            let version: String = s[idx + "UPnP/".len()..]
                .chars()
                .take_while(|c| !c.is_whitespace() && *c != ',')
                .collect();
            if !version.is_empty() {
                return Some(ProductToken {
                    product: "UPnP".to_string(),
                    version,
                });
            }
        }
        None
    }

    /// Le jeton UPnP, s'il est présent.
    pub fn upnp_token(&self) -> Option<&ProductToken> {
        self.tokens
            .iter()
            .find(|t| t.product.eq_ignore_ascii_case("UPnP"))
    }

    /// Vrai si un jeton UPnP de version 1.0 ou 1.1 a été trouvé.
    pub fn is_valid(&self) -> bool {
        self.upnp_token()
            .map(|t| t.is_valid_upnp_token())
            .unwrap_or(false)
    }

    pub fn tokens(&self) -> &[ProductToken] {
        &self.tokens
    }

    /// La chaîne reçue, telle quelle.
    pub fn original(&self) -> &str {
        &self.original
    }
}

/// Jeton de produit émis dans tous les en-têtes `SERVER` / `USER-AGENT`
/// sortants.
pub fn server_token() -> String {
    format!(
        "{}/1.0 UPnP/1.1 upnpcore/{}",
        std::env::consts::OS,
        env!("CARGO_PKG_VERSION")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nominal_grammar() {
        let t = ProductTokens::parse("Linux/5.15 UPnP/1.1 upnpcore/0.3.0");
        assert!(t.is_valid());
        assert_eq!(t.tokens().len(), 3);
        assert_eq!(t.upnp_token().unwrap().version, "1.1");
    }

    #[test]
    fn test_comma_delimited_tokens() {
        // Délimiteur non standard, vu sur le terrain.
        let t = ProductTokens::parse("Linux/5.15, UPnP/1.0, MediaServer/2");
        assert!(t.is_valid());
        assert_eq!(t.upnp_token().unwrap().version, "1.0");
    }

    #[test]
    fn test_scan_recovers_lone_upnp_token() {
        let t = ProductTokens::parse("some broken header UPnP/1.1 here");
        assert!(t.is_valid());
    }

    #[test]
    fn test_invalid_version_is_rejected() {
        let t = ProductTokens::parse("Linux/5.15 UPnP/2.0 vendor/1");
        assert!(t.upnp_token().is_some());
        assert!(!t.is_valid());
    }

    #[test]
    fn test_garbage_has_no_tokens() {
        let t = ProductTokens::parse("no tokens at all");
        assert!(t.upnp_token().is_none());
        assert!(!t.is_valid());
    }

    #[test]
    fn test_emitted_token_is_valid() {
        assert!(ProductTokens::parse(&server_token()).is_valid());
    }
}
