//! Corps `e:propertyset` des NOTIFY.

use std::io::BufReader;

use xmltree::Element;

use crate::http::HttpError;

/// Namespace des événements GENA.
pub const EVENT_NS: &str = "urn:schemas-upnp-org:event-1-0";

/// Construit le corps d'un NOTIFY : une `e:property` par variable.
pub fn build_propertyset(pairs: &[(String, String)]) -> String {
    let mut body = format!(r#"<e:propertyset xmlns:e="{}">"#, EVENT_NS);
    for (name, value) in pairs {
        body.push_str(&format!(
            "<e:property><{0}>{1}</{0}></e:property>",
            name,
            escape(value)
        ));
    }
    body.push_str("</e:propertyset>");
    body
}

/// Analyse le corps d'un NOTIFY reçu.
pub fn parse_propertyset(xml: &[u8]) -> Result<Vec<(String, String)>, HttpError> {
    let root = Element::parse(BufReader::new(xml))
        .map_err(|e| HttpError::MalformedMessage(format!("propertyset: {}", e)))?;

    if !root.name.ends_with("propertyset") {
        return Err(HttpError::MalformedMessage(
            "NOTIFY body is not a propertyset".into(),
        ));
    }

    let mut pairs = Vec::new();
    for property in root.children.iter().filter_map(|n| n.as_element()) {
        if !property.name.ends_with("property") {
            continue;
        }
        for variable in property.children.iter().filter_map(|n| n.as_element()) {
            pairs.push((
                variable.name.clone(),
                variable
                    .get_text()
                    .map(|t| t.to_string())
                    .unwrap_or_default(),
            ));
        }
    }

    Ok(pairs)
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_propertyset_round_trip() {
        let pairs = vec![
            ("TransportState".to_string(), "PLAYING".to_string()),
            ("Volume".to_string(), "42".to_string()),
        ];
        let body = build_propertyset(&pairs);
        assert!(body.contains("e:propertyset"));

        let parsed = parse_propertyset(body.as_bytes()).unwrap();
        assert_eq!(parsed, pairs);
    }

    #[test]
    fn test_values_are_escaped() {
        let pairs = vec![("Meta".to_string(), "<DIDL-Lite & co>".to_string())];
        let body = build_propertyset(&pairs);
        let parsed = parse_propertyset(body.as_bytes()).unwrap();
        assert_eq!(parsed[0].1, "<DIDL-Lite & co>");
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(parse_propertyset(b"not xml").is_err());
        assert!(parse_propertyset(b"<other/>").is_err());
    }
}
