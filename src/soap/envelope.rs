//! Enveloppe SOAP.

use std::io::BufReader;

use xmltree::Element;

use super::SoapParseError;

/// Corps d'une enveloppe SOAP.
#[derive(Debug, Clone)]
pub struct SoapBody {
    pub content: Element,
}

/// Enveloppe SOAP analysée.
#[derive(Debug, Clone)]
pub struct SoapEnvelope {
    pub body: SoapBody,
}

/// Analyse une enveloppe SOAP complète.
pub fn parse_envelope(xml: &[u8]) -> Result<SoapEnvelope, SoapParseError> {
    let reader = BufReader::new(xml);
    let root = Element::parse(reader)?;

    if !root.name.ends_with("Envelope") {
        return Err(SoapParseError::MissingEnvelope);
    }

    let body = root
        .get_child("Body")
        .or_else(|| {
            root.children
                .iter()
                .find_map(|n| n.as_element().filter(|e| e.name.ends_with("Body")))
        })
        .ok_or(SoapParseError::MissingBody)?;

    Ok(SoapEnvelope {
        body: SoapBody {
            content: body.clone(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_envelope() {
        let xml = r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body/>
</s:Envelope>"#;
        assert!(parse_envelope(xml.as_bytes()).is_ok());
    }

    #[test]
    fn test_missing_body_is_rejected() {
        let xml = r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"/>"#;
        assert!(matches!(
            parse_envelope(xml.as_bytes()),
            Err(SoapParseError::MissingBody)
        ));
    }

    #[test]
    fn test_non_envelope_is_rejected() {
        assert!(matches!(
            parse_envelope(b"<root/>"),
            Err(SoapParseError::MissingEnvelope)
        ));
    }
}
