//! Analyse des invocations, réponses et faults SOAP.

use xmltree::Element;

use super::{parse_envelope, SoapParseError};
use crate::actions::ActionError;

/// Invocation d'action extraite d'une enveloppe SOAP.
///
/// Les arguments sont conservés dans l'ordre du document : l'UDA impose
/// l'ordre de déclaration du SCPD dans les deux sens.
#[derive(Debug, Clone)]
pub struct SoapActionCall {
    pub name: String,
    pub namespace: Option<String>,
    pub args: Vec<(String, String)>,
}

/// Analyse le POST reçu sur une URL de contrôle.
pub fn parse_action_request(xml: &[u8]) -> Result<SoapActionCall, SoapParseError> {
    let envelope = parse_envelope(xml)?;

    let action_elem = envelope
        .body
        .content
        .children
        .iter()
        .find_map(|n| n.as_element())
        .ok_or(SoapParseError::NoAction)?;

    Ok(SoapActionCall {
        name: action_elem.name.clone(),
        namespace: action_elem.namespace.clone(),
        args: child_values(action_elem),
    })
}

/// Analyse une réponse 200 : extrait les arguments de sortie de
/// `<u:<Action>Response>`, dans l'ordre du document.
pub fn parse_action_response(
    xml: &[u8],
    action: &str,
) -> Result<Vec<(String, String)>, SoapParseError> {
    let envelope = parse_envelope(xml)?;
    let expected = format!("{}Response", action);

    let response_elem = envelope
        .body
        .content
        .children
        .iter()
        .find_map(|n| n.as_element().filter(|e| e.name == expected))
        .ok_or(SoapParseError::NoAction)?;

    Ok(child_values(response_elem))
}

/// Extrait le fault UPnP d'une réponse d'erreur, s'il y en a un.
pub fn parse_fault(xml: &[u8]) -> Option<ActionError> {
    let envelope = parse_envelope(xml).ok()?;

    let fault = envelope
        .body
        .content
        .children
        .iter()
        .find_map(|n| n.as_element().filter(|e| e.name.ends_with("Fault")))?;

    let upnp_error = find_descendant(fault, "UPnPError")?;
    let code: u32 = upnp_error
        .get_child("errorCode")
        .and_then(|e| e.get_text())
        .and_then(|t| t.trim().parse().ok())?;
    let description = upnp_error
        .get_child("errorDescription")
        .and_then(|e| e.get_text())
        .map(|t| t.trim().to_string())
        .unwrap_or_default();

    Some(ActionError { code, description })
}

fn child_values(elem: &Element) -> Vec<(String, String)> {
    elem.children
        .iter()
        .filter_map(|n| n.as_element())
        .map(|e| {
            (
                e.name.clone(),
                e.get_text().map(|t| t.to_string()).unwrap_or_default(),
            )
        })
        .collect()
}

fn find_descendant<'a>(elem: &'a Element, name: &str) -> Option<&'a Element> {
    for child in elem.children.iter().filter_map(|n| n.as_element()) {
        if child.name == name {
            return Some(child);
        }
        if let Some(found) = find_descendant(child, name) {
            return Some(found);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_action_keeps_argument_order() {
        let xml = r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <u:Seek xmlns:u="urn:schemas-upnp-org:service:AVTransport:1">
      <InstanceID>0</InstanceID>
      <Unit>REL_TIME</Unit>
      <Target>00:01:00</Target>
    </u:Seek>
  </s:Body>
</s:Envelope>"#;

        let call = parse_action_request(xml.as_bytes()).unwrap();
        assert_eq!(call.name, "Seek");
        assert_eq!(
            call.namespace.as_deref(),
            Some("urn:schemas-upnp-org:service:AVTransport:1")
        );
        let names: Vec<_> = call.args.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["InstanceID", "Unit", "Target"]);
    }

    #[test]
    fn test_parse_response_outputs() {
        let xml = r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <u:GetVolumeResponse xmlns:u="urn:schemas-upnp-org:service:RenderingControl:1">
      <CurrentVolume>42</CurrentVolume>
    </u:GetVolumeResponse>
  </s:Body>
</s:Envelope>"#;

        let outputs = parse_action_response(xml.as_bytes(), "GetVolume").unwrap();
        assert_eq!(outputs, vec![("CurrentVolume".to_string(), "42".to_string())]);
    }

    #[test]
    fn test_parse_fault() {
        let xml = r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <s:Fault>
      <faultcode>s:Client</faultcode>
      <faultstring>UPnPError</faultstring>
      <detail>
        <UPnPError xmlns="urn:schemas-upnp-org:control-1-0">
          <errorCode>601</errorCode>
          <errorDescription>Argument Value Out of Range</errorDescription>
        </UPnPError>
      </detail>
    </s:Fault>
  </s:Body>
</s:Envelope>"#;

        let fault = parse_fault(xml.as_bytes()).unwrap();
        assert_eq!(fault.code, 601);
        assert_eq!(fault.description, "Argument Value Out of Range");
    }

    #[test]
    fn test_empty_body_has_no_action() {
        let xml = r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Body/></s:Envelope>"#;
        assert!(parse_action_request(xml.as_bytes()).is_err());
    }
}
