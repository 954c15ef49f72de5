//! Construction des enveloppes d'invocation et de réponse.

use xmltree::{Element, EmitterConfig, XMLNode};

use super::{SOAP_ENCODING, SOAP_ENVELOPE_NS};

/// Construit l'enveloppe d'invocation d'une action.
///
/// Le corps est `<u:<Action> xmlns:u="<serviceType>">` avec un enfant par
/// argument d'entrée, dans l'ordre de déclaration.
pub fn build_action_request(
    service_type: &str,
    action: &str,
    args: &[(String, String)],
) -> String {
    let mut action_elem = Element::new(&format!("u:{}", action));
    action_elem
        .attributes
        .insert("xmlns:u".to_string(), service_type.to_string());

    append_children(&mut action_elem, args);
    wrap_in_envelope(action_elem)
}

/// Construit l'enveloppe de réponse d'une action.
///
/// Le corps est `<u:<Action>Response>` avec un enfant par argument de
/// sortie, dans l'ordre de déclaration.
pub fn build_action_response(
    service_type: &str,
    action: &str,
    outputs: &[(String, String)],
) -> String {
    let mut response_elem = Element::new(&format!("u:{}Response", action));
    response_elem
        .attributes
        .insert("xmlns:u".to_string(), service_type.to_string());

    append_children(&mut response_elem, outputs);
    wrap_in_envelope(response_elem)
}

fn append_children(parent: &mut Element, values: &[(String, String)]) {
    for (name, value) in values {
        let mut child = Element::new(name);
        child.children.push(XMLNode::Text(value.clone()));
        parent.children.push(XMLNode::Element(child));
    }
}

fn wrap_in_envelope(content: Element) -> String {
    let mut body = Element::new("s:Body");
    body.children.push(XMLNode::Element(content));

    let mut envelope = Element::new("s:Envelope");
    envelope
        .attributes
        .insert("xmlns:s".to_string(), SOAP_ENVELOPE_NS.to_string());
    envelope
        .attributes
        .insert("s:encodingStyle".to_string(), SOAP_ENCODING.to_string());
    envelope.children.push(XMLNode::Element(body));

    serialize(&envelope)
}

pub(super) fn serialize(elem: &Element) -> String {
    let config = EmitterConfig::new().perform_indent(true).indent_string("  ");

    let mut buf = Vec::new();
    if let Err(e) = elem.write_with_config(&mut buf, config) {
        // N'arrive que si l'arbre contient des noms invalides, que nous
        // construisons nous-mêmes.
        tracing::error!("Failed to serialize SOAP XML: {}", e);
        return String::new();
    }

    String::from_utf8_lossy(&buf).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soap::{parse_action_request, parse_action_response};

    #[test]
    fn test_request_round_trip() {
        let xml = build_action_request(
            "urn:schemas-upnp-org:service:AVTransport:1",
            "Seek",
            &[
                ("InstanceID".to_string(), "0".to_string()),
                ("Unit".to_string(), "REL_TIME".to_string()),
            ],
        );

        let call = parse_action_request(xml.as_bytes()).unwrap();
        assert_eq!(call.name, "Seek");
        assert_eq!(call.args.len(), 2);
        assert_eq!(call.args[0], ("InstanceID".to_string(), "0".to_string()));
    }

    #[test]
    fn test_response_round_trip() {
        let xml = build_action_response(
            "urn:schemas-upnp-org:service:RenderingControl:1",
            "GetVolume",
            &[("CurrentVolume".to_string(), "11".to_string())],
        );

        assert!(xml.contains("GetVolumeResponse"));
        let outputs = parse_action_response(xml.as_bytes(), "GetVolume").unwrap();
        assert_eq!(outputs[0].1, "11");
    }

    #[test]
    fn test_empty_response() {
        let xml = build_action_response(
            "urn:schemas-upnp-org:service:AVTransport:1",
            "Stop",
            &[],
        );
        assert!(xml.contains("StopResponse"));
    }
}
