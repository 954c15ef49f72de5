//! Faults SOAP UPnP.

use xmltree::{Element, XMLNode};

use super::{builder::serialize, SOAP_ENVELOPE_NS, UPNP_CONTROL_NS};
use crate::actions::ActionError;

/// Construit l'enveloppe fault d'une erreur d'action.
///
/// Le faultcode est toujours `s:Client` (UDA §3.2.2), le détail porte
/// `UPnPError/errorCode/errorDescription`.
pub fn build_fault(error: &ActionError) -> String {
    let mut fault = Element::new("s:Fault");

    let mut faultcode = Element::new("faultcode");
    faultcode
        .children
        .push(XMLNode::Text("s:Client".to_string()));
    fault.children.push(XMLNode::Element(faultcode));

    let mut faultstring = Element::new("faultstring");
    faultstring
        .children
        .push(XMLNode::Text("UPnPError".to_string()));
    fault.children.push(XMLNode::Element(faultstring));

    let mut upnp_error = Element::new("UPnPError");
    upnp_error
        .attributes
        .insert("xmlns".to_string(), UPNP_CONTROL_NS.to_string());

    let mut code = Element::new("errorCode");
    code.children.push(XMLNode::Text(error.code.to_string()));
    upnp_error.children.push(XMLNode::Element(code));

    let mut description = Element::new("errorDescription");
    description
        .children
        .push(XMLNode::Text(error.description.clone()));
    upnp_error.children.push(XMLNode::Element(description));

    let mut detail = Element::new("detail");
    detail.children.push(XMLNode::Element(upnp_error));
    fault.children.push(XMLNode::Element(detail));

    let mut body = Element::new("s:Body");
    body.children.push(XMLNode::Element(fault));

    let mut envelope = Element::new("s:Envelope");
    envelope
        .attributes
        .insert("xmlns:s".to_string(), SOAP_ENVELOPE_NS.to_string());
    envelope.children.push(XMLNode::Element(body));

    serialize(&envelope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soap::parse_fault;

    #[test]
    fn test_fault_round_trip() {
        let xml = build_fault(&ActionError::argument_value_out_of_range());

        assert!(xml.contains("<faultcode>s:Client</faultcode>"));
        assert!(xml.contains("<errorCode>601</errorCode>"));

        let parsed = parse_fault(xml.as_bytes()).unwrap();
        assert_eq!(parsed.code, 601);
        assert_eq!(parsed.description, "Argument Value Out of Range");
    }
}
