//! Émission des documents de description depuis le modèle (device host).

use xmltree::{Element, EmitterConfig, XMLNode};

use super::{DEVICE_NS, SERVICE_NS};
use crate::devices::Device;
use crate::services::Service;
use crate::state_variables::EventingMode;

/// Le document `description.xml` d'un arbre de devices.
pub fn description_document(device: &Device) -> String {
    let mut root = Element::new("root");
    root.attributes
        .insert("xmlns".to_string(), DEVICE_NS.to_string());

    root.children.push(XMLNode::Element(spec_version()));
    root.children.push(XMLNode::Element(device_element(device)));

    serialize(&root)
}

fn device_element(device: &Device) -> Element {
    let mut elem = Element::new("device");
    let info = device.info();

    push_text(&mut elem, "deviceType", &info.device_type.to_string());
    push_text(&mut elem, "friendlyName", &info.friendly_name);
    push_text(&mut elem, "manufacturer", &info.manufacturer);
    push_opt(&mut elem, "manufacturerURL", &info.manufacturer_url);
    push_opt(&mut elem, "modelDescription", &info.model_description);
    push_text(&mut elem, "modelName", &info.model_name);
    push_opt(&mut elem, "modelNumber", &info.model_number);
    push_opt(&mut elem, "modelURL", &info.model_url);
    push_opt(&mut elem, "serialNumber", &info.serial_number);
    push_text(&mut elem, "UDN", device.udn().as_str());
    push_opt(&mut elem, "UPC", &info.upc);

    if !device.icons().is_empty() {
        let mut icon_list = Element::new("iconList");
        for icon in device.icons() {
            let mut icon_elem = Element::new("icon");
            push_text(&mut icon_elem, "mimetype", &icon.mimetype);
            push_text(&mut icon_elem, "width", &icon.width.to_string());
            push_text(&mut icon_elem, "height", &icon.height.to_string());
            push_text(&mut icon_elem, "depth", &icon.depth.to_string());
            push_text(&mut icon_elem, "url", &icon.url);
            icon_list.children.push(XMLNode::Element(icon_elem));
        }
        elem.children.push(XMLNode::Element(icon_list));
    }

    if !device.services().is_empty() {
        let mut service_list = Element::new("serviceList");
        for service in device.services() {
            service_list
                .children
                .push(XMLNode::Element(service_element(service)));
        }
        elem.children.push(XMLNode::Element(service_list));
    }

    if !device.embedded().is_empty() {
        let mut device_list = Element::new("deviceList");
        for child in device.embedded() {
            device_list.children.push(XMLNode::Element(device_element(child)));
        }
        elem.children.push(XMLNode::Element(device_list));
    }

    push_opt(&mut elem, "presentationURL", &info.presentation_url);

    elem
}

fn service_element(service: &Service) -> Element {
    let mut elem = Element::new("service");
    let urls = service.urls();

    push_text(&mut elem, "serviceType", &service.service_type().to_string());
    push_text(&mut elem, "serviceId", service.id());
    push_text(&mut elem, "SCPDURL", &urls.scpd);
    push_text(&mut elem, "controlURL", &urls.control);
    push_text(&mut elem, "eventSubURL", &urls.event_sub);

    elem
}

/// Le document `scpd.xml` d'un service.
pub fn scpd_document(service: &Service) -> String {
    let mut root = Element::new("scpd");
    root.attributes
        .insert("xmlns".to_string(), SERVICE_NS.to_string());

    root.children.push(XMLNode::Element(spec_version()));

    if !service.actions().is_empty() {
        let mut action_list = Element::new("actionList");
        for action in service.actions() {
            let mut action_elem = Element::new("action");
            push_text(&mut action_elem, "name", action.name());

            if !action.arguments().is_empty() {
                let mut arg_list = Element::new("argumentList");
                for arg in action.arguments() {
                    let mut arg_elem = Element::new("argument");
                    push_text(&mut arg_elem, "name", arg.name());
                    push_text(
                        &mut arg_elem,
                        "direction",
                        match arg.direction() {
                            crate::actions::Direction::In => "in",
                            crate::actions::Direction::Out => "out",
                        },
                    );
                    if arg.is_retval() {
                        arg_elem.children.push(XMLNode::Element(Element::new("retval")));
                    }
                    push_text(
                        &mut arg_elem,
                        "relatedStateVariable",
                        arg.related_state_variable(),
                    );
                    arg_list.children.push(XMLNode::Element(arg_elem));
                }
                action_elem.children.push(XMLNode::Element(arg_list));
            }

            action_list.children.push(XMLNode::Element(action_elem));
        }
        root.children.push(XMLNode::Element(action_list));
    }

    if !service.variables().is_empty() {
        let mut table = Element::new("serviceStateTable");
        for variable in service.variables() {
            let def = variable.definition();
            let mut var_elem = Element::new("stateVariable");
            var_elem.attributes.insert(
                "sendEvents".to_string(),
                if def.is_evented() { "yes" } else { "no" }.to_string(),
            );
            if def.eventing() == EventingMode::Multicast {
                var_elem
                    .attributes
                    .insert("multicast".to_string(), "yes".to_string());
            }

            push_text(&mut var_elem, "name", def.name());
            push_text(&mut var_elem, "dataType", def.var_type().name());

            if let Some(default) = def.default_value() {
                push_text(&mut var_elem, "defaultValue", &default.to_upnp_string());
            }

            if let Some(list) = def.allowed_values() {
                let mut list_elem = Element::new("allowedValueList");
                for value in list.values() {
                    push_text(&mut list_elem, "allowedValue", value);
                }
                var_elem.children.push(XMLNode::Element(list_elem));
            }

            if let Some(range) = def.range() {
                let mut range_elem = Element::new("allowedValueRange");
                push_text(&mut range_elem, "minimum", &range.min().to_upnp_string());
                push_text(&mut range_elem, "maximum", &range.max().to_upnp_string());
                if let Some(step) = range.step() {
                    push_text(&mut range_elem, "step", &step.to_upnp_string());
                }
                var_elem.children.push(XMLNode::Element(range_elem));
            }

            table.children.push(XMLNode::Element(var_elem));
        }
        root.children.push(XMLNode::Element(table));
    }

    serialize(&root)
}

fn spec_version() -> Element {
    let mut spec = Element::new("specVersion");
    push_text(&mut spec, "major", "1");
    push_text(&mut spec, "minor", "1");
    spec
}

fn push_text(parent: &mut Element, name: &str, value: &str) {
    let mut child = Element::new(name);
    child.children.push(XMLNode::Text(value.to_string()));
    parent.children.push(XMLNode::Element(child));
}

fn push_opt(parent: &mut Element, name: &str, value: &Option<String>) {
    if let Some(value) = value {
        push_text(parent, name, value);
    }
}

fn serialize(elem: &Element) -> String {
    let config = EmitterConfig::new().perform_indent(true).indent_string("  ");

    let mut buf = Vec::new();
    if let Err(e) = elem.write_with_config(&mut buf, config) {
        tracing::error!("Failed to serialize description XML: {}", e);
        return String::new();
    }

    let mut xml = String::from_utf8_lossy(&buf).to_string();
    if !xml.starts_with("<?xml") {
        xml.insert_str(0, "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    }
    xml
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::description::{parse_device_description, parse_scpd};
    use crate::types::ValidationLevel;

    #[test]
    fn test_description_round_trip() {
        let xml = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <device>
    <deviceType>urn:schemas-upnp-org:device:Basic:1</deviceType>
    <friendlyName>Round Trip</friendlyName>
    <manufacturer>PMO Project</manufacturer>
    <modelName>RT</modelName>
    <UDN>uuid:11111111-2222-3333-4444-555555555555</UDN>
  </device>
</root>"#;
        let base = url::Url::parse("http://192.168.1.2:8080/").unwrap();
        let desc =
            parse_device_description(xml.as_bytes(), &base, ValidationLevel::Strict).unwrap();
        let device =
            super::super::build_device(&desc, &std::collections::HashMap::new()).unwrap();

        let emitted = description_document(&device);
        let reparsed =
            parse_device_description(emitted.as_bytes(), &base, ValidationLevel::Strict)
                .unwrap();
        assert_eq!(reparsed.root.info.friendly_name, "Round Trip");
        assert_eq!(reparsed.root.udn, desc.root.udn);
    }

    #[test]
    fn test_scpd_round_trip() {
        let scpd_xml = r#"<scpd xmlns="urn:schemas-upnp-org:service-1-0">
  <actionList>
    <action>
      <name>SetLevel</name>
      <argumentList>
        <argument>
          <name>NewLevel</name>
          <direction>in</direction>
          <relatedStateVariable>Level</relatedStateVariable>
        </argument>
      </argumentList>
    </action>
  </actionList>
  <serviceStateTable>
    <stateVariable sendEvents="yes">
      <name>Level</name>
      <dataType>ui1</dataType>
      <defaultValue>0</defaultValue>
      <allowedValueRange><minimum>0</minimum><maximum>100</maximum><step>1</step></allowedValueRange>
    </stateVariable>
  </serviceStateTable>
</scpd>"#;
        let scpd = parse_scpd(scpd_xml.as_bytes()).unwrap();

        let service = crate::services::Service::build(
            "urn:upnp-org:serviceId:Dimming",
            "urn:schemas-upnp-org:service:Dimming:1".parse().unwrap(),
            crate::services::ServiceUrls {
                scpd: "/x/scpd.xml".into(),
                control: "/x/control".into(),
                event_sub: "/x/event".into(),
            },
            scpd.actions,
            scpd.variables,
        )
        .unwrap();

        let emitted = scpd_document(&service);
        let reparsed = parse_scpd(emitted.as_bytes()).unwrap();
        assert_eq!(reparsed.actions.len(), 1);
        assert_eq!(reparsed.variables.len(), 1);
        assert!(reparsed.variables[0].range().is_some());
    }
}
