//! Analyse des descriptions de devices.
//!
//! L'analyse se fait en deux temps : le document de description produit un
//! [`DeviceDescription`] intermédiaire (les services n'y sont que des
//! [`ServiceStub`] portant leurs URL) ; une fois chaque SCPD récupéré,
//! [`build_device`] assemble l'arbre final de bas en haut.

use std::collections::HashMap;
use std::io::BufReader;
use std::sync::Arc;

use tracing::warn;
use url::Url;
use xmltree::Element;

use super::{DescriptionError, Scpd, DEVICE_NS};
use crate::devices::{Device, DeviceInfo, Icon};
use crate::services::{Service, ServiceUrls};
use crate::types::{ResourceType, Udn, ValidationLevel};

/// Service déclaré dans une description, avant récupération de son SCPD.
#[derive(Debug, Clone)]
pub struct ServiceStub {
    pub id: String,
    pub service_type: ResourceType,
    /// Le `SCPDURL` tel qu'écrit dans le document (pour les résolutions
    /// hors-HTTP : fichiers locaux, documents en mémoire).
    pub scpd_path: String,
    pub scpd_url: Url,
    pub control_url: Url,
    pub event_sub_url: Url,
}

/// Nœud de device analysé.
#[derive(Debug, Clone)]
pub struct DeviceNode {
    pub udn: Udn,
    pub info: DeviceInfo,
    pub icons: Vec<Icon>,
    pub services: Vec<ServiceStub>,
    pub children: Vec<DeviceNode>,
}

impl DeviceNode {
    /// Tous les stubs de services du sous-arbre.
    pub fn all_service_stubs(&self) -> Vec<(&Udn, &ServiceStub)> {
        let mut out: Vec<(&Udn, &ServiceStub)> =
            self.services.iter().map(|s| (&self.udn, s)).collect();
        for child in &self.children {
            out.extend(child.all_service_stubs());
        }
        out
    }
}

/// Résultat de l'analyse d'un document de description.
#[derive(Debug, Clone)]
pub struct DeviceDescription {
    pub root: DeviceNode,
    pub base_url: Url,
}

/// Compose l'URL de localisation d'un device : `base + '/' + udn` quand
/// l'hôte est configuré pour suffixer l'UDN (désambiguïsation de plusieurs
/// devices derrière un même serveur).
pub fn compose_location(base_url: &Url, udn: &Udn, append_udn: bool) -> Url {
    if !append_udn {
        return base_url.clone();
    }
    let mut location = base_url.clone();
    {
        let mut path = location.path().trim_end_matches('/').to_string();
        path.push('/');
        path.push_str(udn.as_str());
        location.set_path(&path);
    }
    location
}

/// Analyse un document de description de device.
///
/// # Errors
///
/// `InvalidDeviceDescription` avec la raison et l'élément fautif : élément
/// racine inattendu, élément obligatoire absent, UDN ou type invalide, URL
/// de service non résoluble. Les violations de tailles UDA et un UPC mal
/// formé ne sont que des avertissements.
pub fn parse_device_description(
    xml: &[u8],
    base_url: &Url,
    level: ValidationLevel,
) -> Result<DeviceDescription, DescriptionError> {
    let root = Element::parse(BufReader::new(xml))
        .map_err(|e| DescriptionError::device("root", e.to_string()))?;

    if root.name != "root" {
        return Err(DescriptionError::device(
            &root.name,
            "document root element must be 'root'",
        ));
    }
    if root.namespace.as_deref() != Some(DEVICE_NS) {
        warn!(
            "❓ Device description has namespace {:?}, expected {}",
            root.namespace, DEVICE_NS
        );
    }

    // Un URLBase explicite (UDA 1.0) remplace l'URL de la description.
    let base = match child_text(&root, "URLBase") {
        Some(raw) => Url::parse(raw.trim())
            .map_err(|e| DescriptionError::device("URLBase", e.to_string()))?,
        None => base_url.clone(),
    };

    let device_elem = root
        .get_child("device")
        .ok_or_else(|| DescriptionError::device("root", "missing 'device' element"))?;

    let node = parse_device_node(device_elem, &base, level)?;

    Ok(DeviceDescription {
        root: node,
        base_url: base,
    })
}

fn parse_device_node(
    elem: &Element,
    base: &Url,
    level: ValidationLevel,
) -> Result<DeviceNode, DescriptionError> {
    let device_type: ResourceType = required_text(elem, "deviceType")?
        .parse()
        .map_err(|e| DescriptionError::device("deviceType", format!("{}", e)))?;

    let udn_text = required_text(elem, "UDN")?;
    let udn = Udn::parse(&udn_text, level)
        .map_err(|e| DescriptionError::device("UDN", format!("{}", e)))?;

    let friendly_name = required_text(elem, "friendlyName")?;
    let manufacturer = required_text(elem, "manufacturer")?;
    let model_name = required_text(elem, "modelName")?;

    // Avertissements de tailles UDA (non fatals).
    check_length("friendlyName", &friendly_name, 64);
    check_length("manufacturer", &manufacturer, 64);
    check_length("modelName", &model_name, 32);

    let model_number = child_text(elem, "modelNumber");
    let serial_number = child_text(elem, "serialNumber");
    let model_description = child_text(elem, "modelDescription");

    if let Some(v) = &model_number {
        check_length("modelNumber", v, 32);
    }
    if let Some(v) = &serial_number {
        check_length("serialNumber", v, 64);
    }
    if let Some(v) = &model_description {
        check_length("modelDescription", v, 128);
    }

    let upc = child_text(elem, "UPC");
    if let Some(upc) = &upc {
        if !upc_is_well_formed(upc) {
            warn!("❓ UPC '{}' is not a valid 12-digit code", upc);
        }
    }

    let info = DeviceInfo {
        device_type,
        friendly_name,
        manufacturer,
        manufacturer_url: child_text(elem, "manufacturerURL"),
        model_description,
        model_name,
        model_number,
        model_url: child_text(elem, "modelURL"),
        serial_number,
        upc,
        presentation_url: child_text(elem, "presentationURL"),
    };

    let icons = parse_icons(elem);
    let services = parse_service_list(elem, base)?;

    let mut children = Vec::new();
    if let Some(device_list) = elem.get_child("deviceList") {
        for child in device_list.children.iter().filter_map(|n| n.as_element()) {
            if child.name == "device" {
                children.push(parse_device_node(child, base, level)?);
            }
        }
    }

    Ok(DeviceNode {
        udn,
        info,
        icons,
        services,
        children,
    })
}

fn parse_service_list(elem: &Element, base: &Url) -> Result<Vec<ServiceStub>, DescriptionError> {
    let mut stubs = Vec::new();

    let Some(service_list) = elem.get_child("serviceList") else {
        return Ok(stubs);
    };

    for service in service_list.children.iter().filter_map(|n| n.as_element()) {
        if service.name != "service" {
            continue;
        }

        let service_type: ResourceType = required_service_text(service, "serviceType")?
            .parse()
            .map_err(|e| DescriptionError::service("serviceType", format!("{}", e)))?;
        let id = required_service_text(service, "serviceId")?;

        let scpd_path = required_service_text(service, "SCPDURL")?;
        let scpd_url = resolve(base, &scpd_path)?;
        let control_url = resolve(base, &required_service_text(service, "controlURL")?)?;
        let event_sub_url = resolve(base, &required_service_text(service, "eventSubURL")?)?;

        stubs.push(ServiceStub {
            id,
            service_type,
            scpd_path,
            scpd_url,
            control_url,
            event_sub_url,
        });
    }

    Ok(stubs)
}

fn parse_icons(elem: &Element) -> Vec<Icon> {
    let mut icons = Vec::new();

    let Some(icon_list) = elem.get_child("iconList") else {
        return icons;
    };

    for icon in icon_list.children.iter().filter_map(|n| n.as_element()) {
        if icon.name != "icon" {
            continue;
        }
        let parse_dim = |name: &str| {
            child_text(icon, name)
                .and_then(|v| v.trim().parse::<u32>().ok())
                .unwrap_or(0)
        };
        let Some(url) = child_text(icon, "url") else {
            warn!("❓ icon without url, dropped");
            continue;
        };
        icons.push(Icon {
            mimetype: child_text(icon, "mimetype").unwrap_or_default(),
            width: parse_dim("width"),
            height: parse_dim("height"),
            depth: parse_dim("depth"),
            url,
            data: None,
        });
    }

    icons
}

/// Assemble l'arbre final : chaque stub de service est complété par son SCPD
/// (indexé par URL de SCPD), les enfants d'abord.
pub fn build_device(
    description: &DeviceDescription,
    scpds: &HashMap<String, Scpd>,
) -> Result<Arc<Device>, DescriptionError> {
    build_node(&description.root, &description.base_url, scpds)
}

fn build_node(
    node: &DeviceNode,
    base: &Url,
    scpds: &HashMap<String, Scpd>,
) -> Result<Arc<Device>, DescriptionError> {
    let mut children = Vec::with_capacity(node.children.len());
    for child in &node.children {
        children.push(build_node(child, base, scpds)?);
    }

    let mut services = Vec::with_capacity(node.services.len());
    for stub in &node.services {
        let scpd = scpds.get(stub.scpd_url.as_str()).ok_or_else(|| {
            DescriptionError::service("SCPDURL", format!("no SCPD for {}", stub.scpd_url))
        })?;

        let service = Service::build(
            &stub.id,
            stub.service_type.clone(),
            ServiceUrls {
                scpd: stub.scpd_url.to_string(),
                control: stub.control_url.to_string(),
                event_sub: stub.event_sub_url.to_string(),
            },
            scpd.actions.clone(),
            scpd.variables.clone(),
        )
        .map_err(|e| DescriptionError::service(&stub.id, e.to_string()))?;

        services.push(service);
    }

    Ok(Device::assemble(
        node.udn.clone(),
        node.info.clone(),
        node.icons.clone(),
        base.clone(),
        services,
        children,
    ))
}

fn child_text(elem: &Element, name: &str) -> Option<String> {
    elem.get_child(name)
        .and_then(|e| e.get_text())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn required_text(elem: &Element, name: &str) -> Result<String, DescriptionError> {
    child_text(elem, name)
        .ok_or_else(|| DescriptionError::device(name, "mandatory element missing or empty"))
}

fn required_service_text(elem: &Element, name: &str) -> Result<String, DescriptionError> {
    child_text(elem, name)
        .ok_or_else(|| DescriptionError::service(name, "mandatory element missing or empty"))
}

fn resolve(base: &Url, relative: &str) -> Result<Url, DescriptionError> {
    base.join(relative)
        .map_err(|e| DescriptionError::service(relative, e.to_string()))
}

fn check_length(element: &str, value: &str, max: usize) {
    if value.chars().count() > max {
        warn!(
            "❓ {} exceeds the recommended {} characters ({} given)",
            element,
            max,
            value.chars().count()
        );
    }
}

/// UPC : 12 chiffres, ou 13 caractères avec un unique espace ou tiret en
/// position 6.
fn upc_is_well_formed(upc: &str) -> bool {
    let chars: Vec<char> = upc.chars().collect();
    match chars.len() {
        12 => chars.iter().all(|c| c.is_ascii_digit()),
        13 => {
            (chars[6] == ' ' || chars[6] == '-')
                && chars
                    .iter()
                    .enumerate()
                    .all(|(i, c)| i == 6 || c.is_ascii_digit())
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <specVersion><major>1</major><minor>0</minor></specVersion>
  <device>
    <deviceType>urn:schemas-upnp-org:device:Basic:1</deviceType>
    <friendlyName>Basic Test Device</friendlyName>
    <manufacturer>PMO Project</manufacturer>
    <modelName>Basic</modelName>
    <UDN>uuid:00000000-0000-0000-0000-000000000001</UDN>
    <serviceList>
      <service>
        <serviceType>urn:schemas-upnp-org:service:SwitchPower:1</serviceType>
        <serviceId>urn:upnp-org:serviceId:SwitchPower</serviceId>
        <SCPDURL>/scpd.xml</SCPDURL>
        <controlURL>/control</controlURL>
        <eventSubURL>/event</eventSubURL>
      </service>
    </serviceList>
  </device>
</root>"#;

    fn base() -> Url {
        Url::parse("http://192.168.1.20:8080/").unwrap()
    }

    #[test]
    fn test_parse_minimal_description() {
        let desc =
            parse_device_description(MINIMAL.as_bytes(), &base(), ValidationLevel::Strict)
                .unwrap();

        assert_eq!(
            desc.root.udn.as_str(),
            "uuid:00000000-0000-0000-0000-000000000001"
        );
        assert_eq!(desc.root.info.friendly_name, "Basic Test Device");
        assert_eq!(desc.root.services.len(), 1);

        let stub = &desc.root.services[0];
        assert_eq!(
            stub.scpd_url.as_str(),
            "http://192.168.1.20:8080/scpd.xml"
        );
    }

    #[test]
    fn test_missing_mandatory_element() {
        let broken = MINIMAL.replace("<friendlyName>Basic Test Device</friendlyName>", "");
        let err = parse_device_description(broken.as_bytes(), &base(), ValidationLevel::Strict)
            .unwrap_err();
        assert!(matches!(
            err,
            DescriptionError::InvalidDeviceDescription { ref element, .. } if element == "friendlyName"
        ));
    }

    #[test]
    fn test_strict_rejects_uppercase_udn() {
        let upper = MINIMAL.replace(
            "uuid:00000000-0000-0000-0000-000000000001",
            "uuid:ABCDEF00-0000-0000-0000-000000000001",
        );
        assert!(parse_device_description(upper.as_bytes(), &base(), ValidationLevel::Strict)
            .is_err());
        assert!(parse_device_description(upper.as_bytes(), &base(), ValidationLevel::Lenient)
            .is_ok());
    }

    #[test]
    fn test_missing_service_url_is_rejected() {
        let broken = MINIMAL.replace("<controlURL>/control</controlURL>", "");
        let err = parse_device_description(broken.as_bytes(), &base(), ValidationLevel::Strict)
            .unwrap_err();
        assert!(matches!(
            err,
            DescriptionError::InvalidServiceDescription { .. }
        ));
    }

    #[test]
    fn test_upc_forms() {
        assert!(upc_is_well_formed("123456789012"));
        assert!(upc_is_well_formed("123456-789012"));
        assert!(upc_is_well_formed("123456 789012"));
        assert!(!upc_is_well_formed("12345678901"));
        assert!(!upc_is_well_formed("1234567890123"));
        assert!(!upc_is_well_formed("12345x789012"));
    }

    #[test]
    fn test_compose_location_appends_udn() {
        let udn = Udn::parse(
            "uuid:00000000-0000-0000-0000-000000000001",
            ValidationLevel::Strict,
        )
        .unwrap();

        let with = compose_location(&base(), &udn, true);
        assert_eq!(
            with.as_str(),
            "http://192.168.1.20:8080/uuid:00000000-0000-0000-0000-000000000001"
        );

        let without = compose_location(&base(), &udn, false);
        assert_eq!(without.as_str(), "http://192.168.1.20:8080/");
    }
}
