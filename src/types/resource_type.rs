//! Types de ressources UPnP.
//!
//! Un type de ressource est une URN de la forme
//! `urn:<domaine>:(device|service):<type>:<version>`. C'est l'identifiant
//! porté par les éléments `deviceType` et `serviceType` des descriptions, et
//! par les en-têtes `NT`/`ST` des messages SSDP.

use std::fmt;
use std::str::FromStr;

use super::TypeError;

/// Catégorie d'une URN de ressource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Device,
    Service,
}

impl ResourceKind {
    fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Device => "device",
            ResourceKind::Service => "service",
        }
    }
}

/// URN de type de device ou de service, analysée.
///
/// # Examples
///
/// ```
/// use upnpcore::types::ResourceType;
///
/// let rt: ResourceType = "urn:schemas-upnp-org:device:Basic:1".parse().unwrap();
/// assert_eq!(rt.type_name(), "Basic");
/// assert_eq!(rt.version(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceType {
    domain: String,
    kind: ResourceKind,
    type_name: String,
    version: u32,
}

impl ResourceType {
    /// Construit un type de ressource champ par champ.
    pub fn new(domain: &str, kind: ResourceKind, type_name: &str, version: u32) -> Self {
        Self {
            domain: domain.to_string(),
            kind,
            type_name: type_name.to_string(),
            version,
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Compatibilité au sens UDA : même domaine, même catégorie, même type,
    /// et version supérieure ou égale à la version demandée.
    ///
    /// Un device annonçant `…:AVTransport:2` répond donc à une recherche de
    /// `…:AVTransport:1`.
    pub fn is_compatible_with(&self, requested: &ResourceType) -> bool {
        self.domain == requested.domain
            && self.kind == requested.kind
            && self.type_name == requested.type_name
            && self.version >= requested.version
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "urn:{}:{}:{}:{}",
            self.domain,
            self.kind.as_str(),
            self.type_name,
            self.version
        )
    }
}

impl FromStr for ResourceType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || TypeError::InvalidResourceType(s.to_string());

        let mut parts = s.trim().split(':');
        if parts.next() != Some("urn") {
            return Err(err());
        }

        let domain = parts.next().filter(|d| !d.is_empty()).ok_or_else(err)?;
        let kind = match parts.next() {
            Some("device") => ResourceKind::Device,
            Some("service") => ResourceKind::Service,
            _ => return Err(err()),
        };
        let type_name = parts.next().filter(|t| !t.is_empty()).ok_or_else(err)?;
        let version: u32 = parts
            .next()
            .and_then(|v| v.parse().ok())
            .ok_or_else(err)?;

        if parts.next().is_some() {
            return Err(err());
        }

        Ok(ResourceType::new(domain, kind, type_name, version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device_type() {
        let rt: ResourceType = "urn:schemas-upnp-org:device:MediaRenderer:1"
            .parse()
            .unwrap();
        assert_eq!(rt.domain(), "schemas-upnp-org");
        assert_eq!(rt.kind(), ResourceKind::Device);
        assert_eq!(rt.type_name(), "MediaRenderer");
        assert_eq!(rt.version(), 1);
        assert_eq!(
            rt.to_string(),
            "urn:schemas-upnp-org:device:MediaRenderer:1"
        );
    }

    #[test]
    fn test_parse_vendor_service_type() {
        let rt: ResourceType = "urn:acme-com:service:Lighting:3".parse().unwrap();
        assert_eq!(rt.kind(), ResourceKind::Service);
        assert_eq!(rt.version(), 3);
    }

    #[test]
    fn test_rejects_malformed_urns() {
        assert!("urn:schemas-upnp-org:gadget:Basic:1"
            .parse::<ResourceType>()
            .is_err());
        assert!("urn:schemas-upnp-org:device:Basic".parse::<ResourceType>().is_err());
        assert!("urn:schemas-upnp-org:device:Basic:one"
            .parse::<ResourceType>()
            .is_err());
        assert!("schemas-upnp-org:device:Basic:1".parse::<ResourceType>().is_err());
    }

    #[test]
    fn test_compatibility_requires_version_at_least() {
        let v2: ResourceType = "urn:schemas-upnp-org:service:AVTransport:2"
            .parse()
            .unwrap();
        let v1: ResourceType = "urn:schemas-upnp-org:service:AVTransport:1"
            .parse()
            .unwrap();

        assert!(v2.is_compatible_with(&v1));
        assert!(!v1.is_compatible_with(&v2));
        assert!(v1.is_compatible_with(&v1));
    }
}
