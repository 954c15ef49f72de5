//! Descriptions de devices et de services (SCPD).
//!
//! L'analyse produit le graphe du modèle (§ devices/services) depuis les
//! documents XML ; la construction émet ces mêmes documents depuis le
//! modèle, pour le device host. La récupération des documents et des icônes
//! passe par des capacités enfichables ([`DescriptionFetcher`],
//! [`IconFetcher`]).

mod builder;
mod device_parser;
mod errors;
mod fetch;
mod scpd_parser;

pub use builder::{description_document, scpd_document};
pub use device_parser::{
    build_device, compose_location, parse_device_description, DeviceDescription, DeviceNode,
    ServiceStub,
};
pub use errors::{DescriptionError, IconFetchError};
pub use fetch::{DescriptionFetcher, HttpFetcher, IconFetcher};
pub use scpd_parser::{parse_scpd, Scpd};

/// Namespace des descriptions de devices.
pub const DEVICE_NS: &str = "urn:schemas-upnp-org:device-1-0";

/// Namespace des SCPD.
pub const SERVICE_NS: &str = "urn:schemas-upnp-org:service-1-0";
