//! # upnpcore — runtime UPnP Device Architecture (UDA 1.0/1.1)
//!
//! Cette crate permet à un processus d'agir comme :
//!
//! - **Device Host** : publication d'un ou plusieurs root devices et de leurs
//!   services sur le réseau local (annonces SSDP, description XML, contrôle
//!   SOAP, événements GENA) ;
//! - **Control Point** : découverte, inspection, invocation d'actions et
//!   réception d'événements depuis des devices distants.
//!
//! Les deux orchestrateurs ([`host::DeviceHost`] et
//! [`control_point::ControlPoint`]) possèdent chacun un moteur SSDP, un
//! serveur HTTP, un pool de clients HTTP, un gestionnaire d'abonnements et un
//! stockage de devices.

pub mod actions;
pub mod control_point;
pub mod description;
pub mod devices;
pub mod errors;
pub mod eventing;
pub mod host;
pub mod http;
pub mod services;
pub mod soap;
pub mod ssdp;
pub mod state_variables;
pub mod types;
pub mod value_ranges;
pub mod variable_types;

pub use control_point::ControlPoint;
pub use errors::{SubscriptionError, UpnpError};
pub use host::DeviceHost;
pub use types::{ResourceType, Udn};
