//! Couche SOAP 1.1 du contrôle UPnP.
//!
//! Côté control point : construction d'enveloppes d'invocation et analyse
//! des réponses et des faults. Côté device host : dispatch des POST reçus
//! sur les URL de contrôle vers les actions des services.

mod builder;
mod client;
mod dispatch;
mod envelope;
mod fault;
mod parser;

pub use builder::{build_action_request, build_action_response};
pub use client::{invoke_action, invoke_action_typed};
pub use dispatch::handle_control_request;
pub use envelope::{parse_envelope, SoapBody, SoapEnvelope};
pub use fault::build_fault;
pub use parser::{parse_action_request, parse_action_response, parse_fault, SoapActionCall};

use thiserror::Error;

/// Namespace de l'enveloppe SOAP 1.1.
pub const SOAP_ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// Style d'encodage SOAP 1.1.
pub const SOAP_ENCODING: &str = "http://schemas.xmlsoap.org/soap/encoding/";

/// Namespace du détail d'erreur UPnP.
pub const UPNP_CONTROL_NS: &str = "urn:schemas-upnp-org:control-1-0";

/// Erreur d'analyse SOAP.
#[derive(Debug, Clone, Error)]
pub enum SoapParseError {
    #[error("XML parse error: {0}")]
    Xml(String),

    #[error("missing SOAP Envelope")]
    MissingEnvelope,

    #[error("missing SOAP Body")]
    MissingBody,

    #[error("no action element in SOAP Body")]
    NoAction,
}

impl From<xmltree::ParseError> for SoapParseError {
    fn from(e: xmltree::ParseError) -> Self {
        SoapParseError::Xml(e.to_string())
    }
}
