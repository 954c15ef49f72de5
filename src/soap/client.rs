//! Invocation d'actions côté control point.

use std::time::Duration;

use reqwest::Method;
use tracing::debug;
use url::Url;

use super::{build_action_request, parse_action_response, parse_fault};
use crate::actions::Action;
use crate::errors::UpnpError;
use crate::http::HttpClient;
use crate::variable_types::Value;

/// Fenêtre réseau d'une invocation.
const INVOKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Invoque une action d'un service distant.
///
/// Les entrées sont sérialisées dans l'ordre de déclaration du SCPD ; les
/// sorties reviennent dans l'ordre du document, en forme texte
/// ([`invoke_action_typed`] les coerce vers les types des variables liées).
///
/// # Errors
///
/// - [`UpnpError::Action`] pour un fault SOAP (`errorCode`,
///   `errorDescription`) ;
/// - [`UpnpError::MalformedMessage`] si la réponse ne s'analyse pas ;
/// - les erreurs de transport de [`HttpClient`].
pub async fn invoke_action(
    http: &HttpClient,
    control_url: &Url,
    service_type: &str,
    action: &Action,
    inputs: &[(String, String)],
) -> Result<Vec<(String, String)>, UpnpError> {
    // Réordonner les entrées selon la signature.
    let mut ordered = Vec::new();
    for arg in action.in_arguments() {
        let value = inputs
            .iter()
            .find(|(n, _)| n == arg.name())
            .map(|(_, v)| v.clone())
            .ok_or_else(|| {
                UpnpError::InvalidConfiguration(format!(
                    "missing input argument '{}' for action '{}'",
                    arg.name(),
                    action.name()
                ))
            })?;
        ordered.push((arg.name().to_string(), value));
    }

    let envelope = build_action_request(service_type, action.name(), &ordered);
    let soapaction = format!("\"{}#{}\"", service_type, action.name());

    debug!("📤 SOAP invoke {} on {}", action.name(), control_url);

    let response = http
        .request(
            Method::POST,
            control_url,
            &[
                ("SOAPACTION", soapaction),
                (
                    "Content-Type",
                    "text/xml; charset=\"utf-8\"".to_string(),
                ),
            ],
            Some(envelope),
            INVOKE_TIMEOUT,
        )
        .await?;

    if !response.is_success() {
        if let Some(fault) = parse_fault(&response.body) {
            return Err(UpnpError::Action(fault));
        }
        return Err(UpnpError::MalformedMessage(format!(
            "control endpoint returned HTTP {} without a UPnP fault",
            response.status
        )));
    }

    parse_action_response(&response.body, action.name())
        .map_err(|e| UpnpError::MalformedMessage(e.to_string()))
}

/// Variante typée : coerce chaque sortie vers le type de sa variable liée.
pub async fn invoke_action_typed(
    http: &HttpClient,
    control_url: &Url,
    service: &crate::services::Service,
    action_name: &str,
    inputs: &[(String, String)],
) -> Result<Vec<(String, Value)>, UpnpError> {
    let action = service
        .action(action_name)
        .ok_or_else(|| UpnpError::InvalidConfiguration(format!("unknown action '{}'", action_name)))?;

    let raw = invoke_action(
        http,
        control_url,
        &service.service_type().to_string(),
        &action,
        inputs,
    )
    .await?;

    let mut typed = Vec::with_capacity(raw.len());
    for (name, text) in raw {
        let coerced = action
            .argument(&name)
            .and_then(|arg| service.state_variable(arg.related_state_variable()))
            .and_then(|var| Value::parse(&text, var.definition().var_type()).ok())
            .unwrap_or(Value::String(text));
        typed.push((name, coerced));
    }

    Ok(typed)
}
