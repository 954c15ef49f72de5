//! Dispatch des POST de contrôle côté device host.

use std::sync::Arc;

use axum::response::Response;
use tracing::{info, warn};

use super::{build_action_response, build_fault, parse_action_request};
use crate::actions::ActionError;
use crate::http::responses;
use crate::services::Service;

/// Traite un POST reçu sur l'URL de contrôle d'un service.
///
/// Enveloppe analysée → action localisée par nom → entrées validées contre
/// le SCPD → entité invocable exécutée → sorties sérialisées dans
/// `<u:<Action>Response>`. Toute erreur d'action devient un fault SOAP avec
/// le statut HTTP de la table d'erreurs.
pub async fn handle_control_request(service: Arc<Service>, body: &[u8]) -> Response {
    let call = match parse_action_request(body) {
        Ok(call) => call,
        Err(e) => {
            warn!("❌ Unparseable control request: {}", e);
            return responses::bad_request();
        }
    };

    info!(
        "📡 SOAP control: {} on {}",
        call.name,
        service.short_id()
    );

    match service.invoke(&call.name, &call.args).await {
        Ok(outputs) => {
            let serialized: Vec<(String, String)> = outputs
                .into_iter()
                .map(|(name, value)| (name, value.to_upnp_string()))
                .collect();
            let envelope = build_action_response(
                &service.service_type().to_string(),
                &call.name,
                &serialized,
            );
            responses::ok_xml(envelope)
        }
        Err(error) => fault_response(&call.name, error),
    }
}

fn fault_response(action: &str, error: ActionError) -> Response {
    warn!("❌ Action {} failed: {}", action, error);
    responses::soap_fault(error.http_status(), build_fault(&error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{Action, Argument, Direction};
    use crate::services::ServiceUrls;
    use crate::state_variables::StateVariable;
    use crate::value_ranges::ValueRange;
    use crate::variable_types::{Value, VarType};

    fn service_with_set() -> Arc<Service> {
        let set = Action::new(
            "Set",
            vec![Argument::new("Value", Direction::In, "Level")],
        )
        .unwrap();

        let svc = Service::build(
            "urn:upnp-org:serviceId:Dimmer",
            "urn:schemas-upnp-org:service:Dimmer:1".parse().unwrap(),
            ServiceUrls {
                scpd: "/d/scpd.xml".into(),
                control: "/d/control".into(),
                event_sub: "/d/event".into(),
            },
            vec![set],
            vec![StateVariable::new("Level", VarType::Ui1).with_range(
                ValueRange::from_strings(VarType::Ui1, "0", "100", Some("1")).unwrap(),
            )],
        )
        .unwrap();

        svc.set_action_handler(
            "Set",
            Arc::new(|inputs| {
                Box::pin(async move {
                    assert!(matches!(inputs.get("Value"), Some(Value::Ui1(_))));
                    Ok(vec![])
                })
            }),
        )
        .unwrap();

        svc
    }

    fn request(value: &str) -> String {
        format!(
            r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <u:Set xmlns:u="urn:schemas-upnp-org:service:Dimmer:1">
      <Value>{}</Value>
    </u:Set>
  </s:Body>
</s:Envelope>"#,
            value
        )
    }

    #[tokio::test]
    async fn test_valid_invocation_returns_200() {
        let svc = service_with_set();
        let response = handle_control_request(svc, request("50").as_bytes()).await;
        assert_eq!(response.status().as_u16(), 200);
    }

    #[tokio::test]
    async fn test_out_of_range_returns_601_fault() {
        let svc = service_with_set();
        let response = handle_control_request(svc, request("150").as_bytes()).await;
        assert_eq!(response.status().as_u16(), 601);
    }

    #[tokio::test]
    async fn test_garbage_body_returns_400() {
        let svc = service_with_set();
        let response = handle_control_request(svc, b"not xml at all").await;
        assert_eq!(response.status().as_u16(), 400);
    }
}
