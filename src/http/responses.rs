//! Réponses HTTP types des endpoints UPnP.
//!
//! Toutes les réponses portent `DATE` (RFC 1123) et `SERVER` (jetons de
//! produit UDA). Les codes 600–605 et 608 sont les statuts étendus des
//! faults SOAP UPnP.

use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;

use crate::types::server_token;

/// La valeur `DATE` au format RFC 1123.
pub fn http_date() -> String {
    Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn with_standard_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    if let Ok(date) = HeaderValue::from_str(&http_date()) {
        headers.insert(header::DATE, date);
    }
    if let Ok(server) = HeaderValue::from_str(&server_token()) {
        headers.insert(header::SERVER, server);
    }
    response
}

/// 200 OK avec un corps XML.
pub fn ok_xml(body: String) -> Response {
    with_standard_headers(
        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/xml; charset=\"utf-8\"")],
            body,
        )
            .into_response(),
    )
}

/// 200 OK sans corps, avec des en-têtes supplémentaires (SUBSCRIBE).
pub fn ok_with_headers(extra: &[(&'static str, String)]) -> Response {
    let mut response = StatusCode::OK.into_response();
    for (name, value) in extra {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            response.headers_mut().insert(name, value);
        }
    }
    with_standard_headers(response)
}

pub fn bad_request() -> Response {
    with_standard_headers(StatusCode::BAD_REQUEST.into_response())
}

pub fn not_found() -> Response {
    with_standard_headers(StatusCode::NOT_FOUND.into_response())
}

pub fn method_not_allowed() -> Response {
    with_standard_headers(StatusCode::METHOD_NOT_ALLOWED.into_response())
}

pub fn precondition_failed() -> Response {
    with_standard_headers(StatusCode::PRECONDITION_FAILED.into_response())
}

pub fn internal_error() -> Response {
    with_standard_headers(StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

pub fn not_implemented() -> Response {
    with_standard_headers(StatusCode::NOT_IMPLEMENTED.into_response())
}

pub fn service_unavailable() -> Response {
    with_standard_headers(StatusCode::SERVICE_UNAVAILABLE.into_response())
}

/// Réponse fault SOAP : statut HTTP du fault (401, 402, 501, 600–605, 608 ou
/// code vendor) et corps d'enveloppe fault.
pub fn soap_fault(status: u16, body: String) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    with_standard_headers(
        (
            status,
            [(header::CONTENT_TYPE, "text/xml; charset=\"utf-8\"")],
            body,
        )
            .into_response(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_headers_are_injected() {
        let response = ok_xml("<root/>".to_string());
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(header::DATE));
        assert!(response.headers().contains_key(header::SERVER));
    }

    #[test]
    fn test_extended_fault_status() {
        let response = soap_fault(601, "<fault/>".to_string());
        assert_eq!(response.status().as_u16(), 601);
    }

    #[test]
    fn test_http_date_shape() {
        let date = http_date();
        assert!(date.ends_with("GMT"));
        assert_eq!(date.split_whitespace().count(), 6);
    }
}
