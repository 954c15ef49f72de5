//! Grammaire des datagrammes SSDP.
//!
//! Un datagramme SSDP est un message HTTP/1.1 sans corps ; l'analyse
//! s'appuie sur la grammaire de [`crate::http`]. Les messages mal formés
//! sont abandonnés silencieusement (`parse` retourne `None`).

use crate::http::{responses::http_date, HttpHeader};

use super::{multicast_target, DEFAULT_MAX_AGE};

/// Datagramme SSDP analysé.
#[derive(Debug, Clone, PartialEq)]
pub enum SsdpMessage {
    Alive {
        nt: String,
        usn: String,
        location: String,
        server: String,
        max_age: u32,
    },
    ByeBye {
        nt: String,
        usn: String,
    },
    Update {
        nt: String,
        usn: String,
        location: String,
    },
    SearchRequest {
        st: String,
        mx: u32,
    },
    SearchResponse {
        st: String,
        usn: String,
        location: String,
        server: String,
        max_age: u32,
    },
}

impl SsdpMessage {
    /// Analyse un datagramme. `None` pour tout ce qui n'est pas un message
    /// SSDP exploitable.
    pub fn parse(data: &[u8]) -> Option<SsdpMessage> {
        let (header, _) = HttpHeader::parse(data).ok()?;

        if header.is_response() {
            if header.status_code() != Some(200) {
                return None;
            }
            return Some(SsdpMessage::SearchResponse {
                st: header.get("ST")?.to_string(),
                usn: header.get("USN")?.to_string(),
                location: header.get("LOCATION")?.to_string(),
                server: header
                    .get("SERVER")
                    .unwrap_or("Unknown")
                    .to_string(),
                max_age: parse_max_age(header.get("CACHE-CONTROL")),
            });
        }

        match header.method()? {
            "NOTIFY" => Self::parse_notify(&header),
            "M-SEARCH" => Self::parse_msearch(&header),
            _ => None,
        }
    }

    fn parse_notify(header: &HttpHeader) -> Option<SsdpMessage> {
        let nts = header.get("NTS")?.to_ascii_lowercase();
        let nt = header.get("NT")?.to_string();
        let usn = header.get("USN")?.to_string();

        match nts.as_str() {
            "ssdp:alive" => Some(SsdpMessage::Alive {
                nt,
                usn,
                location: header.get("LOCATION")?.to_string(),
                server: header.get("SERVER").unwrap_or("Unknown").to_string(),
                max_age: parse_max_age(header.get("CACHE-CONTROL")),
            }),
            "ssdp:byebye" => Some(SsdpMessage::ByeBye { nt, usn }),
            "ssdp:update" => Some(SsdpMessage::Update {
                nt,
                usn,
                location: header.get("LOCATION")?.to_string(),
            }),
            _ => None,
        }
    }

    fn parse_msearch(header: &HttpHeader) -> Option<SsdpMessage> {
        // MAN est obligatoire et doit valoir "ssdp:discover", guillemets
        // compris.
        if header.get("MAN")? != "\"ssdp:discover\"" {
            return None;
        }
        let st = header.get("ST")?.to_string();
        let mx = header
            .get("MX")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(1);

        Some(SsdpMessage::SearchRequest { st, mx })
    }
}

fn parse_max_age(value: Option<&str>) -> u32 {
    let Some(value) = value else {
        return DEFAULT_MAX_AGE;
    };
    let lower = value.to_ascii_lowercase();
    let Some(idx) = lower.find("max-age") else {
        return DEFAULT_MAX_AGE;
    };

    let after = lower[idx + "max-age".len()..]
        .trim_start()
        .trim_start_matches('=')
        .trim_start();
    let digits: String = after.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(DEFAULT_MAX_AGE)
}

/// Construit un `NOTIFY … ssdp:alive`.
pub fn build_alive(nt: &str, usn: &str, location: &str, server: &str, max_age: u32) -> String {
    let mut header = HttpHeader::new("NOTIFY * HTTP/1.1");
    header.set("HOST", &multicast_target().to_string());
    header.set("CACHE-CONTROL", &format!("max-age={}", max_age));
    header.set("LOCATION", location);
    header.set("NT", nt);
    header.set("NTS", "ssdp:alive");
    header.set("SERVER", server);
    header.set("USN", usn);
    header.emit()
}

/// Construit un `NOTIFY … ssdp:byebye`.
pub fn build_byebye(nt: &str, usn: &str) -> String {
    let mut header = HttpHeader::new("NOTIFY * HTTP/1.1");
    header.set("HOST", &multicast_target().to_string());
    header.set("NT", nt);
    header.set("NTS", "ssdp:byebye");
    header.set("USN", usn);
    header.emit()
}

/// Construit un `M-SEARCH`.
pub fn build_msearch(st: &str, mx: u32, user_agent: &str) -> String {
    let mut header = HttpHeader::new("M-SEARCH * HTTP/1.1");
    header.set("HOST", &multicast_target().to_string());
    header.set("MAN", "\"ssdp:discover\"");
    header.set("MX", &mx.max(1).to_string());
    header.set("ST", st);
    header.set("USER-AGENT", user_agent);
    header.emit()
}

/// Construit la réponse unicast à un M-SEARCH.
pub fn build_search_response(
    st: &str,
    usn: &str,
    location: &str,
    server: &str,
    max_age: u32,
) -> String {
    let mut header = HttpHeader::new("HTTP/1.1 200 OK");
    header.set("CACHE-CONTROL", &format!("max-age={}", max_age));
    header.set("DATE", &http_date());
    header.set("EXT", "");
    header.set("LOCATION", location);
    header.set("SERVER", server);
    header.set("ST", st);
    header.set("USN", usn);
    header.emit()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alive_round_trip() {
        let raw = build_alive(
            "upnp:rootdevice",
            "uuid:00000000-0000-0000-0000-000000000001::upnp:rootdevice",
            "http://192.168.1.5:8080/description.xml",
            "linux/1.0 UPnP/1.1 upnpcore/0.3.0",
            30,
        );

        match SsdpMessage::parse(raw.as_bytes()).unwrap() {
            SsdpMessage::Alive {
                nt, max_age, location, ..
            } => {
                assert_eq!(nt, "upnp:rootdevice");
                assert_eq!(max_age, 30);
                assert_eq!(location, "http://192.168.1.5:8080/description.xml");
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_byebye_round_trip() {
        let raw = build_byebye("upnp:rootdevice", "uuid:x::upnp:rootdevice");
        assert!(matches!(
            SsdpMessage::parse(raw.as_bytes()),
            Some(SsdpMessage::ByeBye { .. })
        ));
    }

    #[test]
    fn test_msearch_requires_man() {
        let raw = build_msearch("ssdp:all", 2, "test UPnP/1.1");
        assert!(matches!(
            SsdpMessage::parse(raw.as_bytes()),
            Some(SsdpMessage::SearchRequest { ref st, mx: 2 }) if st == "ssdp:all"
        ));

        let without_man = raw.replace("MAN: \"ssdp:discover\"\r\n", "");
        assert_eq!(SsdpMessage::parse(without_man.as_bytes()), None);
    }

    #[test]
    fn test_search_response_round_trip() {
        let raw = build_search_response(
            "upnp:rootdevice",
            "uuid:y::upnp:rootdevice",
            "http://192.168.1.9:8080/description.xml",
            "linux/1.0 UPnP/1.1 upnpcore/0.3.0",
            1800,
        );
        assert!(matches!(
            SsdpMessage::parse(raw.as_bytes()),
            Some(SsdpMessage::SearchResponse { .. })
        ));
    }

    #[test]
    fn test_malformed_is_dropped_silently() {
        assert_eq!(SsdpMessage::parse(b"garbage"), None);
        assert_eq!(SsdpMessage::parse(b"GET / HTTP/1.1\r\n\r\n"), None);
        // NOTIFY sans NTS.
        assert_eq!(
            SsdpMessage::parse(b"NOTIFY * HTTP/1.1\r\nNT: upnp:rootdevice\r\nUSN: u\r\n\r\n"),
            None
        );
    }

    #[test]
    fn test_max_age_parsing_tolerance() {
        assert_eq!(parse_max_age(Some("max-age=120")), 120);
        assert_eq!(parse_max_age(Some("MAX-AGE = 60")), 60);
        assert_eq!(parse_max_age(Some("no-cache")), DEFAULT_MAX_AGE);
        assert_eq!(parse_max_age(None), DEFAULT_MAX_AGE);
    }
}
