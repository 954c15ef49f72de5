//! Grammaire des messages HTTP/1.1-like.
//!
//! Les datagrammes SSDP sont des messages HTTP sans corps ; cette analyse
//! leur sert de socle, et couvre aussi le framing de corps
//! (`Content-Length`, `chunked`, lecture jusqu'à la fin) pour les chemins
//! TCP bruts.

use super::HttpError;

/// Tête d'un message HTTP : ligne de départ et champs d'en-tête.
///
/// Les recherches de champs sont insensibles à la casse ; l'émission
/// conserve la casse posée par l'appelant.
#[derive(Debug, Clone)]
pub struct HttpHeader {
    start_line: String,
    fields: Vec<(String, String)>,
}

impl HttpHeader {
    pub fn new(start_line: &str) -> Self {
        Self {
            start_line: start_line.to_string(),
            fields: Vec::new(),
        }
    }

    /// Analyse la tête d'un message brut.
    ///
    /// # Returns
    ///
    /// La tête et l'offset du premier octet de corps.
    ///
    /// # Errors
    ///
    /// `MalformedMessage` si le terminateur `\r\n\r\n` manque ou si une ligne
    /// d'en-tête n'a pas de `:`.
    pub fn parse(bytes: &[u8]) -> Result<(Self, usize), HttpError> {
        let end = find_header_end(bytes)
            .ok_or_else(|| HttpError::MalformedMessage("missing header terminator".into()))?;

        let head = std::str::from_utf8(&bytes[..end])
            .map_err(|_| HttpError::MalformedMessage("header is not UTF-8".into()))?;

        let mut lines = head.split("\r\n");
        let start_line = lines
            .next()
            .filter(|l| !l.trim().is_empty())
            .ok_or_else(|| HttpError::MalformedMessage("empty start line".into()))?
            .trim()
            .to_string();

        let mut fields = Vec::new();
        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| HttpError::MalformedMessage(format!("header line without colon: '{}'", line)))?;
            fields.push((name.trim().to_string(), value.trim().to_string()));
        }

        Ok((Self { start_line, fields }, end + 4))
    }

    pub fn start_line(&self) -> &str {
        &self.start_line
    }

    /// Valeur d'un champ, nom comparé sans tenir compte de la casse.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Pose ou remplace un champ.
    pub fn set(&mut self, name: &str, value: &str) {
        if let Some(field) = self
            .fields
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            field.1 = value.to_string();
        } else {
            self.fields.push((name.to_string(), value.to_string()));
        }
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// Vrai pour une ligne de statut (`HTTP/1.x …`).
    pub fn is_response(&self) -> bool {
        self.start_line.starts_with("HTTP/")
    }

    /// Méthode d'une ligne de requête.
    pub fn method(&self) -> Option<&str> {
        if self.is_response() {
            return None;
        }
        self.start_line.split_whitespace().next()
    }

    /// Code de statut d'une ligne de réponse.
    pub fn status_code(&self) -> Option<u16> {
        if !self.is_response() {
            return None;
        }
        self.start_line
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse().ok())
    }

    /// Version HTTP (`1.0` / `1.1`), où qu'elle se trouve dans la ligne.
    pub fn http_version(&self) -> Option<&str> {
        self.start_line
            .split_whitespace()
            .find_map(|tok| tok.strip_prefix("HTTP/"))
    }

    /// Inférence keep-alive : HTTP/1.1 actif par défaut sauf
    /// `Connection: close` ; HTTP/1.0 inactif par défaut sauf
    /// `Connection: Keep-Alive`.
    pub fn keep_alive(&self) -> bool {
        let connection = self.get("Connection").map(|v| v.to_ascii_lowercase());
        match self.http_version() {
            Some("1.0") => connection.as_deref() == Some("keep-alive"),
            _ => connection.as_deref() != Some("close"),
        }
    }

    /// Émet la tête, terminée par la ligne vide.
    pub fn emit(&self) -> String {
        let mut out = String::with_capacity(128);
        out.push_str(&self.start_line);
        out.push_str("\r\n");
        for (name, value) in &self.fields {
            out.push_str(name);
            out.push_str(": ");
            out.push_str(value);
            out.push_str("\r\n");
        }
        out.push_str("\r\n");
        out
    }
}

fn find_header_end(bytes: &[u8]) -> Option<usize> {
    bytes.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Analyse un message complet : tête puis corps selon `Transfer-Encoding`
/// (chunked), `Content-Length`, ou lecture jusqu'à la fin des octets reçus.
pub fn parse_message(bytes: &[u8]) -> Result<(HttpHeader, Vec<u8>), HttpError> {
    let (header, body_start) = HttpHeader::parse(bytes)?;
    let raw_body = &bytes[body_start.min(bytes.len())..];

    let body = if header
        .get("Transfer-Encoding")
        .map(|v| v.to_ascii_lowercase().contains("chunked"))
        .unwrap_or(false)
    {
        decode_chunked(raw_body)?
    } else if let Some(len) = header.get("Content-Length") {
        let len: usize = len
            .parse()
            .map_err(|_| HttpError::MalformedMessage("bad Content-Length".into()))?;
        if raw_body.len() < len {
            return Err(HttpError::MalformedMessage("truncated body".into()));
        }
        raw_body[..len].to_vec()
    } else {
        raw_body.to_vec()
    };

    Ok((header, body))
}

/// Encode un corps en transfert chunked.
///
/// Chaque chunk est au plus `max_chunk` octets : ligne de taille en
/// hexadécimal, `\r\n`, le chunk, `\r\n` ; le flux se termine par le chunk
/// final `0\r\n\r\n`.
pub fn encode_chunked(body: &[u8], max_chunk: usize) -> Vec<u8> {
    let max_chunk = max_chunk.max(1);
    let mut out = Vec::with_capacity(body.len() + 32);

    for chunk in body.chunks(max_chunk) {
        out.extend_from_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
        out.extend_from_slice(chunk);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"0\r\n\r\n");
    out
}

/// Décode un corps en transfert chunked.
///
/// Une extension de chunk après `;` sur la ligne de taille est ignorée.
pub fn decode_chunked(mut bytes: &[u8]) -> Result<Vec<u8>, HttpError> {
    let mut out = Vec::new();

    loop {
        let line_end = bytes
            .windows(2)
            .position(|w| w == b"\r\n")
            .ok_or_else(|| HttpError::MalformedMessage("missing chunk size line".into()))?;

        let size_line = std::str::from_utf8(&bytes[..line_end])
            .map_err(|_| HttpError::MalformedMessage("chunk size is not UTF-8".into()))?;
        let size_str = size_line.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_str, 16)
            .map_err(|_| HttpError::MalformedMessage(format!("bad chunk size '{}'", size_str)))?;

        bytes = &bytes[line_end + 2..];

        if size == 0 {
            return Ok(out);
        }

        if bytes.len() < size + 2 {
            return Err(HttpError::MalformedMessage("truncated chunk".into()));
        }
        out.extend_from_slice(&bytes[..size]);
        if &bytes[size..size + 2] != b"\r\n" {
            return Err(HttpError::MalformedMessage("chunk not CRLF-terminated".into()));
        }
        bytes = &bytes[size + 2..];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request_head() {
        let raw = b"M-SEARCH * HTTP/1.1\r\nHOST: 239.255.255.250:1900\r\nMAN: \"ssdp:discover\"\r\nMX: 2\r\nST: ssdp:all\r\n\r\n";
        let (header, body_start) = HttpHeader::parse(raw).unwrap();

        assert_eq!(header.method(), Some("M-SEARCH"));
        assert_eq!(header.get("st"), Some("ssdp:all"));
        assert_eq!(header.get("ST"), Some("ssdp:all"));
        assert_eq!(body_start, raw.len());
    }

    #[test]
    fn test_missing_terminator_is_malformed() {
        assert!(HttpHeader::parse(b"NOTIFY * HTTP/1.1\r\nNT: upnp:rootdevice\r\n").is_err());
    }

    #[test]
    fn test_keep_alive_inference() {
        let (h11, _) = HttpHeader::parse(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        assert!(h11.keep_alive());

        let (h11_close, _) =
            HttpHeader::parse(b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n").unwrap();
        assert!(!h11_close.keep_alive());

        let (h10, _) = HttpHeader::parse(b"GET / HTTP/1.0\r\n\r\n").unwrap();
        assert!(!h10.keep_alive());

        let (h10_ka, _) =
            HttpHeader::parse(b"GET / HTTP/1.0\r\nConnection: Keep-Alive\r\n\r\n").unwrap();
        assert!(h10_ka.keep_alive());
    }

    #[test]
    fn test_status_line() {
        let (resp, _) = HttpHeader::parse(b"HTTP/1.1 412 Precondition Failed\r\n\r\n").unwrap();
        assert!(resp.is_response());
        assert_eq!(resp.status_code(), Some(412));
        assert_eq!(resp.http_version(), Some("1.1"));
    }

    #[test]
    fn test_content_length_framing() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhellotrailing";
        let (_, body) = parse_message(raw).unwrap();
        assert_eq!(body, b"hello");
    }

    #[test]
    fn test_chunked_round_trip() {
        let body = b"the quick brown fox jumps over the lazy dog";
        let encoded = encode_chunked(body, 10);
        assert_eq!(decode_chunked(&encoded).unwrap(), body);
    }

    #[test]
    fn test_chunk_extension_is_ignored() {
        let encoded = b"5;ext=1\r\nhello\r\n0\r\n\r\n";
        assert_eq!(decode_chunked(encoded).unwrap(), b"hello");
    }

    #[test]
    fn test_chunked_message_framing() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n2\r\nde\r\n0\r\n\r\n";
        let (_, body) = parse_message(raw).unwrap();
        assert_eq!(body, b"abcde");
    }

    #[test]
    fn test_emit_round_trips() {
        let mut header = HttpHeader::new("NOTIFY * HTTP/1.1");
        header.set("Host", "239.255.255.250:1900");
        header.set("NT", "upnp:rootdevice");

        let emitted = header.emit();
        let (parsed, _) = HttpHeader::parse(emitted.as_bytes()).unwrap();
        assert_eq!(parsed.get("nt"), Some("upnp:rootdevice"));
    }
}
