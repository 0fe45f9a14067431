//! HTTP/1.1 plumbing for both sides of the handshake: building the client's
//! upgrade request from a `ws`/`wss` URL, and parsing the server's view of
//! that request off the wire.

use std::collections::HashMap;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{timeout, Duration};
use url::Url;

use crate::error::Error;
use crate::extensions::{build_header_value, Extensions};

const MAX_REQUEST_HEADER_BYTES: usize = 16 * 1024;
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Parses a `ws://`/`wss://` URL and renders the client's handshake request.
/// Returns `(request, host_with_port, hostname, use_tls)`; the caller needs
/// `host_with_port` to open the TCP connection and `hostname` for TLS SNI and
/// certificate verification.
pub fn construct_http_request(
    ws_url: &str,
    key: &str,
    extensions: Option<&Extensions>,
) -> Result<(String, String, String, bool), Error> {
    let parsed_url = Url::parse(ws_url)?;

    let (default_port, use_tls) = match parsed_url.scheme() {
        "ws" => (80, false),
        "wss" => (443, true),
        _ => return Err(Error::InvalidSchemeURL),
    };

    let host = parsed_url.host_str().ok_or(Error::URLNoHost)?;
    let port = parsed_url.port().unwrap_or(default_port);

    let request_host_field = match parsed_url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };
    let host_with_port = format!("{}:{}", host, port);

    let request_path = match parsed_url.query() {
        Some(query) => format!("{}?{}", parsed_url.path(), query),
        None => parsed_url.path().to_string(),
    };

    let mut request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: Upgrade\r\nUpgrade: websocket\r\n\
         Sec-WebSocket-Key: {}\r\nSec-WebSocket-Version: 13\r\n",
        request_path, request_host_field, key,
    );

    if let Some(header) = extensions.and_then(build_header_value) {
        request.push_str(&format!("Sec-WebSocket-Extensions: {}\r\n", header));
    }
    request.push_str("\r\n");

    Ok((request, host_with_port, host.to_string(), use_tls))
}

#[derive(Debug)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(&key.to_lowercase()).map(String::as_str)
    }

    /// Reads and parses an HTTP/1.1 request off `stream`, capping the header
    /// section at [`MAX_REQUEST_HEADER_BYTES`] and the whole read at
    /// [`REQUEST_READ_TIMEOUT`] to bound a client that opens a connection and
    /// never completes the handshake.
    pub async fn parse<T: AsyncReadExt + AsyncWriteExt + Unpin>(
        stream: &mut T,
    ) -> Result<HttpRequest, Error> {
        let mut buf = BytesMut::with_capacity(4096);
        let header_end = timeout(REQUEST_READ_TIMEOUT, async {
            loop {
                if let Some(pos) = find_header_end(&buf) {
                    return Ok(pos);
                }
                if buf.len() >= MAX_REQUEST_HEADER_BYTES {
                    return Err(Error::IncompleteHTTPRequest);
                }
                let mut chunk = [0u8; 1024];
                let n = stream.read(&mut chunk).await?;
                if n == 0 {
                    return Err(Error::IncompleteHTTPRequest);
                }
                buf.extend_from_slice(&chunk[..n]);
            }
        })
        .await??;

        let mut headers = [httparse::EMPTY_HEADER; 64];
        let mut parsed = httparse::Request::new(&mut headers);
        let parse_status = parsed.parse(&buf[..header_end])?;
        if parse_status.is_partial() {
            return Err(Error::IncompleteHTTPRequest);
        }

        let method = parsed.method.ok_or(Error::InvalidHTTPHandshake)?.to_string();
        let path = parsed.path.ok_or(Error::InvalidHTTPHandshake)?.to_string();

        let mut header_map = HashMap::new();
        for header in parsed.headers.iter() {
            header_map.insert(
                header.name.to_lowercase(),
                String::from_utf8_lossy(header.value).into_owned(),
            );
        }

        let mut body = buf.split_off(header_end).to_vec();
        if let Some(content_length) = header_map.get("content-length") {
            let length: usize = content_length
                .parse()
                .map_err(|_| Error::InvalidContentLength)?;
            while body.len() < length {
                let mut chunk = vec![0u8; length - body.len()];
                let n = stream.read(&mut chunk).await?;
                if n == 0 {
                    return Err(Error::IncompleteHTTPRequest);
                }
                body.extend_from_slice(&chunk[..n]);
            }
            body.truncate(length);
        }

        Ok(HttpRequest {
            method,
            path,
            headers: header_map,
            body,
        })
    }
}

fn find_header_end(buf: &BytesMut) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|pos| pos + 4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_request_includes_key_and_version() {
        let (request, host_with_port, host, use_tls) =
            construct_http_request("ws://example.com/chat", "dGhlIHNhbXBsZSBub25jZQ==", None)
                .unwrap();

        assert!(request.starts_with("GET /chat HTTP/1.1\r\n"));
        assert!(request.contains("Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n"));
        assert!(request.ends_with("\r\n\r\n"));
        assert_eq!(host_with_port, "example.com:80");
        assert_eq!(host, "example.com");
        assert!(!use_tls);
    }

    #[test]
    fn wss_scheme_defaults_to_port_443_and_tls() {
        let (_, host_with_port, _, use_tls) =
            construct_http_request("wss://example.com/", "key", None).unwrap();
        assert_eq!(host_with_port, "example.com:443");
        assert!(use_tls);
    }

    #[test]
    fn explicit_port_overrides_scheme_default() {
        let (_, host_with_port, _, _) =
            construct_http_request("ws://example.com:9001/", "key", None).unwrap();
        assert_eq!(host_with_port, "example.com:9001");
    }

    #[test]
    fn invalid_scheme_is_rejected() {
        assert!(matches!(
            construct_http_request("http://example.com/", "key", None),
            Err(Error::InvalidSchemeURL)
        ));
    }

    #[test]
    fn client_request_carries_extension_header_when_present() {
        let extensions = Extensions {
            permessage_deflate: true,
            ..Default::default()
        };
        let (request, ..) =
            construct_http_request("ws://example.com/", "key", Some(&extensions)).unwrap();
        assert!(request.contains("Sec-WebSocket-Extensions: permessage-deflate\r\n"));
    }

    #[test]
    fn header_end_is_found_after_blank_line() {
        let buf = BytesMut::from(&b"GET / HTTP/1.1\r\nHost: x\r\n\r\nbody"[..]);
        assert_eq!(find_header_end(&buf), Some(28));
    }
}
