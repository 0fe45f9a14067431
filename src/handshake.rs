//! Server-side accept handshake and client-side handshake response
//! validation, sitting between the raw HTTP exchange ([`crate::request`]) and
//! the established [`crate::connection::Connection`].

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};

use crate::config::WebSocketConfig;
use crate::error::Error;
use crate::extensions::{self, Extensions};
use crate::request::HttpRequest;
use crate::utils::generate_websocket_accept_value;

/// Outcome of a successful server-side handshake: the negotiated extensions,
/// ready to hand to the connection that will own the socket from here.
pub struct AcceptedHandshake {
    pub extensions: Option<Extensions>,
}

/// Validates an upgrade request and writes the `101 Switching Protocols`
/// response, negotiating permessage-deflate against `config` if the client
/// asked for it.
pub async fn accept<T: AsyncReadExt + AsyncWriteExt + Unpin>(
    stream: &mut T,
    config: &WebSocketConfig,
) -> Result<AcceptedHandshake, Error> {
    let request = HttpRequest::parse(stream).await?;
    validate_upgrade_request(&request)?;

    let key = request
        .header("sec-websocket-key")
        .ok_or(Error::NoSecWebsocketKey)?
        .to_string();
    let accept_value = generate_websocket_accept_value(&key);

    let client_extensions = match request.header("sec-websocket-extensions") {
        Some(header) => extensions::parse_extensions(header)?,
        None => None,
    };

    let server_extensions = config.permessage_deflate.as_ref().map(|cfg| Extensions {
        permessage_deflate: cfg.enabled,
        client_no_context_takeover: Some(cfg.client_no_context_takeover),
        server_no_context_takeover: Some(cfg.server_no_context_takeover),
        client_max_window_bits: Some(cfg.client_max_window_bits),
        server_max_window_bits: Some(cfg.server_max_window_bits),
    });

    let negotiated = extensions::merge_extensions(server_extensions, client_extensions);

    let mut response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Connection: Upgrade\r\n\
         Upgrade: websocket\r\n\
         Sec-WebSocket-Accept: {}\r\n",
        accept_value
    );
    if let Some(header) = negotiated.as_ref().and_then(extensions::build_header_value) {
        response.push_str(&format!("Sec-WebSocket-Extensions: {}\r\n", header));
    }
    response.push_str("\r\n");

    stream.write_all(response.as_bytes()).await?;

    Ok(AcceptedHandshake {
        extensions: negotiated,
    })
}

fn validate_upgrade_request(request: &HttpRequest) -> Result<(), Error> {
    if request.method != "GET" {
        return Err(Error::InvalidHTTPHandshake);
    }
    let connection_ok = request
        .header("connection")
        .map(|v| v.to_lowercase().contains("upgrade"))
        .unwrap_or(false);
    if !connection_ok {
        return Err(Error::NoConnectionHeaderPresent);
    }
    let upgrade_ok = request
        .header("upgrade")
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);
    if !upgrade_ok {
        return Err(Error::NoUpgradeHeaderPresent);
    }
    if request.header("host").is_none() {
        return Err(Error::NoHostHeaderPresent);
    }
    Ok(())
}

/// Outcome of validating the server's handshake response on the client side.
pub struct ClientHandshakeResult {
    pub extensions: Option<Extensions>,
}

/// Reads and validates the server's handshake response against the
/// `Sec-WebSocket-Key` the client sent, per RFC 6455 §4.1.
pub async fn validate_response<T: AsyncReadExt + Unpin>(
    reader: &mut BufReader<T>,
    sent_key: &str,
) -> Result<ClientHandshakeResult, Error> {
    let mut status_line = String::new();
    reader.read_line(&mut status_line).await?;
    if !status_line.contains("101") {
        return Err(Error::InvalidResponseStatus(status_line.trim().to_string()));
    }

    let mut headers = std::collections::HashMap::new();
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 || line == "\r\n" {
            break;
        }
        if let Some((key, value)) = line.split_once(':') {
            headers.insert(key.trim().to_lowercase(), value.trim().to_string());
        }
    }

    let upgraded = headers
        .get("upgrade")
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);
    if !upgraded {
        return Err(Error::NoUpgrade);
    }

    let accept = headers
        .get("sec-websocket-accept")
        .ok_or(Error::InvalidAcceptKey)?;
    let expected = generate_websocket_accept_value(sent_key);
    if accept != &expected {
        return Err(Error::InvalidAcceptKey);
    }

    let extensions = match headers.get("sec-websocket-extensions") {
        Some(header) => extensions::parse_extensions(header)?,
        None => None,
    };

    Ok(ClientHandshakeResult { extensions })
}
