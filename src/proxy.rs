//! HTTP CONNECT tunneling through a forward proxy, used by the client connect
//! path before TLS or the WebSocket upgrade begins.

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::config::ProxyConfig;
use crate::error::Error;

/// Opens a TCP connection to the proxy and issues `CONNECT host:port`,
/// returning the raw stream once the proxy confirms the tunnel with a `2xx`
/// status. The caller layers TLS and the WebSocket handshake on top.
pub async fn connect_through_proxy(
    proxy: &ProxyConfig,
    target_host: &str,
    target_port: u16,
) -> Result<TcpStream, Error> {
    let mut stream = TcpStream::connect((proxy.host.as_str(), proxy.port)).await?;

    let mut request = format!(
        "CONNECT {host}:{port} HTTP/1.1\r\nHost: {host}:{port}\r\n",
        host = target_host,
        port = target_port,
    );
    if let Some(auth) = &proxy.authorization {
        request.push_str(&format!("Proxy-Authorization: {}\r\n", auth));
    }
    request.push_str("\r\n");

    stream.write_all(request.as_bytes()).await?;

    let mut reader = BufReader::new(&mut stream);
    let mut status_line = String::new();
    reader.read_line(&mut status_line).await?;

    let status_ok = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .map(|code| (200..300).contains(&code))
        .unwrap_or(false);

    if !status_ok {
        return Err(Error::ProxyConnectFailed(status_line.trim().to_string()));
    }

    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 || line == "\r\n" {
            break;
        }
    }

    Ok(stream)
}

/// Rewrites a `ws://` upgrade request's request-line into the absolute form
/// required when tunneling a plaintext connection through a proxy.
pub fn rewrite_request_line_for_proxy(request: &str, host_with_port: &str) -> String {
    let Some((first_line, rest)) = request.split_once("\r\n") else {
        return request.to_string();
    };
    let Some((method, tail)) = first_line.split_once(' ') else {
        return request.to_string();
    };
    let Some((path, version)) = tail.split_once(' ') else {
        return request.to_string();
    };

    format!(
        "{method} ws://{host_with_port}{path} {version}\r\n{rest}",
        method = method,
        host_with_port = host_with_port,
        path = path,
        version = version,
        rest = rest,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_request_line_to_absolute_form() {
        let request = "GET /chat HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let rewritten = rewrite_request_line_for_proxy(request, "example.com:80");
        assert!(rewritten.starts_with("GET ws://example.com:80/chat HTTP/1.1\r\n"));
        assert!(rewritten.contains("Host: example.com\r\n"));
    }

    #[test]
    fn malformed_request_line_is_returned_unchanged() {
        let request = "not a request";
        assert_eq!(rewrite_request_line_for_proxy(request, "example.com:80"), request);
    }
}
