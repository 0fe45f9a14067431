//! Client connect path: URL parsing, optional proxy tunneling, optional TLS,
//! the HTTP/1.1 upgrade exchange, and construction of the resulting
//! [`crate::connection::Connection`].

use std::sync::Arc;

use pki_types::ServerName;
use rustls::{ClientConfig as RustlsClientConfig, RootCertStore};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::error::Error;
use crate::extensions::Extensions;
use crate::frame::Role;
use crate::handshake::validate_response;
use crate::proxy::{connect_through_proxy, rewrite_request_line_for_proxy};
use crate::request::construct_http_request;
use crate::stream::SocketFlowStream;
use crate::utils::generate_websocket_key;

/// Connects to `ws_url`, performing the HTTP upgrade and returning an
/// established `Connection`. Honors `config`'s proxy and TLS settings.
pub async fn connect_async_with_config(
    ws_url: &str,
    config: Option<ClientConfig>,
) -> Result<Connection, Error> {
    let config = config.unwrap_or_default();
    let key = generate_websocket_key();

    let client_extensions = config.web_socket_config.permessage_deflate.as_ref().map(|cfg| Extensions {
        permessage_deflate: cfg.enabled,
        client_no_context_takeover: Some(cfg.client_no_context_takeover),
        server_no_context_takeover: Some(cfg.server_no_context_takeover),
        client_max_window_bits: Some(cfg.client_max_window_bits),
        server_max_window_bits: Some(cfg.server_max_window_bits),
    });

    let (mut request, host_with_port, hostname, use_tls) =
        construct_http_request(ws_url, &key, client_extensions.as_ref())?;

    let tcp_stream = match &config.proxy {
        Some(proxy) => {
            let (host, port) = split_host_port(&host_with_port)?;
            if !use_tls {
                request = rewrite_request_line_for_proxy(&request, &host_with_port);
            }
            connect_through_proxy(proxy, host, port).await?
        }
        None => TcpStream::connect(&host_with_port).await?,
    };

    let mut stream = if use_tls {
        let tls_config = build_client_tls_config(config.ca_file.as_deref())?;
        let connector = TlsConnector::from(Arc::new(tls_config));
        let server_name = ServerName::try_from(hostname.clone())?;
        let tls_stream = connector.connect(server_name, tcp_stream).await?;
        SocketFlowStream::ClientTls(Box::new(tls_stream))
    } else {
        SocketFlowStream::Plain(tcp_stream)
    };

    stream.write_all(request.as_bytes()).await?;

    let mut reader = BufReader::new(&mut stream);
    let handshake_result = validate_response(&mut reader, &key).await?;

    Ok(Connection::new(
        stream,
        Role::Client,
        config.web_socket_config,
        handshake_result.extensions,
    ))
}

pub async fn connect_async(ws_url: &str) -> Result<Connection, Error> {
    connect_async_with_config(ws_url, None).await
}

fn split_host_port(host_with_port: &str) -> Result<(&str, u16), Error> {
    let (host, port) = host_with_port.rsplit_once(':').ok_or(Error::URLNoPort)?;
    let port: u16 = port.parse().map_err(|_| Error::URLNoPort)?;
    Ok((host, port))
}

fn build_client_tls_config(ca_file: Option<&str>) -> Result<RustlsClientConfig, Error> {
    let mut root_store = RootCertStore::empty();

    match ca_file {
        Some(path) => {
            let pem = std::fs::read(path)?;
            let certs = rustls_pemfile::certs(&mut pem.as_slice()).collect::<Result<Vec<_>, _>>()?;
            for cert in certs {
                root_store
                    .add(cert)
                    .map_err(|err| Error::TlsConfigError(format!("invalid CA certificate: {err}")))?;
            }
        }
        None => {
            root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        }
    }

    Ok(RustlsClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_host_and_port() {
        assert_eq!(split_host_port("example.com:443").unwrap(), ("example.com", 443));
    }

    #[test]
    fn rejects_host_without_port() {
        assert!(split_host_port("example.com").is_err());
    }
}
