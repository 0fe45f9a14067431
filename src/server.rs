//! A ready-to-use WebSocket server: binds a `TcpListener`, optionally wraps
//! accepted sockets in TLS, runs the server-side upgrade, and emits one
//! `Event` per connection lifecycle transition on an `EventStream`.

use futures::StreamExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_rustls::TlsAcceptor;

use crate::config::ServerConfig;
use crate::connection::accept_async_with_config;
use crate::error::Error;
use crate::event::{generate_connection_id, Event, EventStream};
use crate::read::ReadSignal;
use crate::stream::SocketFlowStream;

const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Spawns a WebSocket server listening on `port` and returns an `EventStream`
/// the caller drives to learn about new clients, messages, and errors.
pub async fn start_server_with_config(
    port: u16,
    config: Option<ServerConfig>,
) -> Result<EventStream, std::io::Error> {
    let listener = TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let config = config.unwrap_or_default();
    let web_socket_config = config.web_socket_config;
    let tls_config = config.tls_config;

    tokio::spawn(async move {
        loop {
            let connection_id = generate_connection_id();
            let (stream, _addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    let _ = tx.send(Event::Error(connection_id, Box::new(err.into()))).await;
                    continue;
                }
            };

            let socket_stream = match &tls_config {
                Some(tls_config) => {
                    let acceptor = TlsAcceptor::from(tls_config.clone());
                    match acceptor.accept(stream).await {
                        Ok(tls_stream) => SocketFlowStream::ServerTls(Box::new(tls_stream)),
                        Err(err) => {
                            let _ = tx.send(Event::Error(connection_id, Box::new(Error::from(err)))).await;
                            continue;
                        }
                    }
                }
                None => SocketFlowStream::Plain(stream),
            };

            let connection =
                match accept_async_with_config(socket_stream, web_socket_config.clone()).await {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = tx.send(Event::Error(connection_id, Box::new(err))).await;
                        continue;
                    }
                };

            let (mut signals, writer) = connection.into_signals();
            let _ = tx.send(Event::NewClient(connection_id, writer)).await;

            let tx_task = tx.clone();
            tokio::spawn(async move {
                while let Some(signal) = signals.next().await {
                    match signal {
                        Ok(ReadSignal::Message(message)) => {
                            let _ = tx_task.send(Event::NewMessage(connection_id, message)).await;
                        }
                        Ok(ReadSignal::Ping(payload)) => {
                            let _ = tx_task.send(Event::Ping(connection_id, payload)).await;
                        }
                        Ok(ReadSignal::Pong(payload)) => {
                            let _ = tx_task.send(Event::Pong(connection_id, payload)).await;
                        }
                        Err(err) => {
                            let _ = tx_task.send(Event::Error(connection_id, Box::new(err))).await;
                            break;
                        }
                    }
                }

                let _ = tx_task.send(Event::Disconnect(connection_id)).await;
            });
        }
    });

    Ok(EventStream::new(rx))
}

pub async fn start_server(port: u16) -> Result<EventStream, std::io::Error> {
    start_server_with_config(port, None).await
}
