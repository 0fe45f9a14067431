//! Async WebSocket (RFC 6455) client/server engine for the Tokio stack, with
//! optional permessage-deflate (RFC 7692) compression.
//!
//! A server is started with [`server::start_server`] and driven through the
//! resulting [`event::EventStream`]; a client is established with
//! [`client::connect_async`], which hands back a [`connection::Connection`]
//! to split into a [`split::WSReader`]/[`split::WSWriter`] pair.

pub mod aggregator;
pub mod client;
mod codec;
pub mod compression;
pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod extensions;
pub mod frame;
pub mod handshake;
mod liveness;
mod mask;
pub mod message;
pub mod proxy;
pub mod read;
mod request;
pub mod server;
pub mod split;
pub mod stream;
pub mod utils;
mod write;

pub use client::{connect_async, connect_async_with_config};
pub use config::{ClientConfig, PermessageDeflateConfig, ProxyConfig, ServerConfig, WebSocketConfig};
pub use connection::Connection;
pub use error::Error;
pub use event::{ConnectionId, Event, EventStream};
pub use frame::Role;
pub use message::Message;
pub use server::{start_server, start_server_with_config};
pub use split::{WSReader, WSWriter};
