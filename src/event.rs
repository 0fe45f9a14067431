//! The event stream a server hands back per accepted connection, and the
//! per-connection identifier used to correlate events across the channel.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use rand::Rng;
use tokio::sync::mpsc::Receiver;
use uuid::Uuid;

use crate::error::Error;
use crate::message::Message;
use crate::split::WSWriter;

pub type ConnectionId = Uuid;

/// Generates a fresh connection identifier, one per accepted client.
pub fn generate_connection_id() -> ConnectionId {
    let bytes = rand::thread_rng().gen::<[u8; 16]>();
    Uuid::new_v8(bytes)
}

/// Every event a connection can report back to the owner through its
/// [`EventStream`], realizing a single immutable handler surface instead of
/// mutable per-kind callback slots.
pub enum Event {
    NewClient(ConnectionId, WSWriter),
    NewMessage(ConnectionId, Message),
    Ping(ConnectionId, Vec<u8>),
    Pong(ConnectionId, Vec<u8>),
    Disconnect(ConnectionId),
    Error(ConnectionId, Box<Error>),
}

/// Wraps the `mpsc` receiver side of a connection's event channel as a
/// `Stream`, so callers can `while let Some(event) = events.next().await`
/// instead of interacting with the channel directly.
pub struct EventStream {
    receiver: Receiver<Event>,
}

impl EventStream {
    pub fn new(receiver: Receiver<Event>) -> Self {
        Self { receiver }
    }
}

impl Stream for EventStream {
    type Item = Event;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        Pin::new(&mut this.receiver).poll_recv(cx)
    }
}
