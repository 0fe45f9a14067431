use std::collections::HashMap;

use futures::StreamExt;
use log::*;
use tungsten_flow::event::{ConnectionId, Event};
use tungsten_flow::server::start_server;
use tungsten_flow::split::WSWriter;

#[tokio::main]
async fn main() {
    env_logger::init();

    let addr = "127.0.0.1:9002";
    let mut events = start_server(9002).await.expect("can't bind listener");
    info!("Listening on: {}", addr);

    let mut writers: HashMap<ConnectionId, WSWriter> = HashMap::new();

    while let Some(event) = events.next().await {
        match event {
            Event::NewClient(id, writer) => {
                info!("new client: {id}");
                writers.insert(id, writer);
            }
            Event::NewMessage(id, message) => {
                if let Some(writer) = writers.get_mut(&id) {
                    if writer.send_message(message).await.is_err() {
                        error!("{id} failed to echo message");
                    }
                }
            }
            Event::Ping(id, _) => debug!("{id} pinged"),
            Event::Pong(id, _) => debug!("{id} ponged"),
            Event::Disconnect(id) => {
                info!("{id} disconnected");
                writers.remove(&id);
            }
            Event::Error(id, err) => error!("{id} errored: {err}"),
        }
    }
}
