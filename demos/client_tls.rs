use futures::StreamExt;
use log::*;
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use tokio::select;
use tokio::time::{interval, Duration};
use tungsten_flow::client::connect_async_with_config;
use tungsten_flow::config::ClientConfig;

async fn handle_connection(addr: &str) {
    let client_config = ClientConfig {
        ca_file: Some(String::from("ca.crt")),
        ..ClientConfig::default()
    };

    match connect_async_with_config(addr, Some(client_config)).await {
        Ok(connection) => {
            let (mut reader, mut writer) = connection.split();
            let mut ticker = interval(Duration::from_secs(5));
            // it will be used for closing the connection
            let mut counter = 0;

            loop {
                select! {
                    Some(result) = reader.next() => {
                        match result {
                            Ok(message) => {
                                info!("Received message: {message:?}");
                                counter += 1;
                                // close the connection if 3 messages have already been sent and received
                                if counter >= 3 {
                                    if writer.close_normally().await.is_err() {
                                        error!("Error occurred when closing connection");
                                    }
                                    break;
                                }
                            }
                            Err(err) => {
                                error!("Received error from the stream: {err}");
                                break;
                            }
                        }
                    }
                    _ = ticker.tick() => {
                        let random_string = generate_random_string();
                        let binary_data = Vec::from(random_string);

                        if writer.send_binary(binary_data).await.is_err() {
                            eprintln!("Failed to send message");
                            break;
                        }
                    }
                }
            }
        }
        Err(err) => error!("Error when performing handshake: {err}"),
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();
    handle_connection("wss://localhost:9002").await;
}

fn generate_random_string() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(30)
        .map(char::from)
        .collect()
}
