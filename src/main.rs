//! CLI for chathub
//!
//! Subcommands:
//! - `server`: run the WebSocket hub
//! - `client`: an interactive terminal chat client

use std::sync::Arc;

use chathub::client::{ClientEvent, HubConnectionBuilder, ReconnectPolicy};
use chathub::config::{Settings, load_config, load_config_from};
use chathub::hub::Hub;
use chathub::transport::WebSocketServer;
use chathub::utils::{ClientError, logging};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "chathub")]
enum Command {
    /// Start the WebSocket hub
    Server {
        /// Configuration file (default: config/default)
        #[arg(long)]
        config: Option<String>,
    },
    /// Chat from the terminal; `/quit` leaves
    Client {
        /// Hub URL to connect to
        #[arg(long, default_value = "ws://127.0.0.1:8080/chathub")]
        url: String,
        /// Display name attached to every message
        #[arg(long)]
        user: String,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    match Command::parse() {
        Command::Server { config } => {
            let loaded = match config.as_deref() {
                Some(path) => load_config_from(path),
                None => load_config(),
            };
            let settings = match loaded {
                Ok(settings) => settings,
                Err(e) => {
                    logging::init("info");
                    error!("Failed to load configuration: {e}");
                    return;
                }
            };
            logging::init(&settings.logging.level);
            if let Err(e) = run_server(settings).await {
                error!("Server failed: {e}");
            }
        }
        Command::Client { url, user } => {
            logging::init("warn");
            if let Err(e) = run_client(&url, &user).await {
                error!("Client failed: {e}");
            }
        }
    }
}

async fn run_server(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let hub = Arc::new(Hub::new(&settings.hub));
    let server = WebSocketServer::bind(&settings).await?;

    server
        .run_until(hub, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {e}");
                return;
            }
            info!("Shutdown signal received. Exiting gracefully.");
        })
        .await;

    Ok(())
}

async fn run_client(url: &str, user: &str) -> Result<(), ClientError> {
    let (connection, mut events) = HubConnectionBuilder::new(url)
        .with_automatic_reconnect(ReconnectPolicy::default())
        .start()
        .await?;
    println!("Connected to {url} as {user}");

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ClientEvent::ReceiveMessage { user, message } => println!("{user}: {message}"),
                ClientEvent::Reconnecting { .. } => println!("Attempting to reconnect..."),
                ClientEvent::Reconnected => println!("Reconnected to the server"),
                ClientEvent::Closed { error } => {
                    match error {
                        Some(error) => println!("Connection Closed: {error}"),
                        None => println!("Connection Closed"),
                    }
                    break;
                }
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("Failed to read input: {e}");
                break;
            }
        };
        let line = line.trim();
        if line == "/quit" {
            break;
        }
        if line.is_empty() {
            continue;
        }
        if let Err(e) = connection.send_message(user, line).await {
            println!("{e}");
        }
        if printer.is_finished() {
            break;
        }
    }

    connection.stop().await;
    let _ = printer.await;
    Ok(())
}
