//! Chat with other clients of a relay.
//!
//! # Usage
//!
//! ```sh
//! cargo run --release --bin shield-chat -- --server 127.0.0.1:8888 --server-key server_keys/public.pem
//! ```
//!
//! Each line read from stdin is sent as `<target> <text>`. Messages forwarded by the relay are
//! printed as `[sender] text`.

use clap::{value_parser, Arg, Command};
use commonware_macros::select;
use rand::rngs::OsRng;
use shield_cryptography::keys;
use shield_relay::client::{self, Client};
use shield_stream::tcp;
use std::{net::SocketAddr, path::PathBuf, time::Duration};
use tokio::io::{AsyncBufReadExt as _, BufReader};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Parse arguments
    let matches = Command::new("shield-chat")
        .about("exchange end-to-end encrypted messages through a relay")
        .arg(
            Arg::new("server")
                .long("server")
                .default_value("127.0.0.1:8888")
                .value_parser(value_parser!(SocketAddr)),
        )
        .arg(
            Arg::new("server-key")
                .long("server-key")
                .default_value("server_keys/public.pem")
                .value_parser(value_parser!(PathBuf))
                .help("Public key the relay must prove possession of"),
        )
        .arg(
            Arg::new("key-dir")
                .long("key-dir")
                .default_value("client_keys")
                .value_parser(value_parser!(PathBuf))
                .help("Directory holding our identity key"),
        )
        .arg(
            Arg::new("id-file")
                .long("id-file")
                .default_value("client_id.txt")
                .value_parser(value_parser!(PathBuf))
                .help("File holding our identifier"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .default_value("warn"),
        )
        .get_matches();

    // Create logger (stdout is reserved for messages)
    let filter = EnvFilter::try_new(matches.get_one::<String>("log-level").unwrap())
        .expect("Log level not well-formed");
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Load identity
    let key_dir = matches.get_one::<PathBuf>("key-dir").unwrap();
    let (identity, _) =
        keys::load_or_generate(&mut OsRng, key_dir).expect("Unable to load identity");
    let server_key = matches.get_one::<PathBuf>("server-key").unwrap();
    let server = keys::load_public_key(server_key).expect("Unable to load relay public key");
    let client_id = client::load_or_generate_id(matches.get_one::<PathBuf>("id-file").unwrap())
        .expect("Unable to load client id");
    info!(%client_id, key = %identity.public_key(), "loaded identity");

    // Connect to relay
    let address = *matches.get_one::<SocketAddr>("server").unwrap();
    let network = tcp::Network::from(tcp::Config {
        // Conversations may stay quiet for a long time
        read_timeout: Duration::from_secs(24 * 60 * 60),
        ..Default::default()
    });
    let (sink, stream) = network
        .dial(address)
        .await
        .expect("Unable to reach relay");
    let cfg = client::Config {
        identity,
        server,
        client_id,
        stream: Default::default(),
    };
    let client = Client::connect(cfg, sink, stream)
        .await
        .expect("Unable to connect to relay");
    println!("connected as {}", client.client_id());
    let (mut outbox, mut inbox) = client.split();

    // Print deliveries
    let printer = tokio::spawn(async move {
        loop {
            match inbox.recv().await {
                Ok(delivery) => println!("[{}] {}", delivery.sender, delivery.text),
                Err(err) => {
                    debug!(?err, "relay connection closed");
                    return;
                }
            }
        }
    });

    // Send lines from stdin
    let reader = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some((target, text)) = line.split_once(' ') else {
                eprintln!("usage: <target> <text>");
                continue;
            };
            if let Err(err) = outbox.send_to(target, text.trim_start()).await {
                debug!(?err, "failed to send message");
                return;
            }
        }
    });

    select! {
        _ = printer => {
            println!("disconnected");
        },
        _ = reader => {},
    };
}
