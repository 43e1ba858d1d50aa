//! Run a relay that forwards end-to-end encrypted messages between authenticated clients.
//!
//! # Usage
//!
//! ```sh
//! cargo run --release --bin shield-relay -- --listen 127.0.0.1:8888 --key-dir server_keys --pins client_keys.json
//! ```
//!
//! On first run, an identity key is generated in `--key-dir`. Distribute `public.pem` from that
//! directory to clients: they refuse to talk to a relay that cannot sign with the matching key.

use clap::{value_parser, Arg, ArgAction, Command};
use commonware_macros::select;
use prometheus_client::registry::Registry;
use rand::rngs::OsRng;
use shield_cryptography::keys;
use shield_relay::{
    router, server,
    trust::{JsonFile, TrustOnFirstUse},
};
use shield_stream::tcp;
use std::{
    net::SocketAddr,
    num::NonZeroUsize,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn command() -> Command {
    Command::new("shield-relay")
        .about("relay end-to-end encrypted messages between authenticated clients")
        .arg(
            Arg::new("listen")
                .long("listen")
                .default_value("127.0.0.1:8888")
                .value_parser(value_parser!(SocketAddr)),
        )
        .arg(
            Arg::new("key-dir")
                .long("key-dir")
                .default_value("server_keys")
                .value_parser(value_parser!(PathBuf))
                .help("Directory holding the relay identity key"),
        )
        .arg(
            Arg::new("pins")
                .long("pins")
                .default_value("client_keys.json")
                .value_parser(value_parser!(PathBuf))
                .help("File of client keys pinned on first use"),
        )
        .arg(
            Arg::new("keepalive")
                .long("keepalive")
                .default_value("3600")
                .value_parser(value_parser!(u64))
                .help("Seconds of silence after which a connection is closed"),
        )
        .arg(
            Arg::new("nonce-history")
                .long("nonce-history")
                .default_value("1000")
                .value_parser(value_parser!(u64).range(1..))
                .help("Nonces remembered per connection to reject replays"),
        )
        .arg(
            Arg::new("challenge-length")
                .long("challenge-length")
                .default_value("16")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .default_value("info"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
}

#[tokio::main]
async fn main() {
    // Parse arguments
    let matches = command().get_matches();

    // Create logger
    let filter = EnvFilter::try_new(matches.get_one::<String>("log-level").unwrap())
        .expect("Log level not well-formed");
    if matches.get_flag("json") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    // Load or create our identity
    let key_dir = matches.get_one::<PathBuf>("key-dir").unwrap();
    let (identity, fresh) =
        keys::load_or_generate(&mut OsRng, key_dir).expect("Unable to load identity");
    info!(key = %identity.public_key(), fresh, dir = ?key_dir, "loaded identity");

    // Load pinned client keys
    let pins = matches.get_one::<PathBuf>("pins").unwrap();
    let trust = TrustOnFirstUse::new(JsonFile::new(pins)).expect("Unable to load pinned keys");
    info!(pins = trust.len(), path = ?pins, "loaded pinned keys");

    // Start router
    let registry = Arc::new(Mutex::new(Registry::default()));
    let (router, mailbox) = router::Actor::new(router::Config {
        registry: registry.clone(),
        mailbox_size: 1024,
    });
    tokio::spawn(router.run());

    // Configure server
    let mut cfg = server::Config::new(identity, trust, registry.clone());
    let nonce_history = *matches.get_one::<u64>("nonce-history").unwrap();
    cfg.stream.nonce_history =
        NonZeroUsize::new(nonce_history as usize).expect("Nonce history must be positive");
    cfg.challenge_length = *matches.get_one::<usize>("challenge-length").unwrap();
    let server = server::Server::new(cfg, mailbox);

    // Bind listener
    let address = *matches.get_one::<SocketAddr>("listen").unwrap();
    let network = tcp::Network::from(tcp::Config {
        read_timeout: Duration::from_secs(*matches.get_one::<u64>("keepalive").unwrap()),
        ..Default::default()
    });
    let listener = network.bind(address).await.expect("Unable to bind listener");
    info!(?address, "listening");

    // Serve until interrupted
    select! {
        _ = server.run(listener) => {},
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
        },
    };

    // Report metrics
    let mut buffer = String::new();
    prometheus_client::encoding::text::encode(&mut buffer, &registry.lock().unwrap())
        .expect("Unable to encode metrics");
    println!("{buffer}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonce_history() {
        let matches = command().try_get_matches_from(["shield-relay"]).unwrap();
        assert_eq!(*matches.get_one::<u64>("nonce-history").unwrap(), 1000);
        let matches = command()
            .try_get_matches_from(["shield-relay", "--nonce-history", "1"])
            .unwrap();
        assert_eq!(*matches.get_one::<u64>("nonce-history").unwrap(), 1);

        // Remembering nothing would let every replay through
        assert!(command()
            .try_get_matches_from(["shield-relay", "--nonce-history", "0"])
            .is_err());
    }
}
