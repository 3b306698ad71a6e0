//! govgate application entry point.
//!
//! Bootstraps the server:
//! 1. Load configuration from environment
//! 2. Pick nonce and rate-limit stores (Redis when configured, else memory)
//! 3. Connect the ledger RPC client when configured
//! 4. Build router with auth + member routes, rate limiting, CORS and security headers
//! 5. Spawn the cleanup job
//! 6. Start Axum server
//!
//! Also supports `keygen` and `sign` subcommands for testing wallet logins
//! without a browser wallet.

use alloy_primitives::hex;
use govgate::{
    auth::{
        middleware::{AppState, Backends},
        verify::{address_of, generate_signing_key, sign_message},
    },
    capability::{LedgerQuery, RpcLedger},
    cleanup,
    config::Config,
    routes,
    storage::{RedisNonceStore, RedisRateLimitStore},
};
use k256::ecdsa::SigningKey;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use zeroize::Zeroizing;

/// Generate a secp256k1 key. Returns (private key hex, address).
fn keygen() -> (Zeroizing<String>, String) {
    let key = generate_signing_key();
    let secret = Zeroizing::new(hex::encode_prefixed(key.to_bytes()));
    (secret, address_of(&key).to_checksum(None))
}

/// Sign the contents of `message_path` with a hex private key.
fn sign(key_hex: &str, message_path: &str) -> Result<String, String> {
    let bytes = Zeroizing::new(hex::decode(key_hex.trim()).map_err(|e| format!("Key hex: {}", e))?);
    let key = SigningKey::from_slice(&bytes).map_err(|e| format!("Signing key: {}", e))?;

    let message = std::fs::read_to_string(message_path)
        .map_err(|e| format!("Read {}: {}", message_path, e))?;

    sign_message(&key, &message).map_err(|e| format!("Sign: {}", e))
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  govgate                          Start the server");
    eprintln!("  govgate keygen                   Generate a test wallet key");
    eprintln!("  govgate sign <key> <message>     Sign a challenge message file");
    eprintln!();
    eprintln!("Example:");
    eprintln!("  govgate keygen");
    eprintln!("  govgate sign 0x<private-key> challenge.txt");
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("keygen") => {
            if args.len() != 2 {
                print_usage();
                std::process::exit(1);
            }
            let (secret, address) = keygen();
            println!("private key: {}", secret.as_str());
            println!("address:     {}", address);
            return;
        }
        Some("sign") => {
            if args.len() != 4 {
                print_usage();
                std::process::exit(1);
            }
            match sign(&args[2], &args[3]) {
                Ok(signature) => println!("{}", signature),
                Err(e) => {
                    eprintln!("Error signing message: {}", e);
                    std::process::exit(1);
                }
            }
            return;
        }
        Some(_) => {
            print_usage();
            std::process::exit(1);
        }
        None => {}
    }

    // Initialize tracing with env filter support (RUST_LOG)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config from environment
    let config = Config::from_env().expect("Failed to load config");
    tracing::info!("Starting govgate on {}", config.bind_addr);

    let ledger: Option<Arc<dyn LedgerQuery>> = match config.rpc_url.as_deref() {
        Some(url) => {
            let client = RpcLedger::new(url, Duration::from_millis(config.ledger_query_timeout_ms))
                .expect("Failed to build RPC client");
            Some(Arc::new(client))
        }
        None => {
            tracing::warn!("RPC_URL not set: every capability resolves to false");
            None
        }
    };

    let mut backends = Backends::in_memory(ledger);

    if let Some(url) = config.redis_url.as_deref() {
        let redis_client = redis::Client::open(url).expect("Invalid Redis URL");

        // Verify Redis connection
        let con = redis_client
            .get_multiplexed_async_connection()
            .await
            .expect("Failed to connect to Redis");

        backends.nonces = Arc::new(RedisNonceStore::new(con.clone()));
        backends.rate_limits = Arc::new(RedisRateLimitStore::new(con));
        tracing::info!("Using Redis for nonces and rate limits");
    } else {
        tracing::info!("Using in-memory nonce and rate-limit stores");
    }

    let cleanup_interval = Duration::from_secs(config.cleanup_interval_secs);
    let bind_addr = config.bind_addr;

    // Build shared state
    let state = AppState::new(config, backends).expect("Failed to build app state");

    tokio::spawn(cleanup::run_cleanup_loop(state.clone(), cleanup_interval));

    let app = routes::build_app(state);

    // Bind to configured address
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .expect("Failed to bind");
    tracing::info!("Listening on {}", bind_addr);

    // Start server (with_connect_info required for client IP rate limiting)
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server error");
}
