//! Pairnode CLI - wallet server
//!
//! Commands:
//!   pairnode serve     → start the wallet server (default)
//!   pairnode wallet    → print the persisted wallet identity
//!
//! Configuration precedence: flags, then environment, then defaults.
//! A `.env` file in the working directory is loaded first.

use pairnode::logging::init_logging;
use pairnode::{create_router, install_signal_handlers, Node, NodeConfig};
use serde_json::{json, Value};
use std::env;
use std::sync::Arc;
use tracing::info;

fn main() {
    init_logging();
    let _ = rustls::crypto::ring::default_provider().install_default();

    let args: Vec<String> = env::args().collect();
    let opts = ParsedArgs::parse(&args[1..]);

    if opts.help {
        print_usage();
        return;
    }

    if opts.version {
        println!("pairnode 0.1.0");
        return;
    }

    let result = match opts.command.as_deref() {
        Some("serve") | None => cmd_serve(&opts),
        Some("wallet") => cmd_wallet(&opts),
        Some(cmd) => Err(format!("Unknown command: {}", cmd)),
    };

    match result {
        Ok(output) => println!("{}", serde_json::to_string_pretty(&output).unwrap()),
        Err(e) => {
            eprintln!("{}", serde_json::to_string_pretty(&json!({"error": e})).unwrap());
            std::process::exit(1);
        }
    }
}

#[derive(Default)]
struct ParsedArgs {
    command: Option<String>,
    port: Option<u16>,
    ledger_url: Option<String>,
    faucet_url: Option<String>,
    relay_url: Option<String>,
    wallet_file: Option<String>,
    help: bool,
    version: bool,
}

impl ParsedArgs {
    fn parse(args: &[String]) -> Self {
        // Load .env file if present
        if let Ok(contents) = std::fs::read_to_string(".env") {
            for line in contents.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    let value = value.trim().trim_matches('"');
                    if !value.is_empty() && env::var(key.trim()).is_err() {
                        env::set_var(key.trim(), value);
                    }
                }
            }
        }

        let mut opts = ParsedArgs::default();
        let mut positional = Vec::new();
        let mut i = 0;

        while i < args.len() {
            let arg = &args[i];
            match arg.as_str() {
                "--help" | "-h" => opts.help = true,
                "--version" | "-V" => opts.version = true,
                "--port" | "-p" => {
                    if i + 1 < args.len() {
                        opts.port = args[i + 1].parse().ok();
                        i += 1;
                    }
                }
                "--ledger" | "-l" => {
                    if i + 1 < args.len() {
                        opts.ledger_url = Some(args[i + 1].clone());
                        i += 1;
                    }
                }
                "--faucet" => {
                    if i + 1 < args.len() {
                        opts.faucet_url = Some(args[i + 1].clone());
                        i += 1;
                    }
                }
                "--relay" | "-r" => {
                    if i + 1 < args.len() {
                        opts.relay_url = Some(args[i + 1].clone());
                        i += 1;
                    }
                }
                "--wallet-file" | "-w" => {
                    if i + 1 < args.len() {
                        opts.wallet_file = Some(args[i + 1].clone());
                        i += 1;
                    }
                }
                _ if !arg.starts_with('-') => positional.push(arg.clone()),
                _ => {} // Ignore unknown flags
            }
            i += 1;
        }

        if !positional.is_empty() {
            opts.command = Some(positional.remove(0));
        }

        // Apply environment variables (lower priority than CLI args)
        if opts.port.is_none() {
            opts.port = env::var("PAIRNODE_PORT").ok().and_then(|s| s.parse().ok());
        }
        if opts.ledger_url.is_none() {
            opts.ledger_url = env::var("PAIRNODE_LEDGER_URL").ok().filter(|s| !s.is_empty());
        }
        if opts.faucet_url.is_none() {
            opts.faucet_url = env::var("PAIRNODE_FAUCET_URL").ok().filter(|s| !s.is_empty());
        }
        if opts.relay_url.is_none() {
            opts.relay_url = env::var("PAIRNODE_RELAY_URL").ok().filter(|s| !s.is_empty());
        }
        if opts.wallet_file.is_none() {
            opts.wallet_file = env::var("PAIRNODE_WALLET_FILE").ok().filter(|s| !s.is_empty());
        }

        opts
    }
}

fn build_config(opts: &ParsedArgs) -> NodeConfig {
    let mut config = NodeConfig::new("pairnode");
    if let Some(port) = opts.port {
        config = config.with_port(port);
    }
    if let Some(ref url) = opts.ledger_url {
        config = config.with_ledger(url);
    }
    if let Some(ref url) = opts.faucet_url {
        config = config.with_faucet(url);
    }
    if let Some(ref url) = opts.relay_url {
        config = config.with_relay(url);
    }
    if let Some(ref path) = opts.wallet_file {
        config = config.with_wallet_file(path);
    }
    config
}

fn print_usage() {
    println!(
        r#"pairnode - XRP Ledger pairing wallet server

USAGE:
    pairnode [command] [options]

COMMANDS:
    serve                   Start the wallet server (default)
    wallet                  Print the persisted wallet identity

OPTIONS:
    --port, -p <port>       HTTP port (default: 3002, env: PAIRNODE_PORT)
    --ledger, -l <url>      Ledger WebSocket URL (env: PAIRNODE_LEDGER_URL)
    --faucet <url>          Faucet HTTP URL (env: PAIRNODE_FAUCET_URL)
    --relay, -r <url>       Pairing relay URL (env: PAIRNODE_RELAY_URL)
    --wallet-file, -w <p>   Wallet JSON path (env: PAIRNODE_WALLET_FILE)
    --version, -V           Print version

ENDPOINTS:
    GET  /health                        Health check
    POST /api/wallet                    Create + fund a wallet
    GET  /api/balance/:address          Balance in drops and XRP
    POST /api/pairing/connect           Pair with a dapp URI
    GET  /api/pairing/pending           Pending proposal/request
    POST /api/pairing/proposal/approve  Approve pending proposal
    POST /api/pairing/request/approve   Sign pending transaction

EXAMPLES:
    pairnode serve --port 3002
    pairnode serve --ledger wss://s.altnet.rippletest.net:51233
    pairnode wallet --wallet-file ./wallet.json
"#
    );
}

fn cmd_serve(opts: &ParsedArgs) -> Result<Value, String> {
    let config = build_config(opts);
    let port = config.port;
    let node = Arc::new(Node::from_config(config));

    let rt = tokio::runtime::Runtime::new().map_err(|e| format!("Failed to create runtime: {}", e))?;

    rt.block_on(async {
        // Install signal handlers for graceful shutdown
        let shutdown = install_signal_handlers();

        node.start().await;

        let router = create_router(node);
        let addr = format!("0.0.0.0:{}", port);

        info!("Pairnode server listening on http://{}", addr);
        info!("Endpoints:");
        info!("  GET  /health                  - Health check");
        info!("  POST /api/wallet              - Create + fund wallet");
        info!("  GET  /api/pairing/pending     - Pending proposal/request");

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| format!("Failed to bind: {}", e))?;

        // Run server with graceful shutdown
        let mut shutdown_rx = shutdown.subscribe();
        tokio::select! {
            result = axum::serve(listener, router) => {
                result.map_err(|e| format!("Server error: {}", e))?;
            }
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received, stopping server...");
            }
        }

        Ok::<(), String>(())
    })?;

    Ok(json!({"status": "stopped"}))
}

fn cmd_wallet(opts: &ParsedArgs) -> Result<Value, String> {
    let config = build_config(opts);
    let store = pairnode::WalletStore::new(config.wallet_path());
    store.load();

    match store.identity() {
        Some(identity) => Ok(json!({
            "address": identity.address,
            "publicKey": identity.public_key,
            "file": config.wallet_path().display().to_string(),
        })),
        None => Err(format!("No wallet at {}", config.wallet_path().display())),
    }
}
