//! Beacon CLI
//!
//! Terminal front end for the beacon overlay.
//!
//! ## Usage
//!
//! ```bash
//! # Generate an identity and print its address
//! beacon identity
//!
//! # Start a chat node (prints its address and a peer ticket)
//! beacon chat
//!
//! # Join through another node's ticket and talk to a known address
//! beacon chat --join beacon-peer:... --peer beacon:z...
//!
//! # Two in-process nodes discovering each other and exchanging a message
//! beacon demo
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use beacon_core::config::DEFAULT_TOPIC_PREFIX;
use beacon_core::{
    Address, DecryptedMessage, GossipTransport, Identity, MemoryTransport, OverlayConfig,
    OverlayEvent, OverlayNode, PeerTicket,
};
use clap::{Parser, Subcommand};
use tokio::io::AsyncBufReadExt;
use tokio::sync::broadcast::error::RecvError;

/// Beacon - peer presence and encrypted chat
#[derive(Parser)]
#[command(name = "beacon")]
#[command(version = "0.1.0")]
#[command(about = "Beacon - peer presence and encrypted chat")]
#[command(
    long_about = "Discover live peers on a shared topic and exchange end-to-end encrypted messages addressed by public identity, without a central server."
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a fresh identity and print its address
    Identity {
        /// Also print the private key (hex)
        #[arg(long)]
        show_secret: bool,
    },

    /// Join the overlay over iroh gossip and chat interactively
    Chat {
        /// Address to send messages to
        #[arg(short, long)]
        peer: Option<String>,

        /// Peer ticket to bootstrap from (repeatable)
        #[arg(short, long)]
        join: Vec<String>,

        /// Topic prefix shared by all participants
        #[arg(long, default_value = DEFAULT_TOPIC_PREFIX)]
        topic_prefix: String,
    },

    /// Run two in-process nodes and exchange one message
    Demo {
        /// Message Alice sends to Bob
        #[arg(short, long, default_value = "hello")]
        message: String,
    },
}

fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();
}

/// Parse a beacon address
fn parse_address(s: &str) -> Result<Address> {
    Address::parse(s).map_err(|e| anyhow::anyhow!("Invalid address '{}': {}", s, e))
}

fn format_message(message: &DecryptedMessage, me: &Address) -> String {
    let time = message
        .timestamp
        .with_timezone(&chrono::Local)
        .format("%H:%M:%S");
    if message.is_mine(me) {
        format!("[{}] You -> {}: {}", time, message.recipient_address.short(), message.content)
    } else {
        format!("[{}] {}: {}", time, message.sender_address.short(), message.content)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    match cli.command {
        Commands::Identity { show_secret } => {
            let identity = Identity::generate()?;
            println!("Address: {}", identity.address());
            if show_secret {
                println!("Private key: {}", identity.private_key_hex());
            }
        }

        Commands::Chat {
            peer,
            join,
            topic_prefix,
        } => {
            let mut recipient = peer.as_deref().map(parse_address).transpose()?;
            let tickets = join
                .iter()
                .map(|t| PeerTicket::decode(t).map_err(|e| anyhow::anyhow!("Invalid ticket: {}", e)))
                .collect::<Result<Vec<_>>>()?;

            let config = OverlayConfig::with_topic_prefix(&topic_prefix);
            let transport = Arc::new(GossipTransport::bind(&tickets).await?);
            let node =
                OverlayNode::start(transport.clone(), Identity::generate()?, config).await?;
            let mut events = node.subscribe();

            println!("Beacon chat");
            println!();
            println!("  Address: {}", node.address());
            println!("  Ticket:  {}", transport.ticket().encode()?);
            println!();
            match &recipient {
                Some(address) => println!("Sending to {}", address),
                None => println!("No recipient yet. Use /peer <ADDRESS>."),
            }
            println!("Commands: /peer <ADDRESS>, /peers, /quit");
            println!("{}", "─".repeat(50));

            let stdin = tokio::io::stdin();
            let reader = tokio::io::BufReader::new(stdin);
            let mut lines = reader.lines();

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        println!();
                        break;
                    }
                    event = events.recv() => {
                        match event {
                            Ok(OverlayEvent::PeerCountChanged(count)) => {
                                println!("* Users in topic: {}", count + 1);
                            }
                            Ok(OverlayEvent::MessageReceived(message)) => {
                                println!("{}", format_message(&message, node.address()));
                            }
                            Err(RecvError::Lagged(skipped)) => {
                                eprintln!("* {} events dropped", skipped);
                            }
                            Err(RecvError::Closed) => break,
                        }
                    }
                    line = lines.next_line() => {
                        let Some(line) = line? else {
                            break;
                        };
                        let text = line.trim();

                        if text == "/quit" {
                            break;
                        } else if text == "/peers" {
                            let peers = node.live_peers();
                            println!("* {} live peer(s)", peers.len());
                            for record in peers {
                                println!("  {}", record.address);
                            }
                        } else if let Some(address) = text.strip_prefix("/peer ") {
                            match parse_address(address) {
                                Ok(address) => {
                                    println!("* Sending to {}", address);
                                    recipient = Some(address);
                                }
                                Err(e) => eprintln!("{}", e),
                            }
                        } else if !text.is_empty() {
                            match &recipient {
                                Some(to) => {
                                    if let Err(e) = node.send_message(to, text).await {
                                        eprintln!("Failed to send: {}", e);
                                    }
                                }
                                None => eprintln!("No recipient. Use /peer <ADDRESS>."),
                            }
                        }
                    }
                }
            }

            node.shutdown();
            transport.shutdown().await;
        }

        Commands::Demo { message } => {
            let transport = Arc::new(MemoryTransport::new());

            let alice =
                OverlayNode::start(transport.clone(), Identity::generate()?, OverlayConfig::default())
                    .await?;
            let bob =
                OverlayNode::start(transport.clone(), Identity::generate()?, OverlayConfig::default())
                    .await?;
            let mut bob_events = bob.subscribe();

            println!("Alice: {}", alice.address());
            println!("Bob:   {}", bob.address());

            // Bob's announce is answered by Alice within one round trip
            tokio::time::sleep(Duration::from_millis(100)).await;
            println!(
                "Peers visible: alice={} bob={}",
                alice.peer_count(),
                bob.peer_count()
            );

            let envelope = alice.send_message(bob.address(), &message).await?;
            println!("Ciphertext: {}", envelope.ciphertext);

            let received = tokio::time::timeout(Duration::from_secs(2), async {
                loop {
                    match bob_events.recv().await {
                        Ok(OverlayEvent::MessageReceived(m)) => return Some(m),
                        Ok(OverlayEvent::PeerCountChanged(_)) | Err(RecvError::Lagged(_)) => {}
                        Err(RecvError::Closed) => return None,
                    }
                }
            })
            .await
            .ok()
            .flatten()
            .ok_or_else(|| anyhow::anyhow!("Bob did not receive the message"))?;

            println!("Bob received: {}", received.content);

            alice.shutdown();
            bob.shutdown();
        }
    }

    Ok(())
}
