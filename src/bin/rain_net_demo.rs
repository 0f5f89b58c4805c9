//! # rain-net demo CLI
//!
//! A thin demonstration of the [`rain_net`] client/server pair: `server`
//! starts a [`rain_net::Server`] that echoes every message it receives back
//! to its sender, and `client` connects to one, sends a single message, and
//! prints whatever comes back. Neither subcommand is part of the library's
//! public contract; this binary exists to exercise it end to end.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{
    builder::styling::{AnsiColor, Styles},
    Parser, Subcommand,
};
use tracing::{info, warn};
use tracing_subscriber::{filter::LevelFilter, prelude::*};

use rain_net::logging::ColorizedFormatter;
use rain_net::{Client, Message, Server};

fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default())
        .usage(AnsiColor::Yellow.on_default())
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// rain-net demo: a minimal echo server/client pair over the framing layer.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, styles = styles())]
struct Cli {
    /// Increase log verbosity (-v, -vv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run an echo server on the given port.
    Server {
        /// TCP port to listen on.
        #[arg(short, long, default_value_t = 7878)]
        port: u16,

        /// Maximum number of concurrently connected clients.
        #[arg(short, long, default_value_t = 64)]
        max_clients: u32,
    },
    /// Connect to a server, send one message, and print the reply.
    Client {
        /// Host to connect to.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// TCP port to connect to.
        #[arg(short, long, default_value_t = 7878)]
        port: u16,

        /// Application-opaque message id to send.
        #[arg(long, default_value_t = 0)]
        id: u16,

        /// Payload bytes to send, as a UTF-8 string.
        #[arg(long, default_value = "hello, rain-net")]
        payload: String,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .event_format(ColorizedFormatter)
                .with_filter(level),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Server { port, max_clients } => run_server(port, max_clients).await,
        Command::Client { host, port, id, payload } => run_client(&host, port, id, payload).await,
    }
}

/// Accept connections forever, echoing every message back to its sender.
async fn run_server(port: u16, max_clients: u32) -> Result<()> {
    let mut server = Server::new();
    server.on_client_connected(|conn| {
        info!("accepting client {} from {}", conn.id(), conn.peer_addr());
        true
    });
    server.on_client_disconnected(|conn| {
        info!("client {} disconnected", conn.id());
    });

    server
        .start(port, max_clients)
        .with_context(|| format!("failed to start server on port {port}"))?;
    info!("listening on 0.0.0.0:{port} (max {max_clients} clients)");

    loop {
        server.accept_connections()?;

        while let Some((message, conn)) = server.next_message()? {
            info!(
                "echoing {} bytes back to client {}",
                message.payload().len(),
                conn.id()
            );
            server.send_message(&conn, &message);
        }

        server.check_connections();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Connect, send one message, wait for the echoed reply, and print it.
async fn run_client(host: &str, port: u16, id: u16, payload: String) -> Result<()> {
    let mut client = Client::new();
    client
        .connect(host, port)
        .with_context(|| format!("failed to resolve {host}:{port}"))?;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !client.connection_established()? {
        if tokio::time::Instant::now() >= deadline {
            anyhow::bail!("timed out waiting to connect to {host}:{port}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    info!("connected to {host}:{port}");

    let mut outbound = Message::new(id);
    outbound.append(payload.as_bytes())?;
    client.send_message(&outbound);
    info!("sent message {id} ({} bytes)", payload.len());

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(reply) = client.next_message()? {
            let text = String::from_utf8_lossy(reply.payload());
            println!("reply: id={} payload={text:?}", reply.id());
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            warn!("timed out waiting for a reply");
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    client.disconnect();
    Ok(())
}
