use std::sync::Arc;

use clap::Parser;
use tokio::net::{TcpListener, UdpSocket};
use tokio::time::Duration;

use server::auth::StoreAuthenticator;
use server::server::{ServerCore, ServerOptions};
use server::store::MemStore;
use server::transport::{blocking_tcp, tcp, udp, ws};
use server::watcher;

/// Main-method of the application.
/// Parses command-line arguments, binds the four transports, and runs
/// until one of them fails or Ctrl+C arrives.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "0.0.0.0")]
        host: String,
        /// TCP port to listen on (also the advertised discovery port)
        #[clap(short, long, default_value = "8765")]
        port: u16,
        /// Blocking TCP port
        #[clap(long, default_value = "8766")]
        blocking_port: u16,
        /// WebSocket port
        #[clap(long, default_value = "8767")]
        ws_port: u16,
        /// UDP discovery port
        #[clap(long, default_value = "8765")]
        udp_port: u16,
        /// Server name shown to clients
        #[clap(long, default_value = "StepNet")]
        name: String,
        /// Message of the day
        #[clap(long, default_value = "Welcome to StepNet")]
        motd: String,
        /// Maximum simultaneous connections
        #[clap(long, default_value = "255")]
        max_connections: usize,
        /// Watcher tick interval in milliseconds
        #[clap(long, default_value = "1000")]
        tick_ms: u64,
        /// Refuse logins for unknown user names instead of registering them
        #[clap(long)]
        closed: bool,
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let options = ServerOptions {
        name: args.name,
        motd: args.motd,
        advertised_port: args.port,
        max_connections: args.max_connections,
    };
    let core = ServerCore::new(
        options,
        Arc::new(MemStore::new()),
        Arc::new(StoreAuthenticator::new(!args.closed)),
    );

    let tcp_listener = TcpListener::bind((args.host.as_str(), args.port)).await?;
    let ws_listener = TcpListener::bind((args.host.as_str(), args.ws_port)).await?;
    let udp_socket = UdpSocket::bind((args.host.as_str(), args.udp_port)).await?;
    let blocking_listener = std::net::TcpListener::bind((args.host.as_str(), args.blocking_port))?;
    log::info!(
        "listening on {}: tcp {}, blocking tcp {}, websocket {}, udp {}",
        args.host,
        args.port,
        args.blocking_port,
        args.ws_port,
        args.udp_port
    );

    let tcp_task = tokio::spawn(tcp::serve(core.clone(), tcp_listener));
    let ws_task = tokio::spawn(ws::serve(core.clone(), ws_listener));
    let udp_task = tokio::spawn(udp::serve(core.clone(), udp_socket));
    {
        let core = core.clone();
        std::thread::spawn(move || blocking_tcp::serve(core, blocking_listener));
    }
    let watcher_task = tokio::spawn(watcher::run(
        core.clone(),
        Duration::from_millis(args.tick_ms),
    ));

    // Handle shutdown gracefully
    tokio::select! {
        result = tcp_task => {
            if let Err(e) = result {
                log::error!("tcp task panicked: {e}");
            }
        }
        result = ws_task => {
            if let Err(e) = result {
                log::error!("websocket task panicked: {e}");
            }
        }
        result = udp_task => {
            if let Err(e) = result {
                log::error!("udp task panicked: {e}");
            }
        }
        result = watcher_task => {
            if let Err(e) = result {
                log::error!("watcher task panicked: {e}");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            log::info!("received Ctrl+C, shutting down gracefully");
        }
    }

    Ok(())
}
