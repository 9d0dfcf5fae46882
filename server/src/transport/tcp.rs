//! Async TCP transport: one read loop and one writer task per connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::connection::{Connection, Outgoing};
use crate::server::ServerCore;
use crate::transport::frame::FrameAssembler;

pub async fn serve(core: Arc<ServerCore>, listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                tokio::spawn(handle(core.clone(), stream, addr));
            }
            Err(err) => {
                log::error!("tcp accept failed: {err}");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

async fn handle(core: Arc<ServerCore>, stream: TcpStream, addr: SocketAddr) {
    let _ = stream.set_nodelay(true);
    let (conn, rx) = Connection::channel(core.registry.issue_token(), addr);
    if !core.register(&conn) {
        return;
    }

    let (mut reader, writer) = stream.into_split();
    let writer_task = tokio::spawn(write_loop(writer, rx));

    let mut assembler = FrameAssembler::new();
    let mut buf = [0u8; 4096];
    'session: loop {
        tokio::select! {
            _ = conn.shutdown.notified() => break,
            read = reader.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => {
                    assembler.extend(&buf[..n]);
                    loop {
                        match assembler.next_frame() {
                            Ok(Some(frame)) => super::dispatch_frame(&core, &conn, &frame),
                            Ok(None) => break,
                            Err(err) => {
                                log::warn!("closing {addr}: {err}");
                                break 'session;
                            }
                        }
                    }
                }
                Err(err) => {
                    log::debug!("tcp read from {addr} failed: {err}");
                    break;
                }
            },
        }
    }

    core.disconnect(&conn);
    // The shutdown marker queued by disconnect ends the writer.
    let _ = writer_task.await;
}

async fn write_loop(mut writer: OwnedWriteHalf, mut rx: UnboundedReceiver<Outgoing>) {
    while let Some(out) = rx.recv().await {
        match out {
            Outgoing::Packet(packet) => {
                if writer.write_all(&packet.frame()).await.is_err() {
                    break;
                }
            }
            Outgoing::Shutdown => break,
        }
    }
    let _ = writer.shutdown().await;
}
