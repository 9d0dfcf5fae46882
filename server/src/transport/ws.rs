//! WebSocket transport. Every message is one complete packet: binary
//! messages carry `command_byte ++ payload` with no length prefix, text
//! messages carry the JSON form. Replies mirror the form of the last
//! packet the client sent.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::connection::{Connection, Outgoing};
use crate::server::ServerCore;

pub async fn serve(core: Arc<ServerCore>, listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                tokio::spawn(handle(core.clone(), stream, addr));
            }
            Err(err) => {
                log::error!("websocket accept failed: {err}");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

async fn handle(core: Arc<ServerCore>, stream: TcpStream, addr: SocketAddr) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(err) => {
            log::debug!("websocket handshake with {addr} failed: {err}");
            return;
        }
    };
    let (conn, rx) = Connection::channel(core.registry.issue_token(), addr);
    if !core.register(&conn) {
        return;
    }

    let (sink, mut source) = ws.split();
    let writer_task = tokio::spawn(write_loop(sink, rx, conn.clone()));

    loop {
        tokio::select! {
            _ = conn.shutdown.notified() => break,
            message = source.next() => match message {
                Some(Ok(Message::Binary(bytes))) => {
                    conn.set_json_wire(false);
                    super::dispatch_frame(&core, &conn, &bytes);
                }
                Some(Ok(Message::Text(text))) => {
                    conn.set_json_wire(true);
                    super::dispatch_json(&core, &conn, &text);
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(err)) => {
                    log::debug!("websocket read from {addr} failed: {err}");
                    break;
                }
            },
        }
    }

    core.disconnect(&conn);
    let _ = writer_task.await;
}

async fn write_loop(
    mut sink: SplitSink<WebSocketStream<TcpStream>, Message>,
    mut rx: UnboundedReceiver<Outgoing>,
    conn: Arc<Connection>,
) {
    while let Some(out) = rx.recv().await {
        match out {
            Outgoing::Packet(packet) => {
                let message = if conn.json_wire() {
                    Message::Text(packet.to_json().to_string())
                } else {
                    Message::Binary(packet.payload())
                };
                if sink.send(message).await.is_err() {
                    break;
                }
            }
            Outgoing::Shutdown => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    }
}
