//! Blocking TCP transport: two OS threads per connection, for clients
//! whose network stacks predate async I/O. Framing and dispatch are
//! identical to the async TCP transport.

use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;

use crate::connection::{Connection, Outgoing};
use crate::server::ServerCore;
use crate::transport::frame::FrameAssembler;

pub fn serve(core: Arc<ServerCore>, listener: TcpListener) {
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let core = core.clone();
                std::thread::spawn(move || handle(core, stream));
            }
            Err(err) => log::error!("blocking tcp accept failed: {err}"),
        }
    }
}

fn handle(core: Arc<ServerCore>, mut stream: TcpStream) {
    let addr = match stream.peer_addr() {
        Ok(addr) => addr,
        Err(err) => {
            log::debug!("blocking tcp peer address unavailable: {err}");
            return;
        }
    };
    let _ = stream.set_nodelay(true);
    let (conn, rx) = Connection::channel(core.registry.issue_token(), addr);
    if !core.register(&conn) {
        return;
    }
    let writer_stream = match stream.try_clone() {
        Ok(clone) => clone,
        Err(err) => {
            log::error!("blocking tcp handle clone for {addr} failed: {err}");
            core.disconnect(&conn);
            return;
        }
    };
    let writer = std::thread::spawn(move || write_loop(writer_stream, rx));

    let mut assembler = FrameAssembler::new();
    let mut buf = [0u8; 4096];
    'session: loop {
        match stream.read(&mut buf) {
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
                log::debug!("blocking tcp read from {addr} failed: {err}");
                break;
            }
        }
    }

    core.disconnect(&conn);
    let _ = writer.join();
}

fn write_loop(mut stream: TcpStream, mut rx: UnboundedReceiver<Outgoing>) {
    while let Some(out) = rx.blocking_recv() {
        match out {
            Outgoing::Packet(packet) => {
                if stream.write_all(&packet.frame()).is_err() {
                    break;
                }
            }
            Outgoing::Shutdown => break,
        }
    }
    // Closing both halves unblocks the read loop parked in `read`.
    let _ = stream.shutdown(Shutdown::Both);
}
