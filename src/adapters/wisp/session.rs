use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tracing::Instrument;

use crate::adapters::websocket::ServerSocket;
use crate::adapters::wisp::packet::{CloseReason, Packet, Payload, StreamType};
use crate::config::TunnelConfig;
use crate::metrics;
use crate::utils::net::is_local_ip;

const READ_BUFFER: usize = 64 * 1024;
const OUTBOUND_QUEUE: usize = 1024;

struct StreamHandle {
    writes: mpsc::Sender<Bytes>,
    task: JoinHandle<()>,
    /// Distinguishes a reopened stream id from the task that used it before.
    generation: u64,
}

/// Finished stream, reported back to the session loop.
type ClosedStream = (u32, u64);

/// Drives one WISP connection until the WebSocket closes.
///
/// Every stream runs in its own task; dropping the session aborts all of them.
pub async fn run(socket: ServerSocket, config: Arc<TunnelConfig>) {
    let (mut sink, mut incoming) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Packet>(OUTBOUND_QUEUE);
    let (closed_tx, mut closed_rx) = mpsc::unbounded_channel::<ClosedStream>();

    let writer = tokio::spawn(async move {
        while let Some(packet) = out_rx.recv().await {
            if sink.send(Message::Binary(packet.encode())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    if out_tx
        .send(Packet::continue_with(0, config.buffer_size))
        .await
        .is_err()
    {
        return;
    }

    let mut streams: HashMap<u32, StreamHandle> = HashMap::new();
    let mut generation: u64 = 0;

    loop {
        tokio::select! {
            message = incoming.next() => {
                let raw = match message {
                    Some(Ok(Message::Binary(raw))) => raw,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::debug!("WISP websocket error: {}", e);
                        break;
                    }
                };

                let packet = match Packet::parse(raw) {
                    Ok(packet) => packet,
                    Err(e) => {
                        tracing::debug!("Dropping malformed WISP packet: {}", e);
                        continue;
                    }
                };

                handle_packet(packet, &mut streams, &mut generation, &config, &out_tx, &closed_tx).await;
            }
            Some(closed) = closed_rx.recv() => forget_stream(&mut streams, closed),
        }
    }

    for (_, handle) in streams.drain() {
        handle.task.abort();
    }
    drop(out_tx);
    let _ = writer.await;
    tracing::debug!("WISP session closed");
}

/// Drop the handle of a finished stream unless its id was reused since.
fn forget_stream(streams: &mut HashMap<u32, StreamHandle>, (stream_id, generation): ClosedStream) {
    if streams
        .get(&stream_id)
        .is_some_and(|handle| handle.generation == generation)
    {
        streams.remove(&stream_id);
    }
}

async fn handle_packet(
    packet: Packet,
    streams: &mut HashMap<u32, StreamHandle>,
    generation: &mut u64,
    config: &Arc<TunnelConfig>,
    out_tx: &mpsc::Sender<Packet>,
    closed_tx: &mpsc::UnboundedSender<ClosedStream>,
) {
    let stream_id = packet.stream_id;
    match packet.payload {
        Payload::Connect {
            stream_type,
            port,
            hostname,
        } => {
            let live = streams
                .get(&stream_id)
                .is_some_and(|handle| !handle.task.is_finished());
            if stream_id == 0 || live {
                tracing::debug!(stream_id, "Ignoring CONNECT for reserved or live stream");
                return;
            }
            *generation += 1;
            let (writes, write_rx) = mpsc::channel(config.buffer_size as usize);
            let span = tracing::debug_span!("wisp_stream", stream_id, host = %hostname, port);
            let task = tokio::spawn(
                run_stream(
                    (stream_id, *generation),
                    stream_type,
                    hostname,
                    port,
                    config.clone(),
                    write_rx,
                    out_tx.clone(),
                    closed_tx.clone(),
                )
                .instrument(span),
            );
            streams.insert(
                stream_id,
                StreamHandle {
                    writes,
                    task,
                    generation: *generation,
                },
            );
        }
        Payload::Data(data) => {
            if let Some(handle) = streams.get(&stream_id) {
                if handle.writes.send(data).await.is_err() {
                    streams.remove(&stream_id);
                }
            }
        }
        Payload::Close(reason) => {
            if let Some(handle) = streams.remove(&stream_id) {
                tracing::debug!(stream_id, ?reason, "Client closed stream");
                handle.task.abort();
            }
        }
        Payload::Continue { .. } => {}
    }
}

enum Remote {
    Tcp(TcpStream),
    Udp(UdpSocket),
}

#[allow(clippy::too_many_arguments)]
async fn run_stream(
    (stream_id, generation): ClosedStream,
    stream_type: StreamType,
    hostname: String,
    port: u16,
    config: Arc<TunnelConfig>,
    write_rx: mpsc::Receiver<Bytes>,
    out_tx: mpsc::Sender<Packet>,
    closed_tx: mpsc::UnboundedSender<ClosedStream>,
) {
    let reason = match open_remote(stream_type, &hostname, port, &config).await {
        Ok(Remote::Tcp(stream)) => {
            metrics::increment_wisp_streams("tcp");
            pump_tcp(stream_id, stream, write_rx, config.buffer_size, &out_tx).await
        }
        Ok(Remote::Udp(socket)) => {
            metrics::increment_wisp_streams("udp");
            pump_udp(stream_id, socket, write_rx, &out_tx).await
        }
        Err(reason) => {
            tracing::debug!(?reason, "WISP stream could not be opened");
            reason
        }
    };

    let _ = out_tx.send(Packet::close(stream_id, reason)).await;
    let _ = closed_tx.send((stream_id, generation));
}

async fn open_remote(
    stream_type: StreamType,
    hostname: &str,
    port: u16,
    config: &TunnelConfig,
) -> Result<Remote, CloseReason> {
    if stream_type == StreamType::Udp && !config.allow_udp {
        return Err(CloseReason::InvalidInfo);
    }
    if hostname.is_empty() {
        return Err(CloseReason::InvalidInfo);
    }

    let limit = Duration::from_secs(config.connect_timeout_secs);
    let addrs: Vec<SocketAddr> = match timeout(limit, tokio::net::lookup_host((hostname, port))).await {
        Ok(Ok(addrs)) => addrs.collect(),
        Ok(Err(_)) => return Err(CloseReason::Unreachable),
        Err(_) => return Err(CloseReason::TcpTimeout),
    };
    if addrs.is_empty() {
        return Err(CloseReason::Unreachable);
    }
    if config.block_local && addrs.iter().any(|addr| is_local_ip(addr.ip())) {
        return Err(CloseReason::Blocked);
    }

    match stream_type {
        StreamType::Tcp => match timeout(limit, TcpStream::connect(&addrs[..])).await {
            Ok(Ok(stream)) => {
                let _ = stream.set_nodelay(true);
                Ok(Remote::Tcp(stream))
            }
            Ok(Err(e)) => Err(connect_error_reason(&e)),
            Err(_) => Err(CloseReason::TcpTimeout),
        },
        StreamType::Udp => {
            let target = addrs[0];
            let bind: SocketAddr = if target.is_ipv6() {
                "[::]:0".parse().map_err(|_| CloseReason::NetworkError)?
            } else {
                "0.0.0.0:0".parse().map_err(|_| CloseReason::NetworkError)?
            };
            let socket = UdpSocket::bind(bind)
                .await
                .map_err(|_| CloseReason::NetworkError)?;
            socket
                .connect(target)
                .await
                .map_err(|e| connect_error_reason(&e))?;
            Ok(Remote::Udp(socket))
        }
    }
}

fn connect_error_reason(err: &io::Error) -> CloseReason {
    match err.kind() {
        io::ErrorKind::ConnectionRefused => CloseReason::Refused,
        io::ErrorKind::TimedOut => CloseReason::TcpTimeout,
        _ => CloseReason::Unreachable,
    }
}

/// Copies both directions of a TCP stream and grants the client a fresh
/// buffer after every `buffer_size` packets written to the remote.
async fn pump_tcp(
    stream_id: u32,
    stream: TcpStream,
    mut write_rx: mpsc::Receiver<Bytes>,
    buffer_size: u32,
    out_tx: &mpsc::Sender<Packet>,
) -> CloseReason {
    let (mut reader, mut writer) = stream.into_split();

    let upstream = async {
        let mut written: u32 = 0;
        while let Some(data) = write_rx.recv().await {
            if writer.write_all(&data).await.is_err() {
                return CloseReason::NetworkError;
            }
            written += 1;
            if written >= buffer_size {
                written = 0;
                if out_tx
                    .send(Packet::continue_with(stream_id, buffer_size))
                    .await
                    .is_err()
                {
                    return CloseReason::Voluntary;
                }
            }
        }
        let _ = writer.shutdown().await;
        CloseReason::Voluntary
    };

    let downstream = async {
        let mut buf = vec![0u8; READ_BUFFER];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => return CloseReason::Voluntary,
                Ok(n) => {
                    let packet = Packet::data(stream_id, Bytes::copy_from_slice(&buf[..n]));
                    if out_tx.send(packet).await.is_err() {
                        return CloseReason::Voluntary;
                    }
                }
                Err(_) => return CloseReason::NetworkError,
            }
        }
    };

    tokio::select! {
        reason = downstream => reason,
        reason = upstream => reason,
    }
}

async fn pump_udp(
    stream_id: u32,
    socket: UdpSocket,
    mut write_rx: mpsc::Receiver<Bytes>,
    out_tx: &mpsc::Sender<Packet>,
) -> CloseReason {
    let mut buf = vec![0u8; READ_BUFFER];
    loop {
        tokio::select! {
            received = socket.recv(&mut buf) => match received {
                Ok(n) => {
                    let packet = Packet::data(stream_id, Bytes::copy_from_slice(&buf[..n]));
                    if out_tx.send(packet).await.is_err() {
                        return CloseReason::Voluntary;
                    }
                }
                Err(_) => return CloseReason::NetworkError,
            },
            outgoing = write_rx.recv() => match outgoing {
                Some(data) => {
                    if socket.send(&data).await.is_err() {
                        return CloseReason::NetworkError;
                    }
                }
                None => return CloseReason::Voluntary,
            },
        }
    }
}
