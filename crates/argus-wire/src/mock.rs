//! A tiny scriptable JDWP endpoint used for unit testing.
//!
//! It accepts a single debugger connection, answers the handshake and
//! `VirtualMachine.IDSizes`, and otherwise only replies when a test scripted
//! a response or pushes bytes through [`MockVm::send_reply`] /
//! [`MockVm::send_event`]. Leaving a command unanswered is deliberate; it is
//! how timeout and out-of-order reply behavior gets exercised.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio_util::sync::CancellationToken;

use crate::codec::{encode_reply, JdwpWriter, EVENT_MAGIC, HANDSHAKE, HEADER_LEN};
use crate::types::IdSizes;

pub struct MockVm {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<State>,
}

#[derive(Clone, Debug)]
pub struct MockVmConfig {
    /// Bytes echoed back after the debugger's handshake. Tests use a
    /// corrupted value to exercise handshake rejection.
    pub handshake_reply: Vec<u8>,
    /// Identifier sizes returned by `VirtualMachine.IDSizes (1, 7)`.
    pub id_sizes: IdSizes,
    /// Canned replies, matched and consumed in order per `(set, command)`.
    pub scripted_replies: Vec<ScriptedReply>,
}

impl Default for MockVmConfig {
    fn default() -> Self {
        Self {
            handshake_reply: HANDSHAKE.to_vec(),
            id_sizes: IdSizes::default(),
            scripted_replies: Vec::new(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ScriptedReply {
    pub command_set: u8,
    pub command: u8,
    pub error_code: u16,
    pub payload: Vec<u8>,
    pub delay: Option<Duration>,
}

/// A command packet the mock has read off the wire.
#[derive(Clone, Debug)]
pub struct ReceivedPacket {
    pub id: u32,
    pub command_set: u8,
    pub command: u8,
    pub payload: Vec<u8>,
}

struct State {
    id_sizes: IdSizes,
    scripted: Mutex<Vec<ScriptedReply>>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    received: Mutex<Vec<ReceivedPacket>>,
    received_notify: Notify,
    // Cancelled once the connection (or the accept loop) has ended.
    conn_closed: CancellationToken,
}

impl MockVm {
    pub async fn spawn() -> std::io::Result<Self> {
        Self::spawn_with_config(MockVmConfig::default()).await
    }

    pub async fn spawn_with_config(config: MockVmConfig) -> std::io::Result<Self> {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let state = Arc::new(State {
            id_sizes: config.id_sizes,
            scripted: Mutex::new(config.scripted_replies.clone()),
            outbound,
            received: Mutex::new(Vec::new()),
            received_notify: Notify::new(),
            conn_closed: CancellationToken::new(),
        });

        let task_state = state.clone();
        let task_shutdown = shutdown.clone();
        tokio::spawn(async move {
            let _ = run(listener, config, task_state.clone(), outbound_rx, task_shutdown).await;
            task_state.conn_closed.cancel();
        });

        Ok(Self {
            addr,
            shutdown,
            state,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Removes and returns the first received packet matching `(set, command)`,
    /// waiting until one arrives.
    pub async fn await_request(&self, command_set: u8, command: u8) -> ReceivedPacket {
        loop {
            let notified = self.state.received_notify.notified();
            {
                let mut received = self.state.received.lock().await;
                if let Some(pos) = received
                    .iter()
                    .position(|p| p.command_set == command_set && p.command == command)
                {
                    return received.remove(pos);
                }
            }
            notified.await;
        }
    }

    pub fn send_reply(&self, id: u32, error_code: u16, payload: &[u8]) {
        let _ = self
            .state
            .outbound
            .send(encode_reply(id, error_code, payload));
    }

    /// Emits an event packet. The packet id is caller-chosen so tests can
    /// collide it with an in-flight request id.
    pub fn send_event(&self, id: u32, payload: &[u8]) {
        self.send_reply(id, EVENT_MAGIC, payload);
    }

    pub fn send_raw(&self, bytes: Vec<u8>) {
        let _ = self.state.outbound.send(bytes);
    }

    /// Resolves once the debugger side has closed the connection (or the
    /// mock itself shut down).
    pub async fn await_disconnect(&self) {
        self.state.conn_closed.cancelled().await;
    }
}

impl Drop for MockVm {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run(
    listener: TcpListener,
    config: MockVmConfig,
    state: Arc<State>,
    mut outbound_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let mut socket = tokio::select! {
        _ = shutdown.cancelled() => return Ok(()),
        accept = listener.accept() => accept?.0,
    };

    let mut hs = [0u8; HANDSHAKE.len()];
    socket.read_exact(&mut hs).await?;
    if hs != *HANDSHAKE {
        return Ok(());
    }
    socket.write_all(&config.handshake_reply).await?;

    let (mut reader, mut writer) = socket.into_split();

    let writer_shutdown = shutdown.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = writer_shutdown.cancelled() => break,
                msg = outbound_rx.recv() => {
                    let Some(bytes) = msg else { break };
                    if writer.write_all(&bytes).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    loop {
        let packet = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            res = read_packet(&mut reader) => {
                let Some(packet) = res? else {
                    return Ok(());
                };
                packet
            }
        };
        handle_packet(&state, packet, shutdown.clone()).await;
    }
}

async fn read_packet(
    socket: &mut tokio::net::tcp::OwnedReadHalf,
) -> std::io::Result<Option<ReceivedPacket>> {
    let mut header = [0u8; HEADER_LEN];
    match socket.read_exact(&mut header).await {
        Ok(_n) => {}
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err),
    }

    let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    if length < HEADER_LEN {
        return Ok(None);
    }
    let id = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    let flags = header[8];
    if flags != 0 {
        // The mock only expects command packets from the debugger.
        return Ok(None);
    }
    let command_set = header[9];
    let command = header[10];
    let mut payload = vec![0u8; length - HEADER_LEN];
    socket.read_exact(&mut payload).await?;
    Ok(Some(ReceivedPacket {
        id,
        command_set,
        command,
        payload,
    }))
}

async fn handle_packet(state: &Arc<State>, packet: ReceivedPacket, shutdown: CancellationToken) {
    let scripted = {
        let mut scripted = state.scripted.lock().await;
        scripted
            .iter()
            .position(|s| s.command_set == packet.command_set && s.command == packet.command)
            .map(|pos| scripted.remove(pos))
    };

    let reply = match scripted {
        Some(script) => {
            let bytes = encode_reply(packet.id, script.error_code, &script.payload);
            match script.delay.filter(|d| !d.is_zero()) {
                Some(delay) => {
                    let outbound = state.outbound.clone();
                    tokio::spawn(async move {
                        tokio::select! {
                            _ = shutdown.cancelled() => {}
                            _ = tokio::time::sleep(delay) => {
                                let _ = outbound.send(bytes);
                            }
                        }
                    });
                    None
                }
                None => Some(bytes),
            }
        }
        // VirtualMachine.IDSizes gets an automatic reply so connecting works
        // without scripting. Everything else stays unanswered until the test
        // answers it.
        None if packet.command_set == 1 && packet.command == 7 => {
            let sizes = state.id_sizes;
            let mut w = JdwpWriter::new();
            w.write_u32(sizes.field_id as u32);
            w.write_u32(sizes.method_id as u32);
            w.write_u32(sizes.object_id as u32);
            w.write_u32(sizes.reference_type_id as u32);
            w.write_u32(sizes.frame_id as u32);
            Some(encode_reply(packet.id, 0, &w.into_vec()))
        }
        None => None,
    };

    if let Some(bytes) = reply {
        let _ = state.outbound.send(bytes);
    }

    state.received.lock().await.push(packet);
    state.received_notify.notify_waiters();
}
