//! Asynchronous JDWP client: connection setup, request/reply correlation,
//! and event dispatch.
//!
//! The client is a cheap-to-clone handle over shared state. One background
//! task owns the read half of the socket and does nothing but frame packets
//! and route them; a second task decodes event packets against the protocol
//! schema and fans them out to registered callbacks. Any number of callers
//! can issue commands concurrently; replies are matched to callers by packet
//! id through the pending table.

use std::{
    collections::HashMap,
    net::SocketAddr,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU32, AtomicU64, Ordering},
        Arc, OnceLock,
    },
    time::Duration,
};

use argus_spec::Spec;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    sync::{mpsc, oneshot, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    codec::{
        decode_record, encode_command, encode_record, JdwpReader, JdwpWriter, EVENT_MAGIC,
        HANDSHAKE, HEADER_LEN,
    },
    poison,
    types::{IdSizes, Record, Value},
    JdwpError, Result,
};

#[derive(Debug, Clone)]
pub struct JdwpClientConfig {
    pub handshake_timeout: Duration,
    pub reply_timeout: Duration,
    /// Default deadline for [`JdwpClient::await_event`].
    pub event_timeout: Duration,
    /// How long [`JdwpClient::disconnect`] waits for background tasks.
    pub shutdown_timeout: Duration,
}

impl Default for JdwpClientConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(5),
            reply_timeout: Duration::from_secs(10),
            event_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(2),
        }
    }
}

/// Handle returned by [`JdwpClient::register_event_callback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

type EventCallback = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Debug)]
struct Reply {
    error_code: u16,
    payload: Vec<u8>,
}

struct Inner {
    spec: Arc<Spec>,
    writer: Mutex<tokio::net::tcp::OwnedWriteHalf>,
    pending: Mutex<HashMap<u32, oneshot::Sender<Result<Reply>>>>,
    next_id: AtomicU32,
    // Negotiated once during connect; read-only afterwards.
    id_sizes: OnceLock<IdSizes>,
    callbacks: std::sync::Mutex<Vec<(CallbackId, EventCallback)>>,
    next_callback_id: AtomicU64,
    events_tx: mpsc::UnboundedSender<(u32, Vec<u8>)>,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
    shutdown: CancellationToken,
    config: JdwpClientConfig,
}

#[derive(Clone)]
pub struct JdwpClient {
    inner: Arc<Inner>,
}

// Manual impl: `Inner` holds `dyn Fn` callbacks, which have no `Debug`.
impl std::fmt::Debug for JdwpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JdwpClient")
            .field("next_id", &self.inner.next_id)
            .field("id_sizes", &self.inner.id_sizes)
            .finish_non_exhaustive()
    }
}

impl JdwpClient {
    pub async fn connect(addr: SocketAddr, spec: Spec) -> Result<Self> {
        Self::connect_with_config(addr, spec, JdwpClientConfig::default()).await
    }

    pub async fn connect_with_config(
        addr: SocketAddr,
        spec: Spec,
        config: JdwpClientConfig,
    ) -> Result<Self> {
        let mut stream = TcpStream::connect(addr).await?;
        let _ = stream.set_nodelay(true);

        tokio::time::timeout(config.handshake_timeout, stream.write_all(HANDSHAKE))
            .await
            .map_err(|_| JdwpError::Timeout)??;

        let mut handshake = [0u8; HANDSHAKE.len()];
        tokio::time::timeout(config.handshake_timeout, stream.read_exact(&mut handshake))
            .await
            .map_err(|_| JdwpError::Timeout)??;

        if handshake != *HANDSHAKE {
            return Err(JdwpError::Handshake(format!(
                "invalid handshake reply: {:?}",
                String::from_utf8_lossy(&handshake)
            )));
        }

        let (reader, writer) = stream.into_split();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(Inner {
            spec: Arc::new(spec),
            writer: Mutex::new(writer),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU32::new(1),
            id_sizes: OnceLock::new(),
            callbacks: std::sync::Mutex::new(Vec::new()),
            next_callback_id: AtomicU64::new(1),
            events_tx,
            tasks: std::sync::Mutex::new(Vec::new()),
            shutdown: CancellationToken::new(),
            config,
        });

        let read_task = tokio::spawn(read_loop(reader, inner.clone()));
        let notify_task = tokio::spawn(notifier_loop(events_rx, inner.clone()));
        {
            let mut tasks = poison::lock(&inner.tasks, "client tasks");
            tasks.push(read_task);
            tasks.push(notify_task);
        }

        let client = Self { inner };
        // Identifier sizes are required before any schema-driven command can
        // be encoded or decoded, so negotiate them immediately. A failed
        // negotiation must not leave the background tasks holding the socket.
        if let Err(err) = client.negotiate_id_sizes().await {
            client.disconnect().await;
            return Err(err);
        }

        Ok(client)
    }

    /// Cancels the background tasks. In-flight calls fail with `Cancelled`.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    /// A token that is cancelled when the client is shut down, either
    /// explicitly or because the underlying TCP connection closed.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    /// Shuts down and waits (bounded) for the background tasks to exit.
    pub async fn disconnect(&self) {
        self.inner.shutdown.cancel();
        let handles: Vec<JoinHandle<()>> = {
            let mut tasks = poison::lock(&self.inner.tasks, "client tasks");
            tasks.drain(..).collect()
        };
        for handle in handles {
            let _ = tokio::time::timeout(self.inner.config.shutdown_timeout, handle).await;
        }
    }

    pub fn spec(&self) -> &Spec {
        &self.inner.spec
    }

    pub fn id_sizes(&self) -> Result<IdSizes> {
        self.inner
            .id_sizes
            .get()
            .copied()
            .ok_or(JdwpError::IdSizesUnavailable)
    }

    /// Invokes `CommandSet.Command` by name: encodes `request` against the
    /// schema's Out arguments, sends it, and decodes the reply against the
    /// Reply arguments.
    pub async fn invoke(
        &self,
        command_set: &str,
        command: &str,
        request: &Record,
    ) -> Result<Record> {
        let sizes = self.id_sizes()?;
        let command = self.inner.spec.command(command_set, command)?;

        let mut w = JdwpWriter::new();
        encode_record(command.request(), request, &sizes, &mut w)?;
        let payload = self
            .send_command_raw(command.command_set_id(), command.id(), w.into_vec())
            .await?;

        let mut r = JdwpReader::new(&payload);
        let record = decode_record(command.response(), &sizes, &mut r)?;
        if r.remaining() > 0 {
            tracing::warn!(
                target = "argus.wire",
                trailing = r.remaining(),
                "reply payload has trailing bytes past the schema's fields"
            );
        }
        Ok(record)
    }

    /// Registers a callback invoked for every decoded composite event packet.
    /// A panicking callback is isolated; it never affects other callbacks or
    /// the dispatch loop.
    pub fn register_event_callback<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = CallbackId(self.inner.next_callback_id.fetch_add(1, Ordering::Relaxed));
        let mut callbacks = poison::lock(&self.inner.callbacks, "event callbacks");
        callbacks.push((id, Arc::new(callback)));
        id
    }

    pub fn unregister_event_callback(&self, id: CallbackId) {
        let mut callbacks = poison::lock(&self.inner.callbacks, "event callbacks");
        callbacks.retain(|(cb_id, _)| *cb_id != id);
    }

    /// Blocks until a composite event packet satisfies `matches`, then
    /// returns it. Gives up with `Timeout` after the configured event
    /// deadline.
    pub async fn await_event<F>(&self, mut matches: F) -> Result<Value>
    where
        F: FnMut(&Value) -> bool + Send,
    {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = self.register_event_callback(move |event| {
            let _ = tx.send(event.clone());
        });

        let deadline = tokio::time::Instant::now() + self.inner.config.event_timeout;
        let result = loop {
            let event = tokio::select! {
                _ = self.inner.shutdown.cancelled() => break Err(JdwpError::Cancelled),
                res = tokio::time::timeout_at(deadline, rx.recv()) => match res {
                    Ok(Some(event)) => event,
                    Ok(None) => break Err(JdwpError::ConnectionClosed),
                    Err(_elapsed) => break Err(JdwpError::Timeout),
                },
            };
            if matches(&event) {
                break Ok(event);
            }
        };

        self.unregister_event_callback(id);
        result
    }

    async fn send_command_raw(
        &self,
        command_set: u8,
        command: u8,
        payload: Vec<u8>,
    ) -> Result<Vec<u8>> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        {
            let mut pending = self.inner.pending.lock().await;
            pending.insert(id, tx);
        }

        let packet = encode_command(id, command_set, command, &payload);
        {
            let mut writer = self.inner.writer.lock().await;
            writer.write_all(&packet).await?;
        }

        let reply = tokio::select! {
            _ = self.inner.shutdown.cancelled() => {
                self.remove_pending(id).await;
                return Err(JdwpError::Cancelled);
            }
            res = tokio::time::timeout(self.inner.config.reply_timeout, rx) => {
                match res {
                    Ok(Ok(r)) => r,
                    Ok(Err(_closed)) => return Err(JdwpError::ConnectionClosed),
                    Err(_elapsed) => {
                        // The caller gives up; a reply arriving later finds
                        // no pending entry and is dropped by the read loop.
                        self.remove_pending(id).await;
                        return Err(JdwpError::Timeout);
                    }
                }
            }
        }?;

        if reply.error_code != 0 {
            return Err(JdwpError::remote(reply.error_code));
        }

        Ok(reply.payload)
    }

    async fn remove_pending(&self, id: u32) {
        let mut pending = self.inner.pending.lock().await;
        pending.remove(&id);
    }

    /// VirtualMachine.IDSizes (1, 7). The reply layout is fixed by the
    /// protocol, so it is decoded by hand rather than through the schema.
    async fn negotiate_id_sizes(&self) -> Result<()> {
        let payload = self.send_command_raw(1, 7, Vec::new()).await?;
        let mut r = JdwpReader::new(&payload);
        let sizes = IdSizes {
            field_id: r.read_u32()? as usize,
            method_id: r.read_u32()? as usize,
            object_id: r.read_u32()? as usize,
            reference_type_id: r.read_u32()? as usize,
            frame_id: r.read_u32()? as usize,
        };
        let _ = self.inner.id_sizes.set(sizes);
        Ok(())
    }
}

async fn read_loop(mut reader: tokio::net::tcp::OwnedReadHalf, inner: Arc<Inner>) {
    let mut terminated_with_error = false;

    loop {
        let mut header = [0u8; HEADER_LEN];
        let header_read = tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            res = reader.read_exact(&mut header) => res,
        };
        if header_read.is_err() {
            terminated_with_error = true;
            break;
        }

        let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        if length < HEADER_LEN {
            tracing::error!(
                target = "argus.wire",
                length,
                "packet length shorter than its header; closing connection"
            );
            terminated_with_error = true;
            break;
        }

        let id = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        let error_code = u16::from_be_bytes([header[9], header[10]]);
        let mut payload = vec![0u8; length - HEADER_LEN];
        let payload_read = tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            res = reader.read_exact(&mut payload) => res,
        };
        if payload_read.is_err() {
            terminated_with_error = true;
            break;
        }

        // The event marker takes precedence over request-id matching: an
        // event packet whose id collides with an in-flight request must not
        // resolve that request.
        if error_code == EVENT_MAGIC {
            let _ = inner.events_tx.send((id, payload));
            continue;
        }

        let tx = {
            let mut pending = inner.pending.lock().await;
            pending.remove(&id)
        };
        match tx {
            Some(tx) => {
                let _ = tx.send(Ok(Reply {
                    error_code,
                    payload,
                }));
            }
            None => {
                tracing::warn!(
                    target = "argus.wire",
                    id,
                    error_code,
                    "reply for unknown request id; dropping packet"
                );
            }
        }
    }

    tracing::debug!(
        target = "argus.wire",
        terminated_with_error,
        "read loop exiting"
    );
    inner.shutdown.cancel();

    if terminated_with_error {
        let pending = {
            let mut pending = inner.pending.lock().await;
            std::mem::take(&mut *pending)
        };
        for (_id, tx) in pending {
            let _ = tx.send(Err(JdwpError::ConnectionClosed));
        }
    }
}

/// Decodes `Event.Composite` payloads off the event channel and fans them
/// out to callbacks. Decoding happens here, not in the read loop, so a slow
/// or malformed event never stalls reply routing.
async fn notifier_loop(mut events_rx: mpsc::UnboundedReceiver<(u32, Vec<u8>)>, inner: Arc<Inner>) {
    loop {
        let (packet_id, payload) = tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            msg = events_rx.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };

        let Some(sizes) = inner.id_sizes.get().copied() else {
            tracing::warn!(
                target = "argus.wire",
                packet_id,
                "event received before identifier sizes were negotiated; dropping"
            );
            continue;
        };

        let composite = match inner.spec.command("Event", "Composite") {
            Ok(command) => command,
            Err(err) => {
                tracing::warn!(
                    target = "argus.wire",
                    error = %err,
                    "protocol schema has no Event.Composite command; dropping event"
                );
                continue;
            }
        };

        let mut r = JdwpReader::new(&payload);
        let event = match decode_record(composite.response(), &sizes, &mut r) {
            Ok(record) => Value::Record(record),
            Err(err) => {
                tracing::warn!(
                    target = "argus.wire",
                    packet_id,
                    error = %err,
                    "failed to decode event packet; dropping"
                );
                continue;
            }
        };

        let callbacks: Vec<EventCallback> = {
            let callbacks = poison::lock(&inner.callbacks, "event callbacks");
            callbacks.iter().map(|(_, cb)| cb.clone()).collect()
        };
        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(&event))).is_err() {
                tracing::warn!(
                    target = "argus.wire",
                    packet_id,
                    "event callback panicked; continuing with remaining callbacks"
                );
            }
        }
    }
    tracing::debug!(target = "argus.wire", "event notifier exiting");
}

#[cfg(test)]
mod tests {
    use argus_spec::Spec;

    use super::*;
    use crate::mock::{MockVm, MockVmConfig, ScriptedReply};

    const TEST_SPEC: &str = r#"
(CommandSet VirtualMachine=1
  (Command Version=1
    (Out
    )
    (Reply
      (string description)
      (int    jdwpMajor)
      (int    jdwpMinor)
    )
    (ErrorSet
      (Error VM_DEAD)
    )
  )
  (Command IDSizes=7
    (Out
    )
    (Reply
      (int fieldIDSize)
      (int methodIDSize)
      (int objectIDSize)
      (int referenceTypeIDSize)
      (int frameIDSize)
    )
    (ErrorSet
      (Error VM_DEAD)
    )
  )
)
(CommandSet ThreadReference=11
  (Command Name=1
    (Out
      (threadID thread)
    )
    (Reply
      (string threadName)
    )
    (ErrorSet
      (Error INVALID_THREAD)
      (Error INVALID_OBJECT)
      (Error VM_DEAD)
    )
  )
)
(ConstantSet EventKind
  (Constant VM_START = 90)
  (Constant BREAKPOINT = 2)
)
(CommandSet Event=64
  (Command Composite=100
    (Event Composite
      (byte suspendPolicy)
      (Repeat events
        (Select eventKind
          (byte eventKind)
          (Alt VMStart=JDWP.EventKind.VM_START
            (int requestID)
            (threadID thread)
          )
          (Alt Breakpoint=JDWP.EventKind.BREAKPOINT
            (int requestID)
            (threadID thread)
            (location location)
          )
        )
      )
    )
  )
)
"#;

    fn test_spec() -> Spec {
        Spec::parse(TEST_SPEC).unwrap()
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "warn".into()),
            )
            .with_test_writer()
            .try_init();
    }

    fn short_timeouts() -> JdwpClientConfig {
        JdwpClientConfig {
            reply_timeout: Duration::from_millis(200),
            event_timeout: Duration::from_secs(2),
            ..JdwpClientConfig::default()
        }
    }

    fn name_request(thread: u64) -> Record {
        let mut record = Record::new();
        record.insert("thread".to_string(), Value::Id(thread));
        record
    }

    fn string_payload(s: &str) -> Vec<u8> {
        let mut w = JdwpWriter::new();
        w.write_string(s);
        w.into_vec()
    }

    fn vm_start_event_payload(request_id: i32, thread: u64) -> Vec<u8> {
        let mut w = JdwpWriter::new();
        w.write_u8(0); // suspend policy
        w.write_u32(1); // event count
        w.write_u8(90); // VM_START
        w.write_i32(request_id);
        w.write_id(thread, 8);
        w.into_vec()
    }

    fn event_request_id(event: &Value) -> Option<i64> {
        let events = match event.as_record()?.get("events")? {
            Value::List(events) => events,
            _ => return None,
        };
        let first = events.first()?.as_record()?;
        first
            .get("VMStart")?
            .as_record()?
            .get("requestID")?
            .as_discriminant()
    }

    #[tokio::test]
    async fn connect_negotiates_id_sizes() {
        init_tracing();
        let mock = MockVm::spawn().await.unwrap();
        let client = JdwpClient::connect(mock.addr(), test_spec()).await.unwrap();
        assert_eq!(client.id_sizes().unwrap(), IdSizes::default());
        client.disconnect().await;
    }

    #[tokio::test]
    async fn connect_rejects_corrupted_handshake() {
        init_tracing();
        let mock = MockVm::spawn_with_config(MockVmConfig {
            handshake_reply: b"JDWP-Handshape".to_vec(),
            ..MockVmConfig::default()
        })
        .await
        .unwrap();
        let err = JdwpClient::connect(mock.addr(), test_spec())
            .await
            .unwrap_err();
        assert!(matches!(err, JdwpError::Handshake(_)));
    }

    #[tokio::test]
    async fn invoke_encodes_and_decodes_by_name() {
        init_tracing();
        let mock = MockVm::spawn_with_config(MockVmConfig {
            scripted_replies: vec![ScriptedReply {
                command_set: 11,
                command: 1,
                error_code: 0,
                payload: string_payload("main"),
                delay: None,
            }],
            ..MockVmConfig::default()
        })
        .await
        .unwrap();

        let client = JdwpClient::connect(mock.addr(), test_spec()).await.unwrap();
        let reply = client
            .invoke("ThreadReference", "Name", &name_request(0x42))
            .await
            .unwrap();
        assert_eq!(reply.get("threadName").and_then(Value::as_str), Some("main"));
        client.disconnect().await;
    }

    #[tokio::test]
    async fn nonzero_error_code_maps_to_named_remote_error() {
        init_tracing();
        let mock = MockVm::spawn_with_config(MockVmConfig {
            scripted_replies: vec![ScriptedReply {
                command_set: 11,
                command: 1,
                error_code: 20,
                payload: Vec::new(),
                delay: None,
            }],
            ..MockVmConfig::default()
        })
        .await
        .unwrap();

        let client = JdwpClient::connect(mock.addr(), test_spec()).await.unwrap();
        let err = client
            .invoke("ThreadReference", "Name", &name_request(0x42))
            .await
            .unwrap_err();
        assert!(
            matches!(err, JdwpError::Remote { code: 20, name, .. } if name == "INVALID_OBJECT")
        );
        client.disconnect().await;
    }

    #[tokio::test]
    async fn failed_negotiation_tears_the_connection_down() {
        init_tracing();
        let mock = MockVm::spawn_with_config(MockVmConfig {
            scripted_replies: vec![ScriptedReply {
                command_set: 1,
                command: 7,
                error_code: 112,
                payload: Vec::new(),
                delay: None,
            }],
            ..MockVmConfig::default()
        })
        .await
        .unwrap();

        let err = JdwpClient::connect(mock.addr(), test_spec())
            .await
            .unwrap_err();
        assert!(matches!(err, JdwpError::Remote { code: 112, .. }));

        // The background tasks must not linger holding the socket open.
        tokio::time::timeout(Duration::from_secs(2), mock.await_disconnect())
            .await
            .expect("connection should close after a failed connect");
    }

    #[tokio::test]
    async fn late_reply_after_timeout_is_dropped() {
        init_tracing();
        let mock = MockVm::spawn().await.unwrap();
        let client = JdwpClient::connect_with_config(mock.addr(), test_spec(), short_timeouts())
            .await
            .unwrap();

        let err = client
            .invoke("ThreadReference", "Name", &name_request(1))
            .await
            .unwrap_err();
        assert!(matches!(err, JdwpError::Timeout));

        // Reply for the abandoned request: no pending entry remains, so the
        // packet is dropped and must not disturb later traffic.
        let stale = mock.await_request(11, 1).await;
        mock.send_reply(stale.id, 0, &string_payload("stale"));

        let caller = client.clone();
        let call = tokio::spawn(async move {
            caller
                .invoke("ThreadReference", "Name", &name_request(2))
                .await
        });
        let fresh = mock.await_request(11, 1).await;
        assert_ne!(fresh.id, stale.id);
        mock.send_reply(fresh.id, 0, &string_payload("fresh"));

        let reply = call.await.unwrap().unwrap();
        assert_eq!(reply.get("threadName").and_then(Value::as_str), Some("fresh"));
        client.disconnect().await;
    }

    #[tokio::test]
    async fn unanswered_request_times_out() {
        init_tracing();
        let mock = MockVm::spawn().await.unwrap();
        let client =
            JdwpClient::connect_with_config(mock.addr(), test_spec(), short_timeouts())
                .await
                .unwrap();
        let err = client
            .invoke("ThreadReference", "Name", &name_request(0x42))
            .await
            .unwrap_err();
        assert!(matches!(err, JdwpError::Timeout));
        client.disconnect().await;
    }

    #[tokio::test]
    async fn event_with_colliding_id_does_not_resolve_pending_request() {
        init_tracing();
        let mock = MockVm::spawn().await.unwrap();
        let client = JdwpClient::connect(mock.addr(), test_spec()).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        client.register_event_callback(move |event| {
            let _ = tx.send(event.clone());
        });

        let caller = client.clone();
        let call = tokio::spawn(async move {
            caller
                .invoke("ThreadReference", "Name", &name_request(0x42))
                .await
        });

        let packet = mock.await_request(11, 1).await;
        // Event whose packet id equals the in-flight request id.
        mock.send_event(packet.id, &vm_start_event_payload(7, 0x42));

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event_request_id(&event), Some(7));
        assert!(!call.is_finished(), "event must not resolve the call");

        mock.send_reply(packet.id, 0, &string_payload("main"));
        let reply = call.await.unwrap().unwrap();
        assert_eq!(reply.get("threadName").and_then(Value::as_str), Some("main"));
        client.disconnect().await;
    }

    #[tokio::test]
    async fn replies_resolve_out_of_order() {
        init_tracing();
        let mock = MockVm::spawn().await.unwrap();
        let client = JdwpClient::connect(mock.addr(), test_spec()).await.unwrap();

        let first_caller = client.clone();
        let first = tokio::spawn(async move {
            first_caller
                .invoke("ThreadReference", "Name", &name_request(1))
                .await
        });
        let first_packet = mock.await_request(11, 1).await;

        let second_caller = client.clone();
        let second = tokio::spawn(async move {
            second_caller
                .invoke("ThreadReference", "Name", &name_request(2))
                .await
        });
        let second_packet = mock.await_request(11, 1).await;
        assert_ne!(first_packet.id, second_packet.id);

        mock.send_reply(second_packet.id, 0, &string_payload("second"));
        mock.send_reply(first_packet.id, 0, &string_payload("first"));

        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();
        assert_eq!(first.get("threadName").and_then(Value::as_str), Some("first"));
        assert_eq!(
            second.get("threadName").and_then(Value::as_str),
            Some("second")
        );
        client.disconnect().await;
    }

    #[tokio::test]
    async fn await_event_matches_and_returns_the_event() {
        init_tracing();
        let mock = MockVm::spawn().await.unwrap();
        let client = JdwpClient::connect_with_config(mock.addr(), test_spec(), short_timeouts())
            .await
            .unwrap();

        let waiter = client.clone();
        let (event, _) = tokio::join!(
            waiter.await_event(|event| event_request_id(event) == Some(9)),
            async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                // A non-matching event first; the waiter must skip it.
                mock.send_event(1000, &vm_start_event_payload(8, 0x42));
                mock.send_event(1001, &vm_start_event_payload(9, 0x42));
            }
        );
        assert_eq!(event_request_id(&event.unwrap()), Some(9));
        client.disconnect().await;
    }

    #[tokio::test]
    async fn panicking_callback_does_not_stop_dispatch() {
        init_tracing();
        let mock = MockVm::spawn().await.unwrap();
        let client = JdwpClient::connect(mock.addr(), test_spec()).await.unwrap();

        client.register_event_callback(|_| panic!("listener bug"));
        let (tx, mut rx) = mpsc::unbounded_channel();
        client.register_event_callback(move |event| {
            let _ = tx.send(event.clone());
        });

        mock.send_event(1000, &vm_start_event_payload(5, 0x42));
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event_request_id(&event), Some(5));
        client.disconnect().await;
    }

    #[tokio::test]
    async fn unregistered_callback_stops_receiving_events() {
        init_tracing();
        let mock = MockVm::spawn().await.unwrap();
        let client = JdwpClient::connect(mock.addr(), test_spec()).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = client.register_event_callback(move |event| {
            let _ = tx.send(event.clone());
        });
        client.unregister_event_callback(id);

        mock.send_event(1000, &vm_start_event_payload(5, 0x42));
        // The sender side has been dropped with the callback, so the channel
        // reports closed rather than delivering anything.
        let received = tokio::time::timeout(Duration::from_millis(300), rx.recv()).await;
        assert!(matches!(received, Ok(None) | Err(_)));
        client.disconnect().await;
    }
}
