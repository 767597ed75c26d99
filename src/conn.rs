//! Durable multiplexed connection to a Doozer cluster.
//!
//! A [`Connection`] owns exactly one live socket at a time. Many callers
//! share it concurrently: [`Connection::send`] assigns each request the
//! lowest free tag, registers a pending entry holding the raw packet and a
//! one-shot completion, writes the length-prefixed frame, and parks the
//! caller until the background receive loop resolves the matching
//! response or a timeout fires.
//!
//! # Failure Handling
//!
//! When the socket breaks, [`reconnect`](Connection::reconnect) walks the
//! shuffled address pool — up to [`MAX_CONNECT_ROUNDS`] full passes with
//! exponential backoff between rounds — and on success retransmits every
//! pending packet with its original tag before starting a fresh receive
//! loop. A late response for a pre-reconnect attempt therefore still
//! resolves the correct pending entry.
//!
//! Requests sent with `retry = false` are excluded from retransmission
//! entirely: if the transport cannot know whether the server executed a
//! write, the ambiguity belongs to the caller, not to a silent replay.
//!
//! # Locking
//!
//! All shared mutable state (socket writer, ready flag, pending table,
//! address cursor) lives behind one async mutex. Reconnection is
//! additionally serialized by a gate mutex so concurrent senders that hit
//! the same dead socket trigger exactly one dial sequence.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::addr::AddressPool;
use crate::constants::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_REQUEST_TIMEOUT, DEFAULT_RETRY_WAIT,
    MAX_CONNECT_ROUNDS, MAX_TAG,
};
use crate::encode::ToWire;
use crate::error::{Error, ResponseError, Result};
use crate::msg::{Request, Response};
use crate::parser::parse_response;

/// Transport configuration.
///
/// The per-address connect timeout is deliberately distinct from the
/// request/response round-trip timeout: the former bounds one TCP dial
/// during failover, the latter bounds how long a caller waits for its
/// response on a healthy-looking connection.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP connect timeout per address attempt.
    pub connect_timeout: Duration,
    /// How long `send` waits for the matching response.
    pub request_timeout: Duration,
    /// Initial backoff after a full failed pass over the address list;
    /// doubled each round.
    pub retry_wait: Duration,
    /// Frames with a larger length prefix are treated as corrupt.
    pub max_message_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry_wait: DEFAULT_RETRY_WAIT,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

/// One in-flight request.
///
/// The raw packet is kept verbatim so a reconnect can retransmit it with
/// the original tag. The completion is taken (not removed) by the receive
/// loop; removing the entry itself is exclusively `send`'s job, in its
/// guaranteed-cleanup step.
struct PendingRequest {
    packet: Bytes,
    /// Whether a reconnect may replay this packet. False for
    /// non-idempotent requests, which opt out of at-least-once delivery.
    retransmit: bool,
    completion: Option<oneshot::Sender<Response>>,
}

/// Result of attempting to write a registered packet.
enum WriteOutcome {
    /// The packet went out on the live socket.
    Written,
    /// No live socket; nothing was transmitted.
    NotReady,
}

/// State guarded by the connection mutex.
struct ConnState {
    pool: AddressPool,
    writer: Option<OwnedWriteHalf>,
    ready: bool,
    closed: bool,
    /// Bumped on every teardown/install; a receive loop observing a
    /// different epoch than its own has been retired and must not touch
    /// the pending table.
    epoch: u64,
    recv_task: Option<JoinHandle<()>>,
    pending: HashMap<i32, PendingRequest>,
}

struct ConnInner {
    config: Config,
    state: Mutex<ConnState>,
    /// Serializes reconnect attempts; see module docs.
    reconnect_gate: Mutex<()>,
}

/// A durable, multiplexed logical connection to a Doozer cluster.
///
/// Cloning is cheap and shares the underlying transport.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnInner>,
}

impl Connection {
    /// Dial the cluster and return a ready connection.
    ///
    /// The address list is shuffled once; the initial dial and every later
    /// reconnect walk it round-robin from a persistent cursor.
    pub async fn connect(addrs: Vec<String>, config: Config) -> Result<Self> {
        let pool = AddressPool::new(addrs)?;
        let conn = Connection {
            inner: Arc::new(ConnInner {
                config,
                state: Mutex::new(ConnState {
                    pool,
                    writer: None,
                    ready: false,
                    closed: false,
                    epoch: 0,
                    recv_task: None,
                    pending: HashMap::new(),
                }),
                reconnect_gate: Mutex::new(()),
            }),
        };
        conn.reconnect().await?;
        Ok(conn)
    }

    fn from_inner(inner: Arc<ConnInner>) -> Self {
        Connection { inner }
    }

    /// Send one request and wait for its response.
    ///
    /// `retry` selects the delivery contract:
    /// - `true` (idempotent verbs): the packet is retransmitted on
    ///   reconnect, and one timeout is answered with a forced reconnect
    ///   plus one more wait — at-least-once delivery.
    /// - `false` (mutating verbs): the packet is never replayed; any
    ///   transport uncertainty is surfaced to the caller — at most one
    ///   attempt reaches the server.
    ///
    /// A response carrying an error code is mapped to a typed
    /// [`ResponseError`] before returning.
    pub async fn send(&self, mut request: Request, retry: bool) -> Result<Response> {
        let (tag, mut rx) = self.register(&mut request, retry).await?;
        let result = self.exchange(tag, retry, &mut rx).await;

        // Guaranteed cleanup: the pending entry is removed on every exit
        // path, exactly once.
        {
            let mut state = self.inner.state.lock().await;
            state.pending.remove(&tag);
        }

        let response = result?;
        if let Some(code) = response.err_code {
            tracing::debug!(tag, code = ?code, verb = ?request.verb, "request failed");
            return Err(Error::Response(ResponseError::new(code, request, response)));
        }
        Ok(response)
    }

    /// Stop the receive loop, close the socket and refuse further sends.
    ///
    /// Callers already parked in [`send`] observe a timeout or a closed
    /// error and remove their own pending entries on the way out.
    pub async fn disconnect(&self) {
        let mut state = self.inner.state.lock().await;
        state.closed = true;
        state.ready = false;
        state.writer = None;
        state.epoch += 1;
        if let Some(task) = state.recv_task.take() {
            task.abort();
        }
        tracing::debug!("connection closed");
    }

    /// Allocate the lowest free tag and register the pending entry.
    async fn register(
        &self,
        request: &mut Request,
        retry: bool,
    ) -> Result<(i32, oneshot::Receiver<Response>)> {
        let mut state = self.inner.state.lock().await;
        if state.closed {
            return Err(Error::Closed);
        }

        let mut tag: i32 = 0;
        while state.pending.contains_key(&tag) {
            tag = if tag == MAX_TAG { 0 } else { tag + 1 };
        }
        request.tag = tag;

        let packet = request.to_packet()?;
        let (tx, rx) = oneshot::channel();
        state.pending.insert(
            tag,
            PendingRequest {
                packet,
                retransmit: retry,
                completion: Some(tx),
            },
        );
        Ok((tag, rx))
    }

    /// Transmit the packet and wait for the completion, allowing at most
    /// one repair attempt for both write failures and timeouts.
    async fn exchange(
        &self,
        tag: i32,
        retry: bool,
        rx: &mut oneshot::Receiver<Response>,
    ) -> Result<Response> {
        self.transmit(tag, retry).await?;

        let request_timeout = self.inner.config.request_timeout;
        match timeout(request_timeout, &mut *rx).await {
            Ok(Ok(response)) => return Ok(response),
            Ok(Err(_)) => return Err(Error::Closed),
            Err(_) => {}
        }

        if !retry {
            return Err(Error::Timeout(request_timeout));
        }

        // One forced reconnect retransmits the still-pending packet; a
        // second timeout is not retried again.
        tracing::debug!(tag, "request timed out, forcing reconnect");
        self.force_reconnect().await?;
        match timeout(request_timeout, &mut *rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(Error::Closed),
            Err(_) => Err(Error::Timeout(request_timeout)),
        }
    }

    /// Write the pending packet, repairing the connection once on failure.
    async fn transmit(&self, tag: i32, retry: bool) -> Result<()> {
        match self.write_pending(tag).await {
            Ok(WriteOutcome::Written) => Ok(()),
            Ok(WriteOutcome::NotReady) => {
                // Nothing has been transmitted yet, so bringing the
                // connection up and writing is still the first attempt.
                // Safe for every verb, including non-idempotent ones.
                self.reconnect().await?;
                match self.write_pending(tag).await? {
                    WriteOutcome::Written => Ok(()),
                    WriteOutcome::NotReady => Err(Error::IoError(io::ErrorKind::NotConnected)),
                }
            }
            Err(err) => {
                if !retry {
                    // The packet may have reached the server. Withdraw it
                    // so no reconnect can replay it, repair the connection
                    // for everyone else, and surface the ambiguity.
                    {
                        let mut state = self.inner.state.lock().await;
                        state.pending.remove(&tag);
                    }
                    self.reconnect().await?;
                    return Err(err);
                }
                self.reconnect().await?;
                // The reconnect retransmitted our packet already; a
                // duplicate write here is harmless because the second
                // response finds its completion already taken.
                match self.write_pending(tag).await? {
                    WriteOutcome::Written => Ok(()),
                    WriteOutcome::NotReady => Err(Error::IoError(io::ErrorKind::NotConnected)),
                }
            }
        }
    }

    /// Write one registered packet to the live socket.
    async fn write_pending(&self, tag: i32) -> Result<WriteOutcome> {
        let mut state = self.inner.state.lock().await;
        if state.closed {
            return Err(Error::Closed);
        }
        if !state.ready {
            return Ok(WriteOutcome::NotReady);
        }
        let packet = match state.pending.get(&tag) {
            Some(pending) => pending.packet.clone(),
            None => return Ok(WriteOutcome::Written),
        };
        let writer = match state.writer.as_mut() {
            Some(writer) => writer,
            None => return Ok(WriteOutcome::NotReady),
        };
        match writer.write_all(&packet).await {
            Ok(()) => Ok(WriteOutcome::Written),
            Err(err) => {
                tracing::debug!(tag, error = %err, "write failed, marking connection down");
                state.ready = false;
                state.writer = None;
                Err(Error::IoError(err.kind()))
            }
        }
    }

    /// Force a reconnect even if the connection still looks healthy.
    async fn force_reconnect(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock().await;
            if state.closed {
                return Err(Error::Closed);
            }
            state.ready = false;
        }
        self.reconnect().await
    }

    /// Re-establish the connection, retransmitting all pending packets.
    ///
    /// Walks the full address list once per round, starting at the
    /// persistent cursor; after a fruitless round sleeps `retry_wait` and
    /// doubles it. Gives up with a fatal [`Error::ConnectError`] after
    /// [`MAX_CONNECT_ROUNDS`] rounds.
    pub async fn reconnect(&self) -> Result<()> {
        let _gate = self.inner.reconnect_gate.lock().await;

        let addr_count = {
            let mut state = self.inner.state.lock().await;
            if state.closed {
                return Err(Error::Closed);
            }
            // Another sender may have finished a reconnect while we
            // queued on the gate.
            if state.ready {
                return Ok(());
            }
            // Retire the old receive loop (if still running) and socket.
            state.epoch += 1;
            state.writer = None;
            if let Some(task) = state.recv_task.take() {
                task.abort();
            }
            state.pool.len()
        };

        let mut retry_wait = self.inner.config.retry_wait;
        for round in 0..MAX_CONNECT_ROUNDS {
            if round > 0 {
                tracing::debug!(round, wait = ?retry_wait, "backing off before next connect round");
                tokio::time::sleep(retry_wait).await;
                retry_wait *= 2;
            }

            for _ in 0..addr_count {
                let addr = {
                    let mut state = self.inner.state.lock().await;
                    if state.closed {
                        return Err(Error::Closed);
                    }
                    state.pool.next().to_string()
                };

                match timeout(self.inner.config.connect_timeout, TcpStream::connect(&addr)).await {
                    Ok(Ok(stream)) => match self.install(stream).await {
                        Ok(()) => {
                            tracing::info!(%addr, "connected");
                            return Ok(());
                        }
                        Err(err) => {
                            tracing::warn!(%addr, error = %err, "retransmit on fresh socket failed");
                        }
                    },
                    Ok(Err(err)) => {
                        tracing::debug!(%addr, error = %err, "connect failed");
                    }
                    Err(_) => {
                        tracing::debug!(%addr, "connect timed out");
                    }
                }
            }
        }

        Err(Error::ConnectError(format!(
            "no address reachable after {MAX_CONNECT_ROUNDS} rounds"
        )))
    }

    /// Install a fresh socket: retransmit pending packets with their
    /// original tags, mark ready, and spawn exactly one receive loop.
    ///
    /// Returns a boxed future to break the recursive future type cycle
    /// (install -> recv_loop -> reconnect -> install).
    fn install<'a>(
        &'a self,
        stream: TcpStream,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let (reader, mut writer) = stream.into_split();
            let mut state = self.inner.state.lock().await;

            // Map-iteration order; ordering is not semantically significant
            // because responses match by tag. Non-idempotent packets are
            // skipped, their callers surface the uncertainty instead.
            let mut retransmitted = 0;
            for pending in state.pending.values() {
                if !pending.retransmit {
                    continue;
                }
                writer
                    .write_all(&pending.packet)
                    .await
                    .map_err(|e| Error::IoError(e.kind()))?;
                retransmitted += 1;
            }
            if retransmitted > 0 {
                tracing::debug!(count = retransmitted, "retransmitted pending requests");
            }

            state.writer = Some(writer);
            state.ready = true;
            state.epoch += 1;
            let epoch = state.epoch;
            // Boxed to break the recursive future type cycle
            // (install -> recv_loop -> reconnect -> install).
            let loop_fut: std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> =
                Box::pin(recv_loop(Arc::clone(&self.inner), reader, epoch));
            state.recv_task = Some(tokio::spawn(loop_fut));
            Ok(())
        })
    }
}

/// Read one length-prefixed frame: 4 bytes of big-endian length, then
/// exactly that many bytes of message.
async fn read_frame(reader: &mut OwnedReadHalf, max_size: usize) -> Result<Bytes> {
    let mut size_buf = [0u8; 4];
    reader
        .read_exact(&mut size_buf)
        .await
        .map_err(map_read_err)?;

    let size = u32::from_be_bytes(size_buf) as usize;
    if size > max_size {
        return Err(Error::MissingData(format!(
            "frame of {size} bytes exceeds maximum {max_size}"
        )));
    }

    let mut data = vec![0u8; size];
    reader.read_exact(&mut data).await.map_err(map_read_err)?;
    Ok(Bytes::from(data))
}

fn map_read_err(err: io::Error) -> Error {
    match err.kind() {
        io::ErrorKind::UnexpectedEof => Error::MissingData("connection closed".to_string()),
        kind => Error::IoError(kind),
    }
}

/// Receive loop for one live socket.
///
/// Resolves responses against the pending table by tag; never removes
/// entries. Exits on the first malformed frame or IO error, and the
/// connection reacts by scheduling a reconnect — the old loop never
/// recurses into itself.
async fn recv_loop(inner: Arc<ConnInner>, mut reader: OwnedReadHalf, epoch: u64) {
    loop {
        let frame = match read_frame(&mut reader, inner.config.max_message_size).await {
            Ok(frame) => frame,
            Err(err) => {
                tracing::debug!(error = %err, "receive loop terminating");
                break;
            }
        };
        let response = match parse_response(frame) {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(error = %err, "malformed response frame");
                break;
            }
        };

        let mut state = inner.state.lock().await;
        if state.epoch != epoch {
            // Retired by a reconnect; the pending table belongs to the
            // new loop now.
            return;
        }
        match state.pending.get_mut(&response.tag) {
            Some(pending) => {
                if let Some(completion) = pending.completion.take() {
                    let _ = completion.send(response);
                }
            }
            None => {
                tracing::trace!(tag = response.tag, "response for unknown tag dropped");
            }
        }
    }

    // Socket failed. Mark the connection down and schedule a reconnect so
    // pending requests are retransmitted promptly.
    let schedule = {
        let mut state = inner.state.lock().await;
        if state.closed || state.epoch != epoch {
            false
        } else {
            state.ready = false;
            state.writer = None;
            true
        }
    };
    if schedule {
        let conn = Connection::from_inner(inner);
        // Boxed to break the recursive future type cycle
        // (recv_loop -> reconnect -> install -> recv_loop).
        let fut: std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> =
            Box::pin(async move {
                if let Err(err) = conn.reconnect().await {
                    tracing::warn!(error = %err, "background reconnect failed");
                }
            });
        tokio::spawn(fut);
    }
}
