//! The session state machine.
//!
//! One task owns the whole lifecycle: it opens the transport, sends the
//! handshake, runs the steady-state read loop, classifies close frames, and
//! sleeps out reconnect backoffs. Nothing else reads from the transport or
//! mutates session state. Callers interact through a cloneable
//! [`SessionHandle`]: requests enqueue an outbound frame and await a waiter
//! registered with the pending-request table; `stop()` hands off through a
//! cancellation token rather than touching state from a foreign task.
//!
//! Transport teardown and the pending-table cascade happen in the same
//! step on the session task, so a request can never resolve against a stale
//! transport.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio_util::{codec::Framed, sync::CancellationToken};
use tracing::{debug, error, info, warn};

use crate::{
    codec::{Frame, MAX_PAYLOAD_LENGTH, Opcode, OpcodeFrameCodec},
    dispatch::EventRouter,
    envelope::{ClosePayload, Handshake, RequestEnvelope, ResponseEnvelope},
    error::RequestError,
    hooks::SessionHooks,
    multiplex::PendingRequests,
    reconnect::{BackoffPolicy, CloseAction, ClosePolicy},
    transport::Connector,
};

/// Lifecycle states of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// No transport; initial and terminal state.
    Closed,
    /// `Connector::open` in flight (or queued behind a backoff sleep).
    Connecting,
    /// Transport open, handshake sent, awaiting the first inbound frame.
    Handshaking,
    /// Steady state: multiplexer and dispatch active.
    Ready,
    /// Local shutdown in progress, draining buffered writes.
    Closing,
}

/// Why the last connection ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer sent a close frame with this code and message.
    Frame {
        /// Close code, as classified by the close policy.
        code: u16,
        /// Close message from the peer.
        message: String,
    },
    /// The transport died without a close frame.
    TransportLost,
    /// `stop()` was called locally.
    Stopped,
}

/// Tunable parameters of a session.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Protocol version announced in the handshake.
    pub protocol_version: u32,
    /// Application identifier announced in the handshake.
    pub client_id: String,
    /// Deadline for each individual request.
    pub request_timeout: Duration,
    /// Reconnect intervals.
    pub backoff: BackoffPolicy,
    /// Maximum accepted frame payload length.
    pub max_payload_length: usize,
    /// Capacity of the event dispatch queue.
    pub event_queue_capacity: usize,
    /// Capacity of the outbound frame queue.
    pub outbound_queue_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            protocol_version: 1,
            client_id: String::new(),
            request_timeout: Duration::from_secs(15),
            backoff: BackoffPolicy::default(),
            max_payload_length: MAX_PAYLOAD_LENGTH,
            event_queue_capacity: 64,
            outbound_queue_capacity: 64,
        }
    }
}

/// State shared between the session task and its handles.
struct Shared {
    pending: PendingRequests,
    state: watch::Sender<SessionState>,
    running: AtomicBool,
    close_reason: Mutex<Option<CloseReason>>,
    request_timeout: Duration,
}

/// Cloneable handle for interacting with a running session.
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<Shared>,
    outbound: mpsc::Sender<Frame>,
    shutdown: CancellationToken,
}

impl SessionHandle {
    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState { *self.shared.state.borrow() }

    /// Suspend until the session reaches `target`.
    pub async fn wait_for(&self, target: SessionState) {
        let mut rx = self.shared.state.subscribe();
        let _ = rx.wait_for(|state| *state == target).await;
    }

    /// Whether the session is still willing to (re)connect.
    #[must_use]
    pub fn is_running(&self) -> bool { self.shared.running.load(Ordering::SeqCst) }

    /// Why the last connection ended, if any connection has ended yet.
    #[must_use]
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.shared
            .close_reason
            .lock()
            .expect("close reason poisoned")
            .clone()
    }

    /// Number of requests currently awaiting a response.
    #[must_use]
    pub fn pending_requests(&self) -> usize { self.shared.pending.len() }

    /// Request a permanent stop.
    ///
    /// Safe to call from any task and at any point in the lifecycle; the
    /// session task observes the cancellation, drains, rejects every pending
    /// request, and ends in [`SessionState::Closed`].
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shutdown.cancel();
    }

    /// Issue a request and await its correlated response.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Timeout`] when no response arrives within the
    /// configured deadline, [`RequestError::Remote`] when the peer answers
    /// with an error envelope, [`RequestError::ConnectionLost`] when the
    /// transport dies first, and [`RequestError::Closed`] when the session
    /// is stopped.
    pub async fn request(&self, cmd: &str, args: Option<Value>) -> Result<Value, RequestError> {
        self.request_with_event(cmd, None, args).await
    }

    /// Issue a request carrying an event discriminator (subscription
    /// commands).
    ///
    /// # Errors
    ///
    /// As for [`request`](Self::request).
    pub async fn request_with_event(
        &self,
        cmd: &str,
        evt: Option<String>,
        args: Option<Value>,
    ) -> Result<Value, RequestError> {
        if !self.is_running() {
            return Err(RequestError::Closed);
        }
        let nonce = self.shared.pending.next_nonce();
        let envelope = RequestEnvelope {
            cmd: cmd.to_owned(),
            nonce: nonce.clone(),
            evt,
            args,
        };
        let frame = Frame::json(Opcode::Frame, &envelope).map_err(RequestError::Encode)?;

        let waiter = self.shared.pending.register(&nonce);
        // Whatever path leaves this function, including the caller dropping
        // the whole future mid-await, removes this nonce and only this nonce.
        let _guard = NonceGuard {
            pending: &self.shared.pending,
            nonce: &nonce,
        };
        if self.outbound.send(frame).await.is_err() {
            return Err(RequestError::Closed);
        }

        match tokio::time::timeout(self.shared.request_timeout, waiter).await {
            Ok(Ok(result)) => result,
            // The table was dropped without settling this waiter.
            Ok(Err(_)) => Err(RequestError::ConnectionLost),
            Err(_) => Err(RequestError::Timeout),
        }
    }
}

/// Removes a pending-request entry when the caller's wait ends.
struct NonceGuard<'a> {
    pending: &'a PendingRequests,
    nonce: &'a str,
}

impl Drop for NonceGuard<'_> {
    fn drop(&mut self) { self.pending.cancel(self.nonce); }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("state", &self.state())
            .field("running", &self.is_running())
            .field("pending_requests", &self.pending_requests())
            .finish()
    }
}

/// Spawn a session task.
///
/// Returns the handle and the task's join handle. The session starts in
/// `Connecting` immediately.
pub(crate) fn launch<C: Connector>(
    connector: C,
    config: SessionConfig,
    policy: Arc<dyn ClosePolicy>,
    hooks: SessionHooks,
    router: EventRouter,
) -> (SessionHandle, tokio::task::JoinHandle<()>) {
    let (state_tx, _) = watch::channel(SessionState::Closed);
    let shared = Arc::new(Shared {
        pending: PendingRequests::new(),
        state: state_tx,
        running: AtomicBool::new(true),
        close_reason: Mutex::new(None),
        request_timeout: config.request_timeout,
    });
    let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_queue_capacity);
    let shutdown = CancellationToken::new();

    let handle = SessionHandle {
        shared: Arc::clone(&shared),
        outbound: outbound_tx,
        shutdown: shutdown.clone(),
    };
    let session = Session {
        connector,
        config,
        policy,
        hooks,
        router,
        shared,
        outbound: outbound_rx,
        shutdown,
        attempt_count: 0,
    };
    let task = tokio::spawn(session.run());
    (handle, task)
}

/// How one connection's read loop ended.
enum LoopExit {
    /// Reconnect after the backoff selected by this classification.
    Reconnect(CloseAction),
    /// Local stop; no reconnect.
    Stopped,
    /// Fatal close code; no reconnect.
    Fatal,
}

/// The session task's private state.
struct Session<C: Connector> {
    connector: C,
    config: SessionConfig,
    policy: Arc<dyn ClosePolicy>,
    hooks: SessionHooks,
    router: EventRouter,
    shared: Arc<Shared>,
    outbound: mpsc::Receiver<Frame>,
    shutdown: CancellationToken,
    attempt_count: u32,
}

impl<C: Connector> Session<C> {
    fn state(&self) -> SessionState { *self.shared.state.borrow() }

    fn set_state(&self, state: SessionState) { self.shared.state.send_replace(state); }

    fn is_running(&self) -> bool { self.shared.running.load(Ordering::SeqCst) }

    fn record_close(&mut self, reason: CloseReason) {
        self.hooks.on_close(&reason);
        *self
            .shared
            .close_reason
            .lock()
            .expect("close reason poisoned") = Some(reason);
    }

    /// Outermost loop: connect, drive, classify, back off, repeat.
    async fn run(mut self) {
        let mut backoff: Option<Duration> = None;
        while self.is_running() {
            if let Some(delay) = backoff.take() {
                debug!(?delay, "backing off before reconnect");
                tokio::select! {
                    () = self.shutdown.cancelled() => break,
                    () = tokio::time::sleep(delay) => {}
                }
                if !self.is_running() {
                    break;
                }
            }

            self.set_state(SessionState::Connecting);
            self.attempt_count += 1;
            #[cfg(feature = "metrics")]
            {
                if self.attempt_count > 1 {
                    crate::metrics::inc_reconnects();
                }
            }

            let stream = tokio::select! {
                () = self.shutdown.cancelled() => break,
                opened = self.connector.open() => match opened {
                    Ok(stream) => stream,
                    Err(e) => {
                        warn!(attempt = self.attempt_count, error = %e, "connect failed");
                        #[cfg(feature = "metrics")]
                        crate::metrics::inc_errors();
                        backoff = Some(self.config.backoff.standard);
                        continue;
                    }
                },
            };
            info!(attempt = self.attempt_count, "transport established");

            match self.drive(stream).await {
                LoopExit::Reconnect(action) => {
                    if self.is_running() {
                        self.hooks.before_reconnect(action);
                    }
                    backoff = Some(self.config.backoff.delay_for(action));
                }
                LoopExit::Stopped | LoopExit::Fatal => break,
            }
        }

        // Terminal teardown; any waiters registered after the last cascade
        // are settled here.
        self.shared.pending.fail_all();
        self.shared.running.store(false, Ordering::SeqCst);
        self.set_state(SessionState::Closed);
        info!("session closed");
    }

    /// Drive one connection from handshake to its loop exit.
    async fn drive(&mut self, stream: C::Stream) -> LoopExit {
        let codec = OpcodeFrameCodec::new(self.config.max_payload_length);
        let mut framed = Framed::new(stream, codec);

        self.set_state(SessionState::Handshaking);
        let handshake = Handshake {
            v: self.config.protocol_version,
            client_id: self.config.client_id.clone(),
        };
        let frame = match Frame::json(Opcode::Handshake, &handshake) {
            Ok(frame) => frame,
            Err(e) => {
                // An encode failure here is permanent; no retry can fix it.
                error!(error = %e, "handshake payload failed to encode");
                self.shared.running.store(false, Ordering::SeqCst);
                return LoopExit::Fatal;
            }
        };
        if let Err(e) = framed.send(frame).await {
            warn!(error = %e, "handshake write failed");
            return self.connection_lost();
        }

        #[cfg(feature = "metrics")]
        crate::metrics::inc_connections();
        let exit = self.read_loop(&mut framed).await;
        #[cfg(feature = "metrics")]
        crate::metrics::dec_connections();
        exit
    }

    /// Steady-state loop: one inbound read, outbound writes, shutdown.
    async fn read_loop(&mut self, framed: &mut Framed<C::Stream, OpcodeFrameCodec>) -> LoopExit {
        loop {
            // Outbound frames only flow once the handshake is out and the
            // first inbound frame confirmed the peer is talking to us.
            let ready = self.state() == SessionState::Ready;
            tokio::select! {
                biased;

                () = self.shutdown.cancelled() => {
                    return self.shut_down(framed).await;
                }

                outbound = self.outbound.recv(), if ready => {
                    let Some(frame) = outbound else {
                        // Every handle is gone; nobody can request or stop().
                        self.shared.running.store(false, Ordering::SeqCst);
                        return self.shut_down(framed).await;
                    };
                    if let Err(e) = framed.send(frame).await {
                        warn!(error = %e, "outbound write failed");
                        return self.connection_lost();
                    }
                    #[cfg(feature = "metrics")]
                    crate::metrics::inc_frames(crate::metrics::Direction::Outbound);
                }

                inbound = framed.next() => {
                    let frame = match inbound {
                        Some(Ok(frame)) => frame,
                        Some(Err(e)) => {
                            warn!(error = %e, "inbound framing failed");
                            return self.connection_lost();
                        }
                        None => {
                            info!("peer closed transport");
                            return self.connection_lost();
                        }
                    };
                    #[cfg(feature = "metrics")]
                    crate::metrics::inc_frames(crate::metrics::Direction::Inbound);

                    if self.state() == SessionState::Handshaking {
                        // The handshake is fire-and-forget; the first frame
                        // back is the acknowledgment.
                        self.set_state(SessionState::Ready);
                        self.attempt_count = 0;
                        self.hooks.on_ready();
                        info!("session ready");
                    }
                    if let Some(exit) = self.handle_frame(framed, frame).await {
                        return exit;
                    }
                }
            }
        }
    }

    /// Local stop: drain buffered writes, drop the transport, cascade.
    async fn shut_down(&mut self, framed: &mut Framed<C::Stream, OpcodeFrameCodec>) -> LoopExit {
        self.set_state(SessionState::Closing);
        if let Err(e) = framed.close().await {
            debug!(error = %e, "transport close failed");
        }
        self.shared.pending.fail_all();
        self.record_close(CloseReason::Stopped);
        LoopExit::Stopped
    }

    /// Transport died mid-session: cascade and reconnect on the standard
    /// interval.
    fn connection_lost(&mut self) -> LoopExit {
        #[cfg(feature = "metrics")]
        crate::metrics::inc_errors();
        self.shared.pending.fail_all();
        self.record_close(CloseReason::TransportLost);
        LoopExit::Reconnect(CloseAction::Retry)
    }

    /// Route one inbound frame; returns `Some` when the loop must exit.
    async fn handle_frame(
        &mut self,
        framed: &mut Framed<C::Stream, OpcodeFrameCodec>,
        frame: Frame,
    ) -> Option<LoopExit> {
        let opcode = match frame.op() {
            Ok(opcode) => opcode,
            Err(e) => {
                debug!(error = %e, "frame dropped");
                return None;
            }
        };
        match opcode {
            Opcode::Handshake => {
                debug!("unexpected handshake frame from peer dropped");
                None
            }
            Opcode::Ping => {
                let pong = Frame::new(Opcode::Pong, frame.payload);
                if let Err(e) = framed.send(pong).await {
                    warn!(error = %e, "pong write failed");
                    return Some(self.connection_lost());
                }
                None
            }
            Opcode::Pong => {
                debug!("pong received");
                None
            }
            Opcode::Close => Some(self.handle_close(&frame)),
            Opcode::Frame => {
                self.handle_envelope(&frame);
                None
            }
        }
    }

    /// Settle a waiter or dispatch an event from an envelope frame.
    fn handle_envelope(&mut self, frame: &Frame) {
        let envelope = match frame.decode_payload::<ResponseEnvelope>() {
            Ok(Some(envelope)) => envelope,
            Ok(None) => {
                debug!("empty envelope frame dropped");
                return;
            }
            Err(e) => {
                warn!(error = %e, "malformed envelope dropped");
                #[cfg(feature = "metrics")]
                crate::metrics::inc_errors();
                return;
            }
        };
        if let Some(nonce) = envelope.nonce.clone() {
            let result = envelope.into_result().map_err(RequestError::Remote);
            self.shared.pending.settle(&nonce, result);
        } else if let Some(event) = envelope.evt.clone() {
            self.router.dispatch(&event, envelope.data.unwrap_or(Value::Null));
        } else {
            debug!("envelope without nonce or event dropped");
        }
    }

    /// Classify a peer close frame and pick the loop exit.
    fn handle_close(&mut self, frame: &Frame) -> LoopExit {
        let payload = match frame.decode_payload::<ClosePayload>() {
            Ok(Some(payload)) => payload,
            Ok(None) | Err(_) => {
                warn!("close frame without a decodable body");
                ClosePayload {
                    code: 1005,
                    message: String::from("no close payload"),
                }
            }
        };
        let action = self.policy.classify(payload.code);
        self.shared.pending.fail_all();
        self.record_close(CloseReason::Frame {
            code: payload.code,
            message: payload.message.clone(),
        });

        if action.is_retryable() {
            info!(
                code = payload.code,
                message = %payload.message,
                ?action,
                "retryable close, will reconnect"
            );
            LoopExit::Reconnect(action)
        } else {
            self.shared.running.store(false, Ordering::SeqCst);
            error!(
                code = payload.code,
                message = %payload.message,
                "fatal close code, session will not reconnect"
            );
            LoopExit::Fatal
        }
    }
}
