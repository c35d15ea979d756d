//! Session lifecycle: the bidirectional relay and its termination.
//!
//! # Responsibilities
//! - Run one pump per direction (client→backend, backend→client)
//! - Forward data frames verbatim, in order, with no buffering
//! - Relay ping/pong payloads under a bounded control-write timeout
//! - Record exactly one termination reason per session and propagate the
//!   matching close frame to the other side
//! - Guarantee both pumps return and both transports end up closed
//!
//! Each connection is read by exactly one pump and written by exactly one
//! pump; the only cross-pump state is the termination latch. Shutdown is
//! signalled by closing connections, never by flags the pumps poll.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::ws::WebSocket;
use futures_util::future::{self, Either};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use crate::config::TimeoutConfig;
use crate::error::{ProxyError, RelayError};
use crate::observability::metrics;
use crate::proxy::frame::{ClosePayload, ControlSignal, RelayFrame, WireMessage};
use crate::proxy::ErrorHook;

/// The dialed backend connection.
pub type BackendStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One relay direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToBackend,
    BackendToClient,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::ClientToBackend => "client_to_backend",
            Direction::BackendToClient => "backend_to_client",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the session ended. The first pump to hit a terminal event records it;
/// the other pump's report is a no-op.
#[derive(Debug, Clone)]
pub enum Termination {
    /// One side performed a clean close; its payload was propagated.
    PeerClose {
        from: Direction,
        payload: Option<ClosePayload>,
    },
    /// A read or write on one direction failed, or a control write timed
    /// out; the other side was closed with an abnormal-closure code.
    Failed { from: Direction, reason: String },
}

/// One proxied client/backend connection pair.
///
/// Created once both handshakes have completed; destroyed after both relay
/// pumps have returned and both transports are closed.
pub struct Session {
    id: Uuid,
    control_write_timeout: Duration,
    close_grace: Duration,
    terminated: AtomicBool,
    reason: Mutex<Option<Termination>>,
    on_error: Option<ErrorHook>,
}

impl Session {
    pub fn new(id: Uuid, timeouts: &TimeoutConfig, on_error: Option<ErrorHook>) -> Arc<Self> {
        Arc::new(Self {
            id,
            control_write_timeout: Duration::from_millis(timeouts.control_write_millis),
            close_grace: Duration::from_secs(timeouts.close_grace_secs),
            terminated: AtomicBool::new(false),
            reason: Mutex::new(None),
            on_error,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Record the first termination reason. Returns `true` for the caller
    /// that actually started the (single) termination sequence.
    fn begin_termination(&self, termination: Termination) -> bool {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return false;
        }
        if let Ok(mut guard) = self.reason.lock() {
            *guard = Some(termination);
        }
        true
    }

    fn recorded_reason(&self) -> Option<Termination> {
        self.reason.lock().ok().and_then(|guard| guard.clone())
    }

    /// Relay frames between the two connections until either side closes or
    /// fails, then tear both down.
    pub async fn run(self: Arc<Self>, client: WebSocket, backend: BackendStream) {
        let started = Instant::now();
        metrics::session_opened();

        let (client_sink, client_stream) = client.split();
        let (backend_sink, backend_stream) = backend.split();

        let client_to_backend = tokio::spawn(relay_direction(
            client_stream,
            backend_sink,
            Direction::ClientToBackend,
            Arc::clone(&self),
        ));
        let backend_to_client = tokio::spawn(relay_direction(
            backend_stream,
            client_sink,
            Direction::BackendToClient,
            Arc::clone(&self),
        ));

        // Wait for the first pump to return, then give the survivor a
        // bounded window to finish the close handshake it is part of.
        let (first, mut second) = match future::select(client_to_backend, backend_to_client).await
        {
            Either::Left((result, other)) => (result, other),
            Either::Right((result, other)) => (result, other),
        };
        if let Err(join_err) = first {
            tracing::error!(session_id = %self.id, error = %join_err, "Relay pump panicked");
        }
        match tokio::time::timeout(self.close_grace, &mut second).await {
            Ok(Err(join_err)) => {
                tracing::error!(session_id = %self.id, error = %join_err, "Relay pump panicked");
            }
            Ok(Ok(())) => {}
            Err(_) => {
                // The surviving direction is stuck in a close handshake its
                // peer will not finish; force the transport shut.
                tracing::debug!(
                    session_id = %self.id,
                    grace = ?self.close_grace,
                    "Close grace expired, forcing connection shutdown"
                );
                second.abort();
                let _ = second.await;
            }
        }

        let duration = started.elapsed();
        match self.recorded_reason() {
            Some(Termination::PeerClose { from, payload }) => {
                tracing::info!(
                    session_id = %self.id,
                    initiated_by = %from,
                    close_code = payload.as_ref().map(|p| p.code),
                    duration_ms = duration.as_millis() as u64,
                    "Session closed"
                );
            }
            Some(Termination::Failed { from, reason }) => {
                tracing::warn!(
                    session_id = %self.id,
                    direction = %from,
                    error = %reason,
                    duration_ms = duration.as_millis() as u64,
                    "Session failed"
                );
            }
            None => {
                // Both pumps returned without recording anything; only
                // reachable if a pump panicked before reporting.
                tracing::warn!(session_id = %self.id, "Session ended without a recorded reason");
            }
        }
        metrics::session_closed(duration);
        // Dropping the halves here closes whatever the close handshake left
        // open on either transport.
    }

    fn report_relay_error(&self, error: RelayError) {
        metrics::relay_error();
        if let Some(hook) = &self.on_error {
            hook(&ProxyError::Relay(error));
        }
    }
}

/// Move frames from `src` to `dst` until a terminal event, then propagate an
/// appropriate close frame to `dst` and return.
async fn relay_direction<Src, Dst, In, Out, SrcErr, DstErr>(
    mut src: Src,
    mut dst: Dst,
    direction: Direction,
    session: Arc<Session>,
) where
    Src: Stream<Item = Result<In, SrcErr>> + Unpin,
    Dst: Sink<Out, Error = DstErr> + Unpin,
    In: WireMessage,
    Out: WireMessage,
    SrcErr: Into<RelayError>,
    DstErr: Into<RelayError>,
{
    loop {
        let frame = match src.next().await {
            Some(Ok(message)) => message.into_frame(),
            Some(Err(err)) => {
                fail(&session, &mut dst, direction, err.into()).await;
                return;
            }
            None => {
                // The peer vanished without a close frame; same treatment
                // as a read error.
                fail_eof(&session, &mut dst, direction).await;
                return;
            }
        };

        match frame {
            RelayFrame::Control(ControlSignal::Close(payload)) => {
                let won = session.begin_termination(Termination::PeerClose {
                    from: direction,
                    payload: payload.clone(),
                });
                if won {
                    tracing::debug!(
                        session_id = %session.id,
                        direction = %direction,
                        close_code = payload.as_ref().map(|p| p.code),
                        "Close frame received, propagating"
                    );
                }
                // Forward the close regardless of who recorded the reason:
                // this sink has exactly one writer and the protocol layer
                // never emits a second close frame on one connection.
                send_close(&session, &mut dst, direction, payload).await;
                return;
            }
            RelayFrame::Control(signal) => {
                let out = Out::from_frame(RelayFrame::Control(signal));
                let sent =
                    tokio::time::timeout(session.control_write_timeout, dst.send(out)).await;
                match sent {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        fail(&session, &mut dst, direction, err.into()).await;
                        return;
                    }
                    Err(_) => {
                        let err = RelayError::ControlWriteTimeout(session.control_write_timeout);
                        fail(&session, &mut dst, direction, err).await;
                        return;
                    }
                }
            }
            data => {
                if let Err(err) = dst.send(Out::from_frame(data)).await {
                    fail(&session, &mut dst, direction, err.into()).await;
                    return;
                }
            }
        }
    }
}

/// Terminal path for read/write failures: record the reason, tell the hook,
/// and close the other side with an abnormal-closure code.
async fn fail<Dst, Out, DstErr>(
    session: &Arc<Session>,
    dst: &mut Dst,
    direction: Direction,
    error: RelayError,
) where
    Dst: Sink<Out, Error = DstErr> + Unpin,
    Out: WireMessage,
    DstErr: Into<RelayError>,
{
    let reason = error.to_string();
    let won = session.begin_termination(Termination::Failed {
        from: direction,
        reason: reason.clone(),
    });
    if won {
        tracing::debug!(
            session_id = %session.id,
            direction = %direction,
            error = %reason,
            "Relay direction failed, closing peer"
        );
        session.report_relay_error(error);
    } else {
        // Termination already underway; this is the expected echo of the
        // other side being torn down.
        tracing::trace!(
            session_id = %session.id,
            direction = %direction,
            error = %reason,
            "Error after termination began"
        );
    }
    send_close(session, dst, direction, Some(ClosePayload::abnormal(&reason))).await;
}

async fn fail_eof<Dst, Out, DstErr>(session: &Arc<Session>, dst: &mut Dst, direction: Direction)
where
    Dst: Sink<Out, Error = DstErr> + Unpin,
    Out: WireMessage,
    DstErr: Into<RelayError>,
{
    let won = session.begin_termination(Termination::Failed {
        from: direction,
        reason: "connection ended without a close frame".to_string(),
    });
    if won {
        tracing::debug!(
            session_id = %session.id,
            direction = %direction,
            "Connection ended without close frame, closing peer"
        );
    }
    send_close(
        session,
        dst,
        direction,
        Some(ClosePayload::abnormal("peer connection lost")),
    )
    .await;
}

/// Best-effort, time-bounded close write. Failures here mean the other side
/// is already gone or wedged; either way the session is over and the error
/// is swallowed.
async fn send_close<Dst, Out, DstErr>(
    session: &Arc<Session>,
    dst: &mut Dst,
    direction: Direction,
    payload: Option<ClosePayload>,
) where
    Dst: Sink<Out, Error = DstErr> + Unpin,
    Out: WireMessage,
    DstErr: Into<RelayError>,
{
    let close = Out::from_frame(RelayFrame::Control(ControlSignal::Close(payload)));
    let result = tokio::time::timeout(session.control_write_timeout, dst.send(close)).await;
    match result {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            let err: RelayError = err.into();
            tracing::trace!(
                session_id = %session.id,
                direction = %direction,
                error = %err,
                "Close write failed during teardown"
            );
        }
        Err(_) => {
            tracing::trace!(
                session_id = %session.id,
                direction = %direction,
                "Close write timed out during teardown"
            );
        }
    }
}
