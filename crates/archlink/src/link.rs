//! The connection manager's state: phase, session record and the outbound
//! queue of the live connection.
//!
//! `Link` never touches the channel itself. The reader and writer tasks
//! own it; `Link` holds the sending half of the writer's queue and the
//! reader's shutdown signal. Every attempt gets a generation number, so a
//! reader that outlives its connection can't tear down the next one.
//!
//! ```text
//! Disconnected ──begin_connecting──→ Connecting ──open──→ AwaitingAuthentication
//!      ▲                                                        │
//!      └──────────────close (any phase)──── Established ←─establish
//! ```

use std::sync::Arc;

use archlink_dispatch::{DispatchBus, Outbound, SendError};
use archlink_protocol::{ClientMessage, Codec, JsonCodec};
use archlink_session::{ConnectionPhase, Session};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Default)]
struct LinkState {
    session: Session,
    writer: Option<mpsc::UnboundedSender<String>>,
    shutdown: Option<oneshot::Sender<()>>,
    generation: u64,
}

/// Session record plus send primitive of the one live connection.
#[derive(Debug)]
pub(crate) struct Link {
    bus: Arc<DispatchBus>,
    codec: JsonCodec,
    state: Mutex<LinkState>,
}

impl Link {
    pub(crate) fn new(bus: Arc<DispatchBus>) -> Self {
        Self {
            bus,
            codec: JsonCodec,
            state: Mutex::new(LinkState::default()),
        }
    }

    pub(crate) fn codec(&self) -> &JsonCodec {
        &self.codec
    }

    pub(crate) fn session(&self) -> Session {
        self.state.lock().session.clone()
    }

    pub(crate) fn phase(&self) -> ConnectionPhase {
        self.state.lock().session.phase
    }

    /// The phase together with the attempt it belongs to.
    pub(crate) fn current(&self) -> (ConnectionPhase, u64) {
        let state = self.state.lock();
        (state.session.phase, state.generation)
    }

    /// Is `generation` still the live attempt?
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        let state = self.state.lock();
        state.generation == generation
            && state.session.phase != ConnectionPhase::Disconnected
    }

    /// `Disconnected → Connecting`. Returns the new attempt's generation,
    /// or `None` if another attempt is already under way.
    pub(crate) fn begin_connecting(&self) -> Option<u64> {
        let mut state = self.state.lock();
        if !state.session.phase.can_transition_to(ConnectionPhase::Connecting) {
            return None;
        }
        state.generation += 1;
        state.session.phase = ConnectionPhase::Connecting;
        Some(state.generation)
    }

    /// `Connecting → AwaitingAuthentication`: the channel is open and its
    /// tasks are about to start.
    ///
    /// Returns `false` (and drops both handles) if the attempt was closed
    /// in the meantime.
    pub(crate) fn open(
        &self,
        generation: u64,
        writer: mpsc::UnboundedSender<String>,
        shutdown: oneshot::Sender<()>,
    ) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation
            || state.session.phase != ConnectionPhase::Connecting
        {
            return false;
        }
        state.session.phase = ConnectionPhase::AwaitingAuthentication;
        state.writer = Some(writer);
        state.shutdown = Some(shutdown);
        true
    }

    /// `AwaitingAuthentication → Established`.
    pub(crate) fn establish(&self, generation: u64, session: Session) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation
            || !state.session.phase.can_transition_to(session.phase)
        {
            return false;
        }
        state.session = session;
        true
    }

    /// Any phase `→ Disconnected`.
    ///
    /// With `Some(generation)`, only that attempt is closed. Returns
    /// `true` if this call made the transition; repeated calls are no-ops.
    /// The session record is replaced wholesale.
    pub(crate) fn close(&self, generation: Option<u64>) -> bool {
        let mut state = self.state.lock();
        if state.session.phase == ConnectionPhase::Disconnected {
            return false;
        }
        if generation.is_some_and(|g| g != state.generation) {
            return false;
        }

        state.session = Session::default();
        // Dropping the writer lets the writer task flush and close.
        state.writer = None;
        if let Some(shutdown) = state.shutdown.take() {
            let _ = shutdown.send(());
        }
        true
    }
}

impl Outbound for Link {
    fn send(&self, batch: Vec<ClientMessage>) -> Result<(), SendError> {
        {
            let state = self.state.lock();
            if !state.session.phase.can_send() {
                return Err(SendError::NotConnected);
            }
            let writer = state.writer.as_ref().ok_or(SendError::NotConnected)?;
            let frame = self.codec.encode_batch(&batch)?;
            writer.send(frame).map_err(|_| SendError::NotConnected)?;
        }

        tracing::trace!(count = batch.len(), "queued batch");
        self.bus.emit_sent(&batch);
        Ok(())
    }
}

// =========================================================================
// Tests
// =========================================================================
