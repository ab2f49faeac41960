//! Per-connection lifecycle state machine.
//!
//! Pure and synchronous: the connection actor asks it what a given event
//! means and performs the I/O itself. States move forward only:
//!
//! ```text
//! Inited ──handshake──▶ Working ──kick──▶ Kicking ──▶ Kicked
//!    │                     │                             │
//!    └─────────────────────┴──────── close ──────────────┴──▶ Closed
//! ```

/// Connection state. `Closed` is terminal and reachable from every state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Accepted and classified, handshake not yet completed.
    Inited,
    /// Handshake done, full duplex traffic allowed.
    Working,
    /// Kick notice is being written.
    Kicking,
    /// Kick notice sent, waiting for the peer to hang up.
    Kicked,
    /// Fully torn down.
    Closed,
}

/// What the send path should do with an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendDisposition {
    /// Write it to the transport.
    Write,
    /// Reject: the handshake has not completed.
    NotHandshaked,
    /// Re-send the kick notice instead of the message.
    Rekick,
    /// Silently impossible: the connection is closed.
    Dropped,
}

/// Result of registering one handshake attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Proceed,
    /// The peer has exhausted its attempts; treat as hostile and close.
    LimitExceeded,
}

/// Tracks one connection's state and handshake attempt budget.
#[derive(Debug)]
pub struct Lifecycle {
    state: ConnState,
    handshake_attempts: u32,
    handshake_max_times: u32,
}

impl Lifecycle {
    pub fn new(handshake_max_times: u32) -> Self {
        Self {
            state: ConnState::Inited,
            handshake_attempts: 0,
            handshake_max_times,
        }
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnState::Closed
    }

    pub fn handshake_completed(&self) -> bool {
        !matches!(self.state, ConnState::Inited)
    }

    /// Counts one handshake attempt against the budget. The attempt that
    /// goes past `handshake_max_times` is the one reported as exceeded.
    pub fn register_handshake_attempt(&mut self) -> AttemptOutcome {
        self.handshake_attempts += 1;
        if self.handshake_attempts > self.handshake_max_times {
            AttemptOutcome::LimitExceeded
        } else {
            AttemptOutcome::Proceed
        }
    }

    /// Moves `Inited` to `Working`. Returns false when the connection is in
    /// any other state, in which case nothing changes.
    pub fn complete_handshake(&mut self) -> bool {
        if self.state == ConnState::Inited {
            self.state = ConnState::Working;
            true
        } else {
            false
        }
    }

    pub fn send_disposition(&self) -> SendDisposition {
        match self.state {
            ConnState::Closed => SendDisposition::Dropped,
            ConnState::Inited => SendDisposition::NotHandshaked,
            ConnState::Kicked => SendDisposition::Rekick,
            ConnState::Working | ConnState::Kicking => SendDisposition::Write,
        }
    }

    /// Enters `Kicking` so the kick notice bypasses the ready guard.
    /// Returns false when already closed.
    pub fn begin_kick(&mut self) -> bool {
        if self.state == ConnState::Closed {
            return false;
        }
        self.state = ConnState::Kicking;
        true
    }

    /// Marks the kick notice as written. No-op once closed.
    pub fn finish_kick(&mut self) {
        if self.state != ConnState::Closed {
            self.state = ConnState::Kicked;
        }
    }

    /// Enters the terminal state. Returns true only on the first call.
    pub fn close(&mut self) -> bool {
        if self.state == ConnState::Closed {
            return false;
        }
        self.state = ConnState::Closed;
        true
    }
}
