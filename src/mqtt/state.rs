//! Connection state tracking
//!
//! A pure transition function over `ConnectionState`, stored in an atomic so
//! request handlers can read it without locking while the connection driver
//! is the only writer.

use std::sync::atomic::{AtomicU8, Ordering};

/// Connectivity of the broker link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// No connection attempt made yet
    Disconnected = 0,
    /// Attempt in flight, waiting for CONNACK
    Connecting = 1,
    /// CONNACK received; publishes are accepted
    Connected = 2,
    /// Last attempt or session failed; a retry is armed
    Failing = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Failing,
            _ => Self::Disconnected,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Failing => "failing",
        }
    }
}

/// Events observed by the connection driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// First connect requested
    ConnectStarted,
    /// Broker accepted the session
    ConnAck,
    /// Connect or session failed at the transport level
    TransportError,
    /// The fixed reconnect delay ran out
    RetryElapsed,
}

/// Outcome of applying an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ConnectionState,
    pub to: ConnectionState,
    /// True when this transition arms the reconnect timer
    pub arm_retry: bool,
}

/// Pure transition function.
///
/// Only the edge into `Failing` arms a retry; an error reported while already
/// `Failing` leaves the armed timer as the single pending attempt.
pub fn next_state(current: ConnectionState, event: ConnectionEvent) -> Transition {
    use ConnectionEvent as E;
    use ConnectionState as S;

    let (to, arm_retry) = match (current, event) {
        (S::Disconnected, E::ConnectStarted) => (S::Connecting, false),
        (S::Connecting, E::ConnAck) | (S::Connected, E::ConnAck) => (S::Connected, false),
        (S::Connecting, E::TransportError) | (S::Connected, E::TransportError) => {
            (S::Failing, true)
        }
        (S::Failing, E::RetryElapsed) => (S::Connecting, false),
        (state, _) => (state, false),
    };

    Transition {
        from: current,
        to,
        arm_retry,
    }
}

/// Atomic holder for the current state
#[derive(Debug)]
pub struct SharedState {
    value: AtomicU8,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            value: AtomicU8::new(ConnectionState::Disconnected as u8),
        }
    }

    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.value.load(Ordering::SeqCst))
    }

    /// Apply an event atomically and report the transition taken
    pub fn apply(&self, event: ConnectionEvent) -> Transition {
        let mut current = self.value.load(Ordering::SeqCst);
        loop {
            let transition = next_state(ConnectionState::from_u8(current), event);
            match self.value.compare_exchange(
                current,
                transition.to as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return transition,
                Err(actual) => current = actual,
            }
        }
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}
