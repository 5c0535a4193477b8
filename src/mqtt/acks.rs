//! Publish acknowledgment tracking
//!
//! rumqttc assigns packet ids inside the event loop, so a publish request is
//! first queued in send order and bound to its packet id when the event loop
//! reports `Outgoing::Publish(pkid)`. The broker's PUBACK then resolves it.
//!
//! A packet id can be written again before the PUBACK for its previous use
//! is reported: rumqttc releases a publish held back on an id collision as
//! soon as it processes the PUBACK, and emits that `Outgoing::Publish` ahead
//! of the `Incoming::PubAck`. Waiters are therefore kept per packet id in
//! write order, and each PUBACK resolves the oldest one.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::debug;

/// Why an in-flight publish never got its PUBACK
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckError {
    #[error("connection lost before the broker acknowledged the publish")]
    ConnectionLost,
}

pub type AckResult = Result<(), AckError>;

/// Pending acknowledgments for one connection
#[derive(Debug, Default)]
pub struct PendingAcks {
    /// Requested but not yet written by the event loop, in request order
    queued: Mutex<VecDeque<oneshot::Sender<AckResult>>>,
    /// Written and waiting for PUBACK, oldest first per packet id
    inflight: DashMap<u16, VecDeque<oneshot::Sender<AckResult>>>,
}

impl PendingAcks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for the next publish handed to the client.
    ///
    /// Callers must enqueue and hand the request to the client under the same
    /// lock so queue order matches the event loop's order.
    pub fn enqueue(&self) -> oneshot::Receiver<AckResult> {
        let (tx, rx) = oneshot::channel();
        self.lock_queue().push_back(tx);
        rx
    }

    /// Undo the most recent `enqueue` when the client refused the request
    pub fn cancel_last(&self) {
        self.lock_queue().pop_back();
    }

    /// The event loop wrote a publish with `pkid`
    pub fn on_outgoing(&self, pkid: u16) {
        if let Some(tx) = self.lock_queue().pop_front() {
            self.inflight.entry(pkid).or_default().push_back(tx);
        }
    }

    /// The broker acknowledged `pkid`
    pub fn on_puback(&self, pkid: u16) {
        let waiter = self
            .inflight
            .get_mut(&pkid)
            .and_then(|mut waiters| waiters.pop_front());
        self.inflight.remove_if(&pkid, |_, waiters| waiters.is_empty());

        match waiter {
            Some(tx) => {
                // Receiver may have given up after its deadline.
                let _ = tx.send(Ok(()));
            }
            None => debug!(pkid, "PUBACK for unknown packet id"),
        }
    }

    /// Fail every waiter; called when the connection drops
    pub fn fail_all(&self) -> usize {
        let mut failed = 0;
        for tx in self.lock_queue().drain(..) {
            let _ = tx.send(Err(AckError::ConnectionLost));
            failed += 1;
        }
        let pkids: Vec<u16> = self.inflight.iter().map(|entry| *entry.key()).collect();
        for pkid in pkids {
            if let Some((_, waiters)) = self.inflight.remove(&pkid) {
                for tx in waiters {
                    let _ = tx.send(Err(AckError::ConnectionLost));
                    failed += 1;
                }
            }
        }
        failed
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, VecDeque<oneshot::Sender<AckResult>>> {
        self.queued.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
