//! # Deferred waitup replies.
//!
//! Requests asking for an online-rank count the monitor has not reached
//! yet are parked here and revisited on every change to the online set.

use tokio::sync::oneshot;

use crate::error::MonitorError;

struct Pending {
    want: u32,
    reply: oneshot::Sender<Result<(), MonitorError>>,
}

/// Parked waitup requests, answered as the online count moves.
#[derive(Default)]
pub(super) struct WaitupQueue {
    pending: Vec<Pending>,
}

impl WaitupQueue {
    pub(super) fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(super) fn len(&self) -> usize {
        self.pending.len()
    }

    /// Parks a request until the online count reaches `want`.
    pub(super) fn push(&mut self, want: u32, reply: oneshot::Sender<Result<(), MonitorError>>) {
        self.pending.push(Pending { want, reply });
    }

    /// Replies to every parked request satisfied by the new count.
    ///
    /// Requests whose caller went away are dropped; anything else stays
    /// parked for the next change.
    pub(super) fn notify(&mut self, upcount: u32) {
        for entry in std::mem::take(&mut self.pending) {
            if entry.want == upcount {
                if entry.reply.send(Ok(())).is_err() {
                    tracing::debug!(want = entry.want, "waitup caller went away before reply");
                }
            } else if entry.reply.is_closed() {
                tracing::debug!(want = entry.want, "dropping cancelled waitup request");
            } else {
                self.pending.push(entry);
            }
        }
    }
}
