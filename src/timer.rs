//! Turn timers.
//!
//! A timer only ever reports `(match_id, generation)`. The arena compares
//! the generation with the live match before acting, so a timer that fires
//! after its match moved on or ended does nothing.

use crate::matches::MatchId;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, instrument};

/// A turn timer that ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TurnExpiry {
    /// Match the timer belonged to.
    pub match_id: MatchId,
    /// Match generation the timer was armed for.
    pub generation: u64,
}

/// Schedules turn expiries.
pub trait TurnClock: Send {
    /// Arms the timer for `match_id`, replacing any timer already armed.
    fn arm(&mut self, match_id: MatchId, generation: u64, after: Duration);

    /// Cancels the timer for `match_id`, if one is armed.
    fn cancel(&mut self, match_id: MatchId);
}

/// Clock that never fires on its own; expiries are injected by calling
/// `Arena::expire_turn` directly.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualTurnClock;

impl TurnClock for ManualTurnClock {
    fn arm(&mut self, match_id: MatchId, generation: u64, _after: Duration) {
        debug!(%match_id, generation, "Manual turn timer armed");
    }

    fn cancel(&mut self, _match_id: MatchId) {}
}

/// Clock backed by tokio tasks that post expiries to a channel.
#[derive(Debug)]
pub struct TokioTurnClock {
    expiries: mpsc::UnboundedSender<TurnExpiry>,
    tasks: HashMap<MatchId, AbortHandle>,
}

impl TokioTurnClock {
    /// Creates a clock posting to `expiries`. Must be used from within a
    /// tokio runtime.
    pub fn new(expiries: mpsc::UnboundedSender<TurnExpiry>) -> Self {
        Self {
            expiries,
            tasks: HashMap::new(),
        }
    }
}

impl TurnClock for TokioTurnClock {
    #[instrument(skip(self), fields(match_id = %match_id))]
    fn arm(&mut self, match_id: MatchId, generation: u64, after: Duration) {
        let expiries = self.expiries.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if expiries.send(TurnExpiry { match_id, generation }).is_err() {
                debug!(%match_id, "Arena gone, dropping expiry");
            }
        });
        if let Some(previous) = self.tasks.insert(match_id, task.abort_handle()) {
            previous.abort();
        }
    }

    fn cancel(&mut self, match_id: MatchId) {
        if let Some(task) = self.tasks.remove(&match_id) {
            task.abort();
            debug!(%match_id, "Turn timer cancelled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_rearming_supersedes_previous_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut clock = TokioTurnClock::new(tx);
        let id = MatchId::from_raw(42);

        clock.arm(id, 1, Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(30)).await;
        clock.arm(id, 2, Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(61)).await;

        assert_eq!(rx.recv().await, Some(TurnExpiry { match_id: id, generation: 2 }));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_expiry() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut clock = TokioTurnClock::new(tx);
        let id = MatchId::from_raw(7);

        clock.arm(id, 0, Duration::from_secs(60));
        clock.cancel(id);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(rx.try_recv().is_err());
    }
}
