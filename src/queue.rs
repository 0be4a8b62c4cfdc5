//! Matchmaking queue and the pairing algorithm.

use crate::presence::{ConnectionId, PlayerKey};
use derive_getters::Getters;
use derive_new::new;
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{debug, info, instrument};

/// A player waiting to be paired.
#[derive(Debug, Clone, PartialEq, Eq, Getters, new)]
pub struct QueueEntry {
    /// Stable player key.
    player: PlayerKey,
    /// Connection the player joined through.
    connection: ConnectionId,
}

impl QueueEntry {
    /// Splits the entry into its parts.
    pub fn into_parts(self) -> (PlayerKey, ConnectionId) {
        (self.player, self.connection)
    }
}

/// Pending pool of players.
#[derive(Debug, Default)]
pub struct QueueStore {
    entries: Vec<QueueEntry>,
}

impl QueueStore {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a player; returns false if the player key is already queued.
    #[instrument(skip(self))]
    pub fn enqueue(&mut self, player: PlayerKey, connection: ConnectionId) -> bool {
        if self.contains(&player) {
            debug!("Player already queued");
            return false;
        }
        self.entries.push(QueueEntry::new(player, connection));
        true
    }

    /// Removes a player's entry, if any.
    pub fn remove(&mut self, player: &str) -> Option<QueueEntry> {
        let index = self.entries.iter().position(|e| e.player == player)?;
        Some(self.entries.remove(index))
    }

    /// Returns true if the player key is queued.
    pub fn contains(&self, player: &str) -> bool {
        self.entries.iter().any(|e| e.player == player)
    }

    /// Queued entries in arrival order.
    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    /// Number of queued players.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when nobody is waiting.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Pairs queued players.
///
/// An odd player out stays queued until someone else joins; with no
/// further joins it waits indefinitely.
#[derive(Debug, Default, Clone, Copy)]
pub struct Matchmaker;

impl Matchmaker {
    /// Shuffles the whole pool uniformly, pairs neighbours (0-1, 2-3, ...)
    /// and removes the paired players from the queue.
    #[instrument(skip_all, fields(queued = queue.len()))]
    pub fn drain_pairs<R: Rng + ?Sized>(
        &self,
        queue: &mut QueueStore,
        rng: &mut R,
    ) -> Vec<[QueueEntry; 2]> {
        if queue.len() < 2 {
            return Vec::new();
        }

        let mut pool = std::mem::take(&mut queue.entries);
        pool.shuffle(rng);

        let leftover = if pool.len() % 2 == 1 { pool.pop() } else { None };
        let mut pairs = Vec::with_capacity(pool.len() / 2);
        let mut players = pool.into_iter();
        while let (Some(a), Some(b)) = (players.next(), players.next()) {
            pairs.push([a, b]);
        }

        if let Some(entry) = leftover {
            debug!(player = %entry.player, "Odd player left in queue");
            queue.entries.push(entry);
        }
        info!(pairs = pairs.len(), "Formed pairs");
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    fn queue_of(n: u64) -> QueueStore {
        let mut queue = QueueStore::new();
        for i in 0..n {
            assert!(queue.enqueue(format!("player{i}"), i));
        }
        queue
    }

    #[test]
    fn test_duplicate_enqueue_is_noop() {
        let mut queue = QueueStore::new();
        assert!(queue.enqueue("alice".to_string(), 1));
        assert!(!queue.enqueue("alice".to_string(), 2));
        assert_eq!(queue.len(), 1);
        assert_eq!(*queue.entries()[0].connection(), 1);
    }

    #[test]
    fn test_even_pool_pairs_everyone() {
        let mut rng = StdRng::seed_from_u64(11);
        for k in 1..8 {
            let mut queue = queue_of(2 * k);
            let pairs = Matchmaker.drain_pairs(&mut queue, &mut rng);
            assert_eq!(pairs.len() as u64, k);
            assert!(queue.is_empty());

            let mut seen = HashSet::new();
            for [a, b] in &pairs {
                assert_ne!(a.player(), b.player());
                assert!(seen.insert(a.player().clone()));
                assert!(seen.insert(b.player().clone()));
            }
        }
    }

    #[test]
    fn test_odd_pool_leaves_one_queued() {
        let mut rng = StdRng::seed_from_u64(5);
        for k in 0..8 {
            let mut queue = queue_of(2 * k + 1);
            let pairs = Matchmaker.drain_pairs(&mut queue, &mut rng);
            assert_eq!(pairs.len() as u64, k);
            assert_eq!(queue.len(), 1);
        }
    }

    #[test]
    fn test_shuffle_varies_pairings() {
        let mut rng = StdRng::seed_from_u64(99);
        let mut partners_of_zero = HashSet::new();
        for _ in 0..64 {
            let mut queue = queue_of(4);
            for [a, b] in Matchmaker.drain_pairs(&mut queue, &mut rng) {
                if a.player() == "player0" {
                    partners_of_zero.insert(b.player().clone());
                } else if b.player() == "player0" {
                    partners_of_zero.insert(a.player().clone());
                }
            }
        }
        assert_eq!(partners_of_zero.len(), 3);
    }

    #[test]
    fn test_remove_drops_entry() {
        let mut queue = queue_of(3);
        assert!(queue.remove("player1").is_some());
        assert!(!queue.contains("player1"));
        assert!(queue.remove("player1").is_none());
        assert_eq!(queue.len(), 2);
    }
}
