//! Chat collaborators: profanity filter, rate limiter, admin commands.

use governor::clock::{Clock, DefaultClock};
use governor::state::keyed::DefaultKeyedStateStore;
use governor::middleware::NoOpMiddleware;
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, instrument};

/// Cleans chat text before it is broadcast.
pub trait ChatFilter: Send {
    /// Returns the text to broadcast.
    fn clean(&self, text: &str) -> String;
}

/// Masks every whole word found in a case-insensitive deny list.
#[derive(Debug, Clone, Default)]
pub struct WordListFilter {
    banned: Vec<String>,
}

impl WordListFilter {
    /// Creates a filter for the given words.
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            banned: words
                .into_iter()
                .map(|w| w.as_ref().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect(),
        }
    }

    fn is_banned(&self, word: &str) -> bool {
        let bare: String = word
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        !bare.is_empty() && self.banned.iter().any(|b| *b == bare)
    }
}

impl ChatFilter for WordListFilter {
    fn clean(&self, text: &str) -> String {
        if self.banned.is_empty() {
            return text.to_string();
        }
        text.split(' ')
            .map(|word| {
                if self.is_banned(word) {
                    "*".repeat(word.chars().count())
                } else {
                    word.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Per-player chat limiter: a burst of `points` messages, refilled at one
/// message per `window / points`.
pub struct ChatLimiter<C: Clock = DefaultClock> {
    limiter: RateLimiter<String, DefaultKeyedStateStore<String>, C, NoOpMiddleware<C::Instant>>,
}

impl<C: Clock> std::fmt::Debug for ChatLimiter<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatLimiter")
            .field("tracked", &self.limiter.len())
            .finish()
    }
}

impl ChatLimiter {
    /// Creates a limiter on the wall clock.
    pub fn new(points: u32, window: Duration) -> Self {
        Self::with_clock(points, window, DefaultClock::default())
    }
}

impl<C: Clock> ChatLimiter<C> {
    /// Creates a limiter reading time from `clock`.
    pub fn with_clock(points: u32, window: Duration, clock: C) -> Self {
        let burst = NonZeroU32::new(points).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::with_period(window / burst.get())
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst);
        debug!(?quota, "Chat limiter configured");
        Self {
            limiter: RateLimiter::new(quota, DefaultKeyedStateStore::default(), clock),
        }
    }

    /// Consumes one message for `player`; false when throttled.
    #[instrument(skip(self))]
    pub fn try_consume(&self, player: &str) -> bool {
        let allowed = self.limiter.check_key(&player.to_string()).is_ok();
        if !allowed {
            debug!("Chat throttled");
        }
        allowed
    }

    /// Drops players whose budget has fully refilled.
    pub fn shrink(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }

    /// Number of players currently tracked.
    pub fn tracked(&self) -> usize {
        self.limiter.len()
    }
}

/// A chat line starting with `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// `/kick <username>`.
    Kick(String),
    /// Anything else, including `/kick` with the wrong argument count.
    Unknown,
}

impl ChatCommand {
    /// Parses a line; returns `None` when it is not a command.
    pub fn parse(text: &str) -> Option<Self> {
        let body = text.strip_prefix('/')?;
        let mut parts = body.split(' ');
        let command = parts.next().unwrap_or_default();
        let args: Vec<&str> = parts.collect();
        Some(match (command, args.as_slice()) {
            ("kick", [target]) if !target.is_empty() => Self::Kick((*target).to_string()),
            _ => Self::Unknown,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use governor::clock::FakeRelativeClock;

    #[test]
    fn test_filter_masks_whole_words_only() {
        let filter = WordListFilter::new(["darn"]);
        assert_eq!(filter.clean("well darn it"), "well **** it");
        assert_eq!(filter.clean("DARN!"), "*****");
        assert_eq!(filter.clean("darnation"), "darnation");
    }

    #[test]
    fn test_empty_filter_passes_text_through() {
        let filter = WordListFilter::default();
        assert_eq!(filter.clean("anything  goes"), "anything  goes");
    }

    #[test]
    fn test_fifth_message_in_window_is_throttled() {
        let clock = FakeRelativeClock::default();
        let limiter = ChatLimiter::with_clock(4, Duration::from_secs(2), clock.clone());
        for _ in 0..4 {
            assert!(limiter.try_consume("alice"));
        }
        clock.advance(Duration::from_millis(100));
        assert!(!limiter.try_consume("alice"));
        assert!(limiter.try_consume("bob"));

        clock.advance(Duration::from_secs(2));
        for _ in 0..4 {
            assert!(limiter.try_consume("alice"));
        }
        assert!(!limiter.try_consume("alice"));
    }

    #[test]
    fn test_refill_is_gradual() {
        let clock = FakeRelativeClock::default();
        let limiter = ChatLimiter::with_clock(4, Duration::from_secs(2), clock.clone());
        for _ in 0..4 {
            assert!(limiter.try_consume("alice"));
        }
        clock.advance(Duration::from_millis(600));
        assert!(limiter.try_consume("alice"));
        assert!(!limiter.try_consume("alice"));
    }

    #[test]
    fn test_shrink_forgets_refilled_players() {
        let clock = FakeRelativeClock::default();
        let limiter = ChatLimiter::with_clock(4, Duration::from_secs(2), clock.clone());
        limiter.try_consume("alice");
        limiter.try_consume("bob");
        assert_eq!(limiter.tracked(), 2);

        clock.advance(Duration::from_secs(3));
        limiter.shrink();
        assert_eq!(limiter.tracked(), 0);
    }

    #[test]
    fn test_command_parsing() {
        assert_eq!(ChatCommand::parse("hello"), None);
        assert_eq!(
            ChatCommand::parse("/kick bob"),
            Some(ChatCommand::Kick("bob".to_string()))
        );
        assert_eq!(ChatCommand::parse("/kick"), Some(ChatCommand::Unknown));
        assert_eq!(ChatCommand::parse("/kick a b"), Some(ChatCommand::Unknown));
        assert_eq!(ChatCommand::parse("/ban bob"), Some(ChatCommand::Unknown));
    }
}
