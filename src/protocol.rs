//! JSON events exchanged with clients.
//!
//! Every frame is adjacently tagged: `{"event": "<name>", "data": <payload>}`.
//! Payload-less events omit `data`.

use crate::games::tictactoe::Mark;
use crate::ledger::LeaderboardEntry;
use crate::matches::{Match, MatchPhase};
use serde::{Deserialize, Serialize};

/// Reference to a match inside a `playTurn` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRef {
    /// Match id as sent in `joinedMatch`.
    pub id: String,
}

/// Events sent by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    /// Ask to be queued again after a match ended.
    JoinQueue,
    /// Place a mark.
    PlayTurn {
        /// Match the move is for.
        #[serde(rename = "match")]
        match_ref: MatchRef,
        /// Cell index 0-8.
        square: i64,
    },
    /// Post a chat message.
    SendChat(String),
}

/// A seat as shown to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerView {
    /// Player's username.
    pub username: String,
    /// Mark the player places.
    pub mark: Mark,
}

/// Sanitized snapshot of a match. Connection ids are never exposed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchView {
    /// Match id.
    pub id: String,
    /// Both seats in creation order.
    pub players: Vec<PlayerView>,
    /// Cell symbols: `""`, `"X"` or `"O"`.
    pub board: Vec<String>,
    /// Seat index (0 or 1) whose move is next.
    pub turn: usize,
    /// Lifecycle phase name.
    pub phase: String,
}

impl From<&Match> for MatchView {
    fn from(game: &Match) -> Self {
        let phase = match game.phase() {
            MatchPhase::Open => "open",
            MatchPhase::InProgress => "inProgress",
            MatchPhase::Won(_) => "won",
            MatchPhase::Drawn => "drawn",
            MatchPhase::Abandoned => "abandoned",
        };
        Self {
            id: game.id().to_string(),
            players: game
                .players()
                .iter()
                .map(|p| PlayerView {
                    username: p.key().clone(),
                    mark: *p.mark(),
                })
                .collect(),
            board: game.board().symbols().iter().map(|s| s.to_string()).collect(),
            turn: game.turn(),
            phase: phase.to_string(),
        }
    }
}

/// Chat line as broadcast to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatLine {
    /// Display name of the author.
    pub sender: String,
    /// External user id of the author; absent for system notices. Sent as
    /// `senderid`, the name existing chat clients read.
    #[serde(rename = "senderid", default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    /// Filtered text.
    pub msg: String,
    /// CSS color of the author badge.
    pub badge_color: String,
}

/// Events sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Handshake accepted.
    LoggedIn {
        /// Player key.
        username: String,
        /// External user id.
        id: String,
    },
    /// Current top-N ranking.
    LeaderboardUpdate(Vec<LeaderboardEntry>),
    /// A match was formed.
    JoinedMatch(MatchView),
    /// A move was accepted and the match continues.
    MatchUpdate(MatchView),
    /// A line was completed.
    GameWon {
        /// Winner's username.
        winner: String,
        /// Final state.
        #[serde(rename = "match")]
        game: MatchView,
    },
    /// The board filled up without a winner.
    CatsGame(MatchView),
    /// The opponent left mid-match.
    OpponentDisconnect,
    /// The opponent ran out of time.
    OpponentTimedOut(MatchView),
    /// The recipient ran out of time.
    TimedOut(MatchView),
    /// A chat line.
    ChatMsg(ChatLine),
    /// The recipient's cumulative score.
    Score(i64),
    /// The recipient was kicked by an admin.
    Kick,
}

impl ServerEvent {
    /// Encodes the event as a JSON text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl ClientEvent {
    /// Decodes a JSON text frame.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
