//! The single authority over queue, matches, presence and scores.
//!
//! [`Arena`] is a synchronous state machine. Every method handles one event
//! to completion; the server feeds it from a single task so events never
//! interleave.

use crate::chat::{ChatCommand, ChatFilter, ChatLimiter, WordListFilter};
use crate::config::ArenaConfig;
use crate::games::tictactoe::{Mark, Outcome};
use crate::ledger::{LeaderboardEntry, Ledger};
use crate::matches::{Match, MatchId, MatchPlayer, MatchStore, MoveRejection};
use crate::presence::{
    ConnectionId, Identity, Outbox, PlayerKey, Presence, PresenceStore, SessionRegistry,
};
use crate::protocol::{ChatLine, ClientEvent, MatchView, ServerEvent};
use crate::queue::{Matchmaker, QueueStore};
use crate::timer::TurnClock;
use derive_more::{Display, Error};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, error, info, instrument, warn};

/// Why a connection was refused at handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
pub enum ConnectRejection {
    /// The handshake carried no username.
    #[display("Missing username")]
    MissingIdentity,
    /// The player already has a live connection.
    #[display("Player already connected")]
    AlreadyConnected,
}

/// Effect of an accepted move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnResult {
    /// The match goes on with the other player to move.
    Continued,
    /// The mover completed a line.
    Won {
        /// Winner's player key.
        winner: PlayerKey,
        /// Loser's player key.
        loser: PlayerKey,
    },
    /// The board filled up.
    Drawn,
}

/// Score deltas applied on match outcomes.
const WIN_DELTA: i64 = 1;
const LOSS_DELTA: i64 = -1;
const FORFEIT_DELTA: i64 = -2;

/// Queue, match, presence and score authority.
pub struct Arena {
    config: ArenaConfig,
    sessions: SessionRegistry,
    presence: PresenceStore,
    queue: QueueStore,
    matches: MatchStore,
    matchmaker: Matchmaker,
    ledger: Ledger,
    clock: Box<dyn TurnClock>,
    rng: StdRng,
    filter: Box<dyn ChatFilter>,
    limiter: ChatLimiter,
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("sessions", &self.sessions.len())
            .field("queued", &self.queue.len())
            .field("matches", &self.matches.len())
            .finish_non_exhaustive()
    }
}

impl Arena {
    /// Creates an arena over an opened ledger.
    #[instrument(skip_all)]
    pub fn new(config: ArenaConfig, ledger: Ledger, clock: Box<dyn TurnClock>) -> Self {
        let rng = match config.seed() {
            Some(seed) => StdRng::seed_from_u64(*seed),
            None => StdRng::from_entropy(),
        };
        let filter = WordListFilter::new(config.chat().banned_words());
        let limiter = ChatLimiter::new(*config.chat().rate_points(), config.chat().rate_window());
        info!(
            turn_timeout_secs = config.turn_timeout().as_secs(),
            leaderboard_size = ledger.capacity(),
            "Arena created"
        );
        Self {
            config,
            sessions: SessionRegistry::new(),
            presence: PresenceStore::new(),
            queue: QueueStore::new(),
            matches: MatchStore::new(),
            matchmaker: Matchmaker,
            ledger,
            clock,
            rng,
            filter: Box::new(filter),
            limiter,
        }
    }

    // ─────────────────────────────────────────────────────────────
    //  Queries
    // ─────────────────────────────────────────────────────────────

    /// Player keys waiting in the queue, in arrival order.
    pub fn queued_players(&self) -> Vec<PlayerKey> {
        self.queue
            .entries()
            .iter()
            .map(|e| e.player().clone())
            .collect()
    }

    /// Ids of all live matches.
    pub fn live_matches(&self) -> Vec<MatchId> {
        self.matches.ids()
    }

    /// Looks up a live match.
    pub fn match_by_id(&self, id: MatchId) -> Option<&Match> {
        self.matches.get(id)
    }

    /// Live match the connection plays in.
    pub fn match_of(&self, connection: ConnectionId) -> Option<&Match> {
        match self.presence.get(connection) {
            Some(Presence::Playing(id)) => self.matches.get(id),
            _ => None,
        }
    }

    /// Membership of a connection.
    pub fn presence(&self, connection: ConnectionId) -> Option<Presence> {
        self.presence.get(connection)
    }

    /// Number of live connections.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Current leaderboard.
    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        self.ledger.top_n().to_vec()
    }

    /// Score ledger.
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    // ─────────────────────────────────────────────────────────────
    //  Session lifecycle
    // ─────────────────────────────────────────────────────────────

    /// Admits a new connection and queues its player.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectRejection`] when the username is missing or the
    /// player already has a live connection; nothing is registered then and
    /// the transport should close the socket.
    #[instrument(skip(self, identity, outbox), fields(player = %identity.username()))]
    pub fn connect(
        &mut self,
        connection: ConnectionId,
        identity: Identity,
        outbox: Outbox,
    ) -> Result<(), ConnectRejection> {
        if identity.username().trim().is_empty() {
            warn!("Rejecting connection without username");
            return Err(ConnectRejection::MissingIdentity);
        }
        let player = identity.username().clone();
        let user_id = identity.user_id().clone();
        if self.queue.contains(&player) || !self.sessions.register(connection, identity, outbox) {
            warn!("Rejecting duplicate connection");
            return Err(ConnectRejection::AlreadyConnected);
        }
        info!("Player connected");

        self.sessions.send(
            connection,
            ServerEvent::LoggedIn {
                username: player.clone(),
                id: user_id,
            },
        );
        match self.ledger.create_if_absent(&player) {
            Ok(true) => self.broadcast_leaderboard(),
            Ok(false) => {}
            Err(e) => error!(error = %e, "Failed to initialise score"),
        }
        self.push_score(connection, &player);
        self.sessions.send(
            connection,
            ServerEvent::LeaderboardUpdate(self.ledger.top_n().to_vec()),
        );

        self.enqueue(connection, player);
        Ok(())
    }

    /// Re-queues an idle connection. Ignored for unknown, queued or playing
    /// connections.
    #[instrument(skip(self))]
    pub fn join_queue(&mut self, connection: ConnectionId) -> bool {
        let Some(session) = self.sessions.get(connection) else {
            debug!("Join from unknown connection");
            return false;
        };
        let player = session.identity().username().clone();
        self.enqueue(connection, player)
    }

    /// Removes a connection. A match it was playing ends as a forfeit.
    #[instrument(skip(self))]
    pub fn disconnect(&mut self, connection: ConnectionId) {
        let Some(session) = self.sessions.remove(connection) else {
            debug!("Disconnect from unknown connection");
            return;
        };
        let player = session.identity().username().clone();
        self.queue.remove(&player);
        self.limiter.shrink();

        let Some(Presence::Playing(id)) = self.presence.remove(connection) else {
            info!(%player, "Player disconnected");
            return;
        };

        let opponent = self
            .matches
            .get(id)
            .and_then(|game| game.opponent_of(connection))
            .cloned();
        self.teardown(id);
        info!(%player, match_id = %id, "Player left mid-match");

        if let Some(opponent) = &opponent {
            self.sessions
                .send(*opponent.connection(), ServerEvent::OpponentDisconnect);
        }
        self.apply_delta(&player, FORFEIT_DELTA);
        if let Some(opponent) = &opponent {
            self.push_score(*opponent.connection(), opponent.key());
        }
    }

    fn enqueue(&mut self, connection: ConnectionId, player: PlayerKey) -> bool {
        if self.presence.get(connection).is_some() {
            debug!(%player, "Already queued or playing");
            return false;
        }
        if !self.queue.enqueue(player, connection) {
            return false;
        }
        self.presence.set_queued(connection);
        self.form_matches();
        true
    }

    // ─────────────────────────────────────────────────────────────
    //  Matchmaking
    // ─────────────────────────────────────────────────────────────

    /// Pairs everyone currently queued (leaving an odd player out) and
    /// starts a match per pair.
    #[instrument(skip(self))]
    pub fn form_matches(&mut self) -> Vec<MatchId> {
        let pairs = self.matchmaker.drain_pairs(&mut self.queue, &mut self.rng);
        let mut formed = Vec::with_capacity(pairs.len());

        for [a, b] in pairs {
            let id = self.matches.allocate_id(&mut self.rng);
            let first = self.rng.gen_range(0..2);
            let mut game = Match::new(id, [a.into_parts(), b.into_parts()], first);
            game.start();

            for player in game.players() {
                self.presence.set_playing(*player.connection(), id);
            }
            self.clock
                .arm(id, game.generation(), self.config.turn_timeout());

            let view = MatchView::from(&game);
            for player in game.players() {
                self.sessions
                    .send(*player.connection(), ServerEvent::JoinedMatch(view.clone()));
            }
            info!(
                match_id = %id,
                x = %game.player_with_mark(Mark::X).key(),
                o = %game.player_with_mark(Mark::O).key(),
                "Match formed"
            );
            self.matches.insert(game);
            formed.push(id);
        }
        formed
    }

    // ─────────────────────────────────────────────────────────────
    //  Turn authority
    // ─────────────────────────────────────────────────────────────

    /// Applies a move from `connection`.
    ///
    /// # Errors
    ///
    /// Returns [`MoveRejection`] when the move is ignored. Nothing changes
    /// and nobody is notified in that case.
    #[instrument(skip(self))]
    pub fn submit_move(
        &mut self,
        connection: ConnectionId,
        match_id: &str,
        square: i64,
    ) -> Result<TurnResult, MoveRejection> {
        let id: MatchId = match_id.parse()?;
        let game = self
            .matches
            .get_mut(id)
            .ok_or(MoveRejection::UnknownMatch)?;
        let outcome = game.play(connection, square)?;

        let view = MatchView::from(&*game);
        let players = game.players().clone();
        let generation = game.generation();
        if outcome != Outcome::None {
            debug!(board = %game.board().display(), "Final board");
        }

        match outcome {
            Outcome::None => {
                for player in &players {
                    self.sessions
                        .send(*player.connection(), ServerEvent::MatchUpdate(view.clone()));
                }
                self.clock.arm(id, generation, self.config.turn_timeout());
                Ok(TurnResult::Continued)
            }
            Outcome::Win(mark) => {
                let (winner, loser) = if *players[0].mark() == mark {
                    (&players[0], &players[1])
                } else {
                    (&players[1], &players[0])
                };
                info!(match_id = %id, winner = %winner.key(), "Match won");
                for player in &players {
                    self.sessions.send(
                        *player.connection(),
                        ServerEvent::GameWon {
                            winner: winner.key().clone(),
                            game: view.clone(),
                        },
                    );
                }
                self.teardown(id);
                self.settle(winner, WIN_DELTA);
                self.settle(loser, LOSS_DELTA);
                Ok(TurnResult::Won {
                    winner: winner.key().clone(),
                    loser: loser.key().clone(),
                })
            }
            Outcome::Draw => {
                info!(match_id = %id, "Match drawn");
                for player in &players {
                    self.sessions
                        .send(*player.connection(), ServerEvent::CatsGame(view.clone()));
                }
                self.teardown(id);
                Ok(TurnResult::Drawn)
            }
        }
    }

    /// Handles an expired turn timer. Returns false when the timer was
    /// stale: the match is gone, no longer in progress, or has seen a move
    /// since the timer was armed.
    #[instrument(skip(self), fields(match_id = %match_id))]
    pub fn expire_turn(&mut self, match_id: MatchId, generation: u64) -> bool {
        let Some(game) = self.matches.get_mut(match_id) else {
            debug!("Stale timer for finished match");
            return false;
        };
        if game.phase().is_terminal() || game.generation() != generation {
            debug!(live = game.generation(), "Stale timer for superseded turn");
            return false;
        }

        let on_turn = game.on_turn().clone();
        let off_turn = game.off_turn().clone();
        game.abandon();
        let view = MatchView::from(&*game);
        info!(player = %on_turn.key(), "Turn timed out");

        self.sessions
            .send(*on_turn.connection(), ServerEvent::TimedOut(view.clone()));
        self.sessions
            .send(*off_turn.connection(), ServerEvent::OpponentTimedOut(view));
        self.teardown(match_id);
        self.settle(&on_turn, FORFEIT_DELTA);
        true
    }

    /// Removes a match and the presence records pointing at it.
    fn teardown(&mut self, id: MatchId) {
        if let Some(game) = self.matches.remove(id) {
            for player in game.players() {
                self.presence.release_match(*player.connection(), id);
            }
        }
        self.clock.cancel(id);
        debug!(match_id = %id, "Match torn down");
    }

    // ─────────────────────────────────────────────────────────────
    //  Scores
    // ─────────────────────────────────────────────────────────────

    /// Applies a delta and tells the player their new score.
    fn settle(&mut self, player: &MatchPlayer, delta: i64) {
        if let Some(score) = self.apply_delta(player.key(), delta) {
            self.sessions
                .send(*player.connection(), ServerEvent::Score(score));
        }
    }

    fn apply_delta(&mut self, player: &str, delta: i64) -> Option<i64> {
        match self.ledger.adjust(player, delta) {
            Ok(score) => {
                self.broadcast_leaderboard();
                Some(score)
            }
            Err(e) => {
                error!(%player, delta, error = %e, "Score update failed");
                None
            }
        }
    }

    fn push_score(&self, connection: ConnectionId, player: &str) {
        match self.ledger.score(player) {
            Ok(score) => self.sessions.send(connection, ServerEvent::Score(score)),
            Err(e) => error!(%player, error = %e, "Score lookup failed"),
        }
    }

    fn broadcast_leaderboard(&self) {
        self.sessions
            .broadcast(&ServerEvent::LeaderboardUpdate(self.ledger.top_n().to_vec()));
    }

    // ─────────────────────────────────────────────────────────────
    //  Chat
    // ─────────────────────────────────────────────────────────────

    /// Posts a chat line from `connection`.
    #[instrument(skip(self, text))]
    pub fn send_chat(&mut self, connection: ConnectionId, text: &str) {
        let Some(session) = self.sessions.get(connection) else {
            return;
        };
        let identity = session.identity().clone();
        let player = identity.username();

        if !self.limiter.try_consume(player) {
            self.sessions.send(
                connection,
                ServerEvent::ChatMsg(ChatLine {
                    sender: "System".to_string(),
                    sender_id: None,
                    msg: "Slow down!".to_string(),
                    badge_color: "red".to_string(),
                }),
            );
            return;
        }

        let len = text.chars().count();
        if len == 0 || len > *self.config.chat().max_len() {
            debug!(len, "Chat message length out of bounds");
            return;
        }

        let is_admin = self.config.admin().as_deref() == Some(player.as_str());
        if let Some(command) = ChatCommand::parse(text) {
            if is_admin {
                self.run_command(command);
            } else {
                debug!(%player, "Command from non-admin ignored");
            }
            return;
        }

        let badge_color = if is_admin {
            self.config.chat().admin_badge_color()
        } else {
            self.config.chat().badge_color()
        };
        let line = ChatLine {
            sender: player.clone(),
            sender_id: Some(identity.user_id().clone()),
            msg: self.filter.clean(text),
            badge_color: badge_color.clone(),
        };
        self.sessions.broadcast(&ServerEvent::ChatMsg(line));
    }

    fn run_command(&mut self, command: ChatCommand) {
        match command {
            ChatCommand::Kick(target) => match self.sessions.connection_of(&target) {
                Some(connection) => {
                    info!(%target, "Kicking player");
                    self.sessions.send(connection, ServerEvent::Kick);
                }
                None => debug!(%target, "Kick target not online"),
            },
            ChatCommand::Unknown => debug!("Unknown chat command"),
        }
    }

    // ─────────────────────────────────────────────────────────────
    //  Dispatch
    // ─────────────────────────────────────────────────────────────

    /// Routes a decoded client event.
    pub fn handle(&mut self, connection: ConnectionId, event: ClientEvent) {
        match event {
            ClientEvent::JoinQueue => {
                self.join_queue(connection);
            }
            ClientEvent::PlayTurn { match_ref, square } => {
                if let Err(reason) = self.submit_move(connection, &match_ref.id, square) {
                    debug!(connection, %reason, "Move ignored");
                }
            }
            ClientEvent::SendChat(text) => self.send_chat(connection, &text),
        }
    }
}
