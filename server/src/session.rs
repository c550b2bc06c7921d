//! Authoritative quiz session
//!
//! The [`Session`] owns every piece of mutable game state: lifecycle state,
//! mode, round counter, library health, the current article and the round's
//! tally. It is driven by exactly three kinds of input, all delivered by the
//! coordinator loop one at a time:
//!
//! - connection events (connect, inbound frame, disconnect, liveness sweep)
//! - fired timers
//!
//! Each handler runs its whole transition, broadcasts included, before the
//! next input is looked at, so no partial update is ever visible.
//!
//! ```text
//! WAITING -> PLAYING -> SHOWING_RESULTS -> PLAYING ...
//!                                      \-> GAME_OVER -> WAITING
//! ```

use crate::aggregator::AnswerAggregator;
use crate::articles::ArticleLibrary;
use crate::client_manager::{Client, ClientManager, Outbox};
use crate::config::GameConfig;
use crate::timer::{RoundTimer, Scheduler, Tick, TimerFired, TimerId, TimerKind};
use log::{debug, error, info, warn};
use shared::{
    decode_client_message, Article, ClientMessage, GameMode, PlayerId, ServerMessage, Tag,
    TagCount,
};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameState {
    Waiting,
    Playing,
    ShowingResults,
    GameOver,
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GameState::Waiting => "WAITING",
            GameState::Playing => "PLAYING",
            GameState::ShowingResults => "SHOWING_RESULTS",
            GameState::GameOver => "GAME_OVER",
        };
        f.write_str(name)
    }
}

pub struct Session<S: Scheduler> {
    config: GameConfig,
    library: ArticleLibrary,
    scheduler: S,
    clients: ClientManager,
    answers: AnswerAggregator,
    round_timer: RoundTimer,
    lobby_timer: Option<TimerId>,
    intermission_timer: Option<TimerId>,

    state: GameState,
    mode: GameMode,
    round: u32,
    library_health: u32,
    current_article: Option<Arc<Article>>,
}

impl<S: Scheduler> Session<S> {
    pub fn new(config: GameConfig, library: ArticleLibrary, scheduler: S) -> Self {
        Self {
            clients: ClientManager::new(config.max_clients),
            answers: AnswerAggregator::new(),
            round_timer: RoundTimer::new(config.tick_interval),
            lobby_timer: None,
            intermission_timer: None,
            state: GameState::Waiting,
            mode: GameMode::Training,
            round: 0,
            library_health: config.health.initial,
            current_article: None,
            config,
            library,
            scheduler,
        }
    }

    // ---- connection events ----

    /// Registers a new connection. None if the server is full.
    pub fn connect(&mut self, outbox: Outbox) -> Option<PlayerId> {
        self.clients.register(outbox)
    }

    /// Handles one inbound text frame from a connection.
    pub fn handle_frame(&mut self, id: &PlayerId, text: &str) {
        self.clients.touch(id);

        match decode_client_message(text) {
            Ok(message) => self.handle_message(id, message),
            Err(e) => warn!("Discarding message from {}: {}", id, e),
        }
    }

    pub fn handle_message(&mut self, id: &PlayerId, message: ClientMessage) {
        match message {
            ClientMessage::Join { name } => self.join(id, &name),
            ClientMessage::Answer { answer } => {
                self.record_answer(id, answer);
            }
        }
    }

    /// Marks a connection as alive without any game effect
    pub fn heartbeat(&mut self, id: &PlayerId) {
        self.clients.touch(id);
    }

    pub fn disconnect(&mut self, id: &PlayerId) {
        if let Some(client) = self.clients.remove(id) {
            self.after_removal(client);
        }
    }

    /// Drops connections that have gone quiet for longer than the timeout.
    pub fn expire_idle(&mut self) {
        for client in self.clients.check_timeouts(self.config.client_timeout) {
            self.after_removal(client);
        }
    }

    fn join(&mut self, id: &PlayerId, name: &str) {
        let Some(first_join) = self.clients.join(id, name) else {
            warn!("Join from unknown connection {}", id);
            return;
        };

        let joined = ServerMessage::Joined {
            id: id.clone(),
            players: self.clients.snapshot(),
            mode: self.mode,
            round: self.round,
            total_rounds: self.total_rounds(),
            library_health: self.library_health,
        };
        self.clients.send_to(id, &joined);
        self.broadcast(ServerMessage::PlayerJoined {
            players: self.clients.snapshot(),
        });

        if first_join {
            self.maybe_schedule_lobby();
        }
    }

    /// Records or replaces a player's vote. Returns whether it was accepted.
    pub fn record_answer(&mut self, id: &PlayerId, tag: Tag) -> bool {
        if self.state != GameState::Playing {
            debug!("Ignoring answer from {} while {}", id, self.state);
            return false;
        }
        if !self.clients.is_joined(id) {
            debug!("Ignoring answer from {} before join", id);
            return false;
        }

        let previous = self.answers.record_answer(id, tag);
        self.clients.set_answer(id, tag);
        debug!("Player {} voted {} (was {:?})", id, tag, previous);
        true
    }

    fn after_removal(&mut self, client: Client) {
        if !client.is_joined() {
            return;
        }

        // The player's vote for the running round stays in the tally
        self.broadcast(ServerMessage::PlayerLeft {
            players: self.clients.snapshot(),
        });

        let remaining = self.clients.player_count();
        if self.state == GameState::Waiting {
            if remaining < self.config.min_players {
                if let Some(id) = self.lobby_timer.take() {
                    info!("Not enough players left, lobby countdown cancelled");
                    self.scheduler.cancel(id);
                }
            }
        } else if remaining == 0 {
            info!("All players left, resetting session");
            self.reset();
        }
    }

    // ---- timers ----

    /// Applies a fired timer. Timers the session no longer holds are ignored.
    pub fn on_timer(&mut self, fired: TimerFired) {
        match fired.kind {
            TimerKind::Lobby => {
                if self.lobby_timer != Some(fired.id) {
                    debug!("Ignoring stale lobby timer {:?}", fired.id);
                    return;
                }
                self.lobby_timer = None;
                self.start_round();
            }
            TimerKind::Intermission => {
                if self.intermission_timer != Some(fired.id) {
                    debug!("Ignoring stale intermission timer {:?}", fired.id);
                    return;
                }
                self.intermission_timer = None;
                self.start_round();
            }
            TimerKind::RoundTick => match self.round_timer.on_tick(fired.id, &mut self.scheduler) {
                None => debug!("Ignoring stale round tick {:?}", fired.id),
                Some(Tick::Running { time_left }) => {
                    self.broadcast(ServerMessage::TimeUpdate { time_left });
                }
                Some(Tick::Expired) => {
                    self.broadcast(ServerMessage::TimeUpdate { time_left: 0 });
                    self.show_results();
                }
            },
        }
    }

    fn maybe_schedule_lobby(&mut self) {
        if self.state != GameState::Waiting || self.lobby_timer.is_some() {
            return;
        }
        let players = self.clients.player_count();
        if players < self.config.min_players {
            return;
        }

        info!(
            "{} players ready, first round in {:?}",
            players, self.config.lobby_delay
        );
        self.lobby_timer = Some(
            self.scheduler
                .schedule(self.config.lobby_delay, TimerKind::Lobby),
        );
    }

    fn cancel_timers(&mut self) {
        if let Some(id) = self.lobby_timer.take() {
            self.scheduler.cancel(id);
        }
        if let Some(id) = self.intermission_timer.take() {
            self.scheduler.cancel(id);
        }
        self.round_timer.cancel(&mut self.scheduler);
    }

    // ---- transitions ----

    fn start_round(&mut self) {
        self.cancel_timers();
        self.state = GameState::Playing;
        self.answers.clear();
        self.clients.clear_answers();
        self.round += 1;

        if self.mode == GameMode::Training && self.round > self.config.training_rounds {
            self.mode = GameMode::Play;
            self.round = 1;
            self.library_health = self.config.health.initial;
            info!("Training complete, switching to play mode");
            self.broadcast(ServerMessage::ModeChange {
                game_mode: GameMode::Play,
                message: "Training complete! The library is now open. Protect it from fake news!"
                    .to_string(),
            });
        }

        let article = self.library.article(self.mode, self.round);
        self.current_article = Some(Arc::clone(&article));
        self.round_timer
            .start(self.config.round_seconds, &mut self.scheduler);

        info!(
            "Round {} ({}) started: {:?}",
            self.round, self.mode, article.title
        );
        self.broadcast(ServerMessage::GameStart {
            article,
            time_left: self.config.round_seconds,
            players: self.clients.snapshot(),
            game_mode: self.mode,
            library_health: self.library_health,
            round: self.round,
            total_rounds: self.total_rounds(),
        });
    }

    fn show_results(&mut self) {
        self.state = GameState::ShowingResults;

        let Some(article) = self.current_article.clone() else {
            error!("Round ended without an article, resetting session");
            self.reset();
            return;
        };
        let correct = article.correct_tag;

        match self.mode {
            GameMode::Training => {
                let answers = &self.answers;
                for player in self.clients.players_mut() {
                    if answers.answer_of(&player.id) == Some(correct) {
                        player.score += 1;
                    }
                }
            }
            GameMode::Play => {
                let health = self.config.health;
                let plurality = self.answers.plurality();
                self.library_health = if plurality == Some(correct) {
                    (self.library_health + health.reward).min(health.max)
                } else {
                    self.library_health.saturating_sub(health.penalty)
                };
                info!(
                    "Round {} plurality {:?}, correct {}, library health {}",
                    self.round, plurality, correct, self.library_health
                );
            }
        }

        self.broadcast(ServerMessage::ShowResults {
            results: self.answers.snapshot(),
            correct_tag: correct,
            game_mode: self.mode,
            library_health: self.library_health,
        });

        if self.mode == GameMode::Play && self.library_health == 0 {
            self.game_over();
        } else {
            self.intermission_timer = Some(
                self.scheduler
                    .schedule(self.config.results_delay, TimerKind::Intermission),
            );
        }
    }

    fn game_over(&mut self) {
        self.state = GameState::GameOver;
        info!("Library health depleted after round {}, game over", self.round);
        self.broadcast(ServerMessage::GameOver {
            library_health: self.library_health,
        });

        self.reset();
        self.maybe_schedule_lobby();
    }

    /// Puts the session back into its initial waiting state.
    fn reset(&mut self) {
        self.cancel_timers();
        self.state = GameState::Waiting;
        self.mode = GameMode::Training;
        self.round = 0;
        self.library_health = self.config.health.initial;
        self.current_article = None;
        self.answers.clear();
        self.clients.clear_answers();
    }

    fn broadcast(&self, message: ServerMessage) {
        self.clients.broadcast(&message);
    }

    fn total_rounds(&self) -> Option<u32> {
        match self.mode {
            GameMode::Training => Some(self.config.training_rounds),
            GameMode::Play => None,
        }
    }

    // ---- accessors ----

    pub fn state(&self) -> GameState {
        self.state
    }

    pub fn mode(&self) -> GameMode {
        self.mode
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn library_health(&self) -> u32 {
        self.library_health
    }

    pub fn time_left(&self) -> u32 {
        self.round_timer.time_left()
    }

    pub fn current_article(&self) -> Option<&Arc<Article>> {
        self.current_article.as_ref()
    }

    pub fn tally(&self) -> Vec<TagCount> {
        self.answers.snapshot()
    }

    pub fn answers(&self) -> &AnswerAggregator {
        &self.answers
    }

    pub fn clients(&self) -> &ClientManager {
        &self.clients
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }
}
