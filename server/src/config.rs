//! Tunable game constants.

use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3001;

/// Library health bounds and per-round adjustments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthConfig {
    pub initial: u32,
    pub max: u32,
    pub reward: u32,
    pub penalty: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            initial: 100,
            max: 100,
            reward: 10,
            penalty: 15,
        }
    }
}

/// Everything the session and the network layer need to know about timing
/// and limits. Built from command line arguments in `main`.
#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Countdown length of a round, in ticks
    pub round_seconds: u32,
    /// Time between two countdown ticks
    pub tick_interval: Duration,
    /// Delay between reaching the minimum player count and the first round
    pub lobby_delay: Duration,
    /// Delay between showing results and starting the next round
    pub results_delay: Duration,
    pub training_rounds: u32,
    pub min_players: usize,
    pub health: HealthConfig,
    pub max_clients: usize,
    /// Capacity of each connection's outbound queue
    pub max_send_queue: usize,
    pub ping_interval: Duration,
    pub client_timeout: Duration,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            round_seconds: 30,
            tick_interval: Duration::from_secs(1),
            lobby_delay: Duration::from_secs(3),
            results_delay: Duration::from_secs(5),
            training_rounds: 3,
            min_players: 2,
            health: HealthConfig::default(),
            max_clients: 32,
            max_send_queue: 256,
            ping_interval: Duration::from_secs(15),
            client_timeout: Duration::from_secs(45),
        }
    }
}
