//! Server configuration
//!
//! Runtime knobs come from the command line. The phase machine's shape
//! (which phases exist, which replicated object represents each one, and
//! which transitions connect them) comes from a TOML table so it can be
//! changed without a rebuild.

use crate::authority::InputOrdering;
use serde::{Deserialize, Serialize};
use shared::{Phase, TransitionId, DEFAULT_TICK_RATE};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("phase `{0}` is declared more than once")]
    DuplicatePhase(Phase),
    #[error("transition `{0}` is declared more than once")]
    DuplicateTransition(TransitionId),
    #[error("`{context}` refers to undeclared phase `{phase}`")]
    UndeclaredPhase { phase: Phase, context: String },
    #[error("transition `{0}` has a negative or non-finite duration")]
    InvalidDuration(TransitionId),
    #[error("failed to read phase table: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse phase table: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSpec {
    pub id: Phase,
    /// Prefab replicated while this phase is active
    pub object: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionSpec {
    pub id: TransitionId,
    pub source: Phase,
    pub target: Phase,
    /// Prefab replicated while the transition is in flight
    pub object: String,
    /// Seconds the transition runs before it completes; 0 completes on the
    /// next tick
    #[serde(default)]
    pub duration_secs: f32,
}

/// Static shape of the phase machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTable {
    pub initial_phase: Phase,
    pub phases: Vec<PhaseSpec>,
    pub transitions: Vec<TransitionSpec>,
}

impl PhaseTable {
    /// The standard lobby, pre-game, match, results loop.
    pub fn default_table() -> Self {
        let phase = |id: Phase, object: &str| PhaseSpec {
            id,
            object: object.to_string(),
        };
        let transition =
            |id: TransitionId, source: Phase, target: Phase, object: &str, duration_secs: f32| {
                TransitionSpec {
                    id,
                    source,
                    target,
                    object: object.to_string(),
                    duration_secs,
                }
            };

        Self {
            initial_phase: Phase::Lobby,
            phases: vec![
                phase(Phase::Lobby, "lobby_state"),
                phase(Phase::PreGame, "pre_game_state"),
                phase(Phase::MainGame, "main_game_state"),
                phase(Phase::PostGame, "post_game_state"),
            ],
            transitions: vec![
                transition(
                    TransitionId::LobbyToPreGame,
                    Phase::Lobby,
                    Phase::PreGame,
                    "lobby_to_pre_game",
                    0.0,
                ),
                transition(
                    TransitionId::PreGameToMainGame,
                    Phase::PreGame,
                    Phase::MainGame,
                    "countdown",
                    3.0,
                ),
                transition(
                    TransitionId::MainGameToPostGame,
                    Phase::MainGame,
                    Phase::PostGame,
                    "main_game_to_post_game",
                    0.0,
                ),
                transition(
                    TransitionId::PostGameToLobby,
                    Phase::PostGame,
                    Phase::Lobby,
                    "post_game_to_lobby",
                    1.0,
                ),
            ],
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let table: PhaseTable = toml::from_str(content)?;
        table.validate()?;
        Ok(table)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut declared = HashSet::new();
        for spec in &self.phases {
            if !declared.insert(spec.id) {
                return Err(ConfigError::DuplicatePhase(spec.id));
            }
        }

        let require = |phase: Phase, context: String| {
            if declared.contains(&phase) {
                Ok(())
            } else {
                Err(ConfigError::UndeclaredPhase { phase, context })
            }
        };

        require(self.initial_phase, "initial_phase".to_string())?;

        let mut seen = HashSet::new();
        for spec in &self.transitions {
            if !seen.insert(spec.id) {
                return Err(ConfigError::DuplicateTransition(spec.id));
            }
            require(spec.source, format!("{}.source", spec.id))?;
            require(spec.target, format!("{}.target", spec.id))?;
            if !spec.duration_secs.is_finite() || spec.duration_secs < 0.0 {
                return Err(ConfigError::InvalidDuration(spec.id));
            }
        }

        Ok(())
    }

    pub fn phase(&self, id: Phase) -> Option<&PhaseSpec> {
        self.phases.iter().find(|spec| spec.id == id)
    }

    pub fn transition(&self, id: TransitionId) -> Option<&TransitionSpec> {
        self.transitions.iter().find(|spec| spec.id == id)
    }
}

/// Runtime server settings assembled from the command line.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub tick_rate: u32,
    pub max_clients: usize,
    pub ordering: InputOrdering,
    /// Players needed in the lobby before a match starts
    pub min_players: usize,
    pub match_secs: f32,
    pub post_game_secs: f32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_rate: DEFAULT_TICK_RATE,
            max_clients: 16,
            ordering: InputOrdering::Arrival,
            min_players: 1,
            match_secs: 60.0,
            post_game_secs: 5.0,
        }
    }
}
