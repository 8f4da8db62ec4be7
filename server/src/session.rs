//! Match flow rules that decide when to issue phase transitions
//!
//! The phase service only enforces which transitions are legal. This module
//! is the outside event source that asks for them: a lobby fills up, a
//! match clock runs out, a results screen has been shown long enough.

use crate::config::ServerConfig;
use crate::phases::GsService;
use log::debug;
use shared::{Phase, Replicator, TransitionId};

#[derive(Debug)]
pub struct SessionDirector {
    min_players: usize,
    match_secs: f32,
    post_game_secs: f32,
    current: Option<Phase>,
    time_in_phase: f32,
}

impl SessionDirector {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            min_players: config.min_players.max(1),
            match_secs: config.match_secs,
            post_game_secs: config.post_game_secs,
            current: None,
            time_in_phase: 0.0,
        }
    }

    /// Advances the phase clock and issues at most one transition. Returns
    /// the transition that was accepted.
    pub fn update<R: Replicator>(
        &mut self,
        service: &mut GsService<R>,
        connected: usize,
        dt: f32,
    ) -> Option<TransitionId> {
        let active = service.active_phase()?;

        if self.current != Some(active) {
            self.current = Some(active);
            self.time_in_phase = 0.0;
        } else {
            self.time_in_phase += dt;
        }

        if service.in_flight().is_some() {
            return None;
        }

        let wanted = match active {
            Phase::Lobby if connected >= self.min_players => TransitionId::LobbyToPreGame,
            Phase::PreGame => TransitionId::PreGameToMainGame,
            Phase::MainGame if connected == 0 || self.time_in_phase >= self.match_secs => {
                TransitionId::MainGameToPostGame
            }
            Phase::PostGame if self.time_in_phase >= self.post_game_secs => {
                TransitionId::PostGameToLobby
            }
            _ => return None,
        };

        debug!(
            "Requesting {} after {:.1}s in {} with {} players",
            wanted, self.time_in_phase, active, connected
        );
        service.issue_transition(wanted).ok().map(|_| wanted)
    }
}
