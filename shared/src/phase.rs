use serde::{Deserialize, Serialize};
use std::fmt;

/// Session phases of a match. Exactly one is active at a time on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Lobby,
    PreGame,
    MainGame,
    PostGame,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Lobby => "lobby",
            Phase::PreGame => "pre_game",
            Phase::MainGame => "main_game",
            Phase::PostGame => "post_game",
        };
        f.write_str(name)
    }
}

/// Named transitions between phases. Which source and target each one
/// connects is configuration, not hard-coded here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionId {
    LobbyToPreGame,
    PreGameToMainGame,
    MainGameToPostGame,
    PostGameToLobby,
}

impl fmt::Display for TransitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransitionId::LobbyToPreGame => "lobby_to_pre_game",
            TransitionId::PreGameToMainGame => "pre_game_to_main_game",
            TransitionId::MainGameToPostGame => "main_game_to_post_game",
            TransitionId::PostGameToLobby => "post_game_to_lobby",
        };
        f.write_str(name)
    }
}

/// Handle of an object replicated to every observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u32);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names() {
        assert_eq!(Phase::PreGame.to_string(), "pre_game");
        assert_eq!(ObjectId(12).to_string(), "#12");
        assert_eq!(
            TransitionId::MainGameToPostGame.to_string(),
            "main_game_to_post_game"
        );
    }
}
