//! Wire protocol and data model shared by the quiz server and its clients.
//!
//! Every frame is a JSON object with a `type` discriminator. Clients send
//! [`ClientMessage`]s, the server answers with [`ServerMessage`]s.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Reliability tag a player can vote for.
///
/// Variants are declared in lexicographic order of their wire names, so the
/// derived `Ord` matches string ordering. Plurality tie-breaks rely on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tag {
    /// Generic fake label, used by training articles
    #[serde(rename = "FAKE")]
    Fake,
    #[serde(rename = "FAKE:_ALL_CAPS_TITLE")]
    AllCapsTitle,
    #[serde(rename = "FAKE:_UNRELIABLE_SOURCE")]
    UnreliableSource,
    #[serde(rename = "TRUTH")]
    Truth,
}

impl Tag {
    pub const ALL: [Tag; 4] = [
        Tag::Fake,
        Tag::AllCapsTitle,
        Tag::UnreliableSource,
        Tag::Truth,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tag::Fake => "FAKE",
            Tag::AllCapsTitle => "FAKE:_ALL_CAPS_TITLE",
            Tag::UnreliableSource => "FAKE:_UNRELIABLE_SOURCE",
            Tag::Truth => "TRUTH",
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tag {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tag::ALL
            .iter()
            .copied()
            .find(|tag| tag.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownTag(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GameMode {
    Training,
    Play,
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameMode::Training => f.write_str("TRAINING"),
            GameMode::Play => f.write_str("PLAY"),
        }
    }
}

/// Session-scoped player identity, one per connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(value: &str) -> Self {
        PlayerId(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub title: String,
    /// Article body
    pub content: String,
    /// Source label shown next to the title
    pub url: String,
    pub correct_tag: Tag,
    /// Explanatory hints, only present on training articles
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clues: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub score: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<Tag>,
}

impl Player {
    pub fn new(id: PlayerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            score: 0,
            answer: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCount {
    pub tag: Tag,
    pub count: u32,
}

/// Messages sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    Join { name: String },
    Answer { answer: Tag },
}

impl ClientMessage {
    /// Discriminators accepted in the `type` field
    pub const TYPES: [&'static str; 2] = ["join", "answer"];
}

/// Messages sent by the server, either broadcast or direct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Direct reply to the player that just joined
    Joined {
        id: PlayerId,
        players: Vec<Player>,
        mode: GameMode,
        round: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total_rounds: Option<u32>,
        library_health: u32,
    },
    PlayerJoined {
        players: Vec<Player>,
    },
    PlayerLeft {
        players: Vec<Player>,
    },
    ModeChange {
        game_mode: GameMode,
        message: String,
    },
    GameStart {
        article: Arc<Article>,
        time_left: u32,
        players: Vec<Player>,
        game_mode: GameMode,
        library_health: u32,
        round: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total_rounds: Option<u32>,
    },
    TimeUpdate {
        time_left: u32,
    },
    ShowResults {
        results: Vec<TagCount>,
        correct_tag: Tag,
        game_mode: GameMode,
        library_health: u32,
    },
    GameOver {
        library_health: u32,
    },
}

impl ServerMessage {
    /// Wire name of the message, handy for logs
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Joined { .. } => "joined",
            ServerMessage::PlayerJoined { .. } => "playerJoined",
            ServerMessage::PlayerLeft { .. } => "playerLeft",
            ServerMessage::ModeChange { .. } => "modeChange",
            ServerMessage::GameStart { .. } => "gameStart",
            ServerMessage::TimeUpdate { .. } => "timeUpdate",
            ServerMessage::ShowResults { .. } => "showResults",
            ServerMessage::GameOver { .. } => "gameOver",
        }
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("message has no `type` field")]
    MissingType,
    #[error("unknown message type `{0}`")]
    UnknownType(String),
    #[error("unknown tag `{0}`")]
    UnknownTag(String),
}

/// Decodes one inbound text frame.
///
/// Unknown `type` values are reported separately from malformed payloads so
/// the server can log them distinctly.
pub fn decode_client_message(text: &str) -> Result<ClientMessage, ProtocolError> {
    let value: Value = serde_json::from_str(text)?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingType)?;

    if !ClientMessage::TYPES.contains(&kind) {
        return Err(ProtocolError::UnknownType(kind.to_string()));
    }

    if kind == "answer" {
        if let Some(raw) = value.get("answer").and_then(Value::as_str) {
            raw.parse::<Tag>()?;
        }
    }

    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_join() {
        let msg = decode_client_message(r#"{"type":"join","name":"Ada"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Join {
                name: "Ada".to_string()
            }
        );
    }

    #[test]
    fn test_decode_answer() {
        let msg = decode_client_message(r#"{"type":"answer","answer":"FAKE:_ALL_CAPS_TITLE"}"#)
            .unwrap();
        assert_eq!(
            msg,
            ClientMessage::Answer {
                answer: Tag::AllCapsTitle
            }
        );
    }

    #[test]
    fn test_decode_rejects_unknown_tag() {
        let err = decode_client_message(r#"{"type":"answer","answer":"CLICKBAIT"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownTag(tag) if tag == "CLICKBAIT"));
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        let err = decode_client_message(r#"{"type":"cheat","score":99}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownType(kind) if kind == "cheat"));
    }

    #[test]
    fn test_decode_rejects_missing_type() {
        let err = decode_client_message(r#"{"name":"Ada"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingType));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_client_message("not json at all"),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            decode_client_message(r#"{"type":"join"}"#),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_tag_order_matches_wire_names() {
        let mut by_name = Tag::ALL.to_vec();
        by_name.sort_by_key(|tag| tag.as_str());
        let mut by_ord = Tag::ALL.to_vec();
        by_ord.sort();
        assert_eq!(by_name, by_ord);
    }

    #[test]
    fn test_tag_from_str() {
        assert_eq!("TRUTH".parse::<Tag>().unwrap(), Tag::Truth);
        assert!("truth".parse::<Tag>().is_err());
    }

    #[test]
    fn test_game_start_wire_format() {
        let article = Arc::new(Article {
            title: "Title".to_string(),
            content: "Body".to_string(),
            url: "example.org".to_string(),
            correct_tag: Tag::Truth,
            clues: None,
        });
        let msg = ServerMessage::GameStart {
            article,
            time_left: 30,
            players: vec![Player::new(PlayerId::from("abc"), "Ada")],
            game_mode: GameMode::Play,
            library_health: 100,
            round: 1,
            total_rounds: None,
        };

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "gameStart");
        assert_eq!(value["timeLeft"], 30);
        assert_eq!(value["gameMode"], "PLAY");
        assert_eq!(value["libraryHealth"], 100);
        assert_eq!(value["article"]["correctTag"], "TRUTH");
        assert_eq!(value["players"][0], json!({"id": "abc", "name": "Ada", "score": 0}));
        assert!(value.get("totalRounds").is_none());
        assert!(value["article"].get("clues").is_none());
    }

    #[test]
    fn test_show_results_wire_format() {
        let msg = ServerMessage::ShowResults {
            results: vec![TagCount {
                tag: Tag::Fake,
                count: 2,
            }],
            correct_tag: Tag::Fake,
            game_mode: GameMode::Training,
            library_health: 100,
        };

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "showResults",
                "results": [{"tag": "FAKE", "count": 2}],
                "correctTag": "FAKE",
                "gameMode": "TRAINING",
                "libraryHealth": 100
            })
        );
        assert_eq!(msg.kind(), "showResults");
    }
}
