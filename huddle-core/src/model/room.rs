use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

const SHORT_LEN: usize = 6;
const SHORT_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

const ADJECTIVES: &[&str] = &[
    "brave", "calm", "clever", "eager", "fancy", "gentle", "happy", "jolly",
    "kind", "lively", "lucky", "mellow", "nimble", "proud", "quick", "quiet",
    "shiny", "silent", "swift", "tidy", "vivid", "warm", "wise", "witty",
];

const COLORS: &[&str] = &[
    "amber", "azure", "coral", "crimson", "emerald", "golden", "indigo",
    "ivory", "jade", "lilac", "maroon", "olive", "pearl", "ruby", "sage",
    "scarlet", "silver", "teal", "umber", "violet",
];

const ANIMALS: &[&str] = &[
    "badger", "bear", "crane", "dolphin", "falcon", "ferret", "fox", "hare",
    "heron", "lemur", "lynx", "marmot", "otter", "owl", "panda", "raven",
    "salmon", "seal", "swan", "tiger", "walrus", "wolf",
];

/// Which of the two accepted code forms `create_room` hands out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CodeStyle {
    /// 6-character alphanumeric, e.g. `K3QZ7B`.
    #[default]
    Short,
    /// Three hyphenated words, e.g. `quiet-amber-otter`.
    Words,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("invalid room code: {0:?}")]
pub struct InvalidRoomCode(pub String);

/// Short human-shareable room identifier.
///
/// Two forms are valid and both are accepted on join: a 6-character
/// alphanumeric code (stored uppercase) and an `adjective-color-animal`
/// triple (stored lowercase).
#[derive(Debug, Serialize, Deserialize, Clone, Hash, Eq, PartialEq)]
#[serde(transparent)]
pub struct RoomCode(String);

impl RoomCode {
    pub fn generate(style: CodeStyle) -> Self {
        let mut rng = rand::thread_rng();
        match style {
            CodeStyle::Short => {
                let code: String = (0..SHORT_LEN)
                    .map(|_| SHORT_ALPHABET[rng.gen_range(0..SHORT_ALPHABET.len())] as char)
                    .collect();
                Self(code)
            }
            CodeStyle::Words => {
                let pick = |words: &[&'static str], rng: &mut rand::rngs::ThreadRng| -> &'static str {
                    words[rng.gen_range(0..words.len())]
                };
                Self(format!(
                    "{}-{}-{}",
                    pick(ADJECTIVES, &mut rng),
                    pick(COLORS, &mut rng),
                    pick(ANIMALS, &mut rng),
                ))
            }
        }
    }

    /// Validate and normalize a code in either accepted form.
    pub fn parse(input: &str) -> Result<Self, InvalidRoomCode> {
        let trimmed = input.trim();

        if trimmed.len() == SHORT_LEN && trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Ok(Self(trimmed.to_ascii_uppercase()));
        }

        let words: Vec<&str> = trimmed.split('-').collect();
        if words.len() == 3
            && words
                .iter()
                .all(|w| !w.is_empty() && w.chars().all(|c| c.is_ascii_alphabetic()))
        {
            return Ok(Self(trimmed.to_ascii_lowercase()));
        }

        Err(InvalidRoomCode(input.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
