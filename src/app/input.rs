use std::fmt;
use std::str::FromStr;

use crate::app::Message;

/// A key press with its Ctrl modifier state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyChord {
    pub ctrl: bool,
    pub key: char,
}

impl KeyChord {
    pub const fn plain(key: char) -> Self {
        Self { ctrl: false, key }
    }

    pub const fn ctrl(key: char) -> Self {
        Self { ctrl: true, key }
    }
}

impl fmt::Display for KeyChord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ctrl {
            write!(f, "ctrl+{}", self.key)
        } else {
            write!(f, "{}", self.key)
        }
    }
}

impl FromStr for KeyChord {
    type Err = String;

    /// Parses `s`, `ctrl+s` or `Ctrl-S` style chords.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let (ctrl, key) = lower
            .strip_prefix("ctrl+")
            .or_else(|| lower.strip_prefix("ctrl-"))
            .map_or((false, lower.as_str()), |rest| (true, rest));
        let mut chars = key.chars();
        match (chars.next(), chars.next()) {
            (Some(key), None) => Ok(Self { ctrl, key }),
            _ => Err(format!("invalid key chord: {s}")),
        }
    }
}

/// Panel shortcuts: Ctrl+S saves, Ctrl+R resets.
pub fn key_message(chord: KeyChord) -> Option<Message> {
    match chord {
        KeyChord { ctrl: true, key: 's' } => Some(Message::Save),
        KeyChord { ctrl: true, key: 'r' } => Some(Message::Reset),
        _ => None,
    }
}
