use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Two-stop gradient used by the rendering layer for a subject's header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Theme {
    pub from: &'static str,
    pub to: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    Math,
    Physics,
    Chemistry,
    Biology,
    Literature,
    English,
}

impl Subject {
    pub const ALL: [Subject; 6] = [
        Subject::Math,
        Subject::Physics,
        Subject::Chemistry,
        Subject::Biology,
        Subject::Literature,
        Subject::English,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Subject::Math => "math",
            Subject::Physics => "physics",
            Subject::Chemistry => "chemistry",
            Subject::Biology => "biology",
            Subject::Literature => "literature",
            Subject::English => "english",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Subject::Math => "Math",
            Subject::Physics => "Physics",
            Subject::Chemistry => "Chemistry",
            Subject::Biology => "Biology",
            Subject::Literature => "Literature",
            Subject::English => "English",
        }
    }

    pub fn theme(self) -> Theme {
        let (from, to) = match self {
            Subject::Math => ("#3b82f6", "#4f46e5"),
            Subject::Physics => ("#8b5cf6", "#6d28d9"),
            Subject::Chemistry => ("#10b981", "#0d9488"),
            Subject::Biology => ("#22c55e", "#65a30d"),
            Subject::Literature => ("#f43f5e", "#db2777"),
            Subject::English => ("#f59e0b", "#ea580c"),
        };
        Theme { from, to }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown subject '{0}'")]
pub struct UnknownSubject(pub String);

impl FromStr for Subject {
    type Err = UnknownSubject;

    /// Accepts either the key or the label, case-insensitively.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        Subject::ALL
            .into_iter()
            .find(|subject| {
                subject.key() == normalized || subject.label().to_ascii_lowercase() == normalized
            })
            .ok_or_else(|| UnknownSubject(raw.trim().to_string()))
    }
}
