use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::response::StudyResponse;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayTab {
    #[default]
    Speed,
    Mermaid,
    Step,
    Deep,
    Exam,
}

impl DisplayTab {
    pub const ORDER: [DisplayTab; 5] = [
        DisplayTab::Speed,
        DisplayTab::Mermaid,
        DisplayTab::Step,
        DisplayTab::Deep,
        DisplayTab::Exam,
    ];

    pub fn key(self) -> &'static str {
        match self {
            DisplayTab::Speed => "speed",
            DisplayTab::Mermaid => "mermaid",
            DisplayTab::Step => "step",
            DisplayTab::Deep => "deep",
            DisplayTab::Exam => "exam",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DisplayTab::Speed => "Quick answer",
            DisplayTab::Mermaid => "Diagram",
            DisplayTab::Step => "Step by step",
            DisplayTab::Deep => "Deep dive",
            DisplayTab::Exam => "Exam prep",
        }
    }

    pub fn from_key(raw: &str) -> Result<Self, UnknownTab> {
        let normalized = raw.trim().to_ascii_lowercase();
        Self::ORDER
            .into_iter()
            .find(|tab| tab.key() == normalized)
            .ok_or_else(|| UnknownTab(raw.trim().to_string()))
    }
}

impl fmt::Display for DisplayTab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for DisplayTab {
    type Err = UnknownTab;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::from_key(raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown tab '{0}' (expected one of speed, mermaid, step, deep, exam)")]
pub struct UnknownTab(pub String);

/// Tabs shown for a validated response, in display order.
pub fn tabs_for(_response: &StudyResponse) -> [DisplayTab; 5] {
    DisplayTab::ORDER
}

pub fn tab_content(response: &StudyResponse, tab: DisplayTab) -> &str {
    match tab {
        DisplayTab::Speed => response.speed().answer(),
        DisplayTab::Mermaid => response.mermaid(),
        DisplayTab::Step => response.step(),
        DisplayTab::Deep => response.deep(),
        DisplayTab::Exam => response.exam(),
    }
}
