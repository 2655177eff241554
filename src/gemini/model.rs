// Analysis and chat data model shared by the provider client and the panel.

use serde::{Deserialize, Serialize};

/// One identified clue — e.g. a road-marking color or a bollard style.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clue {
    /// Type of clue: road, sign, vegetation, meta, etc.
    #[serde(rename = "type")]
    pub kind: String,
    /// Description citing the specific meta rule.
    pub description: String,
}

/// An alternative country candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alternative {
    pub country: String,
    /// Confidence percentage, 0–100.
    pub confidence: f64,
}

/// Structured result of one screenshot analysis.
///
/// At most one instance is live at a time: it is overwritten by the next
/// successful analysis and dropped when a new analysis begins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// The most likely country.
    pub country: String,
    /// Region within the country, if identifiable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Confidence percentage, 0–100.
    pub confidence: f64,
    /// Key clues, most significant first.
    pub clues: Vec<Clue>,
    /// Alternative possibilities.
    pub alternatives: Vec<Alternative>,
    /// A specific meta rule to memorize.
    pub meta_tip: String,
}

impl AnalysisResult {
    /// `Country (NN%)` list joined by ", ", or "None" when empty.
    /// Shared between the result view and the chat context block.
    pub fn alternatives_text(&self) -> String {
        if self.alternatives.is_empty() {
            return "None".to_string();
        }
        self.alternatives
            .iter()
            .map(|a| format!("{} ({}%)", a.country, a.confidence))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Who produced a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One turn of the follow-up conversation.
///
/// The history is append-only within a session and passed by value to the
/// provider on each turn; it is cleared whenever a new analysis starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}
