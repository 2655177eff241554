//! Render-ready projection of the panel.
//!
//! One serializable view, total over all four panel states. Exactly one
//! state block is marked active per render, so two regions can never be
//! visible at once — the UI client is a dumb projection of this struct.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::gemini::model::{AnalysisResult, Role};
use crate::tabs::HintVariant;

/// How many clues the result block shows.
const MAX_DISPLAY_CLUES: usize = 5;

/// Which of the four mutually exclusive state blocks is visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StateTag {
    Idle,
    Loading,
    Error,
    Result,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelView {
    pub state: StateTag,
    /// Single-line failure text; present only in the error state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Show the "open settings" affordance next to the error.
    pub settings_link: bool,
    /// Rendered result block; present only in the result state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ResultView>,
    /// Cosmetic blur over the result — reversible, survives re-renders.
    pub result_hidden: bool,
    pub chat_visible: bool,
    pub chat: Vec<ChatMessageView>,
    /// Trigger control state: false while an analysis is pending or the
    /// active tab sits on a multiplayer route.
    pub analyze_enabled: bool,
    /// Chat input/send state: false while a chat turn is pending.
    pub chat_enabled: bool,
    pub hint: HintVariant,
}

/// The result block, pre-formatted for display.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultView {
    pub country: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// e.g. "82%"
    pub confidence_pct: String,
    /// "high" | "medium" | "low"
    pub confidence_label: String,
    pub clues: Vec<ClueView>,
    /// e.g. "Belgium (10%)" — or "None"
    pub alternatives_text: String,
    pub meta_tip: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClueView {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
}

impl ResultView {
    pub fn from_analysis(analysis: &AnalysisResult) -> Self {
        Self {
            country: analysis.country.clone(),
            region: analysis.region.clone(),
            confidence_pct: format!("{}%", analysis.confidence),
            confidence_label: confidence_label(analysis.confidence).to_string(),
            clues: analysis
                .clues
                .iter()
                .take(MAX_DISPLAY_CLUES)
                .map(|c| ClueView {
                    kind: c.kind.clone(),
                    description: c.description.clone(),
                })
                .collect(),
            alternatives_text: analysis.alternatives_text(),
            meta_tip: analysis.meta_tip.clone(),
        }
    }
}

/// One entry of the displayed chat thread.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageView {
    pub id: String,
    pub role: Role,
    /// Inline-markup rendering of the content (plain text while pending or
    /// for error strings).
    pub html: String,
    pub pending: bool,
}

/// Deterministic confidence bucketing: ≥70 "high", 40–69 "medium", <40
/// "low". The boundary values belong to the higher tier.
pub fn confidence_label(confidence: f64) -> &'static str {
    if confidence >= 70.0 {
        "high"
    } else if confidence >= 40.0 {
        "medium"
    } else {
        "low"
    }
}

static BOLD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.*?)\*\*").unwrap());
static ITALIC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*(.*?)\*").unwrap());
static BULLET_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^- (.+)$").unwrap());
static LIST_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)(<li>.*</li>)").unwrap());

/// Render the small inline markup subset the assistant is instructed to use:
/// bold, italic, bullet lists, line breaks. Anything else passes through.
pub fn render_inline_markup(text: &str) -> String {
    let s = BOLD_RE.replace_all(text, "<strong>$1</strong>");
    let s = ITALIC_RE.replace_all(&s, "<em>$1</em>");
    let s = BULLET_RE.replace_all(&s, "<li>$1</li>");
    let s = LIST_RE.replace(&s, "<ul>$1</ul>");
    s.replace('\n', "<br>")
}
