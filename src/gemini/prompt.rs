// Prompt text for the analysis and chat calls.
//
// The meta-clue knowledge below is the load-bearing artifact of the whole
// system — keep edits to the rules themselves deliberate.

use crate::gemini::model::AnalysisResult;

/// System instruction for the structured analysis call.
pub const SYSTEM_PROMPT: &str = "You are an expert GeoGuessr analyst specializing in META CLUES - the specific technical patterns that identify countries.

LICENSE PLATE METAS:
- White front + yellow rear = UK, Cyprus, Gibraltar
- Yellow both plates = Netherlands, Luxembourg
- Blue EU strip on left = Europe (check country code)
- Long narrow plates = European, Wide short = American style

ROAD LINE METAS:
- WHITE center lines: UK, Ireland, Australia, NZ, Japan, Nordic, Asia
- YELLOW center lines: USA, Canada, Latin America, Germany, Switzerland
- RED edge lines: Iceland, Faroe Islands

BOLLARD/POST METAS:
- Orange-topped posts = Netherlands
- Red reflectors = Finland, Yellow = Sweden, White = Norway
- Green-backed signs = Ireland, Red-backed chevrons = UK

GOOGLE STREET VIEW METAS:
- Black/white bars at top = Kenya, Uganda, Senegal (African trekker)
- Rifts (vertical lines) = Russia, parts of South America

VEGETATION METAS:
- Eucalyptus = Australia, Portugal, South America
- Birch forests = Russia, Nordic
- Red soil = Brazil, Africa, Australia

DRIVING SIDE:
- LEFT: UK, Japan, Australia, NZ, India, South Africa, Thailand, Indonesia
- RIGHT: Most of the world

Always cite SPECIFIC meta rules, not generic observations.";

/// User text that accompanies the screenshot in the analysis call.
pub const ANALYZE_REQUEST: &str =
    "Analyze this GeoGuessr screenshot and identify the location:";

/// Brevity rules for the follow-up chat.
const CHAT_RULES: &str =
    "You are a GeoGuessr expert. Answer briefly (2-3 sentences max). Use bullet points for lists.";

/// Textual summary of an analysis, embedded in the chat system instruction so
/// follow-up questions are answered against the most recent result.
pub fn context_block(analysis: &AnalysisResult) -> String {
    let clues = analysis
        .clues
        .iter()
        .map(|c| format!("{}: {}", c.kind, c.description))
        .collect::<Vec<_>>()
        .join("; ");
    format!(
        "Previous analysis of the GeoGuessr screenshot:\n\
         - Country: {}\n\
         - Region: {}\n\
         - Confidence: {}%\n\
         - Clues: {}\n\
         - Alternatives: {}",
        analysis.country,
        analysis.region.as_deref().unwrap_or("Unknown"),
        analysis.confidence,
        clues,
        analysis.alternatives_text(),
    )
}

/// Full system instruction for one chat turn.
pub fn chat_system_instruction(last_analysis: Option<&AnalysisResult>) -> String {
    match last_analysis {
        Some(analysis) => format!("{CHAT_RULES}\n\n{}", context_block(analysis)),
        None => format!("{CHAT_RULES}\n\n"),
    }
}
