use funeral_flow::{CemeteryCategory, FieldUpdate, PriceBreakdown, SaveOutcome, SessionView};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct OpenSessionRequest {
    /// Re-open an existing session; a new one is created when absent
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Either one `(field, value)` edit or a batch applied all-or-nothing
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldUpdateRequest {
    Batch { updates: Vec<FieldUpdate> },
    Single(FieldUpdate),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CategoryRequest {
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UpdateResponse {
    /// saved, skipped_oversized or write_failed
    pub draft: &'static str,
    #[serde(flatten)]
    pub view: SessionView,
}

#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    pub session_id: String,
    pub category: Option<CemeteryCategory>,
    pub total: i64,
    pub breakdown: PriceBreakdown,
}

pub fn draft_status(outcome: &SaveOutcome) -> &'static str {
    match outcome {
        SaveOutcome::Saved { .. } => "saved",
        SaveOutcome::SkippedOversized { .. } => "skipped_oversized",
        SaveOutcome::WriteFailed { .. } => "write_failed",
    }
}
