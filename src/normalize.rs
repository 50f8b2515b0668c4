//! Legacy result vocabulary shim.
//!
//! Older workers report results like `KnownBug` or `NotPerformed`; these map
//! onto the canonical five-state model, with the extra meaning preserved as
//! a `status` key under the record's `data`. The table is a fixed
//! backward-compatibility contract; do not extend or prune it.

use uuid::Uuid;

use crate::errors::StepError;
use crate::models::StepResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizedResult {
    pub result: StepResult,
    /// Provenance to merge into `data.status` when the legacy label encoded
    /// more than the canonical result.
    pub status: Option<&'static str>,
}

/// Rewrite a reported result label into canonical form. Canonical labels
/// pass through unchanged; anything outside both vocabularies is rejected
/// without touching the record.
pub fn normalize_result(label: &str, uuid: Uuid) -> Result<NormalizedResult, StepError> {
    let (result, status) = match label {
        "KnownBug" => (StepResult::Failed, Some("known_bug")),
        "Skipped" => (StepResult::Pending, Some("skipped")),
        "NotPerformed" => (StepResult::Pending, Some("not_performed")),
        "NotTested" => (StepResult::Blocked, None),
        "NotSet" => (StepResult::Created, None),
        "Passed" => (StepResult::Passed, None),
        "Failed" => (StepResult::Failed, None),
        other => match StepResult::parse(other) {
            Some(canonical) => (canonical, None),
            None => {
                return Err(StepError::UnknownResult {
                    value: other.to_string(),
                    uuid,
                })
            }
        },
    };

    Ok(NormalizedResult { result, status })
}
