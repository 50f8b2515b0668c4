use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::StepError;

/// Free-form nested mapping carried by `data` / `test_data`.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// Canonical result vocabulary. Legacy labels are rewritten into this set by
/// the normalizer; anything outside it is rejected on update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepResult {
    Created,
    Pending,
    Blocked,
    Passed,
    Failed,
}

impl StepResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepResult::Created => "created",
            StepResult::Pending => "pending",
            StepResult::Blocked => "blocked",
            StepResult::Passed => "passed",
            StepResult::Failed => "failed",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "created" => Some(StepResult::Created),
            "pending" => Some(StepResult::Pending),
            "blocked" => Some(StepResult::Blocked),
            "passed" => Some(StepResult::Passed),
            "failed" => Some(StepResult::Failed),
            _ => None,
        }
    }
}

/// Aggregate outcome of one job, computed over all cached steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobOutcome {
    Passed,
    Failed,
}

impl JobOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobOutcome::Passed => "passed",
            JobOutcome::Failed => "failed",
        }
    }
}

/// One reported unit of test execution, as persisted and as served on the
/// wire. Absent optional fields stay absent in JSON (not null).
///
/// `result` keeps the caller's label verbatim on creation; only updates run
/// through the normalizer, so the stored value is a plain string rather than
/// a [`StepResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub uuid: Uuid,
    pub job_id: String,
    pub name: String,
    pub classname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_position: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_data: Option<JsonMap>,
    #[serde(default)]
    pub number: u64,
    /// Present and true only when position/class_position were
    /// server-allocated rather than client-supplied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added_step: Option<bool>,
}

/// Incoming payload for step creation. Unknown fields are dropped, matching
/// the persisted whitelist.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewStep {
    pub uuid: Option<Uuid>,
    pub name: Option<String>,
    pub classname: Option<String>,
    pub position: Option<i64>,
    pub class_position: Option<i64>,
    pub result: Option<String>,
    pub duration: Option<f64>,
    pub data: Option<JsonMap>,
    pub test_data: Option<JsonMap>,
}

/// Incoming payload for step updates. The read-only fields are declared here
/// solely so their presence can be rejected.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StepUpdate {
    pub uuid: Option<Uuid>,
    pub name: Option<String>,
    pub classname: Option<String>,
    pub position: Option<i64>,
    pub class_position: Option<i64>,
    pub result: Option<String>,
    pub duration: Option<f64>,
    pub data: Option<JsonMap>,
    pub test_data: Option<JsonMap>,
}

/// Validate a NewStep before creation.
pub fn validate_new_step(step: &NewStep) -> Result<(), StepError> {
    if step.uuid.is_some() {
        return Err(StepError::Validation(
            "`uuid` field is not allowed to be set".to_string(),
        ));
    }

    let has_name = step.name.as_deref().is_some_and(|n| !n.trim().is_empty());
    let has_classname = step
        .classname
        .as_deref()
        .is_some_and(|c| !c.trim().is_empty());
    if !has_name || !has_classname {
        return Err(StepError::Validation(
            "Mandatory parameters `name` and `classname` need to be specified".to_string(),
        ));
    }

    Ok(())
}

/// Validate a StepUpdate before applying.
pub fn validate_step_update(update: &StepUpdate) -> Result<Uuid, StepError> {
    if update.name.is_some()
        || update.classname.is_some()
        || update.position.is_some()
        || update.class_position.is_some()
    {
        return Err(StepError::Forbidden(
            "Properties name, position, classname, class_position are read-only!".to_string(),
        ));
    }

    update
        .uuid
        .ok_or_else(|| StepError::Validation("UUID is mandatory!".to_string()))
}
