//! Ordinal placement for steps reported without explicit positions.
//!
//! A step inserted mid-run (e.g. by a retry mechanism) carries neither
//! `position` nor `class_position`; it is appended after the last known step
//! of its class so it slots into the existing ordering without colliding
//! with client-specified positions.

use crate::cache::JobRecord;
use crate::errors::StepError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatedPosition {
    pub position: i64,
    pub class_position: i64,
}

/// Compute the next `(class_position, position)` pair for a discovered step
/// of `classname`, scanning the job's already-cached steps.
///
/// Placement can only be inferred from a prior step of the same class; a
/// wholly new classname is an error. A class group without any
/// `class_position` or `position` set indicates corrupt state and is an
/// error as well, never silently defaulted.
pub fn allocate_position(
    job: &JobRecord,
    job_id: &str,
    classname: &str,
) -> Result<AllocatedPosition, StepError> {
    let members: Vec<_> = job.steps().filter(|s| s.classname == classname).collect();
    if members.is_empty() {
        return Err(StepError::Validation(format!(
            "Test case {} could not be found for job id: {}",
            classname, job_id
        )));
    }

    let class_position = members
        .iter()
        .filter_map(|s| s.class_position)
        .max()
        .ok_or_else(|| StepError::Validation("Invalid class_position in cache.".to_string()))?;

    let position = members
        .iter()
        .filter(|s| s.class_position == Some(class_position))
        .filter_map(|s| s.position)
        .max()
        .ok_or_else(|| {
            StepError::Validation(format!(
                "No positioned step in class {} for job id: {}",
                classname, job_id
            ))
        })?;

    Ok(AllocatedPosition {
        position: position + 1,
        class_position,
    })
}
