pub mod config;
pub mod step;

pub use config::ServerConfig;
pub use step::{
    validate_new_step, validate_step_update, JobOutcome, JsonMap, NewStep, StepRecord, StepResult,
    StepUpdate,
};
