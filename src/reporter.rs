//! Outbound forwarding of accepted step batches.
//!
//! The service notifies the reporter after a batch is durably committed;
//! delivery guarantees from there on are the reporter's problem. A failed
//! notification never rolls back the store.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::StepRecord;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum StepEvent {
    StepsCreated {
        job_id: String,
        steps: Vec<StepRecord>,
    },
    StepsUpdated {
        job_id: String,
        steps: Vec<StepRecord>,
    },
}

#[async_trait]
pub trait Reporter: Send + Sync {
    async fn notify_created(&self, job_id: &str, steps: &[StepRecord]) -> Result<()>;
    async fn notify_updated(&self, job_id: &str, steps: &[StepRecord]) -> Result<()>;
}

/// Reporter fanning events out on a broadcast channel. Downstream consumers
/// (queue publishers, websockets, tests) subscribe and drain at their own
/// pace; with no subscribers events are dropped on the floor.
pub struct BroadcastReporter {
    event_tx: broadcast::Sender<StepEvent>,
}

impl BroadcastReporter {
    pub fn new(capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(capacity);
        Self { event_tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StepEvent> {
        self.event_tx.subscribe()
    }
}

#[async_trait]
impl Reporter for BroadcastReporter {
    async fn notify_created(&self, job_id: &str, steps: &[StepRecord]) -> Result<()> {
        let _ = self.event_tx.send(StepEvent::StepsCreated {
            job_id: job_id.to_string(),
            steps: steps.to_vec(),
        });
        Ok(())
    }

    async fn notify_updated(&self, job_id: &str, steps: &[StepRecord]) -> Result<()> {
        let _ = self.event_tx.send(StepEvent::StepsUpdated {
            job_id: job_id.to_string(),
            steps: steps.to_vec(),
        });
        Ok(())
    }
}
