//! Event types for the Verso event system
//!
//! Provides shared lifecycle event definitions and the EventBus used by the
//! engine and by progress subscribers (UIs, SSE bridges). Events are
//! fire-and-forget: correctness never depends on a subscriber receiving them.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Verso lifecycle event types
///
/// Events are broadcast via EventBus and can be serialized for SSE
/// transmission by an outer HTTP layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum VersoEvent {
    /// Workflow run accepted and started
    ///
    /// Triggers:
    /// - Progress UI: show new active run for the project
    RunStarted {
        /// Run UUID
        run_id: Uuid,
        /// Owning project UUID
        project_id: Uuid,
        /// Workflow type ("translation", "proofread", "quality")
        workflow_type: String,
        /// Ordinal of this run within (project, type)
        sequence: i64,
        /// When the run started
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Workflow run reached a terminal state
    ///
    /// Triggers:
    /// - Progress UI: clear active run, show outcome
    RunFinished {
        /// Run UUID
        run_id: Uuid,
        /// Owning project UUID
        project_id: Uuid,
        /// Terminal status ("succeeded", "failed", "cancelled")
        status: String,
        /// When the run finished
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Job inserted into the ledger
    JobEnqueued {
        /// Job UUID
        job_id: Uuid,
        /// Owning project UUID
        project_id: Uuid,
        /// Job type ("analyze", "translate", "profile", "cover")
        job_type: String,
        /// When the job was enqueued
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Draft pass settled (succeeded, failed, or cancelled)
    ///
    /// Triggers:
    /// - Progress UI: per-draft status lights
    DraftSettled {
        /// Owning job UUID
        job_id: Uuid,
        /// Draft ordinal within the job (0-based)
        run_order: i64,
        /// Terminal draft status
        status: String,
        /// When the draft settled
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Synthesis claimed by exactly one finishing draft
    SynthesisQueued {
        /// Owning job UUID
        job_id: Uuid,
        /// Number of successful drafts feeding synthesis
        candidate_count: usize,
        /// When the claim was made
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Final translation persisted
    SynthesisComplete {
        /// Owning job UUID
        job_id: Uuid,
        /// Owning project UUID
        project_id: Uuid,
        /// Number of final segments written
        segment_count: usize,
        /// When synthesis completed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// One batch of one stage finished in the sequential pipeline
    ///
    /// Triggers:
    /// - Progress UI: stage progress bar
    StageBatchComplete {
        /// Owning job UUID
        job_id: Uuid,
        /// Stage name ("literal", "style", "emotion", "qa")
        stage: String,
        /// Batch index (0-based)
        batch_index: usize,
        /// Total batches for this stage
        total_batches: usize,
        /// When the batch finished
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Guard check flagged a segment for human review
    SegmentFlagged {
        /// Owning job UUID
        job_id: Uuid,
        /// Flagged segment id
        segment_id: String,
        /// Names of the guards that failed
        guards: Vec<String>,
        /// When the segment was flagged
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus for engine-wide lifecycle events
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<VersoEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the specified channel capacity
    ///
    /// # Arguments
    /// * `capacity` - Number of events to buffer before dropping old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<VersoEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening; callers treat that as
    /// non-fatal because events are advisory.
    pub fn emit(
        &self,
        event: VersoEvent,
    ) -> std::result::Result<usize, broadcast::error::SendError<VersoEvent>> {
        self.tx.send(event)
    }

    /// Channel capacity this bus was created with
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.tx.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emit_reaches_all_subscribers() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        let job_id = Uuid::new_v4();
        bus.emit(VersoEvent::SynthesisQueued {
            job_id,
            candidate_count: 2,
            timestamp: chrono::Utc::now(),
        })
        .unwrap();

        for rx in [&mut rx1, &mut rx2] {
            match rx.recv().await.unwrap() {
                VersoEvent::SynthesisQueued {
                    job_id: id,
                    candidate_count,
                    ..
                } => {
                    assert_eq!(id, job_id);
                    assert_eq!(candidate_count, 2);
                }
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }

    #[test]
    fn emit_without_subscribers_is_err_not_panic() {
        let bus = EventBus::new(4);
        let result = bus.emit(VersoEvent::JobEnqueued {
            job_id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            job_type: "translate".to_string(),
            timestamp: chrono::Utc::now(),
        });
        assert!(result.is_err());
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = VersoEvent::RunStarted {
            run_id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            workflow_type: "translation".to_string(),
            sequence: 1,
            timestamp: chrono::Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"RunStarted\""));
    }
}
