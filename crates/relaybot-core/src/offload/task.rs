use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::channel::types::Interaction;

/// A unit of deferred work as stored in the durable queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedTask {
    pub id: String,
    /// Always stored live; the worker flags it deferred on replay
    pub interaction: Interaction,
    /// Failed invocations so far
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedTask {
    pub fn new(interaction: Interaction) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            interaction: interaction.into_live(),
            attempt: 0,
            enqueued_at: Utc::now(),
        }
    }

    /// Copy for the next attempt, same id
    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            enqueued_at: Utc::now(),
            ..self.clone()
        }
    }

    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn decode(data: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::types::{ChannelRef, EventPayload, UserRef};

    fn interaction() -> Interaction {
        Interaction {
            payload: EventPayload::Message {
                text: "queue this".into(),
            },
            channel: ChannelRef::direct_message("D1"),
            user: UserRef::new("U1", "alice"),
            ts: "10.0".into(),
            thread_ts: None,
            is_deferred: true,
        }
    }

    #[test]
    fn test_new_task_is_live_at_attempt_zero() {
        let task = QueuedTask::new(interaction());
        assert_eq!(task.attempt, 0);
        assert!(!task.interaction.is_deferred);
        assert!(Uuid::parse_str(&task.id).is_ok());
    }

    #[test]
    fn test_next_attempt_keeps_id() {
        let task = QueuedTask::new(interaction());
        let next = task.next_attempt();
        assert_eq!(next.id, task.id);
        assert_eq!(next.attempt, 1);
        assert_eq!(next.interaction, task.interaction);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(QueuedTask::decode(b"not json").is_err());
        let task = QueuedTask::new(interaction());
        let decoded = QueuedTask::decode(&task.encode().unwrap()).unwrap();
        assert_eq!(decoded, task);
    }
}
