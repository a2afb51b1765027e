//! Model status state machine and its publication channel.

use futures::StreamExt;
use futures::stream::{self, BoxStream};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};

const TRANSITION_CAPACITY: usize = 64;

/// `NotLoaded -> Loading -> Ready`; any state may move to `Error`, and
/// `Ready -> NotLoaded` on unload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ModelStatus {
    NotLoaded,
    Loading { progress: f32 },
    Ready,
    Error { message: String },
}

impl ModelStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading { .. })
    }

    pub fn progress(&self) -> Option<f32> {
        match self {
            Self::Loading { progress } => Some(*progress),
            Self::Ready => Some(1.0),
            _ => None,
        }
    }
}

impl std::fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotLoaded => f.write_str("not loaded"),
            Self::Loading { progress } => write!(f, "loading ({:.0}%)", progress * 100.0),
            Self::Ready => f.write_str("ready"),
            Self::Error { message } => write!(f, "error: {}", message),
        }
    }
}

/// Current status plus an ordered feed of every transition.
///
/// The watch side answers "what is the status now" and wakes load joiners;
/// the broadcast side lets subscribers see each transition in order, which a
/// watch alone would coalesce. Both are written under the watch lock.
#[derive(Debug)]
pub struct StatusChannel {
    current: watch::Sender<ModelStatus>,
    transitions: broadcast::Sender<ModelStatus>,
}

impl StatusChannel {
    pub fn new() -> Self {
        let (current, _) = watch::channel(ModelStatus::NotLoaded);
        let (transitions, _) = broadcast::channel(TRANSITION_CAPACITY);
        Self {
            current,
            transitions,
        }
    }

    pub fn get(&self) -> ModelStatus {
        self.current.borrow().clone()
    }

    /// Applies `update`; publishes only when it returns `true`.
    pub fn publish_if(&self, update: impl FnOnce(&mut ModelStatus) -> bool) -> bool {
        self.current.send_if_modified(|status| {
            if !update(status) {
                return false;
            }
            let _ = self.transitions.send(status.clone());
            true
        })
    }

    pub fn publish(&self, next: ModelStatus) {
        self.publish_if(|status| {
            if *status == next {
                return false;
            }
            *status = next;
            true
        });
    }

    pub fn watch(&self) -> watch::Receiver<ModelStatus> {
        self.current.subscribe()
    }

    /// Yields the current status, then every later transition in order.
    pub fn stream(&self) -> BoxStream<'static, ModelStatus> {
        // Publishers hold the watch write lock while sending, so subscribing
        // under the read lock splits history exactly at `initial`.
        let (initial, events, current) = {
            let guard = self.current.borrow();
            let events = self.transitions.subscribe();
            (guard.clone(), events, self.current.subscribe())
        };

        stream::unfold(
            (Some(initial), events, current),
            |(pending, mut events, current)| async move {
                if let Some(status) = pending {
                    return Some((status, (None, events, current)));
                }
                match events.recv().await {
                    Ok(status) => Some((status, (None, events, current))),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "status subscriber lagged, resyncing");
                        let status = current.borrow().clone();
                        Some((status, (None, events.resubscribe(), current)))
                    }
                    Err(broadcast::error::RecvError::Closed) => None,
                }
            },
        )
        .boxed()
    }
}

impl Default for StatusChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display_and_progress() {
        assert_eq!(ModelStatus::Loading { progress: 0.5 }.to_string(), "loading (50%)");
        assert_eq!(ModelStatus::Ready.progress(), Some(1.0));
        assert_eq!(ModelStatus::NotLoaded.progress(), None);
        assert!(ModelStatus::Loading { progress: 0.0 }.is_loading());
    }

    #[test]
    fn test_status_serializes_tagged() {
        let json = serde_json::to_string(&ModelStatus::Loading { progress: 0.25 }).unwrap();
        assert_eq!(json, r#"{"state":"loading","progress":0.25}"#);
    }

    #[tokio::test]
    async fn test_stream_yields_current_then_transitions() {
        let channel = StatusChannel::new();
        channel.publish(ModelStatus::Loading { progress: 0.0 });

        let stream = channel.stream();
        channel.publish(ModelStatus::Loading { progress: 0.5 });
        channel.publish(ModelStatus::Ready);
        drop(channel);

        let seen: Vec<ModelStatus> = stream.collect().await;
        assert_eq!(
            seen,
            vec![
                ModelStatus::Loading { progress: 0.0 },
                ModelStatus::Loading { progress: 0.5 },
                ModelStatus::Ready,
            ]
        );
    }

    #[test]
    fn test_publish_skips_identical_status() {
        let channel = StatusChannel::new();
        let mut rx = channel.watch();
        channel.publish(ModelStatus::NotLoaded);
        assert!(!rx.has_changed().unwrap());
        channel.publish(ModelStatus::Ready);
        assert!(rx.has_changed().unwrap());
    }
}
