//! Signals the session emits towards an audio / UI layer.

use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackEvent {
    Correct,
    Incorrect,
    /// The learner ran out of hearts; further checks should be held back.
    HeartsDepleted,
    /// A wrong answer was not charged thanks to an active subscription.
    UnlimitedHearts,
}

/// Consumer of feedback events. Implementations decide what to render or play.
pub trait FeedbackSink: Send + Sync {
    fn emit(&self, event: FeedbackEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopFeedback;

impl FeedbackSink for NoopFeedback {
    fn emit(&self, _event: FeedbackEvent) {}
}

impl FeedbackSink for UnboundedSender<FeedbackEvent> {
    fn emit(&self, event: FeedbackEvent) {
        if self.send(event).is_err() {
            log::debug!("feedback receiver dropped, discarding {event:?}");
        }
    }
}

/// Keeps every event in emission order.
#[derive(Debug, Default)]
pub struct RecordingFeedback {
    events: Mutex<Vec<FeedbackEvent>>,
}

impl RecordingFeedback {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain the recorded events.
    pub fn take(&self) -> Vec<FeedbackEvent> {
        match self.events.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl FeedbackSink for RecordingFeedback {
    fn emit(&self, event: FeedbackEvent) {
        match self.events.lock() {
            Ok(mut guard) => guard.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_feedback_keeps_order() {
        let sink = RecordingFeedback::new();
        sink.emit(FeedbackEvent::Incorrect);
        sink.emit(FeedbackEvent::HeartsDepleted);
        assert_eq!(
            sink.take(),
            vec![FeedbackEvent::Incorrect, FeedbackEvent::HeartsDepleted]
        );
        assert!(sink.take().is_empty());
    }

    #[test]
    fn channel_sink_forwards_and_tolerates_closed_receiver() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        tx.emit(FeedbackEvent::Correct);
        assert_eq!(rx.try_recv().unwrap(), FeedbackEvent::Correct);

        drop(rx);
        tx.emit(FeedbackEvent::Correct);
    }
}
