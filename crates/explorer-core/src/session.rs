//! Run session sink
//!
//! A run session receives the state transitions, messages and output of one
//! test run. It is owned by the host; the orchestrator only writes to it.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::warn;

use crate::tree::NodeId;

/// State of a node within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestState {
    Running,
    Passed,
    Failed,
}

/// Destination for the outcome of a run
///
/// Writes for the same node may repeat; the last one wins. `end` finalizes
/// the session.
pub trait RunSession: Send + Sync {
    fn set_state(&self, node: &NodeId, state: TestState);

    fn append_message(&self, node: &NodeId, message: &str);

    fn append_output(&self, output: &str);

    fn end(&self);
}

/// Everything written to a [`RecordingSession`], in order
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum SessionEvent {
    State { node: NodeId, state: TestState },
    Message { node: NodeId, message: String },
    Output { text: String },
    End,
}

#[derive(Debug, Default)]
struct Recorded {
    events: Vec<SessionEvent>,
    states: HashMap<NodeId, TestState>,
    messages: HashMap<NodeId, Vec<String>>,
    output: String,
    ended: bool,
}

/// In-memory run session that can be inspected after (or during) the run
#[derive(Debug, Default)]
pub struct RecordingSession {
    inner: Mutex<Recorded>,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Latest state written for a node
    pub fn state(&self, node: &NodeId) -> Option<TestState> {
        self.lock().states.get(node).copied()
    }

    /// Nodes whose latest state is `state`, sorted
    pub fn nodes_in_state(&self, state: TestState) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self
            .lock()
            .states
            .iter()
            .filter(|(_, s)| **s == state)
            .map(|(node, _)| node.clone())
            .collect();
        nodes.sort();
        nodes
    }

    pub fn messages(&self, node: &NodeId) -> Vec<String> {
        self.lock().messages.get(node).cloned().unwrap_or_default()
    }

    pub fn output(&self) -> String {
        self.lock().output.clone()
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.lock().events.clone()
    }

    pub fn is_ended(&self) -> bool {
        self.lock().ended
    }

    /// Record an event unless the session already ended
    fn record(&self, event: SessionEvent) {
        let mut recorded = self.lock();
        if recorded.ended {
            warn!(?event, "write to a run session after it ended");
            return;
        }

        match &event {
            SessionEvent::State { node, state } => {
                recorded.states.insert(node.clone(), *state);
            }
            SessionEvent::Message { node, message } => {
                recorded
                    .messages
                    .entry(node.clone())
                    .or_default()
                    .push(message.clone());
            }
            SessionEvent::Output { text } => recorded.output.push_str(text),
            SessionEvent::End => recorded.ended = true,
        }
        recorded.events.push(event);
    }
}

impl RunSession for RecordingSession {
    fn set_state(&self, node: &NodeId, state: TestState) {
        self.record(SessionEvent::State {
            node: node.clone(),
            state,
        });
    }

    fn append_message(&self, node: &NodeId, message: &str) {
        self.record(SessionEvent::Message {
            node: node.clone(),
            message: message.to_string(),
        });
    }

    fn append_output(&self, output: &str) {
        self.record(SessionEvent::Output {
            text: output.to_string(),
        });
    }

    fn end(&self) {
        self.record(SessionEvent::End);
    }
}
