//! Scripted classifier for engine tests.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use super::{Classification, Classifier};
use crate::state::Verdict;

#[derive(Default)]
struct Script {
    by_text: HashMap<String, VecDeque<Classification>>,
    calls: Vec<String>,
}

/// Answers from a per-text queue of responses; texts without a script are
/// classified clean. Optionally parks every call until released.
#[derive(Clone, Default)]
pub(crate) struct ScriptedClassifier {
    script: Arc<Mutex<Script>>,
    gate: Option<Arc<Notify>>,
    entered: Arc<Notify>,
}

impl ScriptedClassifier {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Every call waits on the returned handle's `notify_one` before answering.
    pub(crate) fn gated() -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let classifier = Self {
            gate: Some(gate.clone()),
            ..Self::default()
        };
        (classifier, gate)
    }

    pub(crate) fn respond(&self, text: &str, answer: Classification) -> &Self {
        self.script
            .lock()
            .unwrap()
            .by_text
            .entry(text.to_string())
            .or_default()
            .push_back(answer);
        self
    }

    pub(crate) fn flag(&self, text: &str, suggestion: Option<&str>) -> &Self {
        self.respond(
            text,
            Classification::Verdict(Verdict::flagged(suggestion.map(str::to_string), Some(0.9))),
        )
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.script.lock().unwrap().calls.clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.script.lock().unwrap().calls.len()
    }

    /// Resolves once a call has entered the classifier.
    pub(crate) async fn wait_entered(&self) {
        self.entered.notified().await;
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(&self, text: &str) -> Classification {
        let answer = {
            let mut script = self.script.lock().unwrap();
            script.calls.push(text.to_string());
            script
                .by_text
                .get_mut(text)
                .and_then(|queue| queue.pop_front())
                .unwrap_or_else(|| Classification::Verdict(Verdict::clean()))
        };
        self.entered.notify_one();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        answer
    }
}
