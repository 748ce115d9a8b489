use std::collections::HashMap;
use std::sync::RwLock;

use crate::Event;

#[derive(Debug, Default)]
struct State {
    latest: Option<Event>,
    by_topic: HashMap<String, Event>,
}

/// Last-seen metadata shared by the subscription tasks and the HTTP server.
///
/// Writers replace whole events, so readers never see a partial one. The
/// global slot is last-write-wins across all topics.
#[derive(Debug, Default)]
pub struct MetadataStore {
    state: RwLock<State>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, topic: &str, event: Event) {
        let mut state = match self.state.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.by_topic.insert(topic.to_string(), event.clone());
        state.latest = Some(event);
    }

    /// Most recent event from any topic.
    pub fn latest(&self) -> Option<Event> {
        let state = match self.state.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.latest.clone()
    }

    pub fn latest_for(&self, topic: &str) -> Option<Event> {
        let state = match self.state.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.by_topic.get(topic).cloned()
    }

    /// Topics that have published at least once, sorted.
    pub fn topics(&self) -> Vec<String> {
        let state = match self.state.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut topics: Vec<String> = state.by_topic.keys().cloned().collect();
        topics.sort();
        topics
    }
}
