//! Event sinks for asserting on emitted events.

use minder_protocol::{EventMsg, EventPayload, EventSink};
use parking_lot::Mutex;
use std::sync::Arc;

/// Sink that records every emitted event.
#[derive(Default, Clone)]
pub struct CollectingSink {
    events: Arc<Mutex<Vec<EventMsg>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events emitted so far.
    pub fn events(&self) -> Vec<EventMsg> {
        self.events.lock().clone()
    }

    /// Payloads only, for terser assertions.
    pub fn payloads(&self) -> Vec<EventPayload> {
        self.events.lock().iter().map(|e| e.payload.clone()).collect()
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: EventMsg) {
        self.events.lock().push(event);
    }
}
