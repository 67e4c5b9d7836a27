//! Test doubles shared by unit tests

use std::sync::Mutex;

use bytes::Bytes;

use crate::broker::Publisher;

/// Publisher that records every publish instead of delivering it
#[derive(Default)]
pub(crate) struct RecordingPublisher {
    sent: Mutex<Vec<(String, Bytes)>>,
}

impl RecordingPublisher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn sent(&self) -> Vec<(String, Bytes)> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn destinations(&self) -> Vec<String> {
        self.sent().into_iter().map(|(d, _)| d).collect()
    }

    pub(crate) fn count_to(&self, destination: &str) -> usize {
        self.sent().iter().filter(|(d, _)| d == destination).count()
    }

    pub(crate) fn last_to(&self, destination: &str) -> Option<Bytes> {
        self.sent()
            .into_iter()
            .rev()
            .find(|(d, _)| d == destination)
            .map(|(_, body)| body)
    }

    pub(crate) fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

impl Publisher for RecordingPublisher {
    fn publish(&self, destination: &str, body: Bytes) -> usize {
        self.sent.lock().unwrap().push((destination.to_string(), body));
        1
    }
}
