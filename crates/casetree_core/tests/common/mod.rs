#![allow(dead_code)]

use casetree_core::{Case, CaseConfig, CaseEvent, EventPublisher, Item, NoopPublisher};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Publisher that keeps every event for later assertions.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<CaseEvent>>,
}

impl RecordingPublisher {
    pub fn take(&self) -> Vec<CaseEvent> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}

impl EventPublisher for RecordingPublisher {
    fn publish(&self, event: &CaseEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

pub fn open_case() -> (TempDir, Case) {
    open_case_with(CaseConfig::default())
}

pub fn open_case_with(config: CaseConfig) -> (TempDir, Case) {
    let dir = tempfile::tempdir().unwrap();
    let case = Case::open(dir.path(), config, Arc::new(NoopPublisher)).unwrap();
    (dir, case)
}

pub fn open_recorded_case() -> (TempDir, Case, Arc<RecordingPublisher>) {
    let dir = tempfile::tempdir().unwrap();
    let publisher = Arc::new(RecordingPublisher::default());
    let case = Case::open(dir.path(), CaseConfig::default(), publisher.clone()).unwrap();
    (dir, case, publisher)
}

pub fn child_indices(item: &Item) -> Vec<u32> {
    item.get_children()
        .unwrap()
        .iter()
        .map(|child| child.idx().unwrap())
        .collect()
}

pub fn child_uids(item: &Item) -> Vec<i64> {
    item.get_children()
        .unwrap()
        .iter()
        .map(|child| child.uid().unwrap())
        .collect()
}
