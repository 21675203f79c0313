//! Reader, writer and batchlet traits driven by the chunk runtime.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Resume marker: the 1-based position of the next row to deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checkpoint(pub u64);

impl Checkpoint {
    /// Rows already delivered or skipped before this position.
    pub fn consumed(self) -> u64 {
        self.0.saturating_sub(1)
    }
}

/// Source: yields items one at a time and reports where to resume.
pub trait ItemReader {
    type Item;

    /// `checkpoint` is the last value returned by [`checkpoint_info`](Self::checkpoint_info)
    /// for a previous run, if any.
    fn open(&mut self, checkpoint: Option<Checkpoint>) -> Result<()>;

    /// `None` once the configured window or the underlying rows are exhausted.
    fn read_item(&mut self) -> Result<Option<Self::Item>>;

    fn checkpoint_info(&self) -> Option<Checkpoint>;

    /// Never fails; release problems are logged.
    fn close(&mut self);
}

/// Target: writes one chunk of items per call.
pub trait ItemWriter {
    type Item;

    fn open(&mut self, checkpoint: Option<Checkpoint>) -> Result<()>;

    fn write_items(&mut self, items: Vec<Self::Item>) -> Result<()>;

    /// Write progress is tracked by chunk boundaries, not by the writer.
    fn checkpoint_info(&self) -> Option<Checkpoint> {
        None
    }

    fn close(&mut self);
}

/// A single unit of work outside the chunk model.
pub trait Batchlet {
    /// Returns an exit status, if the step has one.
    fn process(&mut self) -> Result<Option<String>>;

    fn stop(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_serializes_as_bare_number() {
        assert_eq!(serde_json::to_string(&Checkpoint(6)).unwrap(), "6");
        assert_eq!(serde_json::from_str::<Checkpoint>("6").unwrap(), Checkpoint(6));
        assert_eq!(Checkpoint(6).consumed(), 5);
        assert_eq!(Checkpoint(0).consumed(), 0);
    }
}
