//! Sequence generator.
//!
//! Number sequences are counters persisted with a single 8-byte write per
//! increment. Date and UUID sequences are stateless generators: their
//! records only remember the property name and kind.

use crate::alloc::Fit;
use crate::cache::WriteKind;
use crate::entry::{SequenceEntry, SequenceKind, SEQUENCE_ENTRY_SIZE};
use crate::error::{CoreError, CoreResult};
use crate::state::State;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;
use uuid::Uuid;

/// Options for [`crate::Store::create_sequence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceOptions {
    /// First value handed out. Zero means 1.
    pub start: u64,
    /// Step between values. Zero means 1.
    pub increment: u32,
    /// What the sequence generates.
    pub kind: SequenceKind,
}

impl Default for SequenceOptions {
    fn default() -> Self {
        Self {
            start: 1,
            increment: 1,
            kind: SequenceKind::Number,
        }
    }
}

impl SequenceOptions {
    /// Creates options for a counter starting at 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the first value.
    #[must_use]
    pub const fn start(mut self, start: u64) -> Self {
        self.start = start;
        self
    }

    /// Sets the step.
    #[must_use]
    pub const fn increment(mut self, increment: u32) -> Self {
        self.increment = increment;
        self
    }

    /// Sets the kind.
    #[must_use]
    pub const fn kind(mut self, kind: SequenceKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Public view of a sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sequence {
    /// Record property the sequence fills.
    pub name: String,
    /// What the sequence generates.
    pub kind: SequenceKind,
    /// First value handed out.
    pub start_at: u64,
    /// Step between values.
    pub increment: u32,
    /// Last value handed out. Before the first one this is
    /// `start_at - increment`, which is negative for small starts. The file
    /// stores the same 8 bytes as an unsigned counter that wraps.
    pub value: i64,
}

impl From<&SequenceEntry> for Sequence {
    fn from(entry: &SequenceEntry) -> Self {
        Self {
            name: entry.property.clone(),
            kind: entry.kind,
            start_at: entry.start_at,
            increment: entry.increment,
            value: entry.value as i64,
        }
    }
}

/// Current time as an ISO-8601 UTC string with milliseconds.
fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl State {
    pub fn find_sequence(&self, name: &str) -> Option<usize> {
        self.sequences.iter().position(|s| s.property == name)
    }

    /// Persists a new sequence at the head of the sequence list.
    pub fn create_sequence(
        &mut self,
        name: &str,
        options: SequenceOptions,
    ) -> CoreResult<Sequence> {
        if self.find_sequence(name).is_some() {
            return Err(CoreError::duplicate("sequence", name));
        }
        let start_at = if options.start == 0 { 1 } else { options.start };
        let increment = options.increment.max(1);
        let mut entry = SequenceEntry {
            start: 0,
            property: name.to_string(),
            start_at,
            increment,
            kind: options.kind,
            value: start_at.wrapping_sub(u64::from(increment)),
            next: self.header.next_sequence,
        };
        // Validate the name before anything is allocated.
        entry.encode()?;

        let placement = self.place(Fit::Exact {
            total: SEQUENCE_ENTRY_SIZE as u64,
        })?;
        entry.start = placement.position;
        self.write_entry(placement, &entry.encode()?, false)?;
        self.header.next_sequence = entry.start;
        self.write_lists()?;

        info!(sequence = name, kind = %entry.kind, start = start_at, increment, "created sequence");
        let sequence = Sequence::from(&entry);
        self.sequences.insert(0, entry);
        Ok(sequence)
    }

    /// Produces the next value of sequence `idx`.
    pub fn next_sequence_value(&mut self, idx: usize) -> CoreResult<Value> {
        let entry = self
            .sequences
            .get_mut(idx)
            .ok_or_else(|| CoreError::not_found("sequence", idx.to_string()))?;
        match entry.kind {
            SequenceKind::Number => {
                entry.value = entry.value.wrapping_add(u64::from(entry.increment));
                let (at, value) = (entry.start + SequenceEntry::VALUE_OFFSET, entry.value);
                self.write(at, &value.to_be_bytes(), WriteKind::Metadata)?;
                Ok(Value::from(value))
            }
            SequenceKind::Date => Ok(Value::String(timestamp())),
            SequenceKind::Uuid => Ok(Value::String(Uuid::new_v4().to_string())),
        }
    }

    /// Fills every sequence's property of `object`, overwriting what the
    /// caller put there.
    pub fn apply_sequences(&mut self, object: &mut Map<String, Value>) -> CoreResult<()> {
        for idx in 0..self.sequences.len() {
            let value = self.next_sequence_value(idx)?;
            object.insert(self.sequences[idx].property.clone(), value);
        }
        Ok(())
    }
}
