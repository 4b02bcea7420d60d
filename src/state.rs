use std::collections::HashSet;

use crate::{TranscodeError, TranscodeResult};

/// Field names for one invocation, captured from the first line or supplied.
#[derive(Debug, Clone, Default)]
pub struct HeaderState {
    names: Option<Vec<String>>,
}

impl HeaderState {
    /// Headers known before streaming starts, e.g. cached by a resuming client.
    pub fn supplied(names: Vec<String>) -> TranscodeResult<Self> {
        let mut state = Self::default();
        state.capture(names)?;
        Ok(state)
    }

    /// Store the header row. Only valid once per invocation.
    pub fn capture(&mut self, names: Vec<String>) -> TranscodeResult<()> {
        debug_assert!(self.names.is_none(), "headers captured twice");
        let mut seen = HashSet::with_capacity(names.len());
        if let Some(dup) = names.iter().find(|n| !seen.insert(n.as_str())) {
            return Err(TranscodeError::DuplicateHeader(dup.clone()));
        }
        self.names = Some(names);
        Ok(())
    }

    /// `offset` is only used to describe the failure.
    pub fn current(&self, offset: u64) -> TranscodeResult<&[String]> {
        self.names
            .as_deref()
            .ok_or(TranscodeError::HeadersUnavailable { offset })
    }

    pub fn is_captured(&self) -> bool {
        self.names.is_some()
    }

    pub fn into_names(self) -> Vec<String> {
        self.names.unwrap_or_default()
    }
}

/// Running total of source bytes consumed; the value clients resume from.
#[derive(Debug, Clone, Copy)]
pub struct ByteAccountant {
    total: u64,
}

impl ByteAccountant {
    pub fn new(resume_offset: u64) -> Self {
        Self {
            total: resume_offset,
        }
    }

    /// Add the on-wire length of the line just consumed, terminator included.
    pub fn advance(&mut self, n: usize) -> u64 {
        self.total += n as u64;
        self.total
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}

/// Per-connection diagnostics, logged at teardown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub records: u64,
    pub bytes: u64,
}
