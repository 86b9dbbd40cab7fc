//! Per-command send/receive counters.
//!
//! Commands are identified by the first 4 bytes of a payload. The table has a
//! fixed range `0..=max_command`; ids outside it are ignored rather than
//! treated as errors. Counters are lock-free so the sender and the dispatch
//! path can both record without coordination.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Counters for one command id in a [`StatsSnapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandCount {
    pub command: u32,
    pub sent: u64,
    pub received: u64,
}

/// Point-in-time copy of every non-zero counter, ordered by command id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub commands: Vec<CommandCount>,
}

impl StatsSnapshot {
    /// Total frames sent across all commands.
    pub fn total_sent(&self) -> u64 {
        self.commands.iter().map(|c| c.sent).sum()
    }

    /// Total frames received across all commands.
    pub fn total_received(&self) -> u64 {
        self.commands.iter().map(|c| c.received).sum()
    }
}

/// Highest command id a [`CommandStats`] table can cover.
pub const MAX_TRACKED_COMMAND: u32 = u16::MAX as u32;

/// Send and receive counters indexed by command id.
#[derive(Debug)]
pub struct CommandStats {
    sent: Box<[AtomicU64]>,
    received: Box<[AtomicU64]>,
}

impl CommandStats {
    /// Create a table covering command ids `0..=max_command`.
    ///
    /// `max_command` is capped at [`MAX_TRACKED_COMMAND`]; larger ids are
    /// treated as out of range.
    pub fn new(max_command: u32) -> Self {
        let slots = max_command.min(MAX_TRACKED_COMMAND) as usize + 1;
        Self {
            sent: (0..slots).map(|_| AtomicU64::new(0)).collect(),
            received: (0..slots).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    /// Highest command id tracked.
    pub fn max_command(&self) -> u32 {
        (self.sent.len() - 1) as u32
    }

    /// Count one sent frame. Returns `false` if `command` is out of range.
    #[inline]
    pub fn record_sent(&self, command: u32) -> bool {
        bump(&self.sent, command)
    }

    /// Count one received frame. Returns `false` if `command` is out of range.
    #[inline]
    pub fn record_received(&self, command: u32) -> bool {
        bump(&self.received, command)
    }

    pub fn sent(&self, command: u32) -> u64 {
        load(&self.sent, command)
    }

    pub fn received(&self, command: u32) -> u64 {
        load(&self.received, command)
    }

    /// Copy out all non-zero counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        let commands = self
            .sent
            .iter()
            .zip(self.received.iter())
            .enumerate()
            .filter_map(|(command, (sent, received))| {
                let sent = sent.load(Ordering::Relaxed);
                let received = received.load(Ordering::Relaxed);
                (sent != 0 || received != 0).then_some(CommandCount {
                    command: command as u32,
                    sent,
                    received,
                })
            })
            .collect();
        StatsSnapshot { commands }
    }

    /// Zero every counter.
    pub fn reset(&self) {
        for counter in self.sent.iter().chain(self.received.iter()) {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

fn bump(table: &[AtomicU64], command: u32) -> bool {
    match table.get(command as usize) {
        Some(counter) => {
            counter.fetch_add(1, Ordering::Relaxed);
            true
        }
        None => false,
    }
}

fn load(table: &[AtomicU64], command: u32) -> u64 {
    table
        .get(command as usize)
        .map_or(0, |counter| counter.load(Ordering::Relaxed))
}
