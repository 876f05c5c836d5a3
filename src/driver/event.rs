use std::fmt;
use std::sync::mpsc;

use crate::stats::Stats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Write,
    Read,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Write => "write",
            Operation::Read => "read",
        })
    }
}

/// Everything a presentation layer learns about a running test.
///
/// Progress events carry a snapshot of the counters as they stood right
/// after the driver applied that event.
#[derive(Debug, Clone, PartialEq)]
pub enum TestEvent {
    IterationCompleted {
        sequence_index: u64,
        bytes_sent: usize,
        bytes_received: usize,
        matched: bool,
        stats: Stats,
    },
    PacketSent {
        bytes: usize,
        stats: Stats,
    },
    PacketReceived {
        bytes: usize,
        stats: Stats,
    },
    StreamError {
        operation: Operation,
        message: String,
    },
    TestFinished {
        final_stats: Stats,
    },
    Cancelled {
        final_stats: Stats,
    },
}

impl TestEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TestEvent::TestFinished { .. } | TestEvent::Cancelled { .. })
    }
}

pub trait EventSink {
    fn emit(&mut self, event: TestEvent);
}

/// A hung-up receiver just means nobody is watching any more.
impl EventSink for mpsc::Sender<TestEvent> {
    fn emit(&mut self, event: TestEvent) {
        let _ = self.send(event);
    }
}

impl EventSink for Vec<TestEvent> {
    fn emit(&mut self, event: TestEvent) {
        self.push(event);
    }
}
