use tracing::{debug, info};

use crate::error::LoopbackError;
use crate::session::{Mode, TestSession};
use crate::stats::Stats;

use cancel::CancelToken;
use event::{EventSink, TestEvent};

pub mod cancel;
mod duplex;
pub mod event;
mod round_trip;

/// Consecutive refused writes after which the link is treated as gone.
pub const MAX_WRITE_FAILURES: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Running,
    Finished,
    Cancelled,
}

/// Runs a loopback session to completion and owns its counters.
pub struct TestDriver {
    session: TestSession,
    stats: Stats,
    state: DriverState,
    cancel: CancelToken,
}

impl TestDriver {
    pub fn new(session: TestSession, cancel: CancelToken) -> Self {
        Self {
            session,
            stats: Stats::new(),
            state: DriverState::Idle,
            cancel,
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Blocks until the run finishes or is cancelled, emitting progress to
    /// `sink`. The transport is closed before the terminal event goes out.
    pub fn run<S: EventSink>(&mut self, sink: &mut S) -> Result<Stats, LoopbackError> {
        if self.state != DriverState::Idle {
            return Err(LoopbackError::InvalidConfig("driver already ran".into()));
        }
        self.state = DriverState::Running;
        let mode = self.session.config().mode;
        info!(
            port = %self.session.config().port,
            baud = self.session.config().baud_rate,
            ?mode,
            target = ?self.session.config().target_iterations,
            "loopback test started"
        );

        let outcome = match mode {
            Mode::RoundTrip => Ok(self.run_round_trip(sink)),
            Mode::Duplex => self.run_duplex(sink),
        };
        self.session.close();
        let state = match outcome {
            Ok(state) => state,
            Err(e) => {
                self.state = DriverState::Cancelled;
                return Err(e);
            }
        };
        self.state = state;

        let final_stats = self.stats.clone();
        match self.state {
            DriverState::Finished => {
                debug!(?final_stats, "loopback test finished");
                sink.emit(TestEvent::TestFinished {
                    final_stats: final_stats.clone(),
                });
            }
            _ => {
                debug!(?final_stats, "loopback test cancelled");
                sink.emit(TestEvent::Cancelled {
                    final_stats: final_stats.clone(),
                });
            }
        }
        Ok(final_stats)
    }

    fn target_reached(&self) -> bool {
        self.session
            .config()
            .target_iterations
            .is_some_and(|target| self.stats.packets_sent >= target)
    }
}
