use std::io;
use std::time::Instant;

use tracing::{debug, warn};

use super::event::{EventSink, Operation, TestEvent};
use super::{DriverState, MAX_WRITE_FAILURES, TestDriver};
use crate::digest::{digest, equal};
use crate::packet::{Packet, READ_BUFFER_LEN};

/// How one round trip ended.
#[derive(Debug)]
pub(super) enum IterationOutcome {
    Success { sent: usize, received: usize },
    DigestMismatch { sent: usize, received: usize },
    TransportError { op: Operation, error: io::Error },
}

impl TestDriver {
    /// Strictly sequential: iteration N+1 is not written before N is compared.
    pub(super) fn run_round_trip<S: EventSink>(&mut self, sink: &mut S) -> DriverState {
        let mut buf = [0u8; READ_BUFFER_LEN];
        let mut write_failures = 0u32;
        loop {
            if self.cancel.is_cancelled() {
                return DriverState::Cancelled;
            }
            if self.target_reached() {
                return DriverState::Finished;
            }

            let packet = Packet::numbered(self.stats.packets_sent + 1);
            let outcome = self.round_trip(&packet, &mut buf);
            self.stats.recompute_loss();
            let matched = matches!(outcome, IterationOutcome::Success { .. });

            match outcome {
                IterationOutcome::Success { sent, received }
                | IterationOutcome::DigestMismatch { sent, received } => {
                    write_failures = 0;
                    if !matched {
                        debug!(
                            seq = packet.sequence_index,
                            sent = %packet.sent_digest,
                            received = %digest(&buf[..received]),
                            "echo mismatch"
                        );
                    }
                    sink.emit(TestEvent::IterationCompleted {
                        sequence_index: packet.sequence_index,
                        bytes_sent: sent,
                        bytes_received: received,
                        matched,
                        stats: self.stats.clone(),
                    });
                }
                IterationOutcome::TransportError { op, error } => {
                    // Fallout of a quit in progress; the loop head reports it.
                    if self.cancel.is_cancelled() {
                        continue;
                    }
                    warn!(seq = packet.sequence_index, "{} error: {}", op, error);
                    sink.emit(TestEvent::StreamError {
                        operation: op,
                        message: error.to_string(),
                    });
                    if op == Operation::Write {
                        write_failures += 1;
                        if write_failures >= MAX_WRITE_FAILURES {
                            warn!(write_failures, "port refuses writes, giving up");
                            return DriverState::Finished;
                        }
                    } else {
                        write_failures = 0;
                    }
                    let backoff = self.session.config().poll_interval;
                    if self.cancel.wait_timeout(backoff) {
                        return DriverState::Cancelled;
                    }
                    continue;
                }
            }

            let gap = self.session.config().gap;
            if !gap.is_zero() && self.cancel.wait_timeout(gap) {
                return DriverState::Cancelled;
            }
        }
    }

    fn round_trip(&mut self, packet: &Packet, buf: &mut [u8]) -> IterationOutcome {
        let (_, transport) = self.session.parts_mut();
        // A late echo from an earlier iteration must not answer this one.
        if let Err(e) = transport.discard_input() {
            debug!("discard input: {}", e);
        }
        let sent = match transport.write(&packet.payload) {
            Ok(n) => n,
            Err(error) => {
                return IterationOutcome::TransportError {
                    op: Operation::Write,
                    error,
                };
            }
        };
        self.stats.record_sent(sent);

        let received = match self.await_echo(buf) {
            Ok(n) => n,
            Err(error) => {
                return IterationOutcome::TransportError {
                    op: Operation::Read,
                    error,
                };
            }
        };
        self.stats.record_received(received);

        if equal(&packet.sent_digest, &digest(&buf[..received])) {
            IterationOutcome::Success { sent, received }
        } else {
            self.stats.record_mismatch();
            IterationOutcome::DigestMismatch { sent, received }
        }
    }

    /// Polls until something arrives, the echo deadline passes, or quit fires.
    fn await_echo(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let cancel = self.cancel.clone();
        let (config, transport) = self.session.parts_mut();
        let deadline = Instant::now() + config.read_timeout;
        loop {
            let n = transport.read(buf)?;
            if n > 0 {
                return Ok(n);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no echo within {} ms", config.read_timeout.as_millis()),
                ));
            }
            if cancel.wait_timeout(config.poll_interval.min(deadline - now)) {
                return Err(io::Error::new(io::ErrorKind::Interrupted, "cancelled"));
            }
        }
    }
}
