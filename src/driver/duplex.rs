use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::Instant;

use tracing::{debug, warn};

use super::cancel::CancelToken;
use super::event::{EventSink, Operation, TestEvent};
use super::{DriverState, MAX_WRITE_FAILURES, TestDriver};
use crate::error::LoopbackError;
use crate::packet::READ_BUFFER_LEN;
use crate::port::Transport;
use crate::session::SessionConfig;

/// What the send and receive loops report to the stats consumer.
#[derive(Debug)]
enum Signal {
    Sent(usize),
    Received(usize),
    Failed { op: Operation, message: String },
    /// Sender has written its last packet, or given up on a dead port.
    SenderDone,
}

impl TestDriver {
    /// Sender and receiver run on their own threads over separate handles;
    /// this thread is the only one touching `stats`.
    pub(super) fn run_duplex<S: EventSink>(
        &mut self,
        sink: &mut S,
    ) -> Result<DriverState, LoopbackError> {
        let TestDriver {
            session,
            stats,
            cancel,
            ..
        } = self;
        let (config, writer) = session.parts_mut();
        let reader = writer.try_clone().map_err(|source| LoopbackError::Io {
            op: Operation::Read,
            source,
        })?;
        // Stops both loops, on quit or when the run is over.
        let halt = CancelToken::new();
        let (tx, rx) = mpsc::channel();

        let state = thread::scope(|s| {
            let send_tx = tx.clone();
            let send_halt = halt.clone();
            s.spawn(move || send_loop(writer, config, &send_halt, &send_tx));
            let recv_halt = halt.clone();
            s.spawn(move || receive_loop(reader, config, &recv_halt, &tx));

            let mut draining_since: Option<Instant> = None;
            let state = loop {
                if cancel.is_cancelled() {
                    break DriverState::Cancelled;
                }
                if let Some(since) = draining_since
                    && (stats.packets_received >= stats.packets_sent
                        || since.elapsed() >= config.drain)
                {
                    break DriverState::Finished;
                }

                match rx.recv_timeout(config.poll_interval) {
                    Ok(Signal::Sent(bytes)) => {
                        stats.record_sent(bytes);
                        stats.recompute_loss();
                        sink.emit(TestEvent::PacketSent {
                            bytes,
                            stats: stats.clone(),
                        });
                    }
                    Ok(Signal::Received(bytes)) => {
                        stats.record_received(bytes);
                        stats.recompute_loss();
                        sink.emit(TestEvent::PacketReceived {
                            bytes,
                            stats: stats.clone(),
                        });
                    }
                    Ok(Signal::Failed { op, message }) => {
                        if !cancel.is_cancelled() {
                            warn!("{} error: {}", op, message);
                            sink.emit(TestEvent::StreamError {
                                operation: op,
                                message,
                            });
                        }
                    }
                    Ok(Signal::SenderDone) => {
                        debug!(sent = stats.packets_sent, "sender done, draining echoes");
                        draining_since = Some(Instant::now());
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => {
                        break if cancel.is_cancelled() {
                            DriverState::Cancelled
                        } else {
                            DriverState::Finished
                        };
                    }
                }
            };
            halt.cancel();
            state
        });
        Ok(state)
    }
}

fn send_loop(
    writer: &mut dyn Transport,
    config: &SessionConfig,
    halt: &CancelToken,
    tx: &Sender<Signal>,
) {
    let message = config.message.as_bytes();
    let mut sent: u64 = 0;
    let mut failures = 0u32;
    loop {
        if halt.wait_timeout(config.send_interval) {
            return;
        }
        if config.target_iterations.is_some_and(|target| sent >= target) {
            let _ = tx.send(Signal::SenderDone);
            return;
        }
        let signal = match writer.write(message) {
            Ok(n) => {
                sent += 1;
                failures = 0;
                Signal::Sent(n)
            }
            Err(e) if halt.is_cancelled() => {
                debug!("write after halt: {}", e);
                return;
            }
            Err(e) => {
                failures += 1;
                Signal::Failed {
                    op: Operation::Write,
                    message: e.to_string(),
                }
            }
        };
        if tx.send(signal).is_err() {
            return;
        }
        if failures >= MAX_WRITE_FAILURES {
            warn!(failures, "port refuses writes, sender giving up");
            let _ = tx.send(Signal::SenderDone);
            return;
        }
    }
}

/// Exits on the first read error; the sender keeps going. The cloned
/// handle is dropped on return, the session still owns the original.
fn receive_loop(
    mut reader: Box<dyn Transport>,
    config: &SessionConfig,
    halt: &CancelToken,
    tx: &Sender<Signal>,
) {
    let mut buf = [0u8; READ_BUFFER_LEN];
    while !halt.is_cancelled() {
        match reader.read(&mut buf) {
            Ok(0) => {
                if halt.wait_timeout(config.poll_interval) {
                    break;
                }
            }
            Ok(n) => {
                if tx.send(Signal::Received(n)).is_err() {
                    break;
                }
            }
            Err(e) => {
                if !halt.is_cancelled() {
                    let _ = tx.send(Signal::Failed {
                        op: Operation::Read,
                        message: e.to_string(),
                    });
                }
                break;
            }
        }
    }
}
