use std::io::{self, Write};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::driver::event::TestEvent;
use crate::session::SessionConfig;
use crate::stats::Stats;

/// Plain-text presentation of the driver's event stream.
pub struct Report {
    title: String,
    target: Option<u64>,
    t0: Instant,
    last: Instant,
    interval: Duration,
    latest: Stats,
}

impl Report {
    pub fn new(config: &SessionConfig, interval: Duration) -> Self {
        Self {
            title: format!(
                "Serial Loopback Test - {} @ {} baud",
                config.port, config.baud_rate
            ),
            target: config.target_iterations,
            t0: Instant::now(),
            last: Instant::now(),
            interval,
            latest: Stats::new(),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn handle(&mut self, event: &TestEvent) {
        match event {
            TestEvent::IterationCompleted {
                sequence_index,
                bytes_sent,
                bytes_received,
                matched,
                stats,
            } => {
                debug!(
                    seq = sequence_index,
                    sent = bytes_sent,
                    received = bytes_received,
                    matched,
                    "iteration"
                );
                self.latest = stats.clone();
            }
            TestEvent::PacketSent { stats, .. } | TestEvent::PacketReceived { stats, .. } => {
                self.latest = stats.clone();
            }
            // Logged by the driver where it happens.
            TestEvent::StreamError { .. } => {}
            TestEvent::TestFinished { final_stats } | TestEvent::Cancelled { final_stats } => {
                self.latest = final_stats.clone();
                return;
            }
        }
        self.maybe_print();
    }

    fn maybe_print(&mut self) {
        if self.last.elapsed() < self.interval {
            return;
        }
        let s = &self.latest;
        match s.progress(self.target) {
            Some(p) => info!(
                "[{:>5.1}%] sent={} recv={} lost={} mismatch={} loss={:.2}%",
                p * 100.0,
                s.packets_sent,
                s.packets_received,
                s.packets_lost,
                s.mismatch_count,
                s.loss_rate_percent()
            ),
            None => info!(
                "sent={} recv={} lost={} mismatch={} loss={:.2}%",
                s.packets_sent,
                s.packets_received,
                s.packets_lost,
                s.mismatch_count,
                s.loss_rate_percent()
            ),
        }
        self.last = Instant::now();
    }

    /// Final metric table, in the same rows the interactive view showed.
    pub fn render(&self, stats: &Stats) -> String {
        let dur = self.t0.elapsed().as_secs_f64().max(1e-3);
        let rows = [
            ("Bytes Sent", stats.bytes_sent.to_string()),
            ("Bytes Received", stats.bytes_received.to_string()),
            ("Packets Sent", stats.packets_sent.to_string()),
            ("Packets Received", stats.packets_received.to_string()),
            ("Packet Loss", format!("{:.2}%", stats.loss_rate_percent())),
            ("Mismatches", stats.mismatch_count.to_string()),
            (
                "Throughput",
                format!("{:.1} B/s", stats.bytes_received as f64 / dur),
            ),
        ];
        let mut out = format!("{}\n", self.title);
        out.push_str(&format!("{:<20}{:<20}\n", "Metric", "Value"));
        out.push_str(&format!("{}\n", "-".repeat(40)));
        for (metric, value) in rows {
            out.push_str(&format!("{:<20}{:<20}\n", metric, value));
        }
        out
    }

    pub fn print_summary(&self, stats: &Stats) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        stdout.write_all(self.render(stats).as_bytes())?;
        stdout.flush()
    }
}
