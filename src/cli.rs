use clap::{Args, Parser, Subcommand};
use std::time::Duration;

use crate::packet::DUPLEX_MESSAGE;
use crate::session::{Mode, SessionConfig};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "serial-loopback",
    about = "Serial port loopback tester: echo verification and loss stats"
)]
pub struct Cli {
    /// Only log warnings and errors
    #[arg(long, short, global = true, default_value_t = false)]
    pub quiet: bool,
    /// Log per-packet detail
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Cmd {
    /// Run serial port loopback test
    Test(TestOpts),
}

#[derive(Args, Debug, Clone)]
pub struct SerialOpts {
    /// Serial port device
    #[arg(long, short = 'p', env = "LOOPBACK_PORT", default_value = "/dev/ttyUSB0")]
    pub port: String,
    /// Baud rate
    #[arg(long, short = 'b', env = "LOOPBACK_BAUD", default_value_t = 115_200)]
    pub baud: u32,
    /// Enable RTS/CTS
    #[arg(long, default_value_t = false)]
    pub rtscts: bool,
}

#[derive(Args, Debug, Clone)]
pub struct TestOpts {
    #[command(flatten)]
    pub ser: SerialOpts,
    /// Number of test iterations (0 = until quit)
    #[arg(long, short = 'c', env = "LOOPBACK_COUNT", default_value_t = 1000)]
    pub count: u64,
    /// Round-trip request/response or decoupled duplex streams
    #[arg(long, value_enum, env = "LOOPBACK_MODE", default_value_t = Mode::RoundTrip)]
    pub mode: Mode,
    /// Round-trip: milliseconds to wait for each echo
    #[arg(long, default_value_t = 1000)]
    pub read_timeout_ms: u64,
    /// Round-trip: milliseconds between iterations
    #[arg(long, default_value_t = 0)]
    pub gap_ms: u64,
    /// Duplex: milliseconds between sends
    #[arg(long, default_value_t = 500)]
    pub interval_ms: u64,
    /// Duplex: milliseconds to wait for late echoes after the last send
    #[arg(long, default_value_t = 1000)]
    pub drain_ms: u64,
    /// Duplex: message written on every send
    #[arg(long, default_value = DUPLEX_MESSAGE)]
    pub message: String,
}

impl TestOpts {
    pub fn session_config(&self) -> SessionConfig {
        let mut config = SessionConfig::new(&self.ser.port, self.ser.baud);
        config.target_iterations = (self.count > 0).then_some(self.count);
        config.mode = self.mode;
        config.rtscts = self.ser.rtscts;
        config.read_timeout = Duration::from_millis(self.read_timeout_ms);
        config.gap = Duration::from_millis(self.gap_ms);
        config.send_interval = Duration::from_millis(self.interval_ms);
        config.drain = Duration::from_millis(self.drain_ms);
        config.message = self.message.clone();
        config
    }
}
