use std::time::Duration;

use clap::ValueEnum;

use crate::error::LoopbackError;
use crate::packet::DUPLEX_MESSAGE;
use crate::port::{self, POLL_INTERVAL, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Write one packet, wait for its echo, compare, repeat
    RoundTrip,
    /// Independent send and receive streams
    Duplex,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub port: String,
    pub baud_rate: u32,
    /// `None` runs until cancelled.
    pub target_iterations: Option<u64>,
    pub mode: Mode,
    pub rtscts: bool,
    /// Round-trip: how long to wait for an echo.
    pub read_timeout: Duration,
    /// Round-trip: pause between iterations.
    pub gap: Duration,
    /// Duplex: pause between sends.
    pub send_interval: Duration,
    /// Backoff after a read that returned nothing.
    pub poll_interval: Duration,
    /// Duplex: how long to wait for outstanding echoes once a bounded sender is done.
    pub drain: Duration,
    pub message: String,
}

impl SessionConfig {
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            target_iterations: None,
            mode: Mode::RoundTrip,
            rtscts: false,
            read_timeout: Duration::from_millis(1000),
            gap: Duration::ZERO,
            send_interval: Duration::from_millis(500),
            poll_interval: POLL_INTERVAL,
            drain: Duration::from_millis(1000),
            message: DUPLEX_MESSAGE.to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), LoopbackError> {
        if self.baud_rate == 0 {
            return Err(LoopbackError::InvalidConfig("baud rate must be positive".into()));
        }
        if self.mode == Mode::Duplex && self.message.is_empty() {
            return Err(LoopbackError::InvalidConfig(
                "duplex message must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// One test run. Holds the transport exclusively until [`TestSession::close`].
pub struct TestSession {
    config: SessionConfig,
    transport: Box<dyn Transport>,
}

impl TestSession {
    /// Opens the serial port named in `config`.
    pub fn open(config: SessionConfig) -> Result<Self, LoopbackError> {
        config.validate()?;
        let transport = port::open_port(&config.port, config.baud_rate, config.rtscts)?;
        Ok(Self::with_transport(config, Box::new(transport)))
    }

    pub fn with_transport(config: SessionConfig, transport: Box<dyn Transport>) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub(crate) fn parts_mut(&mut self) -> (&SessionConfig, &mut dyn Transport) {
        (&self.config, &mut *self.transport)
    }

    pub fn close(&mut self) {
        self.transport.close();
    }
}
