use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{self, Read, Write};
use std::time::Duration;

use crate::error::LoopbackError;

/// How long one serial read may block before reporting "no data yet".
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Synchronous byte pipe the loopback driver runs over.
pub trait Transport: Send {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
    /// `Ok(0)` means nothing arrived within the transport's own timeout.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    /// Drops whatever has arrived but not been read yet.
    fn discard_input(&mut self) -> io::Result<()>;
    /// Second handle on the same link, used to read while another context writes.
    fn try_clone(&self) -> io::Result<Box<dyn Transport>>;
    /// Idempotent. Errors are swallowed.
    fn close(&mut self);
}

pub struct SerialTransport {
    name: String,
    port: Option<Box<dyn SerialPort>>,
}

pub fn open_port(dev: &str, baud: u32, rtscts: bool) -> Result<SerialTransport, LoopbackError> {
    let builder = serialport::new(dev, baud)
        .timeout(POLL_INTERVAL)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(if rtscts {
            FlowControl::Hardware
        } else {
            FlowControl::None
        });

    let port = builder.open().map_err(|source| LoopbackError::Connection {
        port: dev.to_string(),
        source,
    })?;
    Ok(SerialTransport {
        name: dev.to_string(),
        port: Some(port),
    })
}

impl SerialTransport {
    fn port(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "port closed"))
    }
}

impl Transport for SerialTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let port = self.port()?;
        port.write_all(buf)?;
        port.flush()?;
        Ok(buf.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.port()?.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            other => other,
        }
    }

    fn discard_input(&mut self) -> io::Result<()> {
        Ok(self.port()?.clear(ClearBuffer::Input)?)
    }

    fn try_clone(&self) -> io::Result<Box<dyn Transport>> {
        let port = self
            .port
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "port closed"))?;
        Ok(Box::new(SerialTransport {
            name: self.name.clone(),
            port: Some(port.try_clone()?),
        }))
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            tracing::debug!(port = %self.name, "serial port closed");
        }
    }
}

#[cfg(test)]
pub mod mock {
    use std::collections::VecDeque;
    use std::io;
    use std::sync::{Arc, Mutex, MutexGuard};

    use super::Transport;
    use crate::driver::cancel::CancelToken;

    /// What the far end does with one written payload.
    #[derive(Debug, Clone)]
    pub enum Reply {
        Echo,
        /// Echo, then a stale duplicate of the same bytes.
        EchoTwice,
        /// Echo with the last byte flipped.
        Corrupt,
        Silent,
        FailWrite,
        FailRead,
        /// The next read raises the quit signal, then fails like a forced close.
        CancelDuringRead(CancelToken),
    }

    #[derive(Debug, Default)]
    pub struct MockState {
        pub writes: Vec<Vec<u8>>,
        pub closed: bool,
        pending: VecDeque<Vec<u8>>,
        script: VecDeque<Reply>,
        fallback: Option<Reply>,
        fail_next_read: bool,
        cancel_on_read: Option<CancelToken>,
    }

    /// In-memory loopback. Clones share one far end.
    #[derive(Debug, Clone)]
    pub struct MockTransport {
        state: Arc<Mutex<MockState>>,
    }

    impl MockTransport {
        /// Follows `script` write by write, then `fallback` forever.
        pub fn scripted(script: Vec<Reply>, fallback: Reply) -> Self {
            let state = MockState {
                script: script.into(),
                fallback: Some(fallback),
                ..Default::default()
            };
            Self {
                state: Arc::new(Mutex::new(state)),
            }
        }

        pub fn echo() -> Self {
            Self::scripted(Vec::new(), Reply::Echo)
        }

        pub fn state(&self) -> MutexGuard<'_, MockState> {
            self.state.lock().unwrap()
        }
    }

    impl Transport for MockTransport {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let mut st = self.state();
            if st.closed {
                return Err(io::Error::new(io::ErrorKind::NotConnected, "port closed"));
            }
            let reply = match st.script.pop_front() {
                Some(r) => r,
                None => st.fallback.clone().unwrap_or(Reply::Echo),
            };
            if matches!(reply, Reply::FailWrite) {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "write refused"));
            }
            st.writes.push(buf.to_vec());
            match reply {
                Reply::Echo => st.pending.push_back(buf.to_vec()),
                Reply::EchoTwice => {
                    st.pending.push_back(buf.to_vec());
                    st.pending.push_back(buf.to_vec());
                }
                Reply::Corrupt => {
                    let mut back = buf.to_vec();
                    if let Some(last) = back.last_mut() {
                        *last ^= 0x01;
                    }
                    st.pending.push_back(back);
                }
                Reply::FailRead => st.fail_next_read = true,
                Reply::CancelDuringRead(token) => st.cancel_on_read = Some(token),
                Reply::Silent | Reply::FailWrite => {}
            }
            Ok(buf.len())
        }

        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let mut st = self.state();
            if st.closed {
                return Err(io::Error::new(io::ErrorKind::NotConnected, "port closed"));
            }
            if let Some(token) = st.cancel_on_read.take() {
                token.cancel();
                return Err(io::Error::new(io::ErrorKind::Interrupted, "port closed"));
            }
            if st.fail_next_read {
                st.fail_next_read = false;
                return Err(io::Error::other("framing error"));
            }
            match st.pending.pop_front() {
                Some(chunk) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    Ok(n)
                }
                None => Ok(0),
            }
        }

        fn discard_input(&mut self) -> io::Result<()> {
            self.state().pending.clear();
            Ok(())
        }

        fn try_clone(&self) -> io::Result<Box<dyn Transport>> {
            Ok(Box::new(self.clone()))
        }

        fn close(&mut self) {
            self.state().closed = true;
        }
    }
}
