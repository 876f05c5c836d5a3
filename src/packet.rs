use crate::digest::{Digest, digest};

/// Message the duplex sender repeats.
pub const DUPLEX_MESSAGE: &str = "Hello, serial loopback!";

/// Size of the buffer a single read may fill.
pub const READ_BUFFER_LEN: usize = 256;

/// One round-trip probe. Only its length and digest outlive the iteration.
#[derive(Debug, Clone)]
pub struct Packet {
    pub sequence_index: u64,
    pub payload: Vec<u8>,
    pub sent_digest: Digest,
}

impl Packet {
    pub fn numbered(sequence_index: u64) -> Self {
        let payload = round_trip_payload(sequence_index).into_bytes();
        let sent_digest = digest(&payload);
        Self {
            sequence_index,
            payload,
            sent_digest,
        }
    }
}

/// No framing: the transport is trusted to hand back one message per read.
pub fn round_trip_payload(sequence_index: u64) -> String {
    format!("Test packet {}", sequence_index)
}
