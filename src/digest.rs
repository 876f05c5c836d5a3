use std::fmt;

use sha2::{Digest as _, Sha256};

/// SHA-256 fingerprint of a payload.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; 32]);

impl Digest {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

pub fn digest(payload: &[u8]) -> Digest {
    Digest(Sha256::digest(payload).into())
}

pub fn equal(a: &Digest, b: &Digest) -> bool {
    a.0 == b.0
}
