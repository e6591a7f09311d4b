//! Session identifiers.
//!
//! The id is the only handle a caller gets and nothing else authenticates
//! them, so it must be unguessable: 32 bytes from the thread RNG.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;

const ID_BYTES: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        let mut bytes = [0u8; ID_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Accept an id supplied by a caller. Anything that could not have come
    /// from [`SessionId::generate`] is rejected.
    pub fn parse(s: &str) -> Option<Self> {
        match URL_SAFE_NO_PAD.decode(s) {
            Ok(bytes) if bytes.len() == ID_BYTES => Some(Self(s.to_string())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefix for log lines. The full id is a credential.
    pub fn short(&self) -> &str {
        &self.0[..8]
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
