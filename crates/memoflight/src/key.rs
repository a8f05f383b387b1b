use std::fmt::{self, Write};
use std::sync::Arc;

use sha2::{Digest, Sha256};

/// The identity of one exact call.
///
/// A [`Key`] is a SHA-256 digest over stable, human-readable metadata describing the call, usually
/// its name and parameters. Two keys are equal when their digests are, the metadata is kept only
/// for debugging purposes.
#[derive(Debug, Clone, Eq)]
pub struct Key {
    metadata: Arc<str>,
    hash: [u8; 32],
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.hash {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl std::hash::Hash for Key {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

impl Key {
    /// Creates a [`Key`] from a single, already stable, string.
    pub fn new(key: impl AsRef<str>) -> Self {
        let mut builder = Self::builder();
        builder.metadata.push_str(key.as_ref());
        builder.build()
    }

    /// Create a [`KeyBuilder`] that can be used to build a key consisting of all the parameters
    /// of a call.
    pub fn builder() -> KeyBuilder {
        KeyBuilder {
            metadata: String::new(),
        }
    }

    /// Returns the human-readable metadata that forms the basis of the [`Key`].
    pub fn metadata(&self) -> &str {
        &self.metadata
    }

    /// Returns the raw SHA-256 digest.
    pub fn digest(&self) -> &[u8; 32] {
        &self.hash
    }
}

impl From<&str> for Key {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for Key {
    fn from(key: String) -> Self {
        Self::new(key)
    }
}

/// A builder for [`Key`]s.
///
/// This builder implements the [`Write`](std::fmt::Write) trait, and the intention of it is to
/// accept human readable, but most importantly **stable**, input.
/// This input is then hashed to form the [`Key`]. Map-like parameters have to be written in a
/// deterministic order by the caller.
pub struct KeyBuilder {
    metadata: String,
}

impl KeyBuilder {
    /// Writes a single `name: value` line into the [`Key`].
    pub fn write_param(&mut self, name: &str, value: impl fmt::Display) -> &mut Self {
        // Writing into a `String` is infallible.
        let _ = writeln!(self.metadata, "{name}: {value}");
        self
    }

    /// Finalize the [`Key`].
    pub fn build(self) -> Key {
        let mut hash = [0; 32];
        hash.copy_from_slice(&Sha256::digest(&self.metadata));

        Key {
            metadata: self.metadata.into(),
            hash,
        }
    }
}

impl fmt::Write for KeyBuilder {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.metadata.write_str(s)
    }
}
