use std::fmt;

use rand::{
    Rng,
    distr::{Alphanumeric, SampleString},
};
use sha2::{Digest, Sha256};

pub const KEY_LENGTH: usize = 64;

/// SHA-256 of an API key secret.
///
/// This is the only form of an API key the rest of the crate ever sees.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyHash([u8; 32]);

impl KeyHash {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for KeyHash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "KeyHash({}…)", &self.to_hex()[..8])
    }
}

pub fn generate_key() -> String {
    generate_key_with(&mut rand::rng())
}

fn generate_key_with<R: Rng>(rng: &mut R) -> String {
    Alphanumeric.sample_string(rng, KEY_LENGTH)
}

pub fn hash_key(key: impl AsRef<str>) -> KeyHash {
    let digest = Sha256::digest(key.as_ref().trim().as_bytes());
    KeyHash(digest.into())
}
