//! Request-identity key generation.
//!
//! A stored response is addressed by the identity of the request that
//! produced it: method plus URL. Only retrieval (GET) requests ever reach
//! the cache, but the method is hashed in so the identity stays honest.

use sha2::{Digest, Sha256};

/// Compute the cache key for a request identity.
pub fn request_key(method: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}
