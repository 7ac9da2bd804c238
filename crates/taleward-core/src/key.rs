//! Rendezvous keys.
//!
//! A base request and its moderated twin never talk to each other; they only
//! agree on a key derived from the conversation they both carry.

use crate::types::Message;
use sha2::{Digest, Sha256};

/// Number of hex characters of the first-message digest kept in a key.
const DIGEST_PREFIX_LEN: usize = 8;

/// Compute the rendezvous key for a conversation state.
///
/// The key is the first 8 hex characters of the SHA-256 of the first
/// message's content, a dash, and the message count. An empty conversation
/// hashes the empty string.
///
/// Callers pass the history with system messages already removed so both
/// flows see the same sequence.
pub fn rendezvous_key(messages: &[Message]) -> String {
    let first = messages.first().map(|m| m.content.as_str()).unwrap_or("");
    let digest = hex::encode(Sha256::digest(first.as_bytes()));

    format!("{}-{}", &digest[..DIGEST_PREFIX_LEN], messages.len())
}
