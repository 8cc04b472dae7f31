use bytes::Bytes;
use serde::Serialize;

use crate::error::Error;

/// Envelope kinds published for post changes.
pub mod kind {
    pub const POST_CREATED: &str = "Post_Created";
    pub const POST_UPDATED: &str = "Post_Updated";
    pub const POST_DELETED: &str = "Post_Deleted";
}

/// Message delivered to every connected peer: `{"kind": ..., "payload": ...}`.
///
/// The hub serializes an envelope exactly once per broadcast and fans the
/// resulting bytes out; it never looks inside `payload`.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T: Serialize> {
    pub kind: String,
    pub payload: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn new(kind: impl Into<String>, payload: T) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    pub fn to_bytes(&self) -> Result<Bytes, Error> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }
}
