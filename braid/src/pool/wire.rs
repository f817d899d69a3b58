//! Line-delimited JSON spoken between a process pool and its children.
//!
//! The parent writes one [`Request`] per line on the child's stdin and
//! reads one [`Response`] per line from its stdout.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Request {
    pub(crate) id: u64,
    pub(crate) job: String,
    pub(crate) payload: Value,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub(crate) enum Response {
    Ok { id: u64, value: Value },
    Err { id: u64, message: String },
    Panicked { id: u64, message: String },
}

impl Response {
    pub(crate) fn id(&self) -> u64 {
        match self {
            Response::Ok { id, .. } | Response::Err { id, .. } | Response::Panicked { id, .. } => *id,
        }
    }
}
