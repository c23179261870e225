//! Response envelopes of the portal API
//!
//! Every endpoint wraps its payload as `{ "error": ..., "payload": ... }`. A
//! non-empty `error` is a hard failure regardless of the payload.

use crate::catalog::{CategoryNode, ProductDetail};
use serde::Deserialize;

/// Generic response envelope
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub error: Option<String>,

    #[serde(default = "Option::default")]
    pub payload: Option<T>,
}

impl<T> Envelope<T> {
    /// Returns the upstream error message if one was reported
    pub fn error_message(&self) -> Option<&str> {
        self.error
            .as_deref()
            .map(str::trim)
            .filter(|message| !message.is_empty())
    }
}

/// Payload of the category tree endpoint
///
/// Depending on the deployment the children arrive under a root category or
/// as a bare list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CategoryTreePayload {
    Rooted { category: CategoryNode },
    Flat(Vec<CategoryNode>),
}

impl CategoryTreePayload {
    pub fn into_children(self) -> Vec<CategoryNode> {
        match self {
            Self::Rooted { category } => category.children,
            Self::Flat(children) => children,
        }
    }
}

/// Payload of the product detail endpoint
#[derive(Debug, Deserialize)]
pub struct ProductPayload {
    pub data: ProductDetail,
}
