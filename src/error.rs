//! Error type shared by the DOM builder, bindings and the DevTools client.

use thiserror::Error;

use crate::types::NodeId;

/// Crate-wide result alias.
pub type Result<T, E = SutilError> = std::result::Result<T, E>;

/// Everything that can go wrong while building DOM or talking to the
/// inspected page.
///
/// Errors are `Clone + PartialEq` so they can travel inside a
/// [`PromiseState`](crate::store::PromiseState) held by a store.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SutilError {
    /// The handle refers to a node that has been freed.
    #[error("stale node handle {0}")]
    StaleNode(NodeId),

    /// The operation needs the node to have a parent.
    #[error("node {0} is not attached to a parent")]
    Detached(NodeId),

    /// Text and comment nodes cannot have children or attributes.
    #[error("node {0} cannot hold children or attributes")]
    NotAContainer(NodeId),

    /// Attribute application failed; carries the element context.
    #[error("cannot set attribute '{name}' on <{tag}> ({node_type}): {source}")]
    Attr {
        name: String,
        tag: String,
        node_type: String,
        source: Box<SutilError>,
    },

    /// A keyed list contained the same key twice.
    #[error("duplicate key in keyed list at position {index}")]
    DuplicateKey { index: usize },

    #[error("no element with id '{0}'")]
    ElementNotFound(String),

    #[error("mount point '{0}' is not registered")]
    MountPointNotFound(String),

    /// The inspected page does not expose `document.__sutil_cb`.
    #[error("Sutil control block not found in the inspected page")]
    NoControlBlock,

    #[error("unknown control block method '{0}'")]
    UnknownMethod(String),

    #[error("malformed injected script: {0}")]
    MalformedScript(String),

    #[error("json: {0}")]
    Json(String),

    #[error("port '{0}' is disconnected")]
    PortDisconnected(String),
}

impl From<serde_json::Error> for SutilError {
    fn from(err: serde_json::Error) -> Self {
        SutilError::Json(err.to_string())
    }
}

impl SutilError {
    /// Wrap an attribute failure with the element context.
    pub fn attr(name: &str, tag: &str, node_type: &str, source: SutilError) -> Self {
        SutilError::Attr {
            name: name.to_string(),
            tag: tag.to_string(),
            node_type: node_type.to_string(),
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attr_error_carries_context() {
        let inner = SutilError::NotAContainer(NodeId::new(3, 0));
        let err = SutilError::attr("class", "#text", "text", inner.clone());

        let message = err.to_string();
        assert!(message.contains("'class'"));
        assert!(message.contains("<#text>"));
        assert!(message.contains("(text)"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_json_error_conversion() {
        let parse: std::result::Result<u32, _> = serde_json::from_str("not json");
        let err: SutilError = parse.unwrap_err().into();
        assert!(matches!(err, SutilError::Json(_)));
    }
}
