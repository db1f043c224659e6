//! Error types shared by the core crate.

use crate::dom::NodeId;

/// Errors raised by DOM operations and template parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The operation needs an element node.
    #[error("node {0} is not an element")]
    NotAnElement(NodeId),
    /// The operation needs a node that sits inside a parent.
    #[error("node {0} has no parent")]
    Detached(NodeId),
    /// An insertion would break the tree structure.
    #[error("cannot insert {child} into {parent}: {reason}")]
    Hierarchy {
        /// Prospective parent.
        parent: NodeId,
        /// Node being inserted.
        child: NodeId,
        /// Which rule was violated.
        reason: &'static str,
    },
    /// The node was freed by `Document::dispose`.
    #[error("node {0} was disposed")]
    Disposed(NodeId),
    /// `attach_shadow` was called twice on the same host.
    #[error("element {0} already hosts a shadow root")]
    ShadowExists(NodeId),
    /// Markup could not be parsed.
    #[error("html parse error at byte {offset}: {message}")]
    Html {
        /// Byte offset into the markup.
        offset: usize,
        /// What went wrong.
        message: String,
    },
}

impl Error {
    pub(crate) fn html(offset: usize, message: impl Into<String>) -> Self {
        Self::Html {
            offset,
            message: message.into(),
        }
    }
}
