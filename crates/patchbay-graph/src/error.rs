//! Error types for graph operations.

use thiserror::Error;

use crate::node::{ConnectionEndpoint, NodeId, PortletId, PortletKind};

/// Errors that can occur while building, mutating or traversing a patch graph.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// The specified node was not found in the graph.
    #[error("node '{0}' not found")]
    UnknownNode(NodeId),

    /// The node has no inlet with this id.
    #[error("node '{node_id}' has no inlet {portlet_id}")]
    UnknownInlet {
        /// Node that was looked up.
        node_id: NodeId,
        /// Missing inlet.
        portlet_id: PortletId,
    },

    /// The node has no outlet with this id.
    #[error("node '{node_id}' has no outlet {portlet_id}")]
    UnknownOutlet {
        /// Node that was looked up.
        node_id: NodeId,
        /// Missing outlet.
        portlet_id: PortletId,
    },

    /// A node with this id already exists.
    #[error("node '{0}' already exists")]
    DuplicateNode(NodeId),

    /// Outlet and inlet kinds differ (signal vs message).
    #[error("cannot connect {from_kind} outlet {from} to {to_kind} inlet {to}")]
    PortletKindMismatch {
        /// Source endpoint (outlet).
        from: ConnectionEndpoint,
        /// Kind of the source outlet.
        from_kind: PortletKind,
        /// Sink endpoint (inlet).
        to: ConnectionEndpoint,
        /// Kind of the sink inlet.
        to_kind: PortletKind,
    },

    /// A signal inlet accepts at most one incoming connection.
    #[error("signal inlet {to} already has a source ({existing})")]
    SignalInletAlreadyConnected {
        /// Inlet that was being connected.
        to: ConnectionEndpoint,
        /// The connection already feeding that inlet.
        existing: ConnectionEndpoint,
    },

    /// `sources` and `sinks` disagree, or reference something undeclared.
    #[error("graph integrity violated: {0}")]
    Integrity(String),
}
