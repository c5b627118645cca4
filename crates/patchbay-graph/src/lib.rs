//! Patchbay Graph - patch graph model and traversals
//!
//! A patch is a dataflow graph of unit generators. Nodes expose **signal**
//! portlets (continuous, per-sample data) and **message** portlets (discrete
//! events). This crate holds the graph model and the traversals the
//! precompiler is built on.
//!
//! # Core Abstractions
//!
//! - [`Graph`] - arena-backed node storage with mirrored `sources`/`sinks`
//! - [`Node`], [`Portlet`], [`ConnectionEndpoint`] - the data model
//! - [`signal_traversal`] - pull order (producers before consumers)
//! - [`message_traversal`] - push order (first reached first)
//! - [`declare_traversal`] - every node taking part in the compiled patch
//! - [`trim_graph`] - drop unreachable nodes and their dangling endpoints
//!
//! # Example
//!
//! ```rust
//! use patchbay_graph::{ConnectionEndpoint, Graph, Node, NodeId, PortletKind, signal_traversal};
//!
//! let mut graph = Graph::new();
//! graph.add_node(Node::new("osc", "osc~").with_outlet(0, PortletKind::Signal))?;
//! graph.add_node(
//!     Node::new("dac", "dac~")
//!         .with_inlet(0, PortletKind::Signal)
//!         .pulling_signal(),
//! )?;
//! graph.connect(&ConnectionEndpoint::new("osc", 0), &ConnectionEndpoint::new("dac", 0))?;
//!
//! let order = signal_traversal(&graph, &[NodeId::from("dac")], |_| true)?;
//! assert_eq!(order, vec![NodeId::from("osc"), NodeId::from("dac")]);
//! # Ok::<(), patchbay_graph::GraphError>(())
//! ```

mod error;
mod graph;
mod node;
pub mod traversal;

pub use error::GraphError;
pub use graph::Graph;
pub use node::{
    Connection, ConnectionEndpoint, Node, NodeArgument, NodeHandle, NodeId, Portlet, PortletId,
    PortletKind,
};
pub use traversal::{
    GraphTraversal, declare_traversal, message_traversal, signal_traversal, to_nodes, trim_graph,
};
