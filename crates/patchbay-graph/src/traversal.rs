//! Graph traversals: signal pull, message push, full declaration order, and trimming.
//!
//! - [`signal_traversal`] walks *upstream* from signal sinks along signal
//!   inlets and emits nodes in post-order, so producers precede consumers.
//! - [`message_traversal`] walks *downstream* from message origins along
//!   message outlets and emits nodes in pre-order (first time reached).
//! - [`declare_traversal`] is the union of both, plus nodes targeted by
//!   externally registered inlet callers.
//! - [`trim_graph`] drops everything outside a traversal and filters the
//!   remaining connection lists accordingly.
//!
//! Both walks are iterative (explicit stack) and index their bookkeeping by
//! [`NodeHandle`], so deep patches cannot overflow the call stack. Feedback
//! cycles are cut by tracking the nodes on the current descent path.

use std::collections::HashSet;

use crate::error::GraphError;
use crate::graph::Graph;
use crate::node::{Node, NodeHandle, NodeId, PortletKind};

/// Ordered, deduplicated sequence of node ids.
pub type GraphTraversal = Vec<NodeId>;

/// One pending node of the signal walk, with its signal sources resolved.
struct Frame {
    handle: NodeHandle,
    sources: Vec<NodeHandle>,
    next: usize,
}

impl Frame {
    fn new(graph: &Graph, handle: NodeHandle) -> Result<Self, GraphError> {
        let node = resolve(graph, handle)?;
        let sources = node
            .signal_source_ids()
            .map(|id| resolve_id(graph, id))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            handle,
            sources,
            next: 0,
        })
    }
}

/// Pull traversal of the signal graph.
///
/// For each seed, recursively visits the source of every connected signal
/// inlet and appends a node only after all of its signal sources (post-order).
/// A node already on the current descent path is not re-entered, which cuts
/// feedback loops. `should_continue` is asked about every source node before
/// descending into it; returning `false` prunes that branch. Seeds themselves
/// are always visited.
pub fn signal_traversal<F>(
    graph: &Graph,
    seeds: &[NodeId],
    should_continue: F,
) -> Result<GraphTraversal, GraphError>
where
    F: Fn(&Node) -> bool,
{
    let slots = graph.slot_count();
    let mut appended = vec![false; slots];
    let mut on_path = vec![false; slots];
    let mut traversal = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();

    for seed in seeds {
        let handle = resolve_id(graph, seed)?;
        if appended[handle.index()] {
            continue;
        }
        on_path[handle.index()] = true;
        stack.push(Frame::new(graph, handle)?);

        while let Some(frame) = stack.last_mut() {
            if let Some(&source) = frame.sources.get(frame.next) {
                frame.next += 1;
                let idx = source.index();
                if appended[idx] || on_path[idx] {
                    continue;
                }
                if !should_continue(resolve(graph, source)?) {
                    continue;
                }
                on_path[idx] = true;
                stack.push(Frame::new(graph, source)?);
            } else {
                let handle = frame.handle;
                stack.pop();
                on_path[handle.index()] = false;
                if !appended[handle.index()] {
                    appended[handle.index()] = true;
                    traversal.push(resolve(graph, handle)?.id.clone());
                }
            }
        }
    }

    tracing::trace!(
        "signal_traversal: {} seeds → {} nodes",
        seeds.len(),
        traversal.len()
    );
    Ok(traversal)
}

/// Push traversal of the message graph.
///
/// Depth-first along message outlets only. A node is appended the first time
/// it is reached, before its sinks are visited, and is never revisited.
pub fn message_traversal(graph: &Graph, seeds: &[NodeId]) -> Result<GraphTraversal, GraphError> {
    let mut reached = vec![false; graph.slot_count()];
    let mut traversal = Vec::new();
    let mut stack: Vec<NodeHandle> = Vec::new();

    for seed in seeds {
        stack.push(resolve_id(graph, seed)?);

        while let Some(handle) = stack.pop() {
            if reached[handle.index()] {
                continue;
            }
            reached[handle.index()] = true;
            let node = resolve(graph, handle)?;
            traversal.push(node.id.clone());

            let sinks = node
                .outlets_of_kind(PortletKind::Message)
                .flat_map(|outlet| node.sinks_of(outlet.id))
                .map(|ep| resolve_id(graph, &ep.node_id))
                .collect::<Result<Vec<_>, _>>()?;
            // Reversed so the first sink is popped (and visited) first.
            stack.extend(sinks.into_iter().rev());
        }
    }

    tracing::trace!(
        "message_traversal: {} seeds → {} nodes",
        seeds.len(),
        traversal.len()
    );
    Ok(traversal)
}

/// Every node that takes part in the compiled patch.
///
/// Message-reached nodes first (seeded by `is_pushing_messages` nodes and by
/// `inlet_caller_nodes`), then signal-reached nodes (seeded by
/// `is_pulling_signal` nodes), without duplicates.
pub fn declare_traversal(
    graph: &Graph,
    inlet_caller_nodes: &[NodeId],
) -> Result<GraphTraversal, GraphError> {
    let mut message_seeds = graph.nodes_pushing_messages();
    for id in inlet_caller_nodes {
        if !graph.contains(id.as_str()) {
            return Err(GraphError::UnknownNode(id.clone()));
        }
        if !message_seeds.contains(id) {
            message_seeds.push(id.clone());
        }
    }

    let messages = message_traversal(graph, &message_seeds)?;
    let signals = signal_traversal(graph, &graph.nodes_pulling_signal(), |_| true)?;

    let mut seen = HashSet::new();
    let traversal: GraphTraversal = messages
        .into_iter()
        .chain(signals)
        .filter(|id| seen.insert(id.clone()))
        .collect();

    tracing::debug!(
        "declare_traversal: {} of {} nodes reachable",
        traversal.len(),
        graph.len()
    );
    Ok(traversal)
}

/// Removes every node not in `traversal`, and every connection endpoint that
/// references a removed node.
pub fn trim_graph(graph: &mut Graph, traversal: &[NodeId]) {
    let keep: HashSet<&str> = traversal.iter().map(NodeId::as_str).collect();
    let before = graph.len();

    graph.retain_nodes(|node| keep.contains(node.id.as_str()));
    for node in graph.nodes_mut() {
        for eps in node.sources.values_mut() {
            eps.retain(|ep| keep.contains(ep.node_id.as_str()));
        }
        node.sources.retain(|_, eps| !eps.is_empty());
        for eps in node.sinks.values_mut() {
            eps.retain(|ep| keep.contains(ep.node_id.as_str()));
        }
        node.sinks.retain(|_, eps| !eps.is_empty());
    }

    tracing::debug!("graph_trim: {} → {} nodes", before, graph.len());
}

/// Resolves a traversal to node references.
pub fn to_nodes<'g>(graph: &'g Graph, traversal: &[NodeId]) -> Result<Vec<&'g Node>, GraphError> {
    traversal.iter().map(|id| graph.node(id.as_str())).collect()
}

fn resolve_id(graph: &Graph, id: &NodeId) -> Result<NodeHandle, GraphError> {
    graph
        .handle(id.as_str())
        .ok_or_else(|| GraphError::UnknownNode(id.clone()))
}

fn resolve(graph: &Graph, handle: NodeHandle) -> Result<&Node, GraphError> {
    graph
        .by_handle(handle)
        .ok_or_else(|| GraphError::Integrity(format!("dangling handle {}", handle.index())))
}
