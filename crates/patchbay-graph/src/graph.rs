//! Patch graph: node storage, connection mutations and integrity checks.
//!
//! [`Graph`] owns every [`Node`] of a patch in an arena (`Vec<Option<Node>>`)
//! addressed by [`NodeHandle`]. String ids are resolved to handles once, so
//! traversals can work on integer indices.
//!
//! All mutations keep `sources`/`sinks` mirrored: every endpoint in some node's
//! `sinks` has a matching entry in the target node's `sources`, and vice versa.
//! The only way to break this is direct data corruption (e.g. a hand-written
//! JSON fixture), which [`Graph::validate_integrity`] detects.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::node::{Connection, ConnectionEndpoint, Node, NodeHandle, NodeId, PortletKind};

/// Patch graph: map from node id to [`Node`], in insertion order.
///
/// # Usage
///
/// 1. Create a graph with [`new()`](Self::new)
/// 2. Add nodes: [`add_node()`](Self::add_node)
/// 3. Connect portlets: [`connect()`](Self::connect)
/// 4. Hand it to a traversal or the precompiler
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<Node>", into = "Vec<Node>")]
pub struct Graph {
    nodes: Vec<Option<Node>>,
    handles: HashMap<NodeId, NodeHandle>,
}

impl Graph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    // --- Node mutations ---

    /// Adds a node and returns its handle.
    ///
    /// The node's connection lists are reset: connections are only created
    /// through [`connect()`](Self::connect).
    pub fn add_node(&mut self, mut node: Node) -> Result<NodeHandle, GraphError> {
        if self.handles.contains_key(&node.id) {
            return Err(GraphError::DuplicateNode(node.id));
        }
        node.clear_connections();
        let handle = self.insert(node);
        tracing::trace!("graph_add: node {:?}", handle);
        Ok(handle)
    }

    /// Removes a node after disconnecting every edge touching it.
    ///
    /// Returns the removed node (with empty connection lists).
    pub fn delete_node(&mut self, id: &str) -> Result<Node, GraphError> {
        let handle = self.require_handle(id)?;
        let connections: Vec<Connection> = {
            let node = self.slot(handle)?;
            let incoming = node.sources.iter().flat_map(|(inlet, eps)| {
                eps.iter().map(move |ep| Connection {
                    from: ep.clone(),
                    to: ConnectionEndpoint::new(node.id.clone(), *inlet),
                })
            });
            let outgoing = node.sinks.iter().flat_map(|(outlet, eps)| {
                eps.iter().map(move |ep| Connection {
                    from: ConnectionEndpoint::new(node.id.clone(), *outlet),
                    to: ep.clone(),
                })
            });
            incoming.chain(outgoing).collect()
        };

        for connection in &connections {
            self.disconnect(&connection.from, &connection.to)?;
        }

        self.handles.remove(id);
        let node = self.nodes[handle.index()]
            .take()
            .ok_or_else(|| GraphError::UnknownNode(NodeId::from(id)))?;
        tracing::debug!(
            "graph_delete: node '{}' ({} edges removed)",
            id,
            connections.len()
        );
        Ok(node)
    }

    /// Connects an outlet to an inlet.
    ///
    /// Fails if either portlet is undeclared, if their kinds differ, or if the
    /// sink is a signal inlet that already has a source. Connecting an
    /// already-existing edge is a no-op.
    pub fn connect(
        &mut self,
        from: &ConnectionEndpoint,
        to: &ConnectionEndpoint,
    ) -> Result<(), GraphError> {
        let from_handle = self.require_handle(from.node_id.as_str())?;
        let to_handle = self.require_handle(to.node_id.as_str())?;

        let from_kind = self.slot(from_handle)?.outlet(from.portlet_id)?.kind;
        let sink_node = self.slot(to_handle)?;
        let to_kind = sink_node.inlet(to.portlet_id)?.kind;

        if from_kind != to_kind {
            return Err(GraphError::PortletKindMismatch {
                from: from.clone(),
                from_kind,
                to: to.clone(),
                to_kind,
            });
        }

        let existing = sink_node.sources_of(to.portlet_id);
        if existing.contains(from) {
            return Ok(());
        }
        if to_kind == PortletKind::Signal
            && let Some(first) = existing.first()
        {
            return Err(GraphError::SignalInletAlreadyConnected {
                to: to.clone(),
                existing: first.clone(),
            });
        }

        self.slot_mut(from_handle)?
            .sinks
            .entry(from.portlet_id)
            .or_default()
            .push(to.clone());
        self.slot_mut(to_handle)?
            .sources
            .entry(to.portlet_id)
            .or_default()
            .push(from.clone());

        tracing::trace!("graph_connect: {from} → {to}");
        Ok(())
    }

    /// Removes one specific edge. No-op if the edge does not exist.
    pub fn disconnect(
        &mut self,
        from: &ConnectionEndpoint,
        to: &ConnectionEndpoint,
    ) -> Result<(), GraphError> {
        let from_handle = self.require_handle(from.node_id.as_str())?;
        let to_handle = self.require_handle(to.node_id.as_str())?;

        let source_node = self.slot_mut(from_handle)?;
        if let Some(sinks) = source_node.sinks.get_mut(&from.portlet_id) {
            sinks.retain(|ep| ep != to);
            if sinks.is_empty() {
                source_node.sinks.remove(&from.portlet_id);
            }
        }
        let sink_node = self.slot_mut(to_handle)?;
        if let Some(sources) = sink_node.sources.get_mut(&to.portlet_id) {
            sources.retain(|ep| ep != from);
            if sources.is_empty() {
                sink_node.sources.remove(&to.portlet_id);
            }
        }

        tracing::trace!("graph_disconnect: {from} → {to}");
        Ok(())
    }

    /// Removes every edge going from node `from_id` to node `to_id`.
    pub fn disconnect_nodes(&mut self, from_id: &str, to_id: &str) -> Result<(), GraphError> {
        self.require_handle(to_id)?;
        let source_node = self.node(from_id)?;
        let edges: Vec<Connection> = source_node
            .sinks()
            .flat_map(|(outlet, eps)| {
                eps.iter()
                    .filter(move |ep| ep.node_id.as_str() == to_id)
                    .map(move |ep| Connection {
                        from: ConnectionEndpoint::new(source_node.id.clone(), outlet),
                        to: ep.clone(),
                    })
            })
            .collect();
        for edge in &edges {
            self.disconnect(&edge.from, &edge.to)?;
        }
        Ok(())
    }

    // --- Lookups ---

    /// Returns the node with the given id.
    pub fn node(&self, id: &str) -> Result<&Node, GraphError> {
        self.get(id)
            .ok_or_else(|| GraphError::UnknownNode(NodeId::from(id)))
    }

    /// Returns the node with the given id, if present.
    pub fn get(&self, id: &str) -> Option<&Node> {
        self.handles.get(id).and_then(|h| self.by_handle(*h))
    }

    /// Returns the handle of the node with the given id, if present.
    pub fn handle(&self, id: &str) -> Option<NodeHandle> {
        self.handles.get(id).copied()
    }

    /// Returns the node stored under `handle`, if it was not deleted.
    pub fn by_handle(&self, handle: NodeHandle) -> Option<&Node> {
        self.nodes.get(handle.index()).and_then(Option::as_ref)
    }

    /// Whether a node with this id exists.
    pub fn contains(&self, id: &str) -> bool {
        self.handles.contains_key(id)
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Iterates over nodes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter_map(Option::as_ref)
    }

    /// Ids of all nodes flagged `is_pulling_signal`, in insertion order.
    pub fn nodes_pulling_signal(&self) -> Vec<NodeId> {
        self.iter()
            .filter(|n| n.is_pulling_signal)
            .map(|n| n.id.clone())
            .collect()
    }

    /// Ids of all nodes flagged `is_pushing_messages`, in insertion order.
    pub fn nodes_pushing_messages(&self) -> Vec<NodeId> {
        self.iter()
            .filter(|n| n.is_pushing_messages)
            .map(|n| n.id.clone())
            .collect()
    }

    /// Lists every edge, ordered by source node, outlet, then connection order.
    pub fn connections(&self) -> Vec<Connection> {
        self.iter()
            .flat_map(|node| {
                node.sinks().flat_map(move |(outlet, eps)| {
                    eps.iter().map(move |ep| Connection {
                        from: ConnectionEndpoint::new(node.id.clone(), outlet),
                        to: ep.clone(),
                    })
                })
            })
            .collect()
    }

    /// Checks that every portlet is keyed by its own id, and that `sources`
    /// and `sinks` mirror each other and only reference existing nodes and
    /// declared portlets of matching kind.
    pub fn validate_integrity(&self) -> Result<(), GraphError> {
        for node in self.iter() {
            let portlets = node
                .inlets
                .iter()
                .map(|entry| ("inlet", entry))
                .chain(node.outlets.iter().map(|entry| ("outlet", entry)));
            for (direction, (key, portlet)) in portlets {
                if *key != portlet.id {
                    return Err(GraphError::Integrity(format!(
                        "node '{}' {direction} {key} declares id {}",
                        node.id, portlet.id
                    )));
                }
            }
            for (outlet, eps) in node.sinks() {
                let outlet_kind = node.outlet(outlet)?.kind;
                let from = ConnectionEndpoint::new(node.id.clone(), outlet);
                for to in eps {
                    let sink_node = self.get(to.node_id.as_str()).ok_or_else(|| {
                        GraphError::Integrity(format!("{from} → {to}: unknown sink node"))
                    })?;
                    if sink_node.inlet(to.portlet_id)?.kind != outlet_kind {
                        return Err(GraphError::Integrity(format!(
                            "{from} → {to}: portlet kinds differ"
                        )));
                    }
                    if !sink_node.sources_of(to.portlet_id).contains(&from) {
                        return Err(GraphError::Integrity(format!(
                            "{from} → {to}: missing mirrored source"
                        )));
                    }
                }
            }
            for (inlet, eps) in node.sources() {
                let inlet_kind = node.inlet(inlet)?.kind;
                let to = ConnectionEndpoint::new(node.id.clone(), inlet);
                if inlet_kind == PortletKind::Signal && eps.len() > 1 {
                    return Err(GraphError::Integrity(format!(
                        "signal inlet {to} has {} sources",
                        eps.len()
                    )));
                }
                for from in eps {
                    let source_node = self.get(from.node_id.as_str()).ok_or_else(|| {
                        GraphError::Integrity(format!("{from} → {to}: unknown source node"))
                    })?;
                    if !source_node.sinks_of(from.portlet_id).contains(&to) {
                        return Err(GraphError::Integrity(format!(
                            "{from} → {to}: missing mirrored sink"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    // --- Crate-internal helpers ---

    /// Number of arena slots (including deleted ones). Handle indices are below this.
    pub(crate) fn slot_count(&self) -> usize {
        self.nodes.len()
    }

    /// Keeps only the nodes for which `keep` returns true, without touching
    /// connection lists. Callers are responsible for filtering dangling endpoints.
    pub(crate) fn retain_nodes(&mut self, mut keep: impl FnMut(&Node) -> bool) {
        for slot in &mut self.nodes {
            if slot.as_ref().is_some_and(|node| !keep(node))
                && let Some(node) = slot.take()
            {
                self.handles.remove(&node.id);
            }
        }
    }

    pub(crate) fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.iter_mut().filter_map(Option::as_mut)
    }

    fn insert(&mut self, node: Node) -> NodeHandle {
        let handle = NodeHandle(self.nodes.len() as u32);
        self.handles.insert(node.id.clone(), handle);
        self.nodes.push(Some(node));
        handle
    }

    fn require_handle(&self, id: &str) -> Result<NodeHandle, GraphError> {
        self.handle(id)
            .ok_or_else(|| GraphError::UnknownNode(NodeId::from(id)))
    }

    fn slot(&self, handle: NodeHandle) -> Result<&Node, GraphError> {
        self.by_handle(handle)
            .ok_or_else(|| GraphError::Integrity(format!("dangling handle {}", handle.index())))
    }

    fn slot_mut(&mut self, handle: NodeHandle) -> Result<&mut Node, GraphError> {
        self.nodes
            .get_mut(handle.index())
            .and_then(Option::as_mut)
            .ok_or_else(|| GraphError::Integrity(format!("dangling handle {}", handle.index())))
    }
}

impl TryFrom<Vec<Node>> for Graph {
    type Error = GraphError;

    /// Builds a graph from nodes that already carry their connection lists,
    /// e.g. when loading a serialized patch. Runs the integrity validator.
    fn try_from(nodes: Vec<Node>) -> Result<Self, Self::Error> {
        let mut graph = Graph::new();
        for node in nodes {
            if graph.contains(node.id.as_str()) {
                return Err(GraphError::DuplicateNode(node.id));
            }
            graph.insert(node);
        }
        graph.validate_integrity()?;
        Ok(graph)
    }
}

impl From<Graph> for Vec<Node> {
    fn from(graph: Graph) -> Self {
        graph.nodes.into_iter().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::PortletId;

    fn ep(node: &str, portlet: u32) -> ConnectionEndpoint {
        ConnectionEndpoint::new(node, portlet)
    }

    fn signal_node(id: &str) -> Node {
        Node::new(id, "+~")
            .with_inlet(0, PortletKind::Signal)
            .with_inlet(1, PortletKind::Message)
            .with_outlet(0, PortletKind::Signal)
            .with_outlet(1, PortletKind::Message)
    }

    fn graph_of(ids: &[&str]) -> Graph {
        let mut graph = Graph::new();
        for id in ids {
            graph.add_node(signal_node(id)).unwrap();
        }
        graph
    }

    // --- Mutation tests ---

    #[test]
    fn test_add_node() {
        let graph = graph_of(&["a", "b"]);
        assert_eq!(graph.len(), 2);
        assert!(graph.contains("a"));
        assert_eq!(graph.node("b").unwrap().node_type, "+~");
    }

    #[test]
    fn test_add_duplicate_node_rejected() {
        let mut graph = graph_of(&["a"]);
        let result = graph.add_node(signal_node("a"));
        assert!(matches!(result, Err(GraphError::DuplicateNode(id)) if id.as_str() == "a"));
    }

    #[test]
    fn test_connect_mirrors_sources_and_sinks() {
        let mut graph = graph_of(&["a", "b"]);
        graph.connect(&ep("a", 0), &ep("b", 0)).unwrap();

        assert_eq!(graph.node("a").unwrap().sinks_of(PortletId(0)), &[ep("b", 0)]);
        assert_eq!(graph.node("b").unwrap().sources_of(PortletId(0)), &[ep("a", 0)]);
        graph.validate_integrity().unwrap();
    }

    #[test]
    fn test_connect_same_edge_twice_is_noop() {
        let mut graph = graph_of(&["a", "b"]);
        graph.connect(&ep("a", 0), &ep("b", 0)).unwrap();
        graph.connect(&ep("a", 0), &ep("b", 0)).unwrap();
        assert_eq!(graph.connections().len(), 1);
    }

    #[test]
    fn test_signal_inlet_accepts_single_source() {
        let mut graph = graph_of(&["a", "b", "c"]);
        graph.connect(&ep("a", 0), &ep("c", 0)).unwrap();
        let result = graph.connect(&ep("b", 0), &ep("c", 0));
        assert_eq!(
            result,
            Err(GraphError::SignalInletAlreadyConnected {
                to: ep("c", 0),
                existing: ep("a", 0),
            })
        );
    }

    #[test]
    fn test_message_inlet_accepts_many_sources() {
        let mut graph = graph_of(&["a", "b", "c"]);
        graph.connect(&ep("a", 1), &ep("c", 1)).unwrap();
        graph.connect(&ep("b", 1), &ep("c", 1)).unwrap();
        assert_eq!(graph.node("c").unwrap().sources_of(PortletId(1)).len(), 2);
    }

    #[test]
    fn test_connect_kind_mismatch_rejected() {
        let mut graph = graph_of(&["a", "b"]);
        let result = graph.connect(&ep("a", 0), &ep("b", 1));
        assert!(matches!(
            result,
            Err(GraphError::PortletKindMismatch {
                from_kind: PortletKind::Signal,
                to_kind: PortletKind::Message,
                ..
            })
        ));
    }

    #[test]
    fn test_connect_unknown_portlets_rejected() {
        let mut graph = graph_of(&["a", "b"]);
        assert!(matches!(
            graph.connect(&ep("a", 7), &ep("b", 0)),
            Err(GraphError::UnknownOutlet { .. })
        ));
        assert!(matches!(
            graph.connect(&ep("a", 0), &ep("b", 7)),
            Err(GraphError::UnknownInlet { .. })
        ));
        assert!(matches!(
            graph.connect(&ep("zz", 0), &ep("b", 0)),
            Err(GraphError::UnknownNode(_))
        ));
    }

    #[test]
    fn test_disconnect() {
        let mut graph = graph_of(&["a", "b"]);
        graph.connect(&ep("a", 0), &ep("b", 0)).unwrap();
        graph.disconnect(&ep("a", 0), &ep("b", 0)).unwrap();
        assert!(graph.connections().is_empty());
        assert!(graph.node("b").unwrap().sources_of(PortletId(0)).is_empty());

        // Absent edge: no-op.
        graph.disconnect(&ep("a", 0), &ep("b", 0)).unwrap();
    }

    #[test]
    fn test_disconnect_nodes_removes_all_edges_between_pair() {
        let mut graph = graph_of(&["a", "b", "c"]);
        graph.connect(&ep("a", 0), &ep("b", 0)).unwrap();
        graph.connect(&ep("a", 1), &ep("b", 1)).unwrap();
        graph.connect(&ep("a", 1), &ep("c", 1)).unwrap();

        graph.disconnect_nodes("a", "b").unwrap();

        assert_eq!(
            graph.connections(),
            vec![Connection {
                from: ep("a", 1),
                to: ep("c", 1)
            }]
        );
        graph.validate_integrity().unwrap();
    }

    #[test]
    fn test_delete_node_disconnects_everything() {
        let mut graph = graph_of(&["a", "b", "c"]);
        graph.connect(&ep("a", 0), &ep("b", 0)).unwrap();
        graph.connect(&ep("b", 0), &ep("c", 0)).unwrap();
        graph.connect(&ep("b", 1), &ep("b", 1)).unwrap();

        let removed = graph.delete_node("b").unwrap();
        assert_eq!(removed.id.as_str(), "b");
        assert_eq!(graph.len(), 2);
        assert!(graph.connections().is_empty());
        assert!(graph.handle("b").is_none());
        graph.validate_integrity().unwrap();
    }

    #[test]
    fn test_delete_nonexistent_node() {
        let mut graph = Graph::new();
        assert!(matches!(
            graph.delete_node("nope"),
            Err(GraphError::UnknownNode(_))
        ));
    }

    #[test]
    fn test_handles_not_reused() {
        let mut graph = graph_of(&["a"]);
        let first = graph.handle("a").unwrap();
        graph.delete_node("a").unwrap();
        let second = graph.add_node(signal_node("a")).unwrap();
        assert_ne!(first, second);
        assert!(graph.by_handle(first).is_none());
    }

    #[test]
    fn test_add_node_resets_connections() {
        let mut other = graph_of(&["a", "b"]);
        other.connect(&ep("a", 0), &ep("b", 0)).unwrap();
        let connected = other.node("b").unwrap().clone();

        let mut graph = Graph::new();
        graph.add_node(connected).unwrap();
        assert!(graph.node("b").unwrap().sources_of(PortletId(0)).is_empty());
    }

    // --- Serialization / integrity ---

    #[test]
    fn test_json_roundtrip_preserves_connections() {
        let mut graph = graph_of(&["a", "b"]);
        graph.connect(&ep("a", 0), &ep("b", 0)).unwrap();

        let json = serde_json::to_string(&graph).unwrap();
        let restored: Graph = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.connections(), graph.connections());
    }

    #[test]
    fn test_deserialize_rejects_unmirrored_connection() {
        let json = r#"[
            {"id": "a", "type": "t", "outlets": {"0": {"id": 0, "type": "message"}},
             "sinks": {"0": [{"nodeId": "b", "portletId": 0}]}},
            {"id": "b", "type": "t", "inlets": {"0": {"id": 0, "type": "message"}}}
        ]"#;
        let result: Result<Graph, _> = serde_json::from_str(json);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("missing mirrored source"), "got: {err}");
    }

    #[test]
    fn test_deserialize_rejects_portlet_keyed_under_other_id() {
        let json = r#"[
            {"id": "osc", "type": "osc~", "outlets": {"0": {"id": 0, "type": "signal"}},
             "sinks": {"0": [{"nodeId": "dac", "portletId": 0}]}},
            {"id": "dac", "type": "dac~", "isPullingSignal": true,
             "inlets": {"0": {"id": 1, "type": "signal"}},
             "sources": {"0": [{"nodeId": "osc", "portletId": 0}]}}
        ]"#;
        let result: Result<Graph, _> = serde_json::from_str(json);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("node 'dac' inlet 0 declares id 1"), "got: {err}");
    }

    #[test]
    fn test_deserialize_rejects_duplicate_ids() {
        let json = r#"[{"id": "a", "type": "t"}, {"id": "a", "type": "t"}]"#;
        let result: Result<Graph, _> = serde_json::from_str(json);
        assert!(result.unwrap_err().to_string().contains("already exists"));
    }
}
