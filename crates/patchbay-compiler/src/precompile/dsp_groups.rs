//! Hot/cold partition of the signal graph.
//!
//! The parent group is the signal traversal pulled by the audio sinks. A node
//! is **cold** when its implementation is a pure function, it is not itself
//! pulling, and every connected signal source is cold. Its output then only
//! changes when a message changes its state, so instead of running every
//! frame it is recomputed by a `COLD_<n>(m)` function called after message
//! delivery. Everything else in the parent group is **hot**.
//!
//! Cold nodes feeding hot nodes are the cold *out-nodes*. Each seeds a signal
//! traversal restricted to cold nodes; overlapping traversals are merged into
//! one group. Edges from out-nodes into hot nodes are the group's sink
//! connections: the inlet-dsp fragment of a sink inlet runs at the end of the
//! cold function instead of in the hot loop.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use patchbay_graph::{
    Connection, ConnectionEndpoint, Graph, NodeId, PortletKind, signal_traversal,
};

use crate::ast::{Func, Sequence, TypeName};
use crate::error::CompileError;
use crate::implementation::NodeImplementations;
use crate::precompiled_code::{ColdDspGroup, DspGroup, PrecompiledNode};
use crate::variable_names::GlobalVariableNames;

/// A cold group before its function is named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ColdGroupPlan {
    pub group: DspGroup,
    pub sink_connections: Vec<Connection>,
}

/// Result of the partition analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct DspPartition {
    pub parent: DspGroup,
    pub hot: DspGroup,
    pub cold: Vec<ColdGroupPlan>,
}

impl DspPartition {
    /// Index of the cold group containing `node_id`.
    pub fn cold_group_of(&self, node_id: &NodeId) -> Option<usize> {
        self.cold
            .iter()
            .position(|plan| plan.group.traversal.contains(node_id))
    }

    /// Index of the cold group with a sink connection ending at `sink`.
    pub fn cold_group_for_sink(&self, sink: &ConnectionEndpoint) -> Option<usize> {
        self.cold
            .iter()
            .position(|plan| plan.sink_connections.iter().any(|c| &c.to == sink))
    }
}

/// Splits the pulled signal traversal into hot and cold groups.
pub(crate) fn partition(
    graph: &Graph,
    implementations: &NodeImplementations,
) -> Result<DspPartition, CompileError> {
    let pulling = graph.nodes_pulling_signal();
    let parent = DspGroup {
        traversal: signal_traversal(graph, &pulling, |_| true)?,
        out_nodes_ids: pulling.into_iter().collect(),
    };

    // Parent order is producers first, so sources are classified before
    // their sinks. Feedback sources are not classified yet and count as hot.
    let mut cold: HashSet<NodeId> = HashSet::new();
    for id in &parent.traversal {
        let node = graph.node(id.as_str())?;
        let pure = implementations.get(&node.node_type)?.is_pure_function();
        if pure && !node.is_pulling_signal && node.signal_source_ids().all(|s| cold.contains(s)) {
            cold.insert(id.clone());
        }
    }

    let in_parent: HashSet<&NodeId> = parent.traversal.iter().collect();
    let is_hot = |id: &NodeId| in_parent.contains(id) && !cold.contains(id);

    let mut out_nodes = Vec::new();
    for id in parent.traversal.iter().filter(|id| cold.contains(*id)) {
        let node = graph.node(id.as_str())?;
        if node.signal_sink_ids().any(is_hot) {
            out_nodes.push(id.clone());
        }
    }

    // (members, out-nodes) per group, merging any overlap.
    let mut merged: Vec<(HashSet<NodeId>, BTreeSet<NodeId>)> = Vec::new();
    for out in &out_nodes {
        let members: HashSet<NodeId> =
            signal_traversal(graph, std::slice::from_ref(out), |n| cold.contains(&n.id))?
                .into_iter()
                .collect();
        let mut group = (members, BTreeSet::from([out.clone()]));
        let mut i = 0;
        while i < merged.len() {
            if merged[i].0.is_disjoint(&group.0) {
                i += 1;
            } else {
                let (members, outs) = merged.swap_remove(i);
                group.0.extend(members);
                group.1.extend(outs);
            }
        }
        merged.push(group);
    }

    let mut cold_groups = Vec::with_capacity(merged.len());
    for (members, outs) in merged {
        let traversal: Vec<NodeId> = parent
            .traversal
            .iter()
            .filter(|id| members.contains(*id))
            .cloned()
            .collect();
        let mut sink_connections = Vec::new();
        for out in traversal.iter().filter(|id| outs.contains(*id)) {
            let node = graph.node(out.as_str())?;
            for outlet in node.outlets_of_kind(PortletKind::Signal) {
                for sink in node.sinks_of(outlet.id) {
                    if is_hot(&sink.node_id) {
                        sink_connections.push(Connection {
                            from: ConnectionEndpoint::new(out.clone(), outlet.id),
                            to: sink.clone(),
                        });
                    }
                }
            }
        }
        cold_groups.push(ColdGroupPlan {
            group: DspGroup {
                traversal,
                out_nodes_ids: outs,
            },
            sink_connections,
        });
    }

    let first_position = |plan: &ColdGroupPlan| {
        plan.group
            .traversal
            .first()
            .and_then(|first| parent.traversal.iter().position(|id| id == first))
    };
    cold_groups.sort_by_key(first_position);

    let hot = DspGroup {
        traversal: parent
            .traversal
            .iter()
            .filter(|id| !cold.contains(*id))
            .cloned()
            .collect(),
        out_nodes_ids: parent.out_nodes_ids.clone(),
    };

    tracing::debug!(
        "dsp_partition: {} pulled nodes → {} hot, {} cold in {} groups",
        parent.traversal.len(),
        hot.traversal.len(),
        cold.len(),
        cold_groups.len()
    );
    for (index, plan) in cold_groups.iter().enumerate() {
        tracing::trace!(
            "dsp_partition: COLD_{index} = {:?}, {} sink connections",
            plan.group.traversal,
            plan.sink_connections.len()
        );
    }

    Ok(DspPartition {
        parent,
        hot,
        cold: cold_groups,
    })
}

/// Scheduled code of the whole signal graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct AssembledDsp {
    pub hot_loop: Sequence,
    pub cold_groups: Vec<ColdDspGroup>,
    pub cold_initialization: Sequence,
}

/// Builds the hot loop and the cold group functions.
///
/// `function_names[i]` is the function of `partition.cold[i]`.
pub(crate) fn assemble(
    partition: &DspPartition,
    function_names: &[String],
    nodes: &BTreeMap<NodeId, PrecompiledNode>,
    globs: &GlobalVariableNames,
) -> Result<AssembledDsp, CompileError> {
    let mut hot_loop = Sequence::new();
    for id in &partition.hot.traversal {
        hot_loop.append(node_dsp(partition, id, nodes)?);
    }

    let mut cold_groups = Vec::with_capacity(partition.cold.len());
    let mut cold_initialization = Sequence::new();
    for (plan, function_name) in partition.cold.iter().zip(function_names) {
        let mut body = Sequence::new();
        for id in &plan.group.traversal {
            body.append(node_dsp(partition, id, nodes)?);
        }
        for connection in &plan.sink_connections {
            let sink = precompiled(nodes, &connection.to.node_id)?;
            if let Some(fragment) = sink.dsp.inlets.get(&connection.to.portlet_id) {
                body.append(fragment.clone());
            }
        }
        cold_initialization.push(format!("{function_name}({})\n", globs.empty_message));
        cold_groups.push(ColdDspGroup {
            dsp_group: plan.group.clone(),
            function_name: function_name.clone(),
            sink_connections: plan.sink_connections.clone(),
            function: Func::new(function_name.clone(), body)
                .with_arg(globs.m.clone(), TypeName::Message),
        });
    }

    Ok(AssembledDsp {
        hot_loop,
        cold_groups,
        cold_initialization,
    })
}

/// Inlet fragments not owned by a cold group, then the loop code.
fn node_dsp(
    partition: &DspPartition,
    id: &NodeId,
    nodes: &BTreeMap<NodeId, PrecompiledNode>,
) -> Result<Sequence, CompileError> {
    let node = precompiled(nodes, id)?;
    let mut code = Sequence::new();
    for (inlet, fragment) in &node.dsp.inlets {
        let sink = ConnectionEndpoint::new(id.clone(), *inlet);
        if partition.cold_group_for_sink(&sink).is_none() {
            code.append(fragment.clone());
        }
    }
    code.append(node.dsp.loop_code.clone());
    Ok(code)
}

fn precompiled<'a>(
    nodes: &'a BTreeMap<NodeId, PrecompiledNode>,
    id: &NodeId,
) -> Result<&'a PrecompiledNode, CompileError> {
    nodes
        .get(id)
        .ok_or_else(|| patchbay_graph::GraphError::UnknownNode(id.clone()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::implementation::NodeImplementation;
    use patchbay_graph::Node;

    struct Pure;
    impl NodeImplementation for Pure {
        fn is_pure_function(&self) -> bool {
            true
        }
    }

    struct Impure;
    impl NodeImplementation for Impure {}

    fn registry() -> NodeImplementations {
        NodeImplementations::new()
            .with("pure", Pure)
            .with("impure", Impure)
            .with("dac", Impure)
    }

    fn unit(id: &str, node_type: &str) -> Node {
        Node::new(id, node_type)
            .with_inlet(0, PortletKind::Signal)
            .with_inlet(1, PortletKind::Signal)
            .with_outlet(0, PortletKind::Signal)
    }

    fn wire(graph: &mut Graph, from: &str, to: &str, inlet: u32) {
        graph
            .connect(
                &ConnectionEndpoint::new(from, 0),
                &ConnectionEndpoint::new(to, inlet),
            )
            .unwrap();
    }

    fn ids(traversal: &[NodeId]) -> Vec<&str> {
        traversal.iter().map(NodeId::as_str).collect()
    }

    #[test]
    fn test_pure_chain_into_hot_node_is_cold() {
        // n1 -> n2 -> n3 -> dac, n1/n2 pure, n3 impure
        let mut graph = Graph::new();
        graph.add_node(unit("n1", "pure")).unwrap();
        graph.add_node(unit("n2", "pure")).unwrap();
        graph.add_node(unit("n3", "impure")).unwrap();
        graph.add_node(unit("dac", "dac").pulling_signal()).unwrap();
        wire(&mut graph, "n1", "n2", 0);
        wire(&mut graph, "n2", "n3", 0);
        wire(&mut graph, "n3", "dac", 0);

        let partition = partition(&graph, &registry()).unwrap();
        assert_eq!(ids(&partition.parent.traversal), vec!["n1", "n2", "n3", "dac"]);
        assert_eq!(ids(&partition.hot.traversal), vec!["n3", "dac"]);
        assert_eq!(partition.cold.len(), 1);

        let plan = &partition.cold[0];
        assert_eq!(ids(&plan.group.traversal), vec!["n1", "n2"]);
        assert_eq!(plan.group.out_nodes_ids, BTreeSet::from([NodeId::from("n2")]));
        assert_eq!(
            plan.sink_connections,
            vec![Connection {
                from: ConnectionEndpoint::new("n2", 0),
                to: ConnectionEndpoint::new("n3", 0),
            }]
        );
        assert_eq!(partition.cold_group_of(&NodeId::from("n1")), Some(0));
        assert_eq!(partition.cold_group_of(&NodeId::from("n3")), None);
    }

    #[test]
    fn test_pure_node_with_hot_source_is_hot() {
        let mut graph = Graph::new();
        graph.add_node(unit("osc", "impure")).unwrap();
        graph.add_node(unit("gain", "pure")).unwrap();
        graph.add_node(unit("dac", "dac").pulling_signal()).unwrap();
        wire(&mut graph, "osc", "gain", 0);
        wire(&mut graph, "gain", "dac", 0);

        let partition = partition(&graph, &registry()).unwrap();
        assert!(partition.cold.is_empty());
        assert_eq!(ids(&partition.hot.traversal), vec!["osc", "gain", "dac"]);
    }

    #[test]
    fn test_pulling_pure_node_stays_hot() {
        let mut graph = Graph::new();
        graph.add_node(unit("out", "pure").pulling_signal()).unwrap();
        let partition = partition(&graph, &registry()).unwrap();
        assert!(partition.cold.is_empty());
        assert_eq!(ids(&partition.hot.traversal), vec!["out"]);
    }

    #[test]
    fn test_overlapping_groups_merge() {
        // c0 feeds both c1 and c2, which feed different inlets of the dac
        let mut graph = Graph::new();
        graph.add_node(unit("c0", "pure")).unwrap();
        graph.add_node(unit("c1", "pure")).unwrap();
        graph.add_node(unit("c2", "pure")).unwrap();
        graph.add_node(unit("dac", "dac").pulling_signal()).unwrap();
        wire(&mut graph, "c0", "c1", 0);
        wire(&mut graph, "c0", "c2", 0);
        wire(&mut graph, "c1", "dac", 0);
        wire(&mut graph, "c2", "dac", 1);

        let partition = partition(&graph, &registry()).unwrap();
        assert_eq!(partition.cold.len(), 1);
        let plan = &partition.cold[0];
        assert_eq!(ids(&plan.group.traversal), vec!["c0", "c1", "c2"]);
        assert_eq!(plan.group.out_nodes_ids.len(), 2);
        assert_eq!(plan.sink_connections.len(), 2);
    }

    #[test]
    fn test_disjoint_groups_numbered_by_parent_position() {
        let mut graph = Graph::new();
        graph.add_node(unit("a", "pure")).unwrap();
        graph.add_node(unit("b", "pure")).unwrap();
        graph.add_node(unit("dac", "dac").pulling_signal()).unwrap();
        wire(&mut graph, "a", "dac", 0);
        wire(&mut graph, "b", "dac", 1);

        let partition = partition(&graph, &registry()).unwrap();
        assert_eq!(partition.cold.len(), 2);
        assert_eq!(ids(&partition.cold[0].group.traversal), vec!["a"]);
        assert_eq!(ids(&partition.cold[1].group.traversal), vec!["b"]);
        assert_eq!(
            partition.cold_group_for_sink(&ConnectionEndpoint::new("dac", 1)),
            Some(1)
        );
    }

    #[test]
    fn test_feedback_source_counts_as_hot() {
        // p1 <-> p2 loop, both pure, p2 feeds the dac
        let mut graph = Graph::new();
        graph.add_node(unit("p1", "pure")).unwrap();
        graph.add_node(unit("p2", "pure")).unwrap();
        graph.add_node(unit("dac", "dac").pulling_signal()).unwrap();
        wire(&mut graph, "p1", "p2", 0);
        wire(&mut graph, "p2", "p1", 0);
        wire(&mut graph, "p2", "dac", 0);

        let partition = partition(&graph, &registry()).unwrap();
        assert!(partition.cold.is_empty());
        assert_eq!(partition.hot.traversal.len(), 3);
    }

    #[test]
    fn test_unknown_type_fails() {
        let mut graph = Graph::new();
        graph.add_node(unit("x", "mystery").pulling_signal()).unwrap();
        assert!(matches!(
            partition(&graph, &registry()),
            Err(CompileError::UnknownNodeType { .. })
        ));
    }

    fn precompiled_node(loop_code: &str, inlets: &[(u32, &str)]) -> PrecompiledNode {
        let mut node = PrecompiledNode::new("t");
        node.dsp.loop_code = Sequence::text(loop_code);
        for &(inlet, code) in inlets {
            node.dsp.inlets.insert(inlet.into(), Sequence::text(code));
        }
        node
    }

    #[test]
    fn test_assemble_moves_owned_fragments_into_cold_function() {
        let mut graph = Graph::new();
        graph.add_node(unit("n1", "pure")).unwrap();
        graph.add_node(unit("n2", "pure")).unwrap();
        graph.add_node(unit("n3", "impure")).unwrap();
        graph.add_node(unit("dac", "dac").pulling_signal()).unwrap();
        wire(&mut graph, "n1", "n2", 0);
        wire(&mut graph, "n2", "n3", 0);
        wire(&mut graph, "n3", "dac", 0);
        let partition = partition(&graph, &registry()).unwrap();

        let nodes = BTreeMap::from([
            (NodeId::from("n1"), precompiled_node("n1 loop\n", &[])),
            (NodeId::from("n2"), precompiled_node("n2 loop\n", &[])),
            (
                NodeId::from("n3"),
                precompiled_node("n3 loop\n", &[(0, "n3 in0\n"), (1, "n3 in1\n")]),
            ),
            (NodeId::from("dac"), precompiled_node("dac loop\n", &[])),
        ]);
        let globs = GlobalVariableNames::default();
        let dsp = assemble(&partition, &["COLD_0".to_string()], &nodes, &globs).unwrap();

        assert_eq!(dsp.hot_loop.to_string(), "n3 in1\nn3 loop\ndac loop\n");
        assert_eq!(dsp.cold_groups.len(), 1);
        let cold = &dsp.cold_groups[0];
        assert_eq!(cold.function.name, "COLD_0");
        assert_eq!(cold.function.body.to_string(), "n1 loop\nn2 loop\nn3 in0\n");
        assert_eq!(dsp.cold_initialization.to_string(), "COLD_0(EMPTY_MESSAGE)\n");
    }
}
