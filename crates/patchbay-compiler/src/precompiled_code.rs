//! The frozen output of a precompilation.
//!
//! [`PrecompiledCode`] is filled phase by phase inside the crate and handed
//! to the caller read-only. It holds, per node, what every portlet resolved
//! to and the node's generated code, plus the graph-level scheduling (hot
//! loop, cold groups, host entry points) and the resolved global code.

use std::collections::{BTreeMap, BTreeSet};

use patchbay_graph::{Connection, ConnectionEndpoint, GraphTraversal, NodeId, PortletId};
use serde::Serialize;

use crate::ast::{Func, Sequence, TypeName};
use crate::dependencies::{ExportSpec, ImportSpec};
use crate::variable_names::GlobalVariableNames;

/// Receiver function of a message inlet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageReceiver {
    /// Function name.
    pub name: String,
    /// Body supplied by the node implementation. `None` until overwritten.
    pub body: Option<Sequence>,
}

impl MessageReceiver {
    /// Final receiver function: the body, then a runtime error for any
    /// message the body did not return on.
    pub fn function(
        &self,
        node_id: &NodeId,
        inlet: PortletId,
        globs: &GlobalVariableNames,
        debug: bool,
    ) -> Func {
        let mut body = self.body.clone().unwrap_or_default();
        body.push(format!(
            "throw new Error('Node \"{node_id}\", inlet \"{inlet}\", unsupported message : ' + {}({})",
            globs.msg_display, globs.m
        ));
        if debug {
            body.push(" + '\\nDEBUG : remember, you must return from message receiver'");
        }
        body.push(")\n");
        Func::new(self.name.clone(), body).with_arg(globs.m.clone(), TypeName::Message)
    }
}

/// How references to a message outlet are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SenderKind {
    /// A dedicated function forwarding to every sink function.
    Synthesized,
    /// References go straight to the only sink function.
    Direct,
    /// References go to the shared no-op receiver.
    Null,
}

/// Sender of a message outlet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSender {
    /// Name the node's code calls to emit on this outlet.
    pub name: String,
    /// Functions receiving the emitted messages, in call order.
    pub sink_function_names: Vec<String>,
    /// Resolution strategy.
    pub kind: SenderKind,
}

impl MessageSender {
    /// The forwarding function, for synthesized senders only.
    pub fn function(&self, globs: &GlobalVariableNames) -> Option<Func> {
        if self.kind != SenderKind::Synthesized {
            return None;
        }
        Some(forwarding_function(
            &self.name,
            &self.sink_function_names,
            &globs.m,
        ))
    }
}

/// `name(m)` calling every function of `functions` with `m`, in order.
pub(crate) fn forwarding_function(name: &str, functions: &[String], m: &str) -> Func {
    let body = functions
        .iter()
        .map(|f| Sequence::text(format!("{f}({m})\n")))
        .collect();
    Func::new(name, body).with_arg(m, TypeName::Message)
}

/// State object of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateDeclaration {
    /// Name of the state object.
    pub name: String,
    /// Initial value per field.
    pub initializations: BTreeMap<String, Sequence>,
}

/// Signal processing code of a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDsp {
    /// Per-frame code.
    #[serde(rename = "loop")]
    pub loop_code: Sequence,
    /// Per-inlet refresh code.
    pub inlets: BTreeMap<PortletId, Sequence>,
}

/// Everything generated for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrecompiledNode {
    /// Node type tag.
    pub node_type: String,
    /// Signal inlet references: a source outlet variable or the null signal.
    pub signal_ins: BTreeMap<PortletId, String>,
    /// Signal outlet variables.
    pub signal_outs: BTreeMap<PortletId, String>,
    /// Message receivers, for inlets that can receive anything.
    pub message_receivers: BTreeMap<PortletId, MessageReceiver>,
    /// Message senders, for every message outlet.
    pub message_senders: BTreeMap<PortletId, MessageSender>,
    /// State object, if the type declares one.
    pub state: Option<StateDeclaration>,
    /// Signal processing code.
    pub dsp: NodeDsp,
    /// Startup code.
    pub initialization: Sequence,
}

impl PrecompiledNode {
    pub(crate) fn new(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            signal_ins: BTreeMap::new(),
            signal_outs: BTreeMap::new(),
            message_receivers: BTreeMap::new(),
            message_senders: BTreeMap::new(),
            state: None,
            dsp: NodeDsp::default(),
            initialization: Sequence::new(),
        }
    }
}

/// A slice of the signal traversal scheduled as one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DspGroup {
    /// Nodes in scheduling order.
    pub traversal: GraphTraversal,
    /// Nodes whose output leaves the group.
    pub out_nodes_ids: BTreeSet<NodeId>,
}

/// A group recomputed only when a message reaches one of its nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColdDspGroup {
    /// Nodes and out-nodes.
    pub dsp_group: DspGroup,
    /// Name of the recompute function.
    pub function_name: String,
    /// Edges from an out-node of this group into the hot group.
    pub sink_connections: Vec<Connection>,
    /// The recompute function.
    pub function: Func,
}

/// Host entry point injecting a message into an inlet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InletCaller {
    /// Target node.
    pub node_id: NodeId,
    /// Target inlet.
    pub portlet_id: PortletId,
    /// Function name.
    pub name: String,
    /// Functions called, in order: the receiver, then the cold group
    /// function if the node is cold.
    pub sink_function_names: Vec<String>,
    /// The entry point.
    pub function: Func,
}

/// Host observer of a message outlet. The host provides the function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutletListener {
    /// Observed node.
    pub node_id: NodeId,
    /// Observed outlet.
    pub portlet_id: PortletId,
    /// Function name.
    pub name: String,
}

/// Graph-level scheduling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrecompiledGraph {
    /// Every compiled node, message-reached first.
    pub full_traversal: GraphTraversal,
    /// Nodes run every frame.
    pub hot_dsp_group: DspGroup,
    /// Nodes run on demand.
    pub cold_dsp_groups: Vec<ColdDspGroup>,
    /// Body of the per-frame loop.
    pub hot_dsp_loop: Sequence,
    /// Runs every cold group once at startup.
    pub cold_dsp_initialization: Sequence,
    /// Host entry points.
    pub inlet_callers: Vec<InletCaller>,
    /// Host observers.
    pub outlet_listeners: Vec<OutletListener>,
}

impl PrecompiledGraph {
    /// The cold group whose sink connections end at `sink`, if any.
    pub fn cold_group_for_sink(&self, sink: &ConnectionEndpoint) -> Option<&ColdDspGroup> {
        self.cold_dsp_groups
            .iter()
            .find(|group| group.sink_connections.iter().any(|c| &c.to == sink))
    }
}

/// Resolved global code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Dependencies {
    /// Deduplicated code, dependencies first.
    pub ast: Sequence,
    /// Host functions the code needs.
    pub imports: Vec<ImportSpec>,
    /// Symbols the module exposes.
    pub exports: Vec<ExportSpec>,
}

/// Output of one precompilation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PrecompiledCode {
    pub(crate) nodes: BTreeMap<NodeId, PrecompiledNode>,
    pub(crate) graph: PrecompiledGraph,
    pub(crate) dependencies: Dependencies,
}

impl PrecompiledCode {
    /// Record of node `id`, if it was compiled.
    pub fn node(&self, id: &str) -> Option<&PrecompiledNode> {
        self.nodes.get(id)
    }

    /// All node records, by id.
    pub fn nodes(&self) -> &BTreeMap<NodeId, PrecompiledNode> {
        &self.nodes
    }

    /// Graph-level scheduling.
    pub fn graph(&self) -> &PrecompiledGraph {
        &self.graph
    }

    /// Resolved global code.
    pub fn dependencies(&self) -> &Dependencies {
        &self.dependencies
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn globs() -> GlobalVariableNames {
        GlobalVariableNames::default()
    }

    #[test]
    fn test_placeholder_receiver_throws() {
        let receiver = MessageReceiver {
            name: "n1_RCVS_0".into(),
            body: None,
        };
        let func = receiver.function(&NodeId::from("n1"), PortletId(0), &globs(), false);
        assert_eq!(func.name, "n1_RCVS_0");
        assert_eq!(func.args.len(), 1);
        assert_eq!(func.args[0].name, "m");
        assert_eq!(
            func.body.to_string(),
            "throw new Error('Node \"n1\", inlet \"0\", unsupported message : ' + msg_display(m))\n"
        );
    }

    #[test]
    fn test_receiver_body_precedes_throw_and_debug_hint() {
        let receiver = MessageReceiver {
            name: "n1_RCVS_1".into(),
            body: Some(Sequence::text("if (isBang(m)) { return }\n")),
        };
        let rendered = receiver
            .function(&NodeId::from("n1"), PortletId(1), &globs(), true)
            .body
            .to_string();
        assert!(rendered.starts_with("if (isBang(m)) { return }\nthrow new Error("));
        assert!(rendered.contains("inlet \"1\""));
        assert!(rendered.ends_with(
            "+ '\\nDEBUG : remember, you must return from message receiver')\n"
        ));
    }

    #[test]
    fn test_only_synthesized_senders_have_functions() {
        let mut sender = MessageSender {
            name: "n1_SNDS_0".into(),
            sink_function_names: vec!["n2_RCVS_0".into(), "n3_RCVS_0".into()],
            kind: SenderKind::Synthesized,
        };
        let func = sender.function(&globs()).unwrap();
        assert_eq!(func.body.to_string(), "n2_RCVS_0(m)\nn3_RCVS_0(m)\n");

        sender.kind = SenderKind::Direct;
        assert!(sender.function(&globs()).is_none());
    }

    #[test]
    fn test_cold_group_for_sink_scans_all_groups() {
        let group = |name: &str, to: &str| ColdDspGroup {
            dsp_group: DspGroup::default(),
            function_name: name.into(),
            sink_connections: vec![Connection {
                from: ConnectionEndpoint::new("c", 0),
                to: ConnectionEndpoint::new(to, 0),
            }],
            function: Func::new(name, Sequence::new()),
        };
        let graph = PrecompiledGraph {
            cold_dsp_groups: vec![group("COLD_0", "a"), group("COLD_1", "b")],
            ..Default::default()
        };
        let found = graph.cold_group_for_sink(&ConnectionEndpoint::new("b", 0));
        assert_eq!(found.map(|g| g.function_name.as_str()), Some("COLD_1"));
        assert!(graph.cold_group_for_sink(&ConnectionEndpoint::new("b", 1)).is_none());
    }
}
