//! The variable names index: every symbol the generated code uses.
//!
//! One [`VariableNamesIndex`] is built per compilation and threaded through
//! the pipeline phases by reference. Node symbols are derived from a per-node
//! prefix: the node id, or `<sanitized type>_<id>` in debug mode. A prefix
//! starting with a digit gets an extra `n_` in front, and two nodes can never
//! share a prefix.
//!
//! | Symbol | Pattern |
//! |---|---|
//! | signal outlet | `<prefix>_OUTS_<p>` |
//! | message receiver | `<prefix>_RCVS_<p>` |
//! | message sender | `<prefix>_SNDS_<p>` |
//! | state | `<prefix>_STATE`, fields `<prefix>_STATE.<field>` |
//! | outlet listener | `outletListener_<id>_<p>` |
//! | inlet caller | `inletCaller_<id>_<p>` |
//! | cold group | `COLD_<n>` |
//! | global code | `<namespace>_<key>` |

use std::collections::HashSet;

use patchbay_graph::{Node, NodeId, PortletId};
use serde::Serialize;

use crate::namespace::{Namespace, NamespaceError, assert_valid_name_part};

/// Fixed names shared by all generated code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalVariableNames {
    /// Message argument of receivers and cold functions.
    pub m: String,
    /// Frame counter inside the block loop.
    pub iter_frame: String,
    /// Absolute frame count.
    pub frame: String,
    /// Block size.
    pub block_size: String,
    /// Sample rate.
    pub sample_rate: String,
    /// Audio input buffer.
    pub input: String,
    /// Audio output buffer.
    pub output: String,
    /// No-op message receiver for unconnected outlets.
    pub null_message_receiver: String,
    /// Zero signal for unconnected signal inlets.
    pub null_signal: String,
    /// The empty message.
    pub empty_message: String,
    /// Human-readable message dump.
    pub msg_display: String,
}

impl Default for GlobalVariableNames {
    fn default() -> Self {
        Self {
            m: "m".into(),
            iter_frame: "F".into(),
            frame: "FRAME".into(),
            block_size: "BLOCK_SIZE".into(),
            sample_rate: "SAMPLE_RATE".into(),
            input: "INPUT".into(),
            output: "OUTPUT".into(),
            null_message_receiver: "SND_TO_NULL".into(),
            null_signal: "NULL_SIGNAL".into(),
            empty_message: "EMPTY_MESSAGE".into(),
            msg_display: "msg_display".into(),
        }
    }
}

/// Symbols of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeVariableNames {
    /// Signal outlet variables, by outlet id.
    pub signal_outs: Namespace<String>,
    /// Signal inlet references, by inlet id.
    pub signal_ins: Namespace<String>,
    /// Message receiver functions, by inlet id.
    pub message_receivers: Namespace<String>,
    /// Message sender references, by outlet id.
    pub message_senders: Namespace<String>,
    /// State field accessors, by field name.
    pub state: Namespace<String>,
    /// Name of the state object, if the node type declares a state shape.
    pub state_name: Option<String>,
    #[serde(skip)]
    prefix: String,
}

impl NodeVariableNames {
    fn new(node_id: &NodeId, prefix: String) -> Self {
        let path = |part: &str| format!("nodes.{node_id}.{part}");
        Self {
            signal_outs: Namespace::new(path("signalOuts")),
            signal_ins: Namespace::new(path("signalIns")),
            message_receivers: Namespace::new(path("messageReceivers")),
            message_senders: Namespace::new(path("messageSenders")),
            state: Namespace::new(path("state")),
            state_name: None,
            prefix,
        }
    }

    /// Prefix all symbols of this node start with.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// `<prefix>_OUTS_<p>`
    pub fn signal_out_symbol(&self, outlet: PortletId) -> String {
        format!("{}_OUTS_{outlet}", self.prefix)
    }

    /// `<prefix>_RCVS_<p>`
    pub fn receiver_symbol(&self, inlet: PortletId) -> String {
        format!("{}_RCVS_{inlet}", self.prefix)
    }

    /// `<prefix>_SNDS_<p>`
    pub fn sender_symbol(&self, outlet: PortletId) -> String {
        format!("{}_SNDS_{outlet}", self.prefix)
    }
}

/// The populated namespace tree of one compilation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableNamesIndex {
    /// Fixed global names.
    pub globs: GlobalVariableNames,
    /// Per-node symbols, by node id.
    pub nodes: Namespace<NodeVariableNames>,
    /// Outlet listener functions, by node id then outlet id.
    pub outlet_listeners: Namespace<Namespace<String>>,
    /// Inlet caller functions, by node id then inlet id.
    pub inlet_callers: Namespace<Namespace<String>>,
    /// Cold group functions, by group index.
    pub cold_dsp_groups: Namespace<String>,
    /// Global code symbols, by dependency namespace then key.
    pub global_code: Namespace<Namespace<String>>,
    #[serde(skip)]
    debug: bool,
    #[serde(skip)]
    prefixes: HashSet<String>,
}

impl VariableNamesIndex {
    /// Creates an index holding only the global names.
    pub fn new(debug: bool) -> Self {
        Self {
            globs: GlobalVariableNames::default(),
            nodes: Namespace::new("nodes"),
            outlet_listeners: Namespace::new("outletListeners"),
            inlet_callers: Namespace::new("inletCallers"),
            cold_dsp_groups: Namespace::new("coldDspGroups"),
            global_code: Namespace::new("globalCode"),
            debug,
            prefixes: HashSet::new(),
        }
    }

    /// Whether symbols embed node types.
    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// Symbols of node `id`.
    pub fn node(&self, id: &NodeId) -> Result<&NodeVariableNames, NamespaceError> {
        self.nodes.get(id)
    }

    /// Mutable symbols of node `id`.
    pub fn node_mut(&mut self, id: &NodeId) -> Result<&mut NodeVariableNames, NamespaceError> {
        self.nodes.get_mut(id)
    }

    /// Registers `node` and, if `state_variables` is given, its state object
    /// and one accessor per field.
    pub fn declare_node(
        &mut self,
        node: &Node,
        state_variables: Option<&[&str]>,
    ) -> Result<&mut NodeVariableNames, NamespaceError> {
        let prefix = self.node_prefix(node)?;
        if !self.prefixes.insert(prefix.clone()) {
            return Err(NamespaceError::AlreadyAssigned {
                namespace: "nodes".to_owned(),
                key: prefix,
            });
        }
        let mut names = NodeVariableNames::new(&node.id, prefix);
        if let Some(fields) = state_variables {
            let state_name = format!("{}_STATE", names.prefix);
            for field in fields {
                names.state.declare(field, format!("{state_name}.{field}"))?;
            }
            names.state_name = Some(state_name);
        }
        self.nodes.declare(&node.id, names)
    }

    /// Declares the function of cold group `index` (`COLD_<index>`).
    pub fn declare_cold_dsp_group(&mut self, index: usize) -> Result<String, NamespaceError> {
        self.cold_dsp_groups
            .declare(index, format!("COLD_{index}"))
            .cloned()
    }

    /// Declares the listener of outlet `outlet` of node `node_id`.
    pub fn declare_outlet_listener(
        &mut self,
        node_id: &NodeId,
        outlet: PortletId,
    ) -> Result<String, NamespaceError> {
        assert_valid_name_part(node_id.as_str())?;
        self.outlet_listeners
            .get_or_declare_with(node_id, || {
                Namespace::new(format!("outletListeners.{node_id}"))
            })
            .declare(outlet, format!("outletListener_{node_id}_{outlet}"))
            .cloned()
    }

    /// Declares the caller of inlet `inlet` of node `node_id`.
    pub fn declare_inlet_caller(
        &mut self,
        node_id: &NodeId,
        inlet: PortletId,
    ) -> Result<String, NamespaceError> {
        assert_valid_name_part(node_id.as_str())?;
        self.inlet_callers
            .get_or_declare_with(node_id, || Namespace::new(format!("inletCallers.{node_id}")))
            .declare(inlet, format!("inletCaller_{node_id}_{inlet}"))
            .cloned()
    }

    /// Returns the global code symbol `<namespace>_<key>`, declaring it on first use.
    pub fn global_code_symbol(&mut self, namespace: &str, key: &str) -> Result<String, NamespaceError> {
        assert_valid_name_part(namespace)?;
        assert_valid_name_part(key)?;
        Ok(self
            .global_code
            .get_or_declare_with(namespace, || {
                Namespace::new(format!("globalCode.{namespace}"))
            })
            .get_or_declare_with(key, || format!("{namespace}_{key}"))
            .clone())
    }

    fn node_prefix(&self, node: &Node) -> Result<String, NamespaceError> {
        assert_valid_name_part(node.id.as_str())?;
        let node_type = sanitize_node_type(&node.node_type);
        let prefix = if self.debug && !node_type.is_empty() {
            format!("{node_type}_{}", node.id)
        } else {
            node.id.to_string()
        };
        if prefix.starts_with(|c: char| c.is_ascii_digit()) {
            return Ok(format!("n_{prefix}"));
        }
        Ok(prefix)
    }
}

/// `~` becomes `_t`, other characters outside `[A-Za-z0-9_]` are dropped.
fn sanitize_node_type(node_type: &str) -> String {
    let mut out = String::with_capacity(node_type.len() + 1);
    for c in node_type.chars() {
        match c {
            '~' => out.push_str("_t"),
            c if c.is_ascii_alphanumeric() || c == '_' => out.push(c),
            _ => {}
        }
    }
    out
}
