//! Per-node-type code generators and their registry.
//!
//! A [`NodeImplementation`] produces the code of one node type. Every method
//! has a no-op default, so a type only overrides what it actually generates.
//! [`NodeImplementations`] maps type tags to implementations.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use patchbay_graph::{Node, PortletId};

use crate::ast::Sequence;
use crate::dependencies::GlobalCodeDefinition;
use crate::error::CompileError;
use crate::settings::CompilationSettings;
use crate::variable_names::{GlobalVariableNames, NodeVariableNames};

/// What an implementation sees while generating code for one node.
#[derive(Debug, Clone, Copy)]
pub struct NodeContext<'a> {
    /// The node being compiled.
    pub node: &'a Node,
    /// Its symbols. Signal inlets, receivers and senders are already resolved.
    pub names: &'a NodeVariableNames,
    /// Fixed global names.
    pub globs: &'a GlobalVariableNames,
    /// Settings of the running compilation.
    pub settings: &'a CompilationSettings,
}

/// Code generator for one node type.
pub trait NodeImplementation: Send + Sync {
    /// Field names of the per-node state object, if the type has state.
    fn state_variables(&self) -> Option<&'static [&'static str]> {
        None
    }

    /// Initial value of each state field.
    fn state(&self, _ctx: &NodeContext<'_>) -> Result<BTreeMap<String, Sequence>, CompileError> {
        Ok(BTreeMap::new())
    }

    /// Code run once when the compiled patch starts.
    fn declare(&self, _ctx: &NodeContext<'_>) -> Result<Sequence, CompileError> {
        Ok(Sequence::new())
    }

    /// Code run for every frame the node is scheduled.
    fn dsp_loop(&self, _ctx: &NodeContext<'_>) -> Result<Sequence, CompileError> {
        Ok(Sequence::new())
    }

    /// Extra code refreshing cached values derived from a signal inlet.
    fn inlet_dsp(
        &self,
        _ctx: &NodeContext<'_>,
    ) -> Result<BTreeMap<PortletId, Sequence>, CompileError> {
        Ok(BTreeMap::new())
    }

    /// Receiver bodies, by message inlet. Bodies must return on every
    /// message they handle; unhandled messages fall through to a runtime error.
    fn message_receivers(
        &self,
        _ctx: &NodeContext<'_>,
    ) -> Result<BTreeMap<PortletId, Sequence>, CompileError> {
        Ok(BTreeMap::new())
    }

    /// Global code this type relies on.
    fn dependencies(&self) -> Vec<Arc<GlobalCodeDefinition>> {
        Vec::new()
    }

    /// Whether signal outputs depend only on signal inputs and on state set by
    /// messages. Pure nodes whose inputs are also pure can be moved out of the
    /// per-frame loop.
    fn is_pure_function(&self) -> bool {
        false
    }
}

/// Registry of node implementations, keyed by node type.
#[derive(Default)]
pub struct NodeImplementations {
    entries: HashMap<String, Box<dyn NodeImplementation>>,
}

impl NodeImplementations {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an implementation, replacing any previous one for the type.
    pub fn register(
        &mut self,
        node_type: impl Into<String>,
        implementation: impl NodeImplementation + 'static,
    ) {
        self.entries
            .insert(node_type.into(), Box::new(implementation));
    }

    /// Builder form of [`register()`](Self::register).
    pub fn with(
        mut self,
        node_type: impl Into<String>,
        implementation: impl NodeImplementation + 'static,
    ) -> Self {
        self.register(node_type, implementation);
        self
    }

    /// Implementation of `node_type`.
    pub fn get(&self, node_type: &str) -> Result<&dyn NodeImplementation, CompileError> {
        match self.entries.get(node_type) {
            Some(implementation) => Ok(&**implementation),
            None => Err(CompileError::UnknownNodeType {
                node_type: node_type.to_owned(),
            }),
        }
    }

    /// Whether `node_type` is registered.
    pub fn contains(&self, node_type: &str) -> bool {
        self.entries.contains_key(node_type)
    }

    /// Returns the number of registered types.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no types are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for NodeImplementations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        types.sort_unstable();
        f.debug_struct("NodeImplementations")
            .field("types", &types)
            .finish()
    }
}
