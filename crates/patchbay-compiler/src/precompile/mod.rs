//! The precompilation pipeline.
//!
//! [`precompile`] takes ownership of a graph and runs the phases below on a
//! single [`Precompilation`] object, which owns the variable names index and
//! the in-progress [`PrecompiledCode`]:
//!
//! 1. validate inlet-caller / outlet-listener specs
//! 2. declare traversal, trim everything else
//! 3. resolve every node's implementation
//! 4. hot/cold partition of the signal graph
//! 5. assign node, cold group, listener and caller names
//! 6. precompile portlets: signal outlets, signal inlets, message inlets,
//!    message outlets, inlet callers
//! 7. generate node code (state, initialization, loop, inlet dsp, receivers)
//! 8. assemble the hot loop and cold functions
//! 9. resolve global code dependencies
//!
//! The first error aborts the compilation.

mod dsp_groups;
mod portlets;

use std::collections::BTreeMap;
use std::sync::Arc;

use patchbay_graph::{Graph, NodeId, declare_traversal, trim_graph};
use serde::Serialize;

use crate::dependencies::{
    GlobalCodeDefinition, collect_and_dedupe_exports, collect_and_dedupe_imports,
    flatten_dependencies, instantiate_and_dedupe_dependencies,
};
use crate::error::CompileError;
use crate::implementation::{NodeContext, NodeImplementation, NodeImplementations};
use crate::precompiled_code::{
    Dependencies, OutletListener, PrecompiledCode, PrecompiledNode, StateDeclaration,
};
use crate::settings::{CompilationSettings, PortletSpecs};
use crate::variable_names::VariableNamesIndex;

use dsp_groups::DspPartition;

/// Result of [`precompile`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrecompilationOutput {
    /// The frozen code structure.
    pub precompiled_code: PrecompiledCode,
    /// Every symbol assigned during the compilation.
    pub variable_names_index: VariableNamesIndex,
}

/// Compiles `graph` into a target-agnostic code structure.
///
/// # Errors
///
/// Fails on invalid caller/listener specs, unknown node types, state
/// declarations that do not match their type's state shape, and symbol
/// table misuse by node implementations.
pub fn precompile(
    graph: Graph,
    implementations: &NodeImplementations,
    settings: &CompilationSettings,
) -> Result<PrecompilationOutput, CompileError> {
    Precompilation::new(graph, implementations, settings).run()
}

/// State of one running compilation.
struct Precompilation<'a> {
    graph: Graph,
    implementations: &'a NodeImplementations,
    settings: &'a CompilationSettings,
    inlet_callers: PortletSpecs,
    outlet_listeners: PortletSpecs,
    names: VariableNamesIndex,
    code: PrecompiledCode,
    partition: DspPartition,
    dependencies: Vec<Arc<GlobalCodeDefinition>>,
}

impl<'a> Precompilation<'a> {
    fn new(
        graph: Graph,
        implementations: &'a NodeImplementations,
        settings: &'a CompilationSettings,
    ) -> Self {
        Self {
            graph,
            implementations,
            settings,
            inlet_callers: settings.effective_inlet_callers(),
            outlet_listeners: settings.effective_outlet_listeners(),
            names: VariableNamesIndex::new(settings.debug),
            code: PrecompiledCode::default(),
            partition: DspPartition::default(),
            dependencies: Vec::new(),
        }
    }

    fn run(mut self) -> Result<PrecompilationOutput, CompileError> {
        self.settings.validate_portlet_specs(&self.graph)?;
        self.build_traversal()?;
        self.check_implementations()?;
        self.partition = dsp_groups::partition(&self.graph, self.implementations)?;
        self.assign_names()?;

        self.precompile_signal_outlets()?;
        self.precompile_signal_inlets()?;
        self.precompile_message_inlets()?;
        self.precompile_message_outlets()?;
        self.precompile_inlet_callers()?;

        self.generate_node_code()?;
        self.assemble_dsp()?;
        self.resolve_dependencies()?;

        tracing::debug!(
            "precompile: done, {} nodes, {} cold groups, {} dependency fragments",
            self.code.nodes.len(),
            self.code.graph.cold_dsp_groups.len(),
            self.code.dependencies.ast.elements().len()
        );
        Ok(PrecompilationOutput {
            precompiled_code: self.code,
            variable_names_index: self.names,
        })
    }

    fn build_traversal(&mut self) -> Result<(), CompileError> {
        let seeds: Vec<NodeId> = self.inlet_callers.keys().cloned().collect();
        let traversal = declare_traversal(&self.graph, &seeds)?;
        let before = self.graph.len();
        trim_graph(&mut self.graph, &traversal);
        tracing::debug!(
            "precompile_traversal: {} nodes kept, {} trimmed",
            traversal.len(),
            before - self.graph.len()
        );
        self.code.graph.full_traversal = traversal;
        Ok(())
    }

    fn check_implementations(&self) -> Result<(), CompileError> {
        for node in self.graph.iter() {
            self.implementations.get(&node.node_type)?;
        }
        Ok(())
    }

    fn assign_names(&mut self) -> Result<(), CompileError> {
        for id in &self.code.graph.full_traversal {
            let node = self.graph.node(id.as_str())?;
            let implementation = self.implementations.get(&node.node_type)?;
            self.names
                .declare_node(node, implementation.state_variables())?;
            self.code
                .nodes
                .insert(id.clone(), PrecompiledNode::new(node.node_type.clone()));
        }

        for index in 0..self.partition.cold.len() {
            self.names.declare_cold_dsp_group(index)?;
        }

        for (node_id, outlets) in &self.outlet_listeners {
            if !self.graph.contains(node_id.as_str()) {
                tracing::debug!("precompile_names: listener on unreachable node '{node_id}' skipped");
                continue;
            }
            for &outlet in outlets {
                let name = self.names.declare_outlet_listener(node_id, outlet)?;
                self.code.graph.outlet_listeners.push(OutletListener {
                    node_id: node_id.clone(),
                    portlet_id: outlet,
                    name,
                });
            }
        }

        for (node_id, inlets) in &self.inlet_callers {
            for &inlet in inlets {
                self.names.declare_inlet_caller(node_id, inlet)?;
            }
        }
        Ok(())
    }

    fn generate_node_code(&mut self) -> Result<(), CompileError> {
        for id in &self.code.graph.full_traversal {
            let node = self.graph.node(id.as_str())?;
            let implementation = self.implementations.get(&node.node_type)?;
            let ctx = NodeContext {
                node,
                names: self.names.node(id)?,
                globs: &self.names.globs,
                settings: self.settings,
            };

            let state = node_state(implementation, &ctx)?;
            let initialization = implementation.declare(&ctx)?;
            let loop_code = implementation.dsp_loop(&ctx)?;
            let inlets = implementation.inlet_dsp(&ctx)?;
            for &inlet in inlets.keys() {
                node.inlet(inlet)?;
            }
            let bodies = implementation.message_receivers(&ctx)?;

            let precompiled = node_entry(&mut self.code.nodes, id)?;
            precompiled.state = state;
            precompiled.initialization = initialization;
            precompiled.dsp.loop_code = loop_code;
            precompiled.dsp.inlets = inlets;
            for (inlet, body) in bodies {
                match precompiled.message_receivers.get_mut(&inlet) {
                    Some(receiver) => receiver.body = Some(body),
                    None => tracing::trace!(
                        "precompile_nodes: {id}:{inlet} has no receiver, body ignored"
                    ),
                }
            }

            self.dependencies.extend(implementation.dependencies());
        }
        Ok(())
    }

    fn assemble_dsp(&mut self) -> Result<(), CompileError> {
        let function_names = (0..self.partition.cold.len())
            .map(|index| self.names.cold_dsp_groups.get(index).cloned())
            .collect::<Result<Vec<_>, _>>()?;
        let dsp = dsp_groups::assemble(
            &self.partition,
            &function_names,
            &self.code.nodes,
            &self.names.globs,
        )?;
        let graph = &mut self.code.graph;
        graph.hot_dsp_group = self.partition.hot.clone();
        graph.cold_dsp_groups = dsp.cold_groups;
        graph.hot_dsp_loop = dsp.hot_loop;
        graph.cold_dsp_initialization = dsp.cold_initialization;
        Ok(())
    }

    fn resolve_dependencies(&mut self) -> Result<(), CompileError> {
        let flat = flatten_dependencies(&self.dependencies);
        let ast = instantiate_and_dedupe_dependencies(&flat, &mut self.names, self.settings)?;
        tracing::debug!(
            "precompile_dependencies: {} definitions flattened",
            flat.len()
        );
        self.code.dependencies = Dependencies {
            ast,
            imports: collect_and_dedupe_imports(&flat),
            exports: collect_and_dedupe_exports(&flat, self.settings.target),
        };
        Ok(())
    }
}

/// Checks the state initializers of a node against its type's state shape.
fn node_state(
    implementation: &dyn NodeImplementation,
    ctx: &NodeContext<'_>,
) -> Result<Option<StateDeclaration>, CompileError> {
    let initializations = implementation.state(ctx)?;
    let Some(name) = ctx.names.state_name.clone() else {
        if initializations.is_empty() {
            return Ok(None);
        }
        return Err(CompileError::MissingStateShape {
            node_id: ctx.node.id.clone(),
            node_type: ctx.node.node_type.clone(),
        });
    };
    if let Some(field) = initializations.keys().find(|f| !ctx.names.state.contains(f)) {
        return Err(CompileError::UnknownStateVariable {
            node_id: ctx.node.id.clone(),
            field: field.clone(),
        });
    }
    Ok(Some(StateDeclaration {
        name,
        initializations,
    }))
}

fn node_entry<'n>(
    nodes: &'n mut BTreeMap<NodeId, PrecompiledNode>,
    id: &NodeId,
) -> Result<&'n mut PrecompiledNode, CompileError> {
    nodes
        .get_mut(id)
        .ok_or_else(|| patchbay_graph::GraphError::UnknownNode(id.clone()).into())
}
