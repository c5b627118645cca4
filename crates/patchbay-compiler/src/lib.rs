//! Patchbay Compiler - target-agnostic precompiler for patch graphs
//!
//! Turns a [`patchbay_graph::Graph`] into a [`PrecompiledCode`] structure that
//! a renderer can emit as JavaScript or AssemblyScript without making any
//! further decisions: every portlet is resolved to a symbol, the signal graph
//! is split into a per-frame (hot) loop and message-triggered (cold)
//! functions, and shared global code is flattened and deduplicated.
//!
//! # Core Abstractions
//!
//! - [`precompile`] - the pipeline entry point
//! - [`NodeImplementation`] / [`NodeImplementations`] - per-type code generators
//! - [`CompilationSettings`] - target, audio format, host entry points (TOML-loadable)
//! - [`Namespace`] / [`VariableNamesIndex`] - write-once symbol tables
//! - [`GlobalCodeDefinition`] - shared code with its own dependencies
//! - [`Sequence`] - the code AST, structurally comparable
//!
//! # Example
//!
//! ```rust
//! use patchbay_compiler::{
//!     CompilationSettings, NodeContext, NodeImplementation, NodeImplementations, Sequence,
//!     precompile, CompileError,
//! };
//! use patchbay_graph::{ConnectionEndpoint, Graph, Node, PortletId, PortletKind};
//!
//! struct Osc;
//! impl NodeImplementation for Osc {
//!     fn dsp_loop(&self, ctx: &NodeContext<'_>) -> Result<Sequence, CompileError> {
//!         let out = ctx.names.signal_outs.get(0)?;
//!         Ok(Sequence::text(format!("{out} = Math.sin({})\n", ctx.globs.frame)))
//!     }
//! }
//!
//! struct Dac;
//! impl NodeImplementation for Dac {}
//!
//! let mut graph = Graph::new();
//! graph.add_node(Node::new("osc", "osc~").with_outlet(0, PortletKind::Signal))?;
//! graph.add_node(Node::new("dac", "dac~").with_inlet(0, PortletKind::Signal).pulling_signal())?;
//! graph.connect(&ConnectionEndpoint::new("osc", 0), &ConnectionEndpoint::new("dac", 0))?;
//!
//! let implementations = NodeImplementations::new().with("osc~", Osc).with("dac~", Dac);
//! let output = precompile(graph, &implementations, &CompilationSettings::default())?;
//!
//! let dac = output.precompiled_code.node("dac").unwrap();
//! assert_eq!(dac.signal_ins[&PortletId(0)], "osc_OUTS_0");
//! assert_eq!(
//!     output.precompiled_code.graph().hot_dsp_loop.to_string(),
//!     "osc_OUTS_0 = Math.sin(FRAME)\n"
//! );
//! # Ok::<(), CompileError>(())
//! ```

pub mod ast;
pub mod dependencies;
mod error;
mod implementation;
pub mod namespace;
mod precompile;
mod precompiled_code;
mod settings;
mod variable_names;

pub use ast::{AstElement, Func, Sequence, TypeName, VarDeclaration, Variable};
pub use dependencies::{
    ExportSpec, GlobalCodeContext, GlobalCodeDefinition, GlobalCodeScope, ImportSpec,
};
pub use error::{CompileError, ConfigError};
pub use implementation::{NodeContext, NodeImplementation, NodeImplementations};
pub use namespace::{Namespace, NamespaceError};
pub use precompile::{PrecompilationOutput, precompile};
pub use precompiled_code::{
    ColdDspGroup, Dependencies, DspGroup, InletCaller, MessageReceiver, MessageSender, NodeDsp,
    OutletListener, PrecompiledCode, PrecompiledGraph, PrecompiledNode, SenderKind,
    StateDeclaration,
};
pub use settings::{
    AudioSettings, BitDepth, ChannelCount, CompilationSettings, IoSettings, PortletSpecs, Target,
};
pub use variable_names::{GlobalVariableNames, NodeVariableNames, VariableNamesIndex};
