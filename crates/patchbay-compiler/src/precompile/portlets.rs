//! Portlet precompilation: what each inlet and outlet resolves to.
//!
//! | Portlet | Resolves to |
//! |---|---|
//! | signal outlet | its own `<prefix>_OUTS_<p>` variable |
//! | signal inlet, connected | the source outlet's variable |
//! | signal inlet, unconnected | the null signal |
//! | message inlet with sources or an inlet caller | a `<prefix>_RCVS_<p>` receiver |
//! | message outlet with a listener or several sink functions | a synthesized `<prefix>_SNDS_<p>` |
//! | message outlet with one sink function | that function, directly |
//! | message outlet with no sink function | the null receiver |
//!
//! Passes run in the order of the table, so every name a pass reads was
//! declared by an earlier pass.

use patchbay_graph::PortletKind;

use crate::error::CompileError;
use crate::precompiled_code::{
    InletCaller, MessageReceiver, MessageSender, SenderKind, forwarding_function,
};

use super::{Precompilation, node_entry};

impl Precompilation<'_> {
    pub(super) fn precompile_signal_outlets(&mut self) -> Result<(), CompileError> {
        for id in &self.code.graph.full_traversal {
            let node = self.graph.node(id.as_str())?;
            let names = self.names.node_mut(id)?;
            let precompiled = node_entry(&mut self.code.nodes, id)?;
            for outlet in node.outlets_of_kind(PortletKind::Signal) {
                let symbol = names.signal_out_symbol(outlet.id);
                names.signal_outs.declare(outlet.id, symbol.clone())?;
                precompiled.signal_outs.insert(outlet.id, symbol);
            }
        }
        Ok(())
    }

    pub(super) fn precompile_signal_inlets(&mut self) -> Result<(), CompileError> {
        for id in &self.code.graph.full_traversal {
            let node = self.graph.node(id.as_str())?;
            for inlet in node.inlets_of_kind(PortletKind::Signal) {
                // at most one source per signal inlet
                let reference = match node.sources_of(inlet.id).first() {
                    Some(source) => self
                        .names
                        .node(&source.node_id)?
                        .signal_outs
                        .get(source.portlet_id)?
                        .clone(),
                    None => self.names.globs.null_signal.clone(),
                };
                self.names
                    .node_mut(id)?
                    .signal_ins
                    .declare(inlet.id, reference.clone())?;
                node_entry(&mut self.code.nodes, id)?
                    .signal_ins
                    .insert(inlet.id, reference);
            }
        }
        Ok(())
    }

    pub(super) fn precompile_message_inlets(&mut self) -> Result<(), CompileError> {
        for id in &self.code.graph.full_traversal {
            let node = self.graph.node(id.as_str())?;
            let callers = self.inlet_callers.get(id);
            let names = self.names.node_mut(id)?;
            let precompiled = node_entry(&mut self.code.nodes, id)?;
            for inlet in node.inlets_of_kind(PortletKind::Message) {
                let called = callers.is_some_and(|inlets| inlets.contains(&inlet.id));
                if node.sources_of(inlet.id).is_empty() && !called {
                    continue;
                }
                let name = names.receiver_symbol(inlet.id);
                names.message_receivers.declare(inlet.id, name.clone())?;
                precompiled
                    .message_receivers
                    .insert(inlet.id, MessageReceiver { name, body: None });
            }
        }
        Ok(())
    }

    pub(super) fn precompile_message_outlets(&mut self) -> Result<(), CompileError> {
        for id in &self.code.graph.full_traversal {
            let node = self.graph.node(id.as_str())?;
            let listened = self.outlet_listeners.get(id);
            for outlet in node.outlets_of_kind(PortletKind::Message) {
                let sinks = node.sinks_of(outlet.id);
                let mut functions = Vec::with_capacity(sinks.len() + 1);
                for sink in sinks {
                    let receivers = &self.names.node(&sink.node_id)?.message_receivers;
                    functions.push(receivers.get(sink.portlet_id)?.clone());
                }

                let has_listener = listened.is_some_and(|outlets| outlets.contains(&outlet.id));
                if has_listener {
                    let listeners = self.names.outlet_listeners.get(id)?;
                    functions.push(listeners.get(outlet.id)?.clone());
                }

                let mut groups: Vec<usize> = sinks
                    .iter()
                    .filter_map(|sink| self.partition.cold_group_of(&sink.node_id))
                    .collect();
                groups.sort_unstable();
                groups.dedup();
                for group in groups {
                    functions.push(self.names.cold_dsp_groups.get(group)?.clone());
                }

                let (name, kind) = if has_listener || functions.len() > 1 {
                    let names = self.names.node(id)?;
                    (names.sender_symbol(outlet.id), SenderKind::Synthesized)
                } else if let [only] = functions.as_slice() {
                    (only.clone(), SenderKind::Direct)
                } else {
                    (
                        self.names.globs.null_message_receiver.clone(),
                        SenderKind::Null,
                    )
                };
                tracing::trace!("precompile_portlets: {id}:{} → {name} ({kind:?})", outlet.id);

                self.names
                    .node_mut(id)?
                    .message_senders
                    .declare(outlet.id, name.clone())?;
                node_entry(&mut self.code.nodes, id)?.message_senders.insert(
                    outlet.id,
                    MessageSender {
                        name,
                        sink_function_names: functions,
                        kind,
                    },
                );
            }
        }
        Ok(())
    }

    pub(super) fn precompile_inlet_callers(&mut self) -> Result<(), CompileError> {
        for (node_id, inlets) in &self.inlet_callers {
            for &inlet in inlets {
                let name = self.names.inlet_callers.get(node_id)?.get(inlet)?.clone();
                let mut functions =
                    vec![self.names.node(node_id)?.message_receivers.get(inlet)?.clone()];
                if let Some(group) = self.partition.cold_group_of(node_id) {
                    functions.push(self.names.cold_dsp_groups.get(group)?.clone());
                }
                let function = forwarding_function(&name, &functions, &self.names.globs.m);
                self.code.graph.inlet_callers.push(InletCaller {
                    node_id: node_id.clone(),
                    portlet_id: inlet,
                    name,
                    sink_function_names: functions,
                    function,
                });
            }
        }
        Ok(())
    }
}
