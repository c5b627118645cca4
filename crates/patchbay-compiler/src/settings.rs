//! Compilation settings.
//!
//! Settings can be built programmatically or loaded from TOML:
//!
//! ```toml
//! target = "assemblyscript"
//! debug = true
//!
//! [audio]
//! bitDepth = 32
//! channelCount = { in = 1, out = 2 }
//!
//! [io.messageReceivers]
//! n_0_1 = [0]
//!
//! [arrays]
//! table = [0.0, 0.5, 1.0]
//! ```
//!
//! Every field has a default, so an empty file is valid.

use std::collections::BTreeMap;
use std::path::Path;

use patchbay_graph::{Graph, NodeId, PortletId, PortletKind};
use serde::{Deserialize, Serialize};

use crate::error::{CompileError, ConfigError};

/// Node id → portlet ids.
pub type PortletSpecs = BTreeMap<NodeId, Vec<PortletId>>;

/// Platform the generated code is rendered for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// JavaScript.
    #[default]
    JavaScript,
    /// AssemblyScript, compiled to WebAssembly.
    AssemblyScript,
}

/// Width of floating point samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum BitDepth {
    /// `f32`
    Float32,
    /// `f64`
    #[default]
    Float64,
}

impl TryFrom<u32> for BitDepth {
    type Error = ConfigError;

    fn try_from(bits: u32) -> Result<Self, Self::Error> {
        match bits {
            32 => Ok(BitDepth::Float32),
            64 => Ok(BitDepth::Float64),
            other => Err(ConfigError::InvalidBitDepth(other)),
        }
    }
}

impl From<BitDepth> for u32 {
    fn from(depth: BitDepth) -> Self {
        match depth {
            BitDepth::Float32 => 32,
            BitDepth::Float64 => 64,
        }
    }
}

/// Number of audio input and output channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelCount {
    /// Input channels.
    #[serde(rename = "in")]
    pub input: u32,
    /// Output channels.
    #[serde(rename = "out")]
    pub output: u32,
}

impl Default for ChannelCount {
    fn default() -> Self {
        Self {
            input: 2,
            output: 2,
        }
    }
}

/// Audio format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AudioSettings {
    /// Sample width.
    pub bit_depth: BitDepth,
    /// Channel layout.
    pub channel_count: ChannelCount,
}

/// Message portlets exposed to the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IoSettings {
    /// Inlets the host can send messages to.
    pub message_receivers: PortletSpecs,
    /// Outlets the host observes.
    pub message_senders: PortletSpecs,
}

/// Everything that parameterizes one compilation besides the graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompilationSettings {
    /// Render target.
    pub target: Target,
    /// Audio format.
    pub audio: AudioSettings,
    /// Host-facing message portlets.
    pub io: IoSettings,
    /// Named sample buffers embedded in the generated code.
    pub arrays: BTreeMap<String, Vec<f32>>,
    /// Readable symbols and extra runtime hints.
    pub debug: bool,
    /// Message outlets that get an externally observable listener.
    pub outlet_listener_specs: PortletSpecs,
    /// Message inlets that get an externally invocable caller.
    pub inlet_caller_specs: PortletSpecs,
}

impl CompilationSettings {
    /// Default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        let settings = Self::from_toml(&content)?;
        tracing::debug!("settings_load: {}", path.display());
        Ok(settings)
    }

    /// Load settings from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Save settings to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))?;
        Ok(())
    }

    /// Convert settings to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Set the render target.
    pub fn with_target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    /// Enable or disable debug mode.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Set the sample width.
    pub fn with_bit_depth(mut self, bit_depth: BitDepth) -> Self {
        self.audio.bit_depth = bit_depth;
        self
    }

    /// Register an inlet caller.
    pub fn with_inlet_caller(mut self, node_id: impl Into<NodeId>, inlet: impl Into<PortletId>) -> Self {
        push_spec(&mut self.inlet_caller_specs, node_id.into(), inlet.into());
        self
    }

    /// Register an outlet listener.
    pub fn with_outlet_listener(
        mut self,
        node_id: impl Into<NodeId>,
        outlet: impl Into<PortletId>,
    ) -> Self {
        push_spec(&mut self.outlet_listener_specs, node_id.into(), outlet.into());
        self
    }

    /// Embed a named sample buffer.
    pub fn with_array(mut self, name: impl Into<String>, samples: Vec<f32>) -> Self {
        self.arrays.insert(name.into(), samples);
        self
    }

    /// Inlet caller specs merged with `io.messageReceivers`.
    pub fn effective_inlet_callers(&self) -> PortletSpecs {
        merge_specs(&self.inlet_caller_specs, &self.io.message_receivers)
    }

    /// Outlet listener specs merged with `io.messageSenders`.
    pub fn effective_outlet_listeners(&self) -> PortletSpecs {
        merge_specs(&self.outlet_listener_specs, &self.io.message_senders)
    }

    /// Checks that every caller targets a message inlet and every listener a
    /// message outlet of an existing node.
    pub fn validate_portlet_specs(&self, graph: &Graph) -> Result<(), CompileError> {
        for (node_id, inlets) in &self.effective_inlet_callers() {
            let node = graph.node(node_id.as_str())?;
            for &inlet in inlets {
                if node.inlet(inlet)?.kind != PortletKind::Message {
                    return Err(CompileError::InvalidPortletSpec {
                        role: "inlet caller",
                        node_id: node_id.clone(),
                        portlet_id: inlet,
                        reason: "not a message inlet".to_string(),
                    });
                }
            }
        }
        for (node_id, outlets) in &self.effective_outlet_listeners() {
            let node = graph.node(node_id.as_str())?;
            for &outlet in outlets {
                if node.outlet(outlet)?.kind != PortletKind::Message {
                    return Err(CompileError::InvalidPortletSpec {
                        role: "outlet listener",
                        node_id: node_id.clone(),
                        portlet_id: outlet,
                        reason: "not a message outlet".to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn push_spec(specs: &mut PortletSpecs, node_id: NodeId, portlet: PortletId) {
    let portlets = specs.entry(node_id).or_default();
    if !portlets.contains(&portlet) {
        portlets.push(portlet);
    }
}

fn merge_specs(a: &PortletSpecs, b: &PortletSpecs) -> PortletSpecs {
    let mut merged = a.clone();
    for (node_id, portlets) in b {
        for &portlet in portlets {
            push_spec(&mut merged, node_id.clone(), portlet);
        }
    }
    merged
}
