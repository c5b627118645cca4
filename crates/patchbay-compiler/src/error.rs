//! Error types for settings loading and precompilation.

use std::path::PathBuf;

use patchbay_graph::{GraphError, NodeId, PortletId};
use thiserror::Error;

use crate::namespace::NamespaceError;

/// Errors that abort a precompilation.
///
/// There is no partial-success mode: the first error stops the pipeline.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompileError {
    /// Graph integrity or lookup error.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Symbol table misuse (unknown key, double assignment, invalid name).
    #[error(transparent)]
    Namespace(#[from] NamespaceError),

    /// No implementation is registered for a node type.
    #[error("unknown node type '{node_type}'")]
    UnknownNodeType {
        /// The missing type tag.
        node_type: String,
    },

    /// A node initializes state but its type declares no state shape.
    #[error("node '{node_id}' of type '{node_type}' declares state but its type has no state variables")]
    MissingStateShape {
        /// Offending node.
        node_id: NodeId,
        /// Its type.
        node_type: String,
    },

    /// A state initializer targets a field outside the declared state shape.
    #[error("node '{node_id}' initializes undeclared state variable '{field}'")]
    UnknownStateVariable {
        /// Offending node.
        node_id: NodeId,
        /// The undeclared field.
        field: String,
    },

    /// An inlet-caller or outlet-listener spec targets a portlet that cannot carry it.
    #[error("invalid {role} spec for {node_id}:{portlet_id}: {reason}")]
    InvalidPortletSpec {
        /// `"inlet caller"` or `"outlet listener"`.
        role: &'static str,
        /// Target node.
        node_id: NodeId,
        /// Target portlet.
        portlet_id: PortletId,
        /// Why the spec was rejected.
        reason: String,
    },
}

/// Errors that can occur while loading or saving compilation settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    ReadFile {
        /// Path of the file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to write a file
    #[error("failed to write file '{path}': {source}")]
    WriteFile {
        /// Path of the file that could not be written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Failed to serialize TOML
    #[error("failed to serialize TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// Bit depth other than 32 or 64
    #[error("unsupported bit depth {0} (expected 32 or 64)")]
    InvalidBitDepth(u32),
}

impl ConfigError {
    /// Create a read file error.
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::ReadFile {
            path: path.into(),
            source,
        }
    }

    /// Create a write file error.
    pub fn write_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::WriteFile {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    fn mock_io_err() -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::NotFound, "mock")
    }

    #[test]
    fn read_file_display_and_source() {
        let err = ConfigError::read_file("/a/b.toml", mock_io_err());
        let msg = err.to_string();
        assert!(msg.contains("failed to read file"), "got: {msg}");
        assert!(msg.contains("/a/b.toml"), "got: {msg}");
        assert!(err.source().is_some(), "ReadFile must expose I/O source");
    }

    #[test]
    fn write_file_factory_produces_correct_variant() {
        let err = ConfigError::write_file("/out/path", mock_io_err());
        assert!(
            matches!(err, ConfigError::WriteFile { ref path, .. } if path == std::path::Path::new("/out/path"))
        );
    }

    #[test]
    fn graph_errors_pass_through_unchanged() {
        let err: CompileError = GraphError::UnknownNode(NodeId::from("n9")).into();
        assert_eq!(err.to_string(), "node 'n9' not found");
    }

    #[test]
    fn unknown_node_type_names_the_type() {
        let err = CompileError::UnknownNodeType {
            node_type: "lop~".to_string(),
        };
        assert_eq!(err.to_string(), "unknown node type 'lop~'");
    }

    #[test]
    fn invalid_portlet_spec_display() {
        let err = CompileError::InvalidPortletSpec {
            role: "inlet caller",
            node_id: NodeId::from("osc"),
            portlet_id: PortletId(0),
            reason: "not a message inlet".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid inlet caller spec for osc:0: not a message inlet"
        );
    }
}
