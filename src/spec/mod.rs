//! # Spec Module
//!
//! Ingestion of OpenAPI documents and derivation of operation descriptors.
//!
//! ## Overview
//!
//! - [`load_document`] reads a single YAML or JSON document into a JSON value
//! - [`merge_all`] / [`merge_all_in_directory`] combine several documents into
//!   one [`MergedSpec`]
//! - [`build_operations`] turns the merged contract into [`OperationMeta`]
//!   descriptors, one per `path x verb` carrying an `operationId`
//!
//! Operation identifiers use the form `<controller>.<method>`. Anything that
//! does not split into exactly two non-empty parts aborts startup with
//! [`SpecLoadError::MalformedOperationId`].
//!
//! ## Merge policy
//!
//! The first document is the base. Later documents contribute their paths
//! (each path owned by one document), union their `servers`, `tags` and
//! `security` lists, and override component entries key by key. `info` is
//! first-non-null.
//!
//! ## Example
//!
//! ```rust,ignore
//! use openapi_dispatcher::spec::{build_operations, merge_all};
//!
//! let merged = merge_all(&["api/users.yaml", "api/orders.yaml"])?;
//! for op in build_operations(&merged)? {
//!     println!("{} {} -> {}", op.method, op.path_template, op.operation_id);
//! }
//! ```

mod build;
mod load;
mod merge;
mod types;

pub use build::*;
pub use load::*;
pub use merge::*;
pub use types::*;

use std::fmt;
use std::path::PathBuf;

/// Startup error raised while reading, merging or interpreting documents.
#[derive(Debug)]
pub enum SpecLoadError {
    /// The document could not be read from disk
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The document is not valid YAML/JSON
    Parse { path: PathBuf, message: String },
    /// Two documents define the same path differently
    DuplicatePath {
        path: String,
        first: String,
        second: String,
    },
    /// The merged document does not fit the OpenAPI model
    InvalidDocument { message: String },
    /// No document was supplied
    NoDocuments,
    /// An `operationId` that is not `<controller>.<method>`
    MalformedOperationId {
        operation_id: String,
        method: String,
        path: String,
    },
}

impl fmt::Display for SpecLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecLoadError::Io { path, source } => {
                write!(f, "failed to read spec '{}': {}", path.display(), source)
            }
            SpecLoadError::Parse { path, message } => {
                write!(f, "failed to parse spec '{}': {}", path.display(), message)
            }
            SpecLoadError::DuplicatePath {
                path,
                first,
                second,
            } => write!(
                f,
                "path '{path}' is defined by both '{first}' and '{second}'; \
                each path must be owned by a single document"
            ),
            SpecLoadError::InvalidDocument { message } => {
                write!(f, "merged document is not a valid OpenAPI description: {message}")
            }
            SpecLoadError::NoDocuments => write!(f, "no specification documents supplied"),
            SpecLoadError::MalformedOperationId {
                operation_id,
                method,
                path,
            } => write!(
                f,
                "operationId '{operation_id}' on {method} {path} must have the form \
                '<controller>.<method>'"
            ),
        }
    }
}

impl std::error::Error for SpecLoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SpecLoadError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}
