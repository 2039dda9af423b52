//! # CLI Module
//!
//! Command-line tooling for inspecting and publishing the merged API contract.
//!
//! ## Commands
//!
//! ### `routes`
//!
//! Print the operation table of the merged documents:
//!
//! ```bash
//! dispatch-cli routes --spec users.yaml --spec orders.yaml
//! dispatch-cli routes --spec-dir ./api --format json
//! ```
//!
//! ### `merge`
//!
//! Write the merged document. The output format follows the file extension
//! (`.json` for JSON, YAML otherwise):
//!
//! ```bash
//! dispatch-cli merge --spec-dir ./api --out merged.yaml
//! ```
//!
//! When neither `--spec` nor `--spec-dir` is given, `spec_dir` from the
//! configuration (`--config` / `DISPATCH_CONFIG` file, or `DISPATCH_SPEC_DIR`) is used.

mod commands;

#[cfg(test)]
mod tests;

pub use commands::{run, run_cli, Cli, Commands, OutputFormat, RouteRow, SpecSource};
