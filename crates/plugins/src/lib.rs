//! Built-in components for Tributary pipelines.
//!
//! Every component in this crate registers itself through the core's
//! `inventory`-based registration, so linking the crate is enough for
//! [`tributary_core::registry::Registry::with_builtins`] to find them.
//!
//! # Sources
//!
//! - `timestamp` - current time in selectable representations
//! - `env` - environment variables, pattern filtered and typed
//! - `user` - uid and login name of the executing process
//! - `cpu` - processor count and load percentages
//! - `git` - repository root, branch and revision
//! - `json` - contents of a local JSON file
//!
//! # Aggregators
//!
//! - `filter` - prune the bundle with include/exclude key-path patterns
//! - `expander` - splice one entry's children into the bundle top level
//!
//! # Sinks
//!
//! - `archive` - write the bundle to a JSON file
//! - `print` - pretty-print the bundle to stdout
//!
//! Sinks share the filter options described in [`sinks`]: `include`,
//! `include_files`, `exclude` and `exclude_files` prune the bundle copy a
//! sink receives before it distributes the data.

pub mod aggregators;
pub mod filter;
pub mod sinks;
pub mod sources;
