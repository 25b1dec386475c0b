//! Property maps and LDAP-style filters for the modulith runtime.
//!
//! This crate provides the predicate language the service and listener
//! registries are built on:
//!
//! - **[`Value`]** -- dynamically-typed property values (strings, integers,
//!   floats, booleans, lists) with the coercion rules filter comparison
//!   requires.
//! - **[`Properties`]** -- an ordered, case-insensitive string-keyed map of
//!   values.
//! - **[`Filter`]** -- a parsed LDAP-style boolean predicate over a property
//!   map, with wildcard substring matching, a normalized textual form, and
//!   the *simple filter* analysis ([`Filter::is_simple`]) that lets callers
//!   build value-keyed lookup caches instead of scanning.
//! - **[`FilterError`]** -- the four-way parse-error taxonomy (empty query,
//!   trailing garbage, abrupt end, malformed syntax).
//!
//! Parsed filters are immutable and cheap to clone; a single tree can be
//! shared across threads freely.

pub mod error;
pub mod expr;
pub mod properties;
pub mod value;

// Re-export the most commonly used types at the crate root for convenience.
pub use error::{FilterError, Result};
pub use expr::{Filter, SimpleCache};
pub use properties::Properties;
pub use value::{CompareOp, Value};
