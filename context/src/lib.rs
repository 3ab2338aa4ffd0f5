//! Context gathering for compiler-error analysis.
//!
//! Parses an error message for locations, identifiers and template
//! instantiations, then enriches them with source snippets, live
//! language-server lookups, and optional structural search into one
//! [`GatheredContext`] bundle.

pub mod format;
pub mod gather;
pub mod parse;
pub mod refs;
pub mod snippet;

pub(crate) mod search;

pub use format::format_context;
pub use gather::{GatherOptions, GatheredContext, gather_context};
pub use parse::{
    ErrorLocation, TemplateInstantiation, parse_error_identifiers, parse_error_locations,
    parse_template_instantiations,
};
