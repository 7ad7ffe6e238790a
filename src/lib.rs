#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::assigning_clones,
    clippy::doc_markdown,
    clippy::float_cmp,
    clippy::items_after_statements,
    clippy::map_unwrap_or,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::needless_pass_by_value,
    clippy::redundant_closure_for_method_calls,
    clippy::return_self_not_must_use,
    clippy::single_match_else,
    clippy::too_many_lines,
    clippy::uninlined_format_args,
    clippy::unused_self,
    dead_code
)]

pub mod agent;
pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod memory;
pub mod providers;
pub mod security;
pub mod sessions;
pub mod tools;

pub use config::Config;
pub use error::{ErrorKind, GateError};
