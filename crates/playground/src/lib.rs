//! JavaScript playground: runs snippets in the sandbox from the command line.

pub mod render;

pub use render::{render_json, render_location, render_record, Renderer};

/// Playground version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
