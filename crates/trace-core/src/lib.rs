pub mod augment;
pub mod builtin;
pub mod config;
pub mod discovery;
pub mod environment;
pub mod pipeline;
pub mod registry;
pub mod store;
pub mod transform;

pub use pipeline::TracePipeline;
pub use registry::{PluginRegistry, RegisteredPlugin};
pub use store::{TraceRecord, TraceStore};
pub use transform::TransformOutcome;

/// Returns the crate version baked in at compile time.
pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
