//! Plugins shipped with the application.

mod bff_debug;

use bruno_trace_plugin_sdk::PluginDefinition;

pub use bff_debug::{bff_debug, transform_bff_response, BFF_DEBUG_ID};

pub fn definitions() -> Vec<PluginDefinition> {
    vec![bff_debug()]
}
