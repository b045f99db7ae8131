use bruno_trace_plugin_sdk::{RequestDescriptor, ResponseDescriptor};

use crate::{
    registry::PluginRegistry,
    store::{TraceRecord, TraceStore},
};

/// Ties the registry to a trace store for one request/response cycle.
pub struct TracePipeline<'a> {
    registry: &'a PluginRegistry,
    store: &'a mut TraceStore,
}

impl<'a> TracePipeline<'a> {
    pub fn new(registry: &'a PluginRegistry, store: &'a mut TraceStore) -> Self {
        Self { registry, store }
    }

    /// Augments an outgoing request before it is sent.
    pub fn prepare(&self, plugin_id: &str, request: &RequestDescriptor) -> RequestDescriptor {
        self.registry.apply_trace_config(plugin_id, request)
    }

    /// Transforms a received response, records it under `request_id` and
    /// returns the response to display. Nothing is recorded for unknown plugins.
    pub fn capture(
        &mut self,
        plugin_id: &str,
        request_id: &str,
        response: &ResponseDescriptor,
    ) -> ResponseDescriptor {
        let display = self
            .registry
            .transform_response(plugin_id, response)
            .into_response();
        if let Some(plugin) = self.registry.get(plugin_id) {
            self.store
                .record(TraceRecord::capture(request_id, plugin, &display));
            tracing::debug!(plugin = plugin_id, request = request_id, "trace captured");
        }
        display
    }

    pub fn latest(&self, request_id: &str) -> Option<&TraceRecord> {
        self.store.latest(request_id)
    }
}
