use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    path::Path,
    sync::Arc,
};

use bruno_trace_plugin_sdk::{
    LifecycleHook, ManifestError, PluginDefinition, PluginManifest, RequestDescriptor,
    ResponseDescriptor, ResponseTransformer, TraceConfig,
};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use crate::{
    augment::augment_request,
    builtin,
    discovery::{self, DiscoveryError, DiscoveryReport},
    transform::{panic_message, run_transformer, TransformOutcome},
};

/// A plugin as stored by the registry.
#[derive(Clone)]
pub struct RegisteredPlugin {
    pub manifest: PluginManifest,
    pub registered_at: DateTime<Utc>,
    transformer: Option<Arc<dyn ResponseTransformer>>,
    on_unregister: Option<LifecycleHook>,
}

impl RegisteredPlugin {
    pub fn id(&self) -> &str {
        &self.manifest.id
    }

    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    pub fn has_transformer(&self) -> bool {
        self.transformer.is_some()
    }

    fn trace_config(&self) -> TraceConfig {
        self.manifest.trace_config()
    }
}

impl fmt::Debug for RegisteredPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredPlugin")
            .field("manifest", &self.manifest)
            .field("registered_at", &self.registered_at)
            .field("transformer", &self.transformer.is_some())
            .finish()
    }
}

/// Lookup table of installed trace plugins.
///
/// Constructed explicitly and handed to consumers by reference. Entries keep
/// their first insertion position; re-registering an id replaces the entry in
/// place.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    plugins: IndexMap<String, RegisteredPlugin>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every built-in plugin.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for definition in builtin::definitions() {
            if let Err(err) = registry.register(definition) {
                tracing::error!(error = %err, "built-in plugin failed validation");
            }
        }
        registry
    }

    /// Validates and stores a plugin. The last registration of an id wins.
    pub fn register(&mut self, definition: impl Into<PluginDefinition>) -> Result<(), ManifestError> {
        let definition = definition.into();
        definition.manifest.validate()?;
        let PluginDefinition {
            manifest,
            transformer,
            on_register,
            on_unregister,
        } = definition;

        if manifest.version.is_some() && manifest.parsed_version().is_none() {
            tracing::warn!(
                plugin = %manifest.id,
                version = manifest.version.as_deref().unwrap_or_default(),
                "plugin version is not valid semver"
            );
        }

        let id = manifest.id.clone();
        let entry = RegisteredPlugin {
            manifest,
            registered_at: Utc::now(),
            transformer,
            on_unregister,
        };
        if let Some(previous) = self.plugins.insert(id.clone(), entry) {
            tracing::warn!(plugin = %id, "replacing previously registered plugin");
            run_hook(&id, "on_unregister", previous.on_unregister.as_ref(), &previous.manifest);
        }
        metrics::counter!("trace_registry_registrations_total").increment(1);
        tracing::debug!(plugin = %id, "plugin registered");

        if let Some(entry) = self.plugins.get(&id) {
            run_hook(&id, "on_register", on_register.as_ref(), &entry.manifest);
        }
        Ok(())
    }

    pub fn register_manifest(&mut self, manifest: PluginManifest) -> Result<(), ManifestError> {
        self.register(PluginDefinition::new(manifest))
    }

    /// Registers an untyped manifest document after checking its shape.
    pub fn register_value(&mut self, value: serde_json::Value) -> Result<(), ManifestError> {
        self.register_manifest(PluginManifest::from_value(value)?)
    }

    pub fn get(&self, id: &str) -> Option<&RegisteredPlugin> {
        self.plugins.get(id)
    }

    /// Iterates plugins in insertion order.
    pub fn all(&self) -> impl Iterator<Item = &RegisteredPlugin> {
        self.plugins.values()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.plugins.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Removes a plugin, returning whether it was present.
    pub fn unregister(&mut self, id: &str) -> bool {
        match self.plugins.shift_remove(id) {
            Some(removed) => {
                run_hook(id, "on_unregister", removed.on_unregister.as_ref(), &removed.manifest);
                tracing::debug!(plugin = id, "plugin unregistered");
                true
            }
            None => false,
        }
    }

    /// Returns `request` augmented with the plugin's trace configuration.
    /// Unknown ids leave the request unchanged.
    pub fn apply_trace_config(&self, id: &str, request: &RequestDescriptor) -> RequestDescriptor {
        let Some(plugin) = self.get(id) else {
            tracing::warn!(plugin = id, "trace plugin not found; request left unchanged");
            return request.clone();
        };
        let augmented = augment_request(&plugin.trace_config(), request);
        metrics::counter!("trace_requests_augmented_total", "plugin" => id.to_string()).increment(1);
        tracing::debug!(
            plugin = id,
            headers = augmented.headers.len() - request.headers.len(),
            "trace config applied"
        );
        augmented
    }

    /// Runs the plugin's response transformer, never propagating its failures.
    pub fn transform_response(&self, id: &str, response: &ResponseDescriptor) -> TransformOutcome {
        let Some(plugin) = self.get(id) else {
            tracing::warn!(plugin = id, "trace plugin not found; response left unchanged");
            return TransformOutcome::Unchanged(response.clone());
        };
        let Some(transformer) = plugin.transformer.as_deref() else {
            return TransformOutcome::Unchanged(response.clone());
        };
        let outcome = run_transformer(id, transformer, response);
        metrics::counter!(
            "trace_responses_transformed_total",
            "plugin" => id.to_string(),
            "outcome" => outcome.label()
        )
        .increment(1);
        outcome
    }

    /// Registers every valid manifest under `dir`. Invalid manifests are
    /// skipped and listed in the returned report.
    pub fn load_manifests(&mut self, dir: &Path) -> Result<DiscoveryReport, DiscoveryError> {
        let report = discovery::discover_manifests(dir)?;
        for manifest in &report.manifests {
            if let Err(err) = self.register_manifest(manifest.clone()) {
                tracing::warn!(plugin = %manifest.id, error = %err, "discovered manifest rejected");
            }
        }
        Ok(report)
    }
}

fn run_hook(id: &str, stage: &'static str, hook: Option<&LifecycleHook>, manifest: &PluginManifest) {
    let Some(hook) = hook else {
        return;
    };
    let message = match panic::catch_unwind(AssertUnwindSafe(|| hook(manifest))) {
        Ok(Ok(())) => return,
        Ok(Err(err)) => format!("{err:#}"),
        Err(payload) => panic_message(payload.as_ref()),
    };
    tracing::error!(plugin = id, stage, error = %message, "plugin lifecycle hook failed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::bail;
    use bruno_trace_plugin_sdk::{ManifestErrorReason, ManifestField, TraceParam};
    use serde_json::json;

    fn manifest(id: &str) -> PluginManifest {
        PluginManifest::new(
            id,
            format!("{id} plugin"),
            TraceConfig {
                headers: vec![
                    TraceParam::enabled("B", "2"),
                    TraceParam::enabled("C", "3"),
                    TraceParam::disabled("D", "4"),
                ],
                query_params: vec![TraceParam::enabled("k", "v")],
            },
        )
    }

    #[test]
    fn invalid_manifests_leave_membership_unchanged() {
        let mut registry = PluginRegistry::new();
        registry.register_manifest(manifest("ok")).unwrap();

        let mut missing_config = manifest("broken");
        missing_config.trace_config = None;
        let err = registry.register_manifest(missing_config).unwrap_err();
        assert_eq!(err.field, ManifestField::TraceConfig);

        let mut missing_name = manifest("broken");
        missing_name.name.clear();
        let err = registry.register_manifest(missing_name).unwrap_err();
        assert_eq!(err.field, ManifestField::Name);
        assert_eq!(err.reason, ManifestErrorReason::Empty);

        let err = registry.register_manifest(manifest("")).unwrap_err();
        assert_eq!(err.field, ManifestField::Id);

        assert_eq!(registry.len(), 1);
        assert!(!registry.contains("broken"));
    }

    #[test]
    fn malformed_documents_are_rejected_before_storage() {
        let mut registry = PluginRegistry::new();
        let err = registry
            .register_value(json!({
                "id": "raw",
                "name": "Raw",
                "traceConfig": { "headers": "X-A: 1" }
            }))
            .unwrap_err();
        assert_eq!(err.field, ManifestField::Headers);
        assert_eq!(err.reason, ManifestErrorReason::NotASequence);
        assert!(registry.is_empty());

        registry
            .register_value(json!({ "id": "raw", "name": "Raw", "traceConfig": {} }))
            .unwrap();
        assert!(registry.contains("raw"));
    }

    #[test]
    fn lookup_is_stable_until_unregistered() {
        let mut registry = PluginRegistry::new();
        let m = manifest("a");
        registry.register_manifest(m.clone()).unwrap();
        for _ in 0..3 {
            let plugin = registry.get("a").unwrap();
            assert_eq!(plugin.id(), m.id);
            assert_eq!(plugin.name(), m.name);
            assert_eq!(plugin.manifest.trace_config, m.trace_config);
        }
        assert!(registry.unregister("a"));
        assert!(registry.get("a").is_none());
        assert!(!registry.contains("a"));
        assert!(!registry.unregister("a"));
    }

    #[test]
    fn all_preserves_insertion_order_across_replacement() {
        let mut registry = PluginRegistry::new();
        for id in ["zeta", "alpha", "mid"] {
            registry.register_manifest(manifest(id)).unwrap();
        }
        let mut replacement = manifest("zeta");
        replacement.name = "Zeta v2".into();
        registry.register_manifest(replacement).unwrap();

        let ids: Vec<_> = registry.all().map(|p| p.id()).collect();
        assert_eq!(ids, ["zeta", "alpha", "mid"]);
        assert_eq!(registry.get("zeta").unwrap().name(), "Zeta v2");

        registry.unregister("zeta");
        let ids: Vec<_> = registry.all().map(|p| p.id()).collect();
        assert_eq!(ids, ["alpha", "mid"]);
    }

    #[test]
    fn apply_trace_config_injects_enabled_entries() {
        let mut registry = PluginRegistry::new();
        registry.register_manifest(manifest("p")).unwrap();
        let request = RequestDescriptor::new("https://x.com/a?z=1").with_header("A", "1");

        let out = registry.apply_trace_config("p", &request);
        let names: Vec<_> = out.headers.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, ["A", "B", "C"]);
        assert_eq!(out.url.as_deref(), Some("https://x.com/a?z=1&k=v"));
        assert_eq!(request.headers.len(), 1);
        assert_eq!(request.url.as_deref(), Some("https://x.com/a?z=1"));
    }

    #[test]
    fn unknown_plugins_are_no_ops() {
        let registry = PluginRegistry::new();
        let request = RequestDescriptor::new("https://x.com").with_header("A", "1");
        assert_eq!(registry.apply_trace_config("nope", &request), request);

        let response = ResponseDescriptor::new(200, json!("body"));
        let outcome = registry.transform_response("nope", &response);
        assert_eq!(outcome, TransformOutcome::Unchanged(response));
    }

    #[test]
    fn plugins_without_transformer_return_response_unchanged() {
        let mut registry = PluginRegistry::new();
        registry.register_manifest(manifest("plain")).unwrap();
        let response = ResponseDescriptor::new(204, serde_json::Value::Null);
        let out = registry.transform_response("plain", &response).into_response();
        assert_eq!(out, response);
    }

    #[test]
    fn failing_transformer_annotates_original() {
        let mut registry = PluginRegistry::new();
        registry
            .register(PluginDefinition::new(manifest("flaky")).with_transformer(
                |_: &ResponseDescriptor| -> anyhow::Result<ResponseDescriptor> { bail!("cannot parse") },
            ))
            .unwrap();
        let response = ResponseDescriptor::new(500, json!("oops"));
        let out = registry.transform_response("flaky", &response).into_response();
        assert_eq!(out.transform_error.as_deref(), Some("cannot parse"));
        assert_eq!(out.data, response.data);
        assert_eq!(out.status, Some(500));
    }

    #[test]
    fn lifecycle_hooks_run_and_failures_are_contained() {
        let registered = Arc::new(AtomicUsize::new(0));
        let unregistered = Arc::new(AtomicUsize::new(0));
        let (r, u) = (registered.clone(), unregistered.clone());
        let definition = PluginDefinition::new(manifest("hooked"))
            .on_register(move |_| {
                r.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .on_unregister(move |_| {
                u.fetch_add(1, Ordering::SeqCst);
                bail!("teardown failed")
            });

        let mut registry = PluginRegistry::new();
        registry.register(definition.clone()).unwrap();
        assert_eq!(registered.load(Ordering::SeqCst), 1);

        // Replacing runs the previous entry's teardown.
        registry.register(definition).unwrap();
        assert_eq!(registered.load(Ordering::SeqCst), 2);
        assert_eq!(unregistered.load(Ordering::SeqCst), 1);

        assert!(registry.unregister("hooked"));
        assert_eq!(unregistered.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failing_register_hook_keeps_plugin() {
        let mut registry = PluginRegistry::new();
        registry
            .register(PluginDefinition::new(manifest("loud")).on_register(|_| panic!("init")))
            .unwrap();
        assert!(registry.contains("loud"));
    }

    #[test]
    fn timestamps_are_captured_at_registration() {
        let before = Utc::now();
        let mut registry = PluginRegistry::new();
        registry.register_manifest(manifest("t")).unwrap();
        let at = registry.get("t").unwrap().registered_at;
        assert!(at >= before && at <= Utc::now());
    }

    #[test]
    fn builtins_are_available() {
        let registry = PluginRegistry::with_builtins();
        assert!(registry.contains(builtin::BFF_DEBUG_ID));
        assert!(registry.get(builtin::BFF_DEBUG_ID).unwrap().has_transformer());
    }
}
