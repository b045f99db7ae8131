pub mod descriptor;
pub mod manifest;

use std::{fmt, sync::Arc};

pub use descriptor::{RequestDescriptor, RequestHeader, ResponseDescriptor};
pub use manifest::{
    ManifestError, ManifestErrorReason, ManifestField, PluginManifest, TraceConfig, TraceParam,
};

/// Reshapes a captured response for display.
///
/// Implemented for plain closures so plugins can be declared inline.
pub trait ResponseTransformer: Send + Sync {
    fn transform(&self, response: &ResponseDescriptor) -> anyhow::Result<ResponseDescriptor>;
}

impl<F> ResponseTransformer for F
where
    F: Fn(&ResponseDescriptor) -> anyhow::Result<ResponseDescriptor> + Send + Sync,
{
    fn transform(&self, response: &ResponseDescriptor) -> anyhow::Result<ResponseDescriptor> {
        self(response)
    }
}

/// Callback invoked when a plugin enters or leaves a registry.
pub type LifecycleHook = Arc<dyn Fn(&PluginManifest) -> anyhow::Result<()> + Send + Sync>;

/// Everything a registry needs to install one plugin.
#[derive(Clone)]
pub struct PluginDefinition {
    pub manifest: PluginManifest,
    pub transformer: Option<Arc<dyn ResponseTransformer>>,
    pub on_register: Option<LifecycleHook>,
    pub on_unregister: Option<LifecycleHook>,
}

impl PluginDefinition {
    pub fn new(manifest: PluginManifest) -> Self {
        Self {
            manifest,
            transformer: None,
            on_register: None,
            on_unregister: None,
        }
    }

    pub fn with_transformer(mut self, transformer: impl ResponseTransformer + 'static) -> Self {
        self.transformer = Some(Arc::new(transformer));
        self
    }

    pub fn on_register(
        mut self,
        hook: impl Fn(&PluginManifest) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.on_register = Some(Arc::new(hook));
        self
    }

    pub fn on_unregister(
        mut self,
        hook: impl Fn(&PluginManifest) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.on_unregister = Some(Arc::new(hook));
        self
    }

    pub fn id(&self) -> &str {
        &self.manifest.id
    }
}

impl From<PluginManifest> for PluginDefinition {
    fn from(manifest: PluginManifest) -> Self {
        Self::new(manifest)
    }
}

impl fmt::Debug for PluginDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDefinition")
            .field("manifest", &self.manifest)
            .field("transformer", &self.transformer.is_some())
            .field("on_register", &self.on_register.is_some())
            .field("on_unregister", &self.on_unregister.is_some())
            .finish()
    }
}
