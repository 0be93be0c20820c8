// ABOUTME: Core Hook trait with optional lifecycle methods plus closure adapters
// ABOUTME: Foundation for every interceptor executed by chains and the registry

use crate::context::HookContext;
use crate::result::HookResult;
use crate::types::HookMetadata;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// A user-supplied interceptor bound to one or more lifecycle points.
///
/// `execute` is the only required method; `init`/`deinit` run when the
/// registry creates or replaces the instance, and `validate_config` is
/// invoked against factory configuration before construction completes.
#[async_trait]
pub trait Hook: Send + Sync {
    async fn execute(&self, context: &mut HookContext) -> Result<HookResult>;

    fn metadata(&self) -> HookMetadata {
        HookMetadata::default()
    }

    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn deinit(&self) -> Result<()> {
        Ok(())
    }

    fn validate_config(&self, _config: &JsonValue) -> Result<()> {
        Ok(())
    }

    /// Internal metrics exposed by the hook, if it keeps any.
    fn metrics(&self) -> Option<JsonValue> {
        None
    }
}

/// Wrapper turning a closure into a hook.
pub struct FnHook<F> {
    func: F,
    metadata: HookMetadata,
}

impl<F> FnHook<F>
where
    F: Fn(&mut HookContext) -> Result<HookResult> + Send + Sync + 'static,
{
    pub fn new(id: &str, func: F) -> Self {
        Self {
            func,
            metadata: HookMetadata::new(id),
        }
    }

    pub fn with_metadata(mut self, metadata: HookMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

#[async_trait]
impl<F> Hook for FnHook<F>
where
    F: Fn(&mut HookContext) -> Result<HookResult> + Send + Sync + 'static,
{
    async fn execute(&self, context: &mut HookContext) -> Result<HookResult> {
        (self.func)(context)
    }

    fn metadata(&self) -> HookMetadata {
        self.metadata.clone()
    }
}

/// Type alias for a boxed hook.
pub type BoxedHook = Box<dyn Hook>;

/// Type alias for a shared hook.
pub type ArcHook = Arc<dyn Hook>;

/// Extension trait for hooks.
pub trait HookExt: Hook {
    fn boxed(self) -> BoxedHook
    where
        Self: Sized + 'static,
    {
        Box::new(self)
    }

    fn arc(self) -> ArcHook
    where
        Self: Sized + 'static,
    {
        Arc::new(self)
    }
}

impl<H: Hook + ?Sized> HookExt for H {}
