// ABOUTME: CompositeHook combining child hooks behind a single Hook facade
// ABOUTME: Sequential merges like a chain; FirstMatch returns the first decisive result

use crate::context::HookContext;
use crate::result::HookResult;
use crate::traits::{ArcHook, Hook};
use crate::types::HookMetadata;
use anyhow::Result;
use async_trait::async_trait;

/// How children compose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositionPattern {
    /// Run all children in order, merging results; stop on non-continue.
    Sequential,
    /// Run until the first child returns something other than a plain
    /// continue, and return that result.
    FirstMatch,
}

/// Presents several hooks as one chain entry.
pub struct CompositeHook {
    pattern: CompositionPattern,
    hooks: Vec<ArcHook>,
    metadata: HookMetadata,
}

impl CompositeHook {
    pub fn new(id: &str, pattern: CompositionPattern) -> Self {
        Self {
            pattern,
            hooks: Vec::new(),
            metadata: HookMetadata::new(id),
        }
    }

    pub fn add_hook(mut self, hook: ArcHook) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn with_metadata(mut self, metadata: HookMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    async fn execute_sequential(&self, context: &mut HookContext) -> Result<HookResult> {
        let mut aggregate = HookResult::ok();
        for hook in &self.hooks {
            let result = hook.execute(context).await?;

            if let Some(data) = result.modified_data {
                context.input_data = data.clone();
                aggregate.modified_data = Some(data);
            }
            if let Some(metrics) = result.metrics {
                aggregate.metrics = Some(metrics);
            }
            if let Some(error) = result.error_info {
                aggregate.continue_processing = error.recoverable;
                aggregate.error_info = Some(error);
            }
            if !result.continue_processing {
                aggregate.continue_processing = false;
                break;
            }
        }
        Ok(aggregate)
    }

    async fn execute_first_match(&self, context: &mut HookContext) -> Result<HookResult> {
        for hook in &self.hooks {
            let result = hook.execute(context).await?;
            let decisive = !result.continue_processing
                || result.modified_data.is_some()
                || result.error_info.is_some();
            if decisive {
                return Ok(result);
            }
        }
        Ok(HookResult::ok())
    }
}

#[async_trait]
impl Hook for CompositeHook {
    async fn execute(&self, context: &mut HookContext) -> Result<HookResult> {
        match self.pattern {
            CompositionPattern::Sequential => self.execute_sequential(context).await,
            CompositionPattern::FirstMatch => self.execute_first_match(context).await,
        }
    }

    fn metadata(&self) -> HookMetadata {
        self.metadata.clone()
    }
}
