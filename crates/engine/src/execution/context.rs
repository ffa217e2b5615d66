use std::{sync::Arc, time::Duration};

use dataloader::LoaderRegistry;
use indexmap::IndexMap;
use serde_json::Value;
use web_time::Instant;

use super::result_cache::ResultCache;
use crate::{
    clock::Clock,
    error::{ExecutionError, ExecutionResult},
    response::{ResponsePath, SourceValue},
};

/// A field postponed to a later pass, together with the source data to
/// resume it with.
#[derive(Debug, Clone)]
pub struct DeferredField {
    pub path: ResponsePath,
    pub label: Option<String>,
    pub source: SourceValue,
}

/// Per-request execution state: pass bracketing, the deferred-field
/// registry, the result cache and the per-request loader registry.
///
/// `start`/`stop` bracket each walk of the query tree. The number of passes
/// is bounded by `max_passes`, enforced where deferral decisions are made
/// rather than at `start`: bracketing a pass is free, postponing work into a
/// pass that will never run is the mistake worth failing on.
pub struct OperationContext {
    current_pass: u32,
    max_passes: u32,
    pass_started_at: Option<Instant>,
    deferred: IndexMap<ResponsePath, DeferredField>,
    result_cache: ResultCache,
    loaders: Arc<LoaderRegistry>,
    clock: Clock,
}

impl OperationContext {
    pub fn new(max_passes: u32) -> Self {
        OperationContext {
            current_pass: 0,
            max_passes,
            pass_started_at: None,
            deferred: IndexMap::new(),
            result_cache: ResultCache::new(),
            loaders: Arc::new(LoaderRegistry::new()),
            clock: Clock::start(),
        }
    }

    pub fn current_pass(&self) -> u32 {
        self.current_pass
    }

    pub fn max_passes(&self) -> u32 {
        self.max_passes
    }

    pub fn pass_active(&self) -> bool {
        self.pass_started_at.is_some()
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn loaders(&self) -> &Arc<LoaderRegistry> {
        &self.loaders
    }

    /// Begins the next resolution pass.
    pub fn start(&mut self) -> ExecutionResult<()> {
        if self.pass_active() {
            return Err(ExecutionError::AlreadyRunning);
        }
        self.current_pass += 1;
        self.pass_started_at = Some(Instant::now());
        tracing::debug!(pass = self.current_pass, "resolution pass started");
        Ok(())
    }

    /// Ends the running pass, returning its duration.
    pub fn stop(&mut self) -> ExecutionResult<Duration> {
        let started_at = self.pass_started_at.take().ok_or(ExecutionError::NotRunning)?;
        let elapsed = started_at.elapsed();
        tracing::debug!(
            pass = self.current_pass,
            duration_ms = elapsed.as_millis() as u64,
            deferred = self.deferred.len(),
            "resolution pass finished"
        );
        Ok(elapsed)
    }

    /// Whether a field may still be postponed: deferring from the last pass
    /// would postpone it into a pass that never runs.
    pub fn can_defer(&self) -> bool {
        self.current_pass < self.max_passes
    }

    /// Records `path` for resolution in a later pass. Re-deferring a path
    /// overwrites the previous entry.
    pub fn defer_field(
        &mut self,
        path: ResponsePath,
        label: Option<String>,
        source: SourceValue,
    ) -> ExecutionResult<()> {
        if !self.can_defer() {
            return Err(ExecutionError::DeferralExhausted {
                max_passes: self.max_passes,
            });
        }
        tracing::trace!(path = %path, "field deferred to a later pass");
        self.deferred
            .insert(path.clone(), DeferredField { path, label, source });
        Ok(())
    }

    pub fn is_deferred(&self, path: &ResponsePath) -> bool {
        self.deferred.contains_key(path)
    }

    /// Removes and returns the deferral recorded for `path`; consuming it is
    /// what marks the field as being resumed.
    pub fn pop_deferred(&mut self, path: &ResponsePath) -> Option<DeferredField> {
        self.deferred.shift_remove(path)
    }

    pub fn has_deferred(&self) -> bool {
        !self.deferred.is_empty()
    }

    /// Deferred paths and their labels, in deferral order.
    pub fn deferred_fields(&self) -> impl Iterator<Item = (&ResponsePath, Option<&str>)> {
        self.deferred
            .values()
            .map(|deferred| (&deferred.path, deferred.label.as_deref()))
    }

    /// Replaces the result tree consulted by [`Self::is_in_result`]. The
    /// tree is ground truth for replays, so it can only change between
    /// passes.
    pub fn set_result_data(&mut self, tree: Value) -> ExecutionResult<()> {
        if self.pass_active() {
            return Err(ExecutionError::ResultLocked);
        }
        self.result_cache.set_result(tree);
        Ok(())
    }

    /// False when no result tree is set or when the path is currently
    /// deferred: deferred fields must be re-resolved, never served stale.
    pub fn is_in_result(&self, path: &ResponsePath) -> bool {
        !self.is_deferred(path) && self.result_cache.contains(path)
    }

    pub fn get_from_result(&self, path: &ResponsePath) -> Option<&Value> {
        self.result_cache.get(path)
    }

    pub fn result_cache(&self) -> &ResultCache {
        &self.result_cache
    }

    pub fn set_cache(
        &mut self,
        path: &ResponsePath,
        key: impl Into<String>,
        value: Value,
    ) -> &Value {
        self.result_cache.set_scratch(path, key, value)
    }

    pub fn get_cache(&self, path: &ResponsePath, key: &str) -> Option<&Value> {
        self.result_cache.get_scratch(path, key)
    }
}
