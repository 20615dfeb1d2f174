// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Side-channel registry keyed by per-request context identity.
//!
//! The plugin host invokes the datasource through a fixed query signature
//! that carries no slot for the inbound web request's auth state. The web
//! layer instead deposits that state here, keyed by the request's
//! [`QueryContext`], and the executor looks it up when OAuth pass-through
//! is enabled for the datasource. Entries are removed either explicitly
//! ([`RequestRegistry::remove`]) or by dropping a [`RegistryScope`]; an
//! entry that is never removed stays for the life of the registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one in-flight request scope.
///
/// Allocated from a process-wide counter and never reused, so a stale
/// registry entry can at worst leak memory, not leak auth state into an
/// unrelated request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

/// Cancellation/deadline scope of one inbound request.
///
/// Clones share both identity and cancellation state, so a handler can hand
/// the context to the executor while keeping a handle to cancel it. Only the
/// identity participates in registry lookups.
#[derive(Clone, Debug)]
pub struct QueryContext {
    id: ContextId,
    cancellation: CancellationToken,
}

impl QueryContext {
    pub fn new() -> Self {
        QueryContext {
            id: ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed)),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Cancels the scope, aborting any outbound call bound to it.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Completes when the scope is cancelled.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await;
    }
}

impl Default for QueryContext {
    fn default() -> Self {
        QueryContext::new()
    }
}

/// Mutex-guarded map from request context identity to one associated value.
///
/// The registry is constructed and owned by the request-dispatch layer and
/// shared by reference with the executor; independent registries never
/// interfere, which keeps tests hermetic. The value type is fixed per
/// registry, so a reader cannot observe a value of an unexpected shape.
///
/// The lock is held only for the duration of a map operation, never across
/// I/O. All pass-through queries contend on this single lock.
#[derive(Debug)]
pub struct RequestRegistry<T> {
    entries: Mutex<HashMap<ContextId, Arc<T>>>,
}

impl<T> RequestRegistry<T> {
    pub fn new() -> Self {
        RequestRegistry {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Stores `value` for the context, silently replacing any previous entry.
    pub fn insert(&self, ctx: &QueryContext, value: T) {
        #[allow(clippy::expect_used)]
        let mut entries = self.entries.lock().expect("registry lock poisoned");
        entries.insert(ctx.id(), Arc::new(value));
    }

    /// Returns the stored value for the context, or `None` if no entry
    /// exists (never a stored placeholder).
    pub fn get(&self, ctx: &QueryContext) -> Option<Arc<T>> {
        #[allow(clippy::expect_used)]
        let entries = self.entries.lock().expect("registry lock poisoned");
        entries.get(&ctx.id()).cloned()
    }

    /// Deletes the entry for the context; no-op when absent.
    pub fn remove(&self, ctx: &QueryContext) {
        #[allow(clippy::expect_used)]
        let mut entries = self.entries.lock().expect("registry lock poisoned");
        entries.remove(&ctx.id());
    }

    /// Stores `value` and returns a guard that removes it on drop, tying the
    /// entry's lifetime to the request handler scope.
    pub fn scope<'a>(&'a self, ctx: &QueryContext, value: T) -> RegistryScope<'a, T> {
        self.insert(ctx, value);
        RegistryScope {
            registry: self,
            id: ctx.id(),
        }
    }

    fn remove_id(&self, id: ContextId) {
        #[allow(clippy::expect_used)]
        let mut entries = self.entries.lock().expect("registry lock poisoned");
        entries.remove(&id);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

impl<T> Default for RequestRegistry<T> {
    fn default() -> Self {
        RequestRegistry::new()
    }
}

/// Removes its registry entry when dropped.
#[must_use = "dropping the scope immediately removes the registry entry"]
pub struct RegistryScope<'a, T> {
    registry: &'a RequestRegistry<T>,
    id: ContextId,
}

impl<T> Drop for RegistryScope<'_, T> {
    fn drop(&mut self) {
        self.registry.remove_id(self.id);
    }
}
