//! Per-path change listeners.
//!
//! Listener identity is an explicit [`ListenerHandle`]: every handle gets a
//! process-unique id at construction and clones share it. Registering the
//! same handle twice on a path keeps a single registration.
//!
//! # Dispatch
//!
//! ```text
//! Reconciler (consumer task):
//!   accepted change -> copy path's handle list -> on_change() per handle, in registration order
//!                                                   |
//!                          ready result -> logged inline on failure
//!                          pending      -> tokio::spawn, failure logged out of band
//! ```
//!
//! Every failure (an `Err` result or a panic, in either the synchronous or
//! the asynchronous part of a listener) is caught, logged and counted. It
//! never reaches the other listeners or the feed consumer.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::error;
use tracing::trace;
use tracing::warn;

use super::ChangeEvent;
use crate::metrics::LISTENER_FAILURES;
use crate::ListenerError;

pub type ListenerId = u64;

pub type ListenerFuture = BoxFuture<'static, Result<(), ListenerError>>;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Callback invoked on every accepted change of a path
pub trait Listener: Send + Sync + 'static {
    /// Work done before returning runs inline on the feed consumer, in
    /// registration order. The returned future runs detached.
    fn on_change(
        &self,
        event: ChangeEvent,
    ) -> ListenerFuture;
}

struct FnListener<F>(F);

impl<F> Listener for FnListener<F>
where
    F: Fn(&ChangeEvent) -> Result<(), ListenerError> + Send + Sync + 'static,
{
    fn on_change(
        &self,
        event: ChangeEvent,
    ) -> ListenerFuture {
        Box::pin(futures::future::ready((self.0)(&event)))
    }
}

struct AsyncFnListener<F>(F);

impl<F, Fut> Listener for AsyncFnListener<F>
where
    F: Fn(ChangeEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ListenerError>> + Send + 'static,
{
    fn on_change(
        &self,
        event: ChangeEvent,
    ) -> ListenerFuture {
        Box::pin((self.0)(event))
    }
}

/// Identity token wrapping a listener
#[derive(Clone)]
pub struct ListenerHandle {
    id: ListenerId,
    listener: Arc<dyn Listener>,
}

impl ListenerHandle {
    pub fn new(listener: impl Listener) -> Self {
        Self {
            id: NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed),
            listener: Arc::new(listener),
        }
    }

    /// Wraps a synchronous callback.
    pub fn from_fn<F>(callback: F) -> Self
    where
        F: Fn(&ChangeEvent) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        Self::new(FnListener(callback))
    }

    /// Wraps an asynchronous callback. Its future is never awaited by the
    /// feed consumer.
    pub fn from_async<F, Fut>(callback: F) -> Self
    where
        F: Fn(ChangeEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ListenerError>> + Send + 'static,
    {
        Self::new(AsyncFnListener(callback))
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }
}

impl PartialEq for ListenerHandle {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.id == other.id
    }
}

impl Eq for ListenerHandle {}

impl fmt::Debug for ListenerHandle {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("ListenerHandle").field("id", &self.id).finish_non_exhaustive()
    }
}

enum Invocation {
    Finished(Result<(), ListenerError>),
    Pending(ListenerFuture),
}

/// Listener sets keyed by flattened path
#[derive(Debug)]
pub struct ListenerRegistry {
    namespace: String,
    listeners: DashMap<String, Vec<ListenerHandle>>,
}

impl ListenerRegistry {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            listeners: DashMap::new(),
        }
    }

    /// Registers `handle` on `path`. Returns false if it was already there.
    pub fn add(
        &self,
        path: &str,
        handle: &ListenerHandle,
    ) -> bool {
        let mut handles = self.listeners.entry(path.to_string()).or_default();
        if handles.iter().any(|h| h.id == handle.id) {
            return false;
        }
        handles.push(handle.clone());
        trace!(path, listener_id = handle.id, "Listener registered");
        true
    }

    /// Unregisters `handle` from `path`. Returns false if it was absent.
    ///
    /// Uses `remove_if_mut` so that an emptied list is dropped atomically
    /// with the removal.
    pub fn remove(
        &self,
        path: &str,
        handle: &ListenerHandle,
    ) -> bool {
        let mut removed = false;
        self.listeners.remove_if_mut(path, |_path, handles| {
            let before = handles.len();
            handles.retain(|h| h.id != handle.id);
            removed = handles.len() != before;
            handles.is_empty()
        });
        if removed {
            trace!(path, listener_id = handle.id, "Listener unregistered");
        }
        removed
    }

    /// Point-in-time copy of the handles registered on `path`
    pub fn listeners_for(
        &self,
        path: &str,
    ) -> Vec<ListenerHandle> {
        self.listeners.get(path).map(|h| h.value().clone()).unwrap_or_default()
    }

    /// Invokes every listener of the event's path. Returns how many were
    /// invoked.
    pub fn dispatch(
        &self,
        event: &ChangeEvent,
    ) -> usize {
        let targets = self.listeners_for(&event.path);
        for handle in &targets {
            self.invoke(handle, event.clone());
        }
        targets.len()
    }

    pub fn listener_count(
        &self,
        path: &str,
    ) -> usize {
        self.listeners.get(path).map(|h| h.len()).unwrap_or(0)
    }

    pub fn watched_path_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn clear(&self) {
        self.listeners.clear();
    }

    fn invoke(
        &self,
        handle: &ListenerHandle,
        event: ChangeEvent,
    ) {
        let listener_id = handle.id;
        let path = event.path.clone();

        let invocation = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut future = handle.listener.on_change(event);
            match future.as_mut().now_or_never() {
                Some(result) => Invocation::Finished(result),
                None => Invocation::Pending(future),
            }
        }));

        let future = match invocation {
            Ok(Invocation::Finished(Ok(()))) => return,
            Ok(Invocation::Finished(Err(e))) => {
                report_failure(&self.namespace, &path, listener_id, &e);
                return;
            }
            Err(payload) => {
                let e = ListenerError::Panicked(panic_message(payload.as_ref()));
                report_failure(&self.namespace, &path, listener_id, &e);
                return;
            }
            Ok(Invocation::Pending(future)) => future,
        };

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                error!(
                    namespace = %self.namespace,
                    path = %path,
                    listener_id,
                    "No runtime to drive asynchronous listener: {}",
                    e
                );
                return;
            }
        };

        let namespace = self.namespace.clone();
        runtime.spawn(async move {
            let error = match AssertUnwindSafe(future).catch_unwind().await {
                Ok(Ok(())) => return,
                Ok(Err(e)) => e,
                Err(payload) => ListenerError::Panicked(panic_message(payload.as_ref())),
            };
            report_failure(&namespace, &path, listener_id, &error);
        });
    }
}

fn report_failure(
    namespace: &str,
    path: &str,
    listener_id: ListenerId,
    error: &ListenerError,
) {
    warn!(namespace, path, listener_id, %error, "Listener failed");
    LISTENER_FAILURES.with_label_values(&[namespace]).inc();
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "non-string panic payload".to_string()
}
