use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing_test::traced_test;

use super::*;
use crate::test_utils::wait_until;
use crate::metrics::LISTENER_FAILURES;
use crate::ConfigValue;
use crate::ListenerError;

fn event(
    path: &str,
    revision: u64,
) -> ChangeEvent {
    ChangeEvent {
        path: path.to_string(),
        old_value: None,
        new_value: Some(ConfigValue::from(revision as f64)),
        revision,
        timestamp: revision * 10,
    }
}

fn counting_handle(counter: &Arc<AtomicUsize>) -> ListenerHandle {
    let counter = counter.clone();
    ListenerHandle::from_fn(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
}

#[test]
fn test_handles_have_distinct_ids_and_clones_share_them() {
    let a = ListenerHandle::from_fn(|_| Ok(()));
    let b = ListenerHandle::from_fn(|_| Ok(()));

    assert_ne!(a.id(), b.id());
    assert_eq!(a.clone(), a);
    assert_ne!(a, b);
}

#[tokio::test]
async fn test_add_same_handle_twice_registers_once() {
    let registry = ListenerRegistry::new("ns");
    let calls = Arc::new(AtomicUsize::new(0));
    let handle = counting_handle(&calls);

    assert!(registry.add("app.port", &handle));
    assert!(!registry.add("app.port", &handle.clone()));
    assert_eq!(registry.listener_count("app.port"), 1);

    registry.dispatch(&event("app.port", 1));

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_remove_listener() {
    let registry = ListenerRegistry::new("ns");
    let calls = Arc::new(AtomicUsize::new(0));
    let handle = counting_handle(&calls);
    registry.add("app.port", &handle);

    registry.dispatch(&event("app.port", 1));
    assert!(registry.remove("app.port", &handle));
    registry.dispatch(&event("app.port", 2));

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(registry.watched_path_count(), 0);
}

#[test]
fn test_remove_absent_listener_is_noop() {
    let registry = ListenerRegistry::new("ns");
    let registered = ListenerHandle::from_fn(|_| Ok(()));
    let stranger = ListenerHandle::from_fn(|_| Ok(()));
    registry.add("app.port", &registered);

    assert!(!registry.remove("app.port", &stranger));
    assert!(!registry.remove("app.name", &registered));
    assert_eq!(registry.listener_count("app.port"), 1);
}

#[tokio::test]
async fn test_dispatch_follows_registration_order() {
    let registry = ListenerRegistry::new("ns");
    let order = Arc::new(Mutex::new(Vec::new()));

    for label in ["first", "second", "third"] {
        let order = order.clone();
        registry.add(
            "app.name",
            &ListenerHandle::from_fn(move |_| {
                order.lock().push(label);
                Ok(())
            }),
        );
    }

    let invoked = registry.dispatch(&event("app.name", 1));

    assert_eq!(invoked, 3);
    assert_eq!(*order.lock(), vec!["first", "second", "third"]);
}

#[tokio::test]
async fn test_dispatch_only_reaches_listeners_of_the_path() {
    let registry = ListenerRegistry::new("ns");
    let calls = Arc::new(AtomicUsize::new(0));
    registry.add("app.port", &counting_handle(&calls));

    assert_eq!(registry.dispatch(&event("app.name", 1)), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
#[traced_test]
async fn test_failing_listener_does_not_block_others() {
    let registry = ListenerRegistry::new("failing-ns");
    let calls = Arc::new(AtomicUsize::new(0));

    registry.add(
        "app.port",
        &ListenerHandle::from_fn(|_| Err(ListenerError::msg("boom"))),
    );
    registry.add("app.port", &counting_handle(&calls));

    registry.dispatch(&event("app.port", 1));

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(logs_contain("Listener failed"));
    assert!(logs_contain("boom"));
}

#[tokio::test]
#[traced_test]
async fn test_panicking_listener_is_contained() {
    let registry = ListenerRegistry::new("ns");
    let calls = Arc::new(AtomicUsize::new(0));

    registry.add(
        "app.port",
        &ListenerHandle::from_fn(|_| panic!("listener exploded")),
    );
    registry.add("app.port", &counting_handle(&calls));

    registry.dispatch(&event("app.port", 1));
    registry.dispatch(&event("app.port", 2));

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(logs_contain("listener exploded"));
}

#[tokio::test]
async fn test_async_listener_runs_detached() {
    let registry = ListenerRegistry::new("ns");
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    registry.add(
        "app.port",
        &ListenerHandle::from_async(move |event: ChangeEvent| {
            let tx = tx.clone();
            async move {
                tokio::task::yield_now().await;
                tx.send(event.revision).map_err(ListenerError::msg)
            }
        }),
    );

    registry.dispatch(&event("app.port", 7));

    assert_eq!(rx.recv().await, Some(7));
}

#[tokio::test]
async fn test_async_listener_failure_is_contained() {
    let namespace = "async-failure-ns";
    let registry = ListenerRegistry::new(namespace);
    let calls = Arc::new(AtomicUsize::new(0));

    registry.add(
        "app.port",
        &ListenerHandle::from_async(|_event: ChangeEvent| async {
            tokio::task::yield_now().await;
            Err::<(), _>(ListenerError::msg("async boom"))
        }),
    );
    registry.add(
        "app.port",
        &ListenerHandle::from_async(|_event: ChangeEvent| async {
            tokio::task::yield_now().await;
            if true {
                panic!("async panic");
            }
            Ok::<(), ListenerError>(())
        }),
    );
    registry.add("app.port", &counting_handle(&calls));

    registry.dispatch(&event("app.port", 1));

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let failures = LISTENER_FAILURES.with_label_values(&[namespace]);
    assert!(wait_until(|| failures.get() == 2).await);
}

#[test]
fn test_clear() {
    let registry = ListenerRegistry::new("ns");
    registry.add("app.port", &ListenerHandle::from_fn(|_| Ok(())));
    registry.add("app.name", &ListenerHandle::from_fn(|_| Ok(())));

    registry.clear();

    assert_eq!(registry.watched_path_count(), 0);
    assert!(registry.listeners_for("app.port").is_empty());
}
