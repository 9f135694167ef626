use instr_core::{ElementHandle, EngineConfig, HostApi, Registry};
use instr_events::{ChangeDetector, DetectorConfig, ElementDelta, Subscriber};
use instr_test_utils::{create_text_instruction, setup_session, FakeHost, HostOp};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

type Seen = Arc<Mutex<Vec<ElementDelta>>>;

fn handles(ids: &[u64]) -> Vec<ElementHandle> {
    ids.iter().copied().map(ElementHandle::new).collect()
}

fn host_with(ids: &[u64]) -> Arc<FakeHost> {
    let host = Arc::new(FakeHost::new());
    for id in ids {
        host.insert_element(ElementHandle::new(*id));
    }
    host
}

fn recording(detector: &ChangeDetector) -> Seen {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    detector.subscribe_fn("recorder", move |added, removed| {
        sink.lock().push(ElementDelta {
            added: added.to_vec(),
            removed: removed.to_vec(),
        });
        Ok(())
    });
    seen
}

fn detector_on(host: &Arc<FakeHost>, config: DetectorConfig) -> ChangeDetector {
    let dyn_host: Arc<dyn HostApi> = host.clone();
    ChangeDetector::new(dyn_host, config).unwrap()
}

struct Counter {
    calls: Mutex<usize>,
}

impl Subscriber for Counter {
    fn update(&self, _added: &[ElementHandle], _removed: &[ElementHandle]) -> anyhow::Result<()> {
        *self.calls.lock() += 1;
        Ok(())
    }

    fn name(&self) -> &str {
        "counter"
    }
}

#[test]
fn test_reports_added_and_removed() {
    let host = host_with(&[1, 2, 3]);
    let mut detector = detector_on(&host, DetectorConfig::default());
    let seen = recording(&detector);

    host.remove_external(ElementHandle::new(1));
    host.insert_element(ElementHandle::new(4));

    let delta = detector.tick().unwrap();
    assert_eq!(delta.added, handles(&[4]));
    assert_eq!(delta.removed, handles(&[1]));
    assert_eq!(*seen.lock(), vec![delta]);
}

#[test]
fn test_unchanged_snapshot_notifies_nobody() {
    let host = host_with(&[1, 2]);
    let mut detector = detector_on(&host, DetectorConfig::default());
    let seen = recording(&detector);

    assert!(detector.tick().is_none());
    assert!(detector.tick().is_none());
    assert!(seen.lock().is_empty());
    assert_eq!(detector.stats().ticks, 2);
    assert_eq!(detector.stats().notifications, 0);
}

#[test]
fn test_pre_existing_elements_are_not_added() {
    let host = host_with(&[7, 8, 9]);
    let detector = detector_on(&host, DetectorConfig::default());
    assert_eq!(detector.known().len(), 3);
}

#[test]
fn test_failed_listing_skips_tick_and_keeps_state() {
    let host = host_with(&[1]);
    let mut detector = detector_on(&host, DetectorConfig::default());
    let seen = recording(&detector);

    host.insert_element(ElementHandle::new(2));
    host.fail_next(HostOp::ListElements);
    assert!(detector.tick().is_none());
    assert_eq!(detector.stats().skipped_ticks, 1);
    let expected: BTreeSet<ElementHandle> = handles(&[1]).into_iter().collect();
    assert_eq!(detector.known(), &expected);

    let delta = detector.tick().unwrap();
    assert_eq!(delta.added, handles(&[2]));
    assert_eq!(seen.lock().len(), 1);
}

#[test]
fn test_failing_subscriber_does_not_block_others() {
    let host = host_with(&[]);
    let mut detector = detector_on(&host, DetectorConfig::default());
    detector.subscribe_fn("broken", |_, _| anyhow::bail!("listener gone"));
    detector.subscribe_fn("exploding", |_, _| panic!("listener bug"));
    let counter = Arc::new(Counter {
        calls: Mutex::new(0),
    });
    detector.subscribe(counter.clone());

    host.add_external();
    assert!(detector.tick().is_some());
    assert_eq!(*counter.calls.lock(), 1);
    assert_eq!(detector.stats().subscriber_failures, 2);
}

#[test]
fn test_owned_elements_are_hidden() {
    let session = setup_session(EngineConfig::new());
    let dyn_host: Arc<dyn HostApi> = session.host.clone();
    let mut detector = ChangeDetector::new(dyn_host, DetectorConfig::default())
        .unwrap()
        .with_registry(session.registry.clone());
    let seen = recording(&detector);

    session
        .renderer
        .render(&create_text_instruction("mine"))
        .unwrap();
    let external = session.host.add_external();

    let delta = detector.tick().unwrap();
    assert_eq!(delta.added, vec![external]);

    session.registry.clear().unwrap();
    assert!(detector.tick().is_none());
    assert_eq!(seen.lock().len(), 1);
}

#[test]
fn test_clear_while_watching_is_hidden() {
    let session = setup_session(EngineConfig::new());
    let drawn = session
        .renderer
        .render(&create_text_instruction("before start"))
        .unwrap();
    let dyn_host: Arc<dyn HostApi> = session.host.clone();
    let mut detector = ChangeDetector::new(dyn_host, DetectorConfig::default())
        .unwrap()
        .with_registry(session.registry.clone());
    let seen = recording(&detector);
    assert!(detector.known().contains(&drawn.handle));

    session.registry.clear().unwrap();
    assert!(detector.tick().is_none());

    let external = session.host.add_external();
    session.host.remove_external(external);
    assert!(detector.tick().is_none());
    assert!(seen.lock().is_empty());
}

#[test]
fn test_adopted_handles_are_hidden_on_clear() {
    let host = host_with(&[1, 2, 3]);
    let dyn_host: Arc<dyn HostApi> = host.clone();
    let registry = Arc::new(Registry::new(dyn_host.clone()));
    let mut detector = ChangeDetector::new(dyn_host, DetectorConfig::default())
        .unwrap()
        .with_registry(registry.clone());
    let seen = recording(&detector);

    // adopted after the detector started; picked up on the next tick
    assert_eq!(registry.adopt(handles(&[2, 3])), 2);
    assert!(detector.tick().is_none());
    registry.clear().unwrap();
    host.remove_external(ElementHandle::new(1));

    let delta = detector.tick().unwrap();
    assert_eq!(delta.added, handles(&[]));
    assert_eq!(delta.removed, handles(&[1]));
    assert_eq!(seen.lock().len(), 1);
}

#[test]
fn test_owned_elements_visible_when_not_ignored() {
    let session = setup_session(EngineConfig::new());
    let dyn_host: Arc<dyn HostApi> = session.host.clone();
    let config = DetectorConfig::default().with_ignore_owned(false);
    let mut detector = ChangeDetector::new(dyn_host, config)
        .unwrap()
        .with_registry(session.registry.clone());

    let rendered = session
        .renderer
        .render(&create_text_instruction("mine"))
        .unwrap();
    let delta = detector.tick().unwrap();
    assert_eq!(delta.added, vec![rendered.handle]);
}

#[tokio::test(start_paused = true)]
async fn test_spawned_detector_polls_on_interval() {
    let host = host_with(&[1]);
    let detector = detector_on(&host, DetectorConfig::default().with_interval_ms(100));
    let seen = recording(&detector);
    let handle = detector.spawn();
    assert!(handle.is_running());

    host.insert_element(ElementHandle::new(2));
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(seen.lock().len(), 1);

    host.remove_external(ElementHandle::new(1));
    tokio::time::sleep(Duration::from_millis(100)).await;

    let detector = handle.stop().await.unwrap();
    let deltas = seen.lock().clone();
    assert_eq!(deltas.len(), 2);
    assert_eq!(deltas[1].removed, handles(&[1]));
    assert!(detector.stats().ticks >= 2);
}

#[tokio::test(start_paused = true)]
async fn test_subscribe_while_running() {
    let host = host_with(&[]);
    let detector = detector_on(&host, DetectorConfig::default().with_interval_ms(50));
    let publisher = detector.publisher();
    let handle = detector.spawn();

    let seen = Arc::new(Mutex::new(0usize));
    let sink = seen.clone();
    publisher.subscribe_fn("late", move |added, _| {
        *sink.lock() += added.len();
        Ok(())
    });

    host.add_external();
    host.add_external();
    tokio::time::sleep(Duration::from_millis(60)).await;

    handle.stop().await.unwrap();
    assert_eq!(*seen.lock(), 2);
}
