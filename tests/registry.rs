use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use ndarray::{Array3, ArrayView3};
use vit_tracker::{
    BBox, Device, EngineError, ErrorKind, Model, RawOutput, Registry, TrackerEngine, TrackerParams,
};

const STEP: Duration = Duration::from_millis(150);

/// Shared counters the stub engines report into.
#[derive(Default)]
struct Counters {
    active: AtomicUsize,
    max_active: AtomicUsize,
    finished: AtomicUsize,
    dropped: AtomicBool,
    built: AtomicUsize,
    released: AtomicUsize,
}

/// Sleeps on every call and counts frames since the last init.
struct SlowCounter {
    counters: Arc<Counters>,
    frames: usize,
    rect: [f32; 4],
}

impl SlowCounter {
    fn busy(&self) {
        let now = self.counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_active.fetch_max(now, Ordering::SeqCst);
        thread::sleep(STEP);
        self.counters.active.fetch_sub(1, Ordering::SeqCst);
        self.counters.finished.fetch_add(1, Ordering::SeqCst);
    }
}

impl TrackerEngine for SlowCounter {
    fn initialize(&mut self, _: &ArrayView3<u8>, bbox: BBox) -> Result<(), EngineError> {
        self.frames = 0;
        self.rect = bbox.to_array();
        Ok(())
    }

    fn track(&mut self, _: &ArrayView3<u8>) -> Result<RawOutput, EngineError> {
        self.busy();
        self.frames += 1;
        let [x, y, w, h] = self.rect;
        Ok(RawOutput::Sequence(vec![x + self.frames as f32, y, w, h]))
    }
}

impl Drop for SlowCounter {
    fn drop(&mut self) {
        self.counters.dropped.store(true, Ordering::SeqCst);
        self.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Every target built by this registry reports into the same counters.
fn registry(counters: &Arc<Counters>) -> Registry {
    let counters = Arc::clone(counters);
    let builder = move |_: &TrackerParams, _: &Device| -> Box<dyn TrackerEngine> {
        counters.built.fetch_add(1, Ordering::SeqCst);
        Box::new(SlowCounter {
            counters: Arc::clone(&counters),
            frames: 0,
            rect: [0.0; 4],
        })
    };
    let model = Model::from_parts(TrackerParams::default(), Device::Cpu, Box::new(builder));
    Registry::new(Arc::new(model))
}

fn frame() -> Array3<u8> {
    Array3::zeros((64, 96, 3))
}

#[test]
fn end_to_end_lifecycle() {
    let counters = Arc::new(Counters::default());
    let registry = registry(&counters);
    let f0 = frame();
    let f1 = frame();

    registry.create_session(Some("s1"), None).unwrap();
    let (target_id, init) = registry
        .init_target("s1", Some("obj1"), &f0.view(), BBox::new(10.0, 10.0, 50.0, 50.0))
        .unwrap();
    assert_eq!(target_id, "obj1");
    assert!(init.ok);

    let update = registry.update_target("s1", "obj1", &f1.view()).unwrap();
    assert!(update.bbox.width.is_finite() && update.bbox.width >= 0.0);
    assert!(update.bbox.height.is_finite() && update.bbox.height >= 0.0);
    assert!(update.elapsed >= STEP);

    registry.drop_target("s1", "obj1").unwrap();
    assert!(counters.dropped.load(Ordering::SeqCst));
    let err = registry.update_target("s1", "obj1", &f1.view()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    registry.close_session("s1");
    let err = registry.get_session("s1").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn update_before_init_fails() {
    let registry = registry(&Arc::new(Counters::default()));
    let session = registry.get_session(&registry.create_session(None, None).unwrap()).unwrap();
    let (id, _) = session.get_or_create_target(None).unwrap();

    let err = registry
        .update_target(session.id(), &id, &frame().view())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotInitialized);
}

#[test]
fn attached_caller_continues_temporal_state() {
    let registry = registry(&Arc::new(Counters::default()));
    registry.create_session(Some("s1"), None).unwrap();
    let session = registry.get_session("s1").unwrap();
    let frame = frame();

    let (_, first) = session.get_or_create_target(Some("T1")).unwrap();
    first.init(&frame.view(), BBox::new(0.0, 0.0, 10.0, 10.0)).unwrap();
    assert_eq!(first.update(&frame.view()).unwrap().bbox.x, 1.0);

    let (_, second) = session.get_or_create_target(Some("T1")).unwrap();
    assert_eq!(second.update(&frame.view()).unwrap().bbox.x, 2.0);
}

#[test]
fn different_targets_run_in_parallel() {
    let counters = Arc::new(Counters::default());
    let registry = registry(&counters);
    registry.create_session(Some("s1"), None).unwrap();
    let frame = frame();
    let bbox = BBox::new(10.0, 10.0, 20.0, 20.0);
    registry.init_target("s1", Some("a"), &frame.view(), bbox).unwrap();
    registry.init_target("s1", Some("b"), &frame.view(), bbox).unwrap();

    let start = Instant::now();
    thread::scope(|s| {
        for id in ["a", "b"] {
            let registry = &registry;
            let frame = &frame;
            s.spawn(move || registry.update_target("s1", id, &frame.view()).unwrap());
        }
    });
    let elapsed = start.elapsed();

    assert_eq!(counters.max_active.load(Ordering::SeqCst), 2);
    assert!(elapsed < STEP * 2, "took {:?}", elapsed);
}

#[test]
fn same_target_calls_serialize() {
    let counters = Arc::new(Counters::default());
    let registry = registry(&counters);
    registry.create_session(Some("s1"), None).unwrap();
    let frame = frame();
    registry
        .init_target("s1", Some("a"), &frame.view(), BBox::new(0.0, 0.0, 20.0, 20.0))
        .unwrap();

    let barrier = Barrier::new(2);
    let start = Instant::now();
    let xs: Vec<f32> = thread::scope(|s| {
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let (registry, frame, barrier) = (&registry, &frame, &barrier);
                s.spawn(move || {
                    barrier.wait();
                    registry.update_target("s1", "a", &frame.view()).unwrap().bbox.x
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    let elapsed = start.elapsed();

    assert_eq!(counters.max_active.load(Ordering::SeqCst), 1);
    assert!(elapsed >= STEP * 2, "took {:?}", elapsed);
    let mut xs = xs;
    xs.sort_by(f32::total_cmp);
    assert_eq!(xs, vec![1.0, 2.0]);
}

#[test]
fn drop_waits_for_in_flight_update() {
    let counters = Arc::new(Counters::default());
    let registry = registry(&counters);
    registry.create_session(Some("s1"), None).unwrap();
    let frame = frame();
    registry
        .init_target("s1", Some("a"), &frame.view(), BBox::new(0.0, 0.0, 20.0, 20.0))
        .unwrap();

    thread::scope(|s| {
        let update = s.spawn(|| registry.update_target("s1", "a", &frame.view()));

        while counters.active.load(Ordering::SeqCst) == 0 {
            thread::yield_now();
        }
        registry.drop_target("s1", "a").unwrap();

        // Disposal happened strictly after the in-flight call completed.
        assert_eq!(counters.finished.load(Ordering::SeqCst), 1);
        assert!(counters.dropped.load(Ordering::SeqCst));
        assert!(update.join().unwrap().is_ok());
    });

    let err = registry.update_target("s1", "a", &frame.view()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn closing_session_disposes_targets() {
    let counters = Arc::new(Counters::default());
    let registry = registry(&counters);
    registry.create_session(Some("s1"), None).unwrap();
    let session = registry.get_session("s1").unwrap();
    let (_, handle) = session.get_or_create_target(Some("a")).unwrap();

    registry.close_session("s1");
    assert!(counters.dropped.load(Ordering::SeqCst));
    let err = handle.update(&frame().view()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(registry.is_empty());
}

#[test]
fn concurrent_create_of_one_id_yields_one_target() {
    const CALLERS: usize = 8;
    let counters = Arc::new(Counters::default());
    let registry = registry(&counters);
    registry.create_session(Some("s1"), None).unwrap();
    let session = registry.get_session("s1").unwrap();

    let barrier = Barrier::new(CALLERS);
    let handles: Vec<_> = thread::scope(|s| {
        let spawned: Vec<_> = (0..CALLERS)
            .map(|_| {
                let (session, barrier) = (&session, &barrier);
                s.spawn(move || {
                    barrier.wait();
                    session.get_or_create_target(Some("T1")).unwrap()
                })
            })
            .collect();
        spawned.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(session.len(), 1);
    let (_, first) = &handles[0];
    for (id, handle) in &handles {
        assert_eq!(id, "T1");
        assert!(Arc::ptr_eq(first, handle));
    }
    // Engines built by callers that lost the insert race were thrown away.
    let built = counters.built.load(Ordering::SeqCst);
    assert!(built >= 1);
    assert_eq!(counters.released.load(Ordering::SeqCst), built - 1);

    // Everyone shares the winner's temporal state.
    let frame = frame();
    first.init(&frame.view(), BBox::new(0.0, 0.0, 10.0, 10.0)).unwrap();
    for (i, (_, handle)) in handles.iter().enumerate() {
        assert_eq!(handle.update(&frame.view()).unwrap().bbox.x, (i + 1) as f32);
    }
}

#[test]
fn close_racing_create_leaves_no_live_engine() {
    const CALLERS: usize = 8;
    let counters = Arc::new(Counters::default());
    let registry = registry(&counters);
    registry.create_session(Some("s1"), None).unwrap();
    let session = registry.get_session("s1").unwrap();

    let barrier = Barrier::new(CALLERS + 1);
    let results: Vec<_> = thread::scope(|s| {
        let spawned: Vec<_> = (0..CALLERS)
            .map(|i| {
                let (session, barrier) = (&session, &barrier);
                s.spawn(move || {
                    barrier.wait();
                    session.get_or_create_target(Some(&format!("t{i}")))
                })
            })
            .collect();
        barrier.wait();
        registry.close_session("s1");
        spawned.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for result in &results {
        match result {
            Ok((_, handle)) => {
                let err = handle.update(&frame().view()).unwrap_err();
                assert_eq!(err.kind(), ErrorKind::NotFound);
            }
            Err(err) => assert_eq!(err.kind(), ErrorKind::NotFound),
        }
    }
    assert!(session.is_empty());
    assert!(registry.is_empty());
    assert_eq!(
        counters.released.load(Ordering::SeqCst),
        counters.built.load(Ordering::SeqCst)
    );

    let err = session.get_or_create_target(Some("late")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
