// Copyright (c) 2025 Mesa Research Ltd. All rights reserved.

use std::cell::Cell;
use std::rc::Rc;

use mesa_engine::engine::Engine;
use mesa_engine::run_simulation;
use mesa_engine::test_helpers::start_test;
use mesa_engine::time::clock::Tick;
use mesa_engine::traits::Event;
use mesa_models::expander::ingress::Admission;
use mesa_models::expander::unit::UnitKind;
use mesa_models::expander::{AddrRange, BypassConfig, ExpanderConfig, ExpanderDevice};
use mesa_models::stats::StatsRegistry;
use mesa_models::test_helpers::{StubLink, create_read, create_write};

const PROTO_DELAY: u64 = 2;
const MEM_BASE: u64 = 0x8000_0000;

fn config(request_queue_limit: usize, response_slot_limit: usize) -> ExpanderConfig {
    ExpanderConfig {
        proto_delay_ticks: PROTO_DELAY,
        request_queue_limit,
        response_slot_limit,
        mem_range: AddrRange::new(MEM_BASE, 0x4000_0000),
        bypass: BypassConfig {
            enabled: false,
            start_addr: 0,
            image: Default::default(),
            unit_kind: UnitKind::Sequencer,
        },
    }
}

struct Setup {
    engine: Engine,
    device: Rc<ExpanderDevice>,
    backend: Rc<StubLink>,
    remote: Rc<StubLink>,
    registry: Rc<StatsRegistry>,
}

fn setup(request_queue_limit: usize, response_slot_limit: usize, budget: Option<usize>) -> Setup {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    let top = engine.top().clone();
    let registry = Rc::new(StatsRegistry::new());

    let device = ExpanderDevice::new_and_register(
        &engine,
        &top,
        "expander",
        clock,
        config(request_queue_limit, response_slot_limit),
        &registry,
    );

    let backend = StubLink::new(budget);
    let remote = StubLink::new(None);
    device.connect_backend(backend.clone());
    device.connect_remote(remote.clone());

    Setup {
        engine,
        device,
        backend,
        remote,
        registry,
    }
}

fn counter(registry: &StatsRegistry, name: &str) -> u64 {
    registry.counter_named(name).unwrap().value()
}

/// Count every resubmit signal the device emits.
fn count_resubmits(engine: &Engine, device: &Rc<ExpanderDevice>) -> Rc<Cell<u64>> {
    let resubmits = Rc::new(Cell::new(0));
    let event = device.resubmit_event();
    {
        let resubmits = resubmits.clone();
        engine.spawn(async move {
            loop {
                event.listen().await;
                resubmits.set(resubmits.get() + 1);
            }
        });
    }
    resubmits
}

// Scenario: request queue limit 2, three back-to-back submissions. The
// third must stall, and the first successful forward must fire exactly one
// retry signal.
#[test]
fn third_submission_stalls_then_one_retry() {
    let mut s = setup(2, 10, None);
    let top = s.engine.top().clone();
    let resubmits = count_resubmits(&s.engine, &s.device);

    assert!(matches!(
        s.device.submit(create_read(&top, MEM_BASE, 64)).unwrap(),
        Admission::Accepted
    ));
    assert!(matches!(
        s.device.submit(create_read(&top, MEM_BASE + 64, 64)).unwrap(),
        Admission::Accepted
    ));
    let third = s.device.submit(create_read(&top, MEM_BASE + 128, 64)).unwrap();
    assert!(matches!(third, Admission::Stalled(_)));

    assert!(s.device.ingress().retry_pending());
    assert_eq!(counter(&s.registry, "req_queue_full_events"), 1);

    run_simulation!(s.engine);

    // Both queued requests reached the backend; the stalled sender was told
    // to retry exactly once, by the first successful forward
    assert_eq!(s.backend.delivered_count(), 2);
    assert!(!s.device.ingress().retry_pending());
    assert_eq!(resubmits.get(), 1);
    assert_eq!(counter(&s.registry, "req_retry_count"), 1);
    assert_eq!(counter(&s.registry, "req_send_ok"), 2);
}

// Scenario: a single response slot. The second response-expecting request
// must stall even though the request queue has room.
#[test]
fn response_slot_exhaustion_stalls() {
    let s = setup(2, 1, None);
    let top = s.engine.top().clone();

    assert!(matches!(
        s.device.submit(create_read(&top, MEM_BASE, 64)).unwrap(),
        Admission::Accepted
    ));
    assert_eq!(s.device.outstanding_responses(), 1);

    let second = s.device.submit(create_read(&top, MEM_BASE + 64, 64)).unwrap();
    assert!(matches!(second, Admission::Stalled(_)));

    assert!(s.device.ingress().retry_pending());
    assert_eq!(counter(&s.registry, "rsp_queue_full_events"), 1);
    assert_eq!(counter(&s.registry, "req_queue_full_events"), 0);
    assert_eq!(s.device.outstanding_responses(), 1);
}

// Posted writes reserve no response slot.
#[test]
fn posted_writes_skip_response_slots() {
    let s = setup(2, 1, None);
    let top = s.engine.top().clone();

    assert!(matches!(
        s.device.submit(create_write(&top, MEM_BASE, 64)).unwrap(),
        Admission::Accepted
    ));
    assert!(matches!(
        s.device.submit(create_write(&top, MEM_BASE + 64, 64)).unwrap(),
        Admission::Accepted
    ));
    assert_eq!(s.device.outstanding_responses(), 0);
}

// While the retry flag is set every further submission is refused without
// recording another queue-full event.
#[test]
fn stalled_boundary_refuses_immediately() {
    let s = setup(1, 10, None);
    let top = s.engine.top().clone();

    assert!(matches!(
        s.device.submit(create_read(&top, MEM_BASE, 64)).unwrap(),
        Admission::Accepted
    ));
    assert!(matches!(
        s.device.submit(create_read(&top, MEM_BASE + 64, 64)).unwrap(),
        Admission::Stalled(_)
    ));
    assert!(matches!(
        s.device.submit(create_read(&top, MEM_BASE + 128, 64)).unwrap(),
        Admission::Stalled(_)
    ));

    assert_eq!(counter(&s.registry, "req_queue_full_events"), 1);
}

// An operation already answered upstream is a protocol violation.
#[test]
fn cache_responding_item_aborts() {
    let s = setup(2, 10, None);
    let top = s.engine.top().clone();

    let mut access = create_read(&top, MEM_BASE, 64);
    access.mark_cache_responding();
    assert!(s.device.submit(access).is_err());
}

// Items leave the request queue in the order they were admitted.
#[test]
fn requests_forwarded_in_admission_order() {
    let mut s = setup(4, 10, None);
    let top = s.engine.top().clone();

    let addrs: Vec<u64> = (0..4).map(|i| MEM_BASE + i * 64).collect();
    for addr in &addrs {
        assert!(matches!(
            s.device.submit(create_read(&top, *addr, 64)).unwrap(),
            Admission::Accepted
        ));
    }

    run_simulation!(s.engine);
    assert_eq!(s.backend.delivered_addrs(), addrs);
}

// A backend refusal records a failed send and the queue drains once the
// backend grants more space.
#[test]
fn backend_backpressure_recovers() {
    let mut s = setup(2, 10, Some(1));
    let top = s.engine.top().clone();
    let clock = s.engine.default_clock();

    assert!(matches!(
        s.device.submit(create_read(&top, MEM_BASE, 64)).unwrap(),
        Admission::Accepted
    ));
    assert!(matches!(
        s.device.submit(create_read(&top, MEM_BASE + 64, 64)).unwrap(),
        Admission::Accepted
    ));

    {
        let backend = s.backend.clone();
        s.engine.spawn(async move {
            clock.wait_ticks(20).await;
            backend.grant(1);
            Ok(())
        });
    }

    run_simulation!(s.engine);

    assert_eq!(s.backend.delivered_count(), 2);
    assert_eq!(counter(&s.registry, "req_send_ok"), 2);
    assert_eq!(counter(&s.registry, "req_send_failed"), 1);
}

// Every admitted response-expecting request decrements the outstanding
// count exactly once when its response is returned.
#[test]
fn outstanding_responses_drain_to_zero() {
    let mut s = setup(4, 4, None);
    let top = s.engine.top().clone();
    let clock = s.engine.default_clock();

    for i in 0..3 {
        assert!(matches!(
            s.device.submit(create_read(&top, MEM_BASE + i * 64, 64)).unwrap(),
            Admission::Accepted
        ));
    }
    assert_eq!(s.device.outstanding_responses(), 3);

    // Feed completions back once the requests have reached the backend
    {
        let backend = s.backend.clone();
        let device = s.device.clone();
        s.engine.spawn(async move {
            clock.wait_ticks(10).await;
            for request in backend.take_delivered() {
                device.returner().on_completion(request.to_response()?)?;
            }
            Ok(())
        });
    }

    run_simulation!(s.engine);

    assert_eq!(s.device.outstanding_responses(), 0);
    assert_eq!(s.remote.delivered_count(), 3);
    assert_eq!(counter(&s.registry, "rsp_send_ok"), 3);
    assert_eq!(counter(&s.registry, "req_send_ok"), 3);
}

// Scenario: entries are attempted in insertion order even when a later
// entry has an earlier due tick, and attempting the head before its due
// tick is a programming error.
#[test]
#[should_panic(expected = "send attempted before the scheduled tick")]
fn early_send_attempt_asserts() {
    let s = setup(2, 10, None);
    let top = s.engine.top().clone();

    let forward = s.device.forward().clone();
    forward.enqueue(create_read(&top, MEM_BASE, 64), Tick(10));
    forward.enqueue(create_read(&top, MEM_BASE + 64, 64), Tick(5));

    // The head is the first-inserted entry with the later due tick; the
    // clock is still at 0 so the attempt must assert
    let _ = forward.attempt_send();
}

// Queue-wait samples never exceed the span of the run.
#[test]
fn queue_wait_latency_is_bounded() {
    let mut s = setup(4, 10, None);
    let top = s.engine.top().clone();

    for i in 0..4 {
        assert!(matches!(
            s.device.submit(create_read(&top, MEM_BASE + i * 64, 64)).unwrap(),
            Admission::Accepted
        ));
    }

    run_simulation!(s.engine);

    let wait = s.registry.distribution_named("req_queue_wait_ticks").unwrap();
    assert_eq!(wait.count(), 4);
    let span = s.engine.time_now_ns() as u64;
    assert!(wait.max_sample().unwrap() <= span);
}

// A device with unwired link ports must fail at startup.
#[test]
fn missing_connection_is_fatal() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    let top = engine.top().clone();
    let registry = Rc::new(StatsRegistry::new());

    let _device =
        ExpanderDevice::new_and_register(&engine, &top, "expander", clock, config(2, 2), &registry);

    run_simulation!(
        engine,
        "Error: link port of top::expander not connected to anything"
    );
}
