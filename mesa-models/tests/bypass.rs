// Copyright (c) 2025 Mesa Research Ltd. All rights reserved.

use std::path::PathBuf;
use std::rc::Rc;

use mesa_engine::engine::Engine;
use mesa_engine::run_simulation;
use mesa_engine::test_helpers::start_test;
use mesa_models::expander::bypass::BypassIssue;
use mesa_models::expander::unit::{ProcessingUnit, SequencerUnit, UnitKind};
use mesa_models::expander::{AddrRange, BypassConfig, ExpanderConfig, ExpanderDevice};
use mesa_models::stats::StatsRegistry;
use mesa_models::test_helpers::{StubLink, create_read, create_write_np};

const MEM_BASE: u64 = 0x8000_0000;
const ENTRY: u64 = 0x1000;

fn config(bypass_enabled: bool) -> ExpanderConfig {
    ExpanderConfig {
        proto_delay_ticks: 2,
        request_queue_limit: 4,
        response_slot_limit: 4,
        mem_range: AddrRange::new(MEM_BASE, 0x4000_0000),
        bypass: BypassConfig {
            enabled: bypass_enabled,
            start_addr: ENTRY,
            image: PathBuf::from("workload.bin"),
            unit_kind: UnitKind::Sequencer,
        },
    }
}

struct Setup {
    engine: Engine,
    device: Rc<ExpanderDevice>,
    link: Rc<StubLink>,
    registry: Rc<StatsRegistry>,
}

fn setup(bypass_enabled: bool) -> Setup {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    let top = engine.top().clone();
    let registry = Rc::new(StatsRegistry::new());

    let device = ExpanderDevice::new_and_register(
        &engine,
        &top,
        "expander",
        clock,
        config(bypass_enabled),
        &registry,
    );

    // Link wiring for the protocol path so that init() passes
    device.connect_backend(StubLink::new(None));
    device.connect_remote(StubLink::new(None));

    let link = StubLink::new(None);
    device.bypass().connect_link(link.clone());

    Setup {
        engine,
        device,
        link,
        registry,
    }
}

fn counter(registry: &StatsRegistry, name: &str) -> u64 {
    registry.counter_named(name).unwrap().value()
}

// Scenario: bypass disabled - an issue is refused and no counter moves.
#[test]
fn disabled_bypass_refuses_without_counting() {
    let s = setup(false);
    let top = s.engine.top().clone();

    let outcome = s
        .device
        .bypass()
        .issue(create_read(&top, MEM_BASE, 64))
        .unwrap();
    assert!(matches!(outcome, BypassIssue::Refused(_)));

    assert_eq!(s.link.delivered_count(), 0);
    assert_eq!(counter(&s.registry, "bypass_reads"), 0);
    assert_eq!(counter(&s.registry, "bypass_writes"), 0);
    assert_eq!(counter(&s.registry, "bypass_executions"), 0);
    assert_eq!(
        s.registry
            .distribution_named("bypass_access_latency_ticks")
            .unwrap()
            .count(),
        0
    );
}

// Scenario: every start counts one execution, even when already active.
#[test]
fn repeated_start_counts_executions() {
    let s = setup(true);
    let top = s.engine.top().clone();

    let unit = SequencerUnit::new(&top, "unit", 1);
    s.device.bypass().attach_unit(unit.clone());
    s.device.init().unwrap();

    s.device.bypass().start_execution(ENTRY, 0x2000);
    assert_eq!(s.device.bypass().executions(), 1);

    s.device.bypass().start_execution(ENTRY, 0x2000);
    assert_eq!(s.device.bypass().executions(), 2);
    assert_eq!(counter(&s.registry, "bypass_executions"), 2);

    let context = unit.context(0);
    assert!(context.is_active());
}

// A missing unit is a valid pending state, not an error.
#[test]
fn start_without_unit_is_a_warning() {
    let s = setup(true);

    s.device.init().unwrap();
    s.device.bypass().start_execution(ENTRY, 0x2000);
    assert_eq!(s.device.bypass().executions(), 0);
    assert_eq!(counter(&s.registry, "bypass_executions"), 0);
}

// A unit without contexts permanently disables the coordinator.
#[test]
fn contextless_unit_disables_coordinator() {
    let s = setup(true);
    let top = s.engine.top().clone();

    let unit = SequencerUnit::new(&top, "unit", 0);
    s.device.bypass().attach_unit(unit);
    s.device.init().unwrap();

    s.device.bypass().start_execution(ENTRY, 0x2000);
    assert_eq!(s.device.bypass().executions(), 0);

    // The direct memory path is unaffected by the missing unit
    let outcome = s
        .device
        .bypass()
        .issue(create_read(&top, MEM_BASE, 64))
        .unwrap();
    assert!(matches!(outcome, BypassIssue::Sent));
}

// Completions are accounted with the right latency and operation kind.
#[test]
fn completion_latency_and_kind_counting() {
    let mut s = setup(true);
    let top = s.engine.top().clone();
    let clock = s.engine.default_clock();

    let unit = SequencerUnit::new(&top, "unit", 1);
    s.device.bypass().attach_unit(unit);

    let outcome = s
        .device
        .bypass()
        .issue(create_read(&top, MEM_BASE, 64))
        .unwrap();
    assert!(matches!(outcome, BypassIssue::Sent));
    let outcome = s
        .device
        .bypass()
        .issue(create_write_np(&top, MEM_BASE + 64, 64))
        .unwrap();
    assert!(matches!(outcome, BypassIssue::Sent));

    // Complete both accesses 7 ticks later
    {
        let link = s.link.clone();
        let device = s.device.clone();
        s.engine.spawn(async move {
            clock.wait_ticks(7).await;
            for request in link.take_delivered() {
                device.bypass().on_completion(request.to_response()?)?;
            }
            Ok(())
        });
    }

    run_simulation!(s.engine);

    assert_eq!(counter(&s.registry, "bypass_reads"), 1);
    assert_eq!(counter(&s.registry, "bypass_writes"), 1);
    let latency = s
        .registry
        .distribution_named("bypass_access_latency_ticks")
        .unwrap();
    assert_eq!(latency.count(), 2);
    assert_eq!(latency.min_sample(), Some(7));
    assert_eq!(latency.max_sample(), Some(7));
}

// The unit handle may arrive after the first initialisation pass.
#[test]
fn late_attach_then_reinitialise() {
    let s = setup(true);
    let top = s.engine.top().clone();

    s.device.init().unwrap();
    assert_eq!(s.device.bypass().executions(), 0);

    let unit = SequencerUnit::new(&top, "unit", 1);
    s.device.bypass().attach_unit(unit);
    s.device.bypass().initialize();

    s.device.bypass().start_execution(ENTRY, 0x2000);
    assert_eq!(s.device.bypass().executions(), 1);
}
