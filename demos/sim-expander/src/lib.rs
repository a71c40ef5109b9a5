// Copyright (c) 2025 Mesa Research Ltd. All rights reserved.

//! Build a platform with a link-attached memory expander and drive it over
//! either access path.
//!
//! The host path sends pointer-chase reads through the full protocol
//! machinery: source -> requester -> expander -> backend memory, with
//! responses returned to a sink. The bypass path issues the same chase
//! directly through the expander's bypass coordinator.

use std::rc::Rc;

use mesa_components::sink::Sink;
use mesa_components::source::Source;
use mesa_components::connect_port;
use mesa_engine::engine::Engine;
use mesa_engine::time::clock::Clock;
use mesa_engine::traits::Event;
use mesa_engine::types::{AccessType, SimResult};
use mesa_models::expander::bypass::{BypassCoordinator, BypassIssue};
use mesa_models::expander::unit::{SequencerUnit, UnitKind};
use mesa_models::expander::{AddrRange, BypassConfig, ExpanderConfig, ExpanderDevice};
use mesa_models::memory::{MemAccess, MemoryConfig, MemoryDevice};
use mesa_models::requester::Requester;
use mesa_models::stats::StatsRegistry;
use mesa_resources::Resource;
use mesa_track::entity::Entity;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Memory bandwidth used by the backend model.
const BW_BYTES_PER_CYCLE: u64 = 32;

/// Fixed backend access delay.
const ACCESS_DELAY_TICKS: u64 = 8;

#[derive(Clone, Debug)]
pub struct Config {
    pub num_accesses: usize,
    pub access_bytes: usize,
    pub proto_delay_ticks: u64,
    pub request_queue_limit: usize,
    pub response_slot_limit: usize,
    pub channel_slots: usize,
    pub mem_base: u64,
    pub mem_size: u64,
    pub bypass: bool,
    pub unit_kind: UnitKind,
    pub entry_addr: u64,
    pub seed: u64,
}

pub struct Platform {
    pub device: Rc<ExpanderDevice>,
    pub memory: Rc<MemoryDevice>,
    pub requester: Rc<Requester>,
    pub response_sink: Rc<Sink<MemAccess>>,
    pub source: Rc<Source<MemAccess>>,
}

/// A seeded pointer-chase: every cache line in the working set visited once,
/// in a shuffled order.
#[must_use]
pub fn pointer_chase_addrs(config: &Config) -> Vec<u64> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let stride = config.access_bytes as u64;
    let mut addrs: Vec<u64> = (0..config.num_accesses as u64)
        .map(|i| config.mem_base + i * stride)
        .collect();
    addrs.shuffle(&mut rng);
    addrs
}

/// Build and wire the full platform.
#[must_use]
pub fn build_platform(
    engine: &mut Engine,
    clock: &Clock,
    config: &Config,
    registry: &StatsRegistry,
) -> Platform {
    let top = engine.top().clone();

    let device = ExpanderDevice::new_and_register(
        engine,
        &top,
        "expander",
        clock.clone(),
        ExpanderConfig {
            proto_delay_ticks: config.proto_delay_ticks,
            request_queue_limit: config.request_queue_limit,
            response_slot_limit: config.response_slot_limit,
            mem_range: AddrRange::new(config.mem_base, config.mem_size),
            bypass: BypassConfig {
                enabled: config.bypass,
                start_addr: config.entry_addr,
                image: "pointer_chase.bin".into(),
                unit_kind: config.unit_kind,
            },
        },
        registry,
    );

    let memory = MemoryDevice::new_and_register(
        engine,
        &top,
        "mem",
        clock.clone(),
        MemoryConfig::new(
            config.mem_base,
            config.mem_size,
            BW_BYTES_PER_CYCLE,
            ACCESS_DELAY_TICKS,
            config.channel_slots,
        ),
    );

    let proto_channel = memory.channel("proto");
    device.connect_backend(proto_channel.clone());
    connect_port!(proto_channel, tx => device, backend_rx);

    let bypass_channel = memory.channel("bypass");
    device.bypass().connect_link(bypass_channel.clone());
    connect_port!(bypass_channel, tx => device.bypass(), rx);

    if config.bypass {
        let unit = match config.unit_kind {
            UnitKind::Sequencer => SequencerUnit::new(&top, "unit", 1),
        };
        device.bypass().attach_unit(unit);
    }

    let requester = Requester::new_and_register(
        engine,
        &top,
        "host",
        clock.clone(),
        device.clone(),
        registry,
    );
    device.connect_remote(requester.clone());

    let source = Source::new_and_register(engine, &top, "source", None);
    connect_port!(source, tx => requester, rx);

    let response_sink = Sink::new_and_register(engine, &top, "response_sink");
    requester.connect_port_responses_tx(response_sink.port_rx());

    Platform {
        device,
        memory,
        requester,
        response_sink,
        source,
    }
}

/// Point the host source at the pointer-chase working set.
pub fn drive_host_workload(platform: &Platform, config: &Config) {
    let addrs = pointer_chase_addrs(config);
    let created_by = platform.source.entity.clone();
    let access_bytes = config.access_bytes;
    let generator = Box::new(addrs.into_iter().map(move |addr| {
        MemAccess::new(
            &created_by,
            AccessType::ReadRequest,
            addr,
            access_bytes,
            Default::default(),
        )
    }));
    platform.source.set_generator(Some(generator));
}

/// Issue one sequence of accesses through the bypass coordinator,
/// resubmitting on backend refusal. `serialiser` keeps concurrent
/// sequences from interleaving.
pub async fn run_bypass_sequence(
    entity: Rc<Entity>,
    clock: Clock,
    bypass: Rc<BypassCoordinator>,
    serialiser: Resource,
    kind: AccessType,
    addrs: Vec<u64>,
    access_bytes: usize,
) -> SimResult {
    serialiser.request().await;

    for addr in addrs {
        let mut access = MemAccess::new(&entity, kind, addr, access_bytes, clock.tick_now());
        loop {
            match bypass.issue(access)? {
                BypassIssue::Sent => break,
                BypassIssue::Refused(returned) => {
                    access = returned;
                    bypass.backend_retry_event().listen().await;
                }
            }
        }
    }

    serialiser.release().await?;
    Ok(())
}

/// Spawn the bypass workload: activate the unit, then chase reads and a
/// write-back pass sharing the coordinator one sequence at a time.
pub fn drive_bypass_workload(engine: &Engine, clock: &Clock, platform: &Platform, config: &Config) {
    let serialiser = Resource::new(1);
    let addrs = pointer_chase_addrs(config);
    let entry = config.entry_addr;

    {
        let bypass = platform.device.bypass().clone();
        let clock = clock.clone();
        let entity = platform.device.entity.clone();
        let serialiser = serialiser.clone();
        let addrs = addrs.clone();
        let access_bytes = config.access_bytes;
        engine.spawn(async move {
            // Let the device initialise and acquire the context first
            clock.wait_ticks(1).await;
            bypass.start_execution(entry, 0);
            run_bypass_sequence(
                entity,
                clock,
                bypass,
                serialiser,
                AccessType::ReadRequest,
                addrs,
                access_bytes,
            )
            .await
        });
    }

    {
        let bypass = platform.device.bypass().clone();
        let clock = clock.clone();
        let entity = platform.device.entity.clone();
        let access_bytes = config.access_bytes;
        engine.spawn(async move {
            clock.wait_ticks(1).await;
            run_bypass_sequence(
                entity,
                clock,
                bypass,
                serialiser,
                AccessType::WriteNonPostedRequest,
                addrs,
                access_bytes,
            )
            .await
        });
    }
}
