// Copyright (c) 2025 Mesa Research Ltd. All rights reserved.

use mesa_engine::test_helpers::start_test;
use mesa_resources::{Resource, ResourceGuard};

#[test]
fn resource_all_released() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    const CAPACITY: usize = 2;

    let resource = Resource::new(CAPACITY);

    const NUM_RESOURCE_REQUESTS: usize = 5;

    for _ in 0..NUM_RESOURCE_REQUESTS {
        let clock = clock.clone();
        let resource = resource.clone();
        engine.spawn(async move {
            resource.request().await;
            clock.wait_ticks(10).await;
            resource.release().await?;
            Ok(())
        });
    }

    engine.run().unwrap();

    assert_eq!(resource.count(), 0);
}

#[test]
fn resource_serialises_holders() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();

    let resource = Resource::new(1);

    const NUM_RESOURCE_REQUESTS: usize = 3;

    for _ in 0..NUM_RESOURCE_REQUESTS {
        let clock = clock.clone();
        let resource = resource.clone();
        engine.spawn(async move {
            resource.request().await;
            clock.wait_ticks(10).await;
            resource.release().await?;
            Ok(())
        });
    }

    engine.run().unwrap();

    // Three holders of a single unit for 10 ticks each
    assert_eq!(engine.time_now_ns(), 30.0);
}

#[test]
#[should_panic]
fn resource_more_releases() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();

    let resource = Resource::new(2);

    {
        let resource = resource.clone();
        engine.spawn(async move {
            resource.request().await;
            clock.wait_ticks(10).await;
            resource.release().await?;
            resource.release().await?;
            Ok(())
        });
    }

    engine.run().unwrap();
}

#[test]
fn resource_no_release_keeps_count() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    const CAPACITY: usize = 2;

    let resource = Resource::new(CAPACITY);

    for _ in 0..5 {
        let clock = clock.clone();
        let resource = resource.clone();
        engine.spawn(async move {
            resource.request().await;
            clock.wait_ticks(10).await;
            Ok(())
        });
    }

    engine.run().unwrap();

    assert_eq!(resource.count(), CAPACITY);
}

#[test]
fn resource_guard() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    const CAPACITY: usize = 2;

    let resource = Resource::new(CAPACITY);

    for _ in 0..5 {
        let clock = clock.clone();
        let resource = resource.clone();
        engine.spawn(async move {
            let _guard = ResourceGuard::new(resource).await;
            clock.wait_ticks(10).await;
            Ok(())
        });
    }

    engine.run().unwrap();

    assert_eq!(resource.count(), 0);
}
