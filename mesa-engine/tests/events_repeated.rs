// Copyright (c) 2024 Mesa Research Ltd. All rights reserved.

use std::cell::RefCell;
use std::rc::Rc;

use mesa_engine::events::repeated::Repeated;
use mesa_engine::test_helpers::start_test;
use mesa_engine::traits::Event;

#[test]
fn listener_receives_result() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();

    let event: Repeated<usize> = Repeated::new(0);
    let seen = Rc::new(RefCell::new(Vec::new()));

    {
        let event = event.clone();
        let seen = seen.clone();
        engine.spawn(async move {
            loop {
                let value = event.listen().await;
                seen.borrow_mut().push(value);
                if value == 3 {
                    break;
                }
            }
            Ok(())
        });
    }

    engine.spawn(async move {
        for value in 1..=3 {
            clock.wait_ticks(1).await;
            event.notify_result(value)?;
        }
        Ok(())
    });

    engine.run().unwrap();
    assert_eq!(*seen.borrow(), vec![1, 2, 3]);
}

#[test]
fn notify_without_listeners_is_harmless() {
    let event: Repeated<()> = Repeated::new(());
    event.notify().unwrap();
    event.notify_result(()).unwrap();
}
