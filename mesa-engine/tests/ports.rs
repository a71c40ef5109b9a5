// Copyright (c) 2024 Mesa Research Ltd. All rights reserved.

use std::cell::RefCell;
use std::rc::Rc;

use mesa_engine::port::{InPort, OutPort};
use mesa_engine::test_helpers::start_test;
use mesa_track::entity::Entity;

#[test]
fn put_get_rendezvous() {
    let mut engine = start_test(file!());
    let top = engine.top();

    let producer = Rc::new(Entity::new(top, "producer"));
    let consumer = Rc::new(Entity::new(top, "consumer"));

    let rx: InPort<i32> = InPort::new(&consumer, "rx");
    let mut tx: OutPort<i32> = OutPort::new(&producer, "tx");
    tx.connect(rx.state());

    let received = Rc::new(RefCell::new(Vec::new()));

    engine.spawn(async move {
        for value in 0..4 {
            tx.put(value).await?;
        }
        Ok(())
    });

    {
        let received = received.clone();
        engine.spawn(async move {
            for _ in 0..4 {
                received.borrow_mut().push(rx.get().await);
            }
            Ok(())
        });
    }

    engine.run().unwrap();
    assert_eq!(*received.borrow(), vec![0, 1, 2, 3]);
}

#[test]
#[should_panic(expected = "top::producer::tx already connected")]
fn connect_twice() {
    let engine = start_test(file!());
    let top = engine.top();

    let producer = Rc::new(Entity::new(top, "producer"));
    let consumer = Rc::new(Entity::new(top, "consumer"));

    let rx: InPort<i32> = InPort::new(&consumer, "rx");
    let mut tx: OutPort<i32> = OutPort::new(&producer, "tx");
    tx.connect(rx.state());
    tx.connect(rx.state());
}

#[test]
#[should_panic(expected = "top::producer::tx not connected")]
fn put_unconnected() {
    let engine = start_test(file!());
    let top = engine.top();

    let producer = Rc::new(Entity::new(top, "producer"));
    let tx: OutPort<i32> = OutPort::new(&producer, "tx");
    let _ = tx.put(1);
}
