// Copyright (c) 2025 Mesa Research Ltd. All rights reserved.

use mesa_track::entity::{Entity, toplevel};
use mesa_track::test_helpers::check_and_clear;
use mesa_track::{create_tag, enter, exit, info, test_init, warn};

#[test]
fn entity_creation_tracked() {
    let (test_tracker, tracker) = test_init!(10);
    let top = toplevel(&tracker, "top");
    check_and_clear(&test_tracker, &["0: created 10, top"]);

    let child = Entity::new(&top, "child");
    check_and_clear(&test_tracker, &["10: created 11, top::child"]);
    assert_eq!(child.full_name(), "top::child");
    assert_eq!(format!("{child}"), "top::child");
}

#[test]
fn log_macros_emit() {
    let (test_tracker, tracker) = test_init!(20);
    let top = toplevel(&tracker, "top");
    check_and_clear(&test_tracker, &["0: created 20, top"]);

    info!(top ; "hello {}", 42);
    warn!(top ; "watch out");
    check_and_clear(&test_tracker, &["20:INFO: hello 42", "20:WARN: watch out"]);
}

#[test]
fn enter_exit_tracked() {
    let (test_tracker, tracker) = test_init!(30);
    let top = toplevel(&tracker, "top");
    check_and_clear(&test_tracker, &["0: created 30, top"]);

    let item = create_tag!(top);
    enter!(top ; item);
    exit!(top ; item);
    check_and_clear(&test_tracker, &["30: enter 31", "30: exit 31"]);
}
