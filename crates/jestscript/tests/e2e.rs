//! End-to-end scenarios: plain `#[test]` functions running a chunk of source through
//! a persistent session and asserting on the resulting interpreter state.

use jestscript::value::ArrayKey;
use jestscript::{ErrorKind, ReplSession, Value};

fn run(source: &str) -> ReplSession {
    let mut session = ReplSession::new();
    session.execute(source).expect("program should run without error");
    session
}

fn number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => *n,
        other => panic!("expected a number, got {other:?}"),
    }
}

#[test]
fn overload_priority_picks_the_higher_priority_declaration_even_if_earlier() {
    let session = run(
        r"
        var var x = 1!!
        var var x = 2!
        ",
    );
    let x = session.evaluator().variables().try_get("x").expect("x should be defined");
    assert_eq!(number(&x), 1.0, "the priority-2 declaration should win over the later priority-1 one");
}

#[test]
fn overload_priority_ties_favor_the_later_declaration() {
    let session = run(
        r"
        var var x = 1!
        var var x = 2!
        ",
    );
    let x = session.evaluator().variables().try_get("x").expect("x should be defined");
    assert_eq!(number(&x), 2.0);
}

#[test]
fn history_cursor_reverse_moves_back_without_truncating() {
    let session = run(
        r"
        var var x = 1
        x = 2
        x = 3
        reverse x!
        ",
    );
    let x = session.evaluator().variables().try_get("x").expect("x should be defined");
    assert_eq!(number(&x), 2.0);
}

#[test]
fn history_cursor_forward_redoes_after_reverse() {
    let session = run(
        r"
        var var x = 1
        x = 2
        x = 3
        reverse x!
        reverse x!
        forward x!
        ",
    );
    let x = session.evaluator().variables().try_get("x").expect("x should be defined");
    assert_eq!(number(&x), 2.0);
}

#[test]
fn reassigning_after_reverse_truncates_the_redo_tail() {
    let session = run(
        r"
        var var x = 1
        x = 2
        x = 3
        reverse x!
        x = 99
        forward x!
        ",
    );
    let x = session.evaluator().variables().try_get("x").expect("x should be defined");
    assert_eq!(number(&x), 99.0, "forward past the end should saturate, not reach the discarded '3'");
}

#[test]
fn tri_valued_conditional_routes_maybe_to_the_idk_branch() {
    let session = run(
        r#"
        var var result = "unset"
        if (maybe) {
            result = "yes"
        } else {
            result = "no"
        } idk {
            result = "unsure"
        }
        "#,
    );
    let result = session.evaluator().variables().try_get("result").expect("result should be defined");
    assert_eq!(result.display_string(), "unsure");
}

#[test]
fn tri_valued_conditional_without_idk_branch_falls_back_to_then() {
    let session = run(
        r#"
        var var result = "unset"
        if (maybe) {
            result = "yes"
        } else {
            result = "no"
        }
        "#,
    );
    let result = session.evaluator().variables().try_get("result").expect("result should be defined");
    assert_eq!(result.display_string(), "yes");
}

#[test]
fn when_clause_fires_exactly_once_per_dependency_transition() {
    let session = run(
        r"
        var var counter = 0
        var var flag = false
        when (flag) {
            counter = counter + 1
        }
        flag = true
        ",
    );
    let counter = session.evaluator().variables().try_get("counter").expect("counter should be defined");
    assert_eq!(number(&counter), 1.0);
}

#[test]
fn when_clause_does_not_fire_on_unrelated_mutations() {
    let session = run(
        r"
        var var counter = 0
        var var flag = false
        var var unrelated = 0
        when (flag) {
            counter = counter + 1
        }
        unrelated = 1
        unrelated = 2
        ",
    );
    let counter = session.evaluator().variables().try_get("counter").expect("counter should be defined");
    assert_eq!(number(&counter), 0.0);
}

#[test]
fn when_clause_over_a_zero_arg_call_does_not_depend_on_the_callee_name() {
    let session = run(
        r"
        function ready() {
            return true
        }
        var var hits = 0
        var var unrelated = 0
        when (ready()) {
            if (hits == 0) {
                hits = 1
            }
        }
        unrelated = 1
        ",
    );
    let hits = session.evaluator().variables().try_get("hits").expect("hits should be defined");
    assert_eq!(
        number(&hits),
        1.0,
        "the callee identifier isn't a dependency, so this clause has no named deps and should fall back to the wildcard group"
    );
}

#[test]
fn when_clause_with_no_dependencies_registers_as_wildcard_and_fires_on_any_mutation() {
    let session = run(
        r"
        var var hits = 0
        var var unrelated = 0
        when (true) {
            if (hits == 0) {
                hits = 1
            }
        }
        unrelated = 1
        ",
    );
    let hits = session.evaluator().variables().try_get("hits").expect("hits should be defined");
    assert_eq!(number(&hits), 1.0, "a dependency-free condition should still fire once some mutation happens");
}

#[test]
fn when_clause_fires_once_after_the_triggering_increment_is_reached() {
    let session = run(
        r"
        var var x = 0
        var var hits = 0
        when (x == 3) {
            hits = hits + 1
        }
        x++
        x++
        x++
        ",
    );
    let hits = session.evaluator().variables().try_get("hits").expect("hits should be defined");
    assert_eq!(number(&hits), 1.0, "the clause should fire exactly once, on reaching x == 3");
}

#[test]
fn arrays_are_one_indexed_and_power_stars_squares_in_place() {
    let session = run(
        r"
        var var a = [10, 20, 30]
        a[2]**
        ",
    );
    let a = session.evaluator().variables().try_get("a").expect("a should be defined");
    let Value::Array(map) = a else { panic!("expected an array") };
    assert_eq!(number(map.get(&ArrayKey(1.0)).unwrap()), 10.0);
    assert_eq!(number(map.get(&ArrayKey(2.0)).unwrap()), 400.0, "20 squared via a[2]**");
    assert_eq!(number(map.get(&ArrayKey(3.0)).unwrap()), 30.0);
}

#[test]
fn postfix_run_length_encodes_delta_as_run_length_minus_one() {
    let session = run(
        r"
        var var x = 10
        x++++
        ",
    );
    let x = session.evaluator().variables().try_get("x").expect("x should be defined");
    assert_eq!(number(&x), 13.0, "x++++ has delta 3");
}

#[test]
fn deleted_values_are_poisoned_process_wide() {
    let err = jestscript::run_source(
        r"
        var var x = 5
        delete 5
        var var y = 5
        ",
    )
    .expect_err("declaring y with a poisoned literal should fail");
    assert_eq!(err.kind, ErrorKind::DeletedValueUsed);
}

#[test]
fn static_fields_are_shared_across_accesses_and_separate_from_instance_fields() {
    let mut session = ReplSession::new();
    session
        .execute(
            r#"
            class Counter {
                static total = 0
                count = 0
                function bump() {
                    Counter["total"] = Counter["total"] + 1
                    source["count"] = source["count"] + 1
                }
            }
            Counter["bump"]()
            Counter["bump"]()
            "#,
        )
        .expect("program should run without error");
    let progress = session.execute(r#"return Counter["total"]"#).expect("read should succeed");
    assert_eq!(number(&progress.result.expect("a value")), 2.0, "static field is shared, not per-instance");
    let progress = session.execute(r#"return Counter["count"]"#).expect("read should succeed");
    assert_eq!(number(&progress.result.expect("a value")), 2.0, "instance field bumped once per call too");
}

#[test]
fn deleting_a_binding_removes_it_entirely() {
    let err = jestscript::run_source(
        r"
        var var x = 5
        delete x!
        x?
        ",
    )
    .expect_err("reading a deleted binding should fail");
    assert_eq!(err.kind, ErrorKind::UndefinedVariable);
}
