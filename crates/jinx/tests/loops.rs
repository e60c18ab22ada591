//! Loop forms: while, until, post-test, counting, iteration, and break.

mod common;

use common::execute_script;
use jinx::Variant;

#[test]
fn loop_while() {
    let script = execute_script(
        r"
        set a to 1
        loop while a < 10
            increment a
        end
        ",
    );
    assert_eq!(script.get_variable("a"), 10);
}

#[test]
fn loop_until() {
    let script = execute_script(
        r"
        set a to 1
        loop until a >= 10
            increment a
        end
        ",
    );
    assert_eq!(script.get_variable("a"), 10);
}

/// Post-test loops execute the body once before testing.
#[test]
fn loop_post_test() {
    let script = execute_script(
        r"
        set a to 1
        loop
            increment a
        while a < 10

        set b to 100
        loop
            increment b
        until b > 0
        ",
    );
    assert_eq!(script.get_variable("a"), 10);
    assert_eq!(script.get_variable("b"), 101);
}

#[test]
fn loop_break() {
    let script = execute_script(
        r"
        set b to 1
        loop while true
            increment b
            if b = 10
                break
            end
        end
        ",
    );
    assert_eq!(script.get_variable("b"), 10);
}

/// Break exits only the innermost enclosing loop.
#[test]
fn break_exits_innermost_loop() {
    let script = execute_script(
        r"
        set total to 0
        loop i from 1 to 3
            loop j from 1 to 10
                if j = 2
                    break
                end
                increment total
            end
        end
        ",
    );
    // The inner loop contributes one iteration per outer pass.
    assert_eq!(script.get_variable("total"), 3);
}

#[test]
fn loop_from_to() {
    let script = execute_script(
        r"
        set total to 0
        loop i from 1 to 4
            increment total by i
        end
        ",
    );
    assert_eq!(script.get_variable("total"), 10);
}

/// Counting loops run backwards when from > to, and honor an explicit step.
#[test]
fn loop_from_to_by() {
    let script = execute_script(
        r"
        set down to 0
        loop i from 3 to 1
            increment down
        end

        set stepped to 0
        loop i from 0 to 10 by 2
            increment stepped
        end
        ",
    );
    assert_eq!(script.get_variable("down"), 3);
    assert_eq!(script.get_variable("stepped"), 6);
}

#[test]
fn loop_over_collection() {
    let script = execute_script(
        r#"
        import core

        set colors to "red", "green", "blue"
        set count to 0
        set last to ""
        loop x over colors
            increment count
            set last to x's value
        end
        "#,
    );
    assert_eq!(script.get_variable("count"), 3);
    assert_eq!(script.get_variable("last"), "blue");
}

/// Iterators expose both keys and values inside an iteration loop.
#[test]
fn loop_over_keys_and_values() {
    let script = execute_script(
        r#"
        import core

        set table to [10, "ten"], [20, "twenty"]
        set key total to 0
        set joined to ""
        loop entry over table
            increment key total by entry's key
            set joined to joined + entry's value
        end
        "#,
    );
    assert_eq!(script.get_variable("key total"), 30);
    assert_eq!(script.get_variable("joined"), "tentwenty");
}

/// An empty collection skips the loop body entirely.
#[test]
fn loop_over_empty_collection() {
    let script = execute_script(
        r"
        set empty to []
        set count to 0
        loop x over empty
            increment count
        end
        ",
    );
    assert_eq!(script.get_variable("count"), 0);
}

/// The loop counter is visible inside the loop but scoped to it.
#[test]
fn loop_counter_scoping() {
    let script = execute_script(
        r"
        set last to 0
        loop counter from 1 to 5
            set last to counter
        end
        ",
    );
    assert_eq!(script.get_variable("last"), 5);
    assert_eq!(script.get_variable("counter"), Variant::Null);
}

/// A wait inside a counting loop requires one execute call per pass.
#[test]
fn wait_in_loop_requires_multiple_executions() {
    let runtime = common::test_runtime();
    let bytecode = runtime
        .compile(
            r"
            loop i from 1 to 5
                wait
            end
            ",
            "test",
            &[],
        )
        .expect("script should compile");
    let mut script = runtime.create_script(bytecode, None);
    let mut executions = 0;
    while !script.is_finished() {
        assert!(script.execute());
        executions += 1;
        assert!(executions < 100, "script should have finished by now");
    }
    assert!(executions >= 5, "expected at least 5 cycles, got {executions}");
}
