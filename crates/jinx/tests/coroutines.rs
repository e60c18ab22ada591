//! Coroutines: asynchronous function calls driven by the script, plus the
//! host-side async API.

mod common;

use common::{execute_script, test_runtime};
use jinx::Variant;

/// A trivial function finishes on the first poll.
#[test]
fn async_call_simple_function() {
    let script = execute_script(
        r"
        import core

        function test
            set a to 1
        end

        set c to async call function test
        wait until c is finished
        set v to c's value
        ",
    );
    assert_eq!(script.get_variable("v"), Variant::Null);
}

#[test]
fn async_call_with_return_value() {
    let script = execute_script(
        r#"
        import core

        function test
            return 999
        end

        set c to async call function test
        wait until c is finished
        set v to c's value
        "#,
    );
    assert_eq!(script.get_variable("v"), 999);
}

#[test]
fn async_call_with_argument() {
    let script = execute_script(
        r"
        import core

        function test {x}
            return x + 1
        end

        set c to async call function test {} with 123
        wait until c is finished
        set v to c's value
        ",
    );
    assert_eq!(script.get_variable("v"), 124);
}

/// Scenario: an asynchronous counting function that waits each pass.
#[test]
fn async_counting_function() {
    let script = execute_script(
        r"
        import core

        function count to {integer y}
            set x to 0
            loop while x < y
                increment x
                wait
            end
            return x
        end

        set c to async call function count to {} with 5
        wait until c is finished
        set v to c's value
        ",
    );
    assert_eq!(script.get_variable("v"), 5);
}

/// Several coroutines advance independently.
#[test]
fn multiple_coroutines() {
    let script = execute_script(
        r"
        import core

        function count to {integer x}
            set i to 0
            loop while i < x
                increment i
                wait
            end
            return i
        end

        set c1 to async call function count to {} with 6
        set c2 to async call function count to {} with 4
        set c3 to async call function count to {} with 2
        wait until c1 is finished and c2 is finished and c3 is finished
        set v1 to c1's value
        set v2 to c2's value
        set v3 to c3's value
        ",
    );
    assert_eq!(script.get_variable("v1"), 6);
    assert_eq!(script.get_variable("v2"), 4);
    assert_eq!(script.get_variable("v3"), 2);
}

/// Functions with multiple parameters take a list after `with`.
#[test]
fn async_call_with_multiple_arguments() {
    let script = execute_script(
        r"
        import core

        function {a} plus {b}
            return a + b
        end

        set c to async call function {} plus {} with (19, 23)
        wait until c is finished
        set v to c's value
        ",
    );
    assert_eq!(script.get_variable("v"), 42);
}

/// Synchronous `call function` runs to completion immediately, waits and
/// all.
#[test]
fn sync_call_function() {
    let script = execute_script(
        r"
        import core

        function count to {integer y}
            set x to 0
            loop while x < y
                increment x
                wait
            end
            return x
        end

        set v to call function count to {} with 3
        ",
    );
    assert_eq!(script.get_variable("v"), 3);
}

/// Function references are first-class values.
#[test]
fn function_reference_values() {
    let script = execute_script(
        r"
        import core

        function lucky number
            return 7
        end

        set f to function lucky number
        set v to call f
        ",
    );
    assert_eq!(script.get_variable("v"), 7);
}

/// Host-side asynchronous calls drive coroutines directly.
#[test]
fn host_async_call() {
    let runtime = test_runtime();
    let bytecode = runtime
        .compile(
            r"
            public function return double {x}
                return x * 2
            end
            ",
            "test",
            &[],
        )
        .expect("script should compile");
    let mut script = runtime.create_script(bytecode, None);
    common::drive_to_completion(&mut script);

    let id = script.find_function(None, "double {}");
    assert_ne!(id, jinx::INVALID_ID);
    let mut coroutine = script
        .call_async_function(id, &[Variant::Integer(21)])
        .expect("bytecode function supports async calls");
    while !coroutine.is_finished() {}
    assert_eq!(coroutine.get_return_value(), 42);
}
