//! The core library: write, sizes, call stack, dynamic variables, and the
//! newline property.

mod common;

use common::{capture_runtime, execute_script, execute_script_with};
use jinx::Variant;

/// `write` emits raw values; `write line` appends a newline; list arguments
/// write element by element.
#[test]
fn write_output() {
    let (runtime, output) = capture_runtime();
    execute_script_with(
        r#"
        import core

        write line "Hello, world!"
        write "a", "b", "c", newline
        write line 42
        "#,
        &runtime,
    );
    assert_eq!(&*output.lock().unwrap(), "Hello, world!\nabc\n42\n");
}

#[test]
fn size_and_empty() {
    let script = execute_script(
        r#"
        import core

        set text to "hello"
        set a to text size
        set b to text is empty
        set c to "" is empty
        "#,
    );
    assert_eq!(script.get_variable("a"), 5);
    assert_eq!(script.get_variable("b"), false);
    assert_eq!(script.get_variable("c"), true);
}

/// The call stack lists "root" and each enclosing function, outermost
/// first.
#[test]
fn call_stack() {
    let script = execute_script(
        r"
        import core

        function func4 {integer a}
            return call stack
        end

        function func3 {a}
            return func4 a
        end

        function func2/func22 (opt1/opt2)
            return func3 123
        end

        function func1/func11 (optional)
            return func2
        end

        set a to func1
        ",
    );
    let value = script.get_variable("a");
    let stack = value.as_collection().expect("call stack collection");
    let guard = stack.read().unwrap();
    assert_eq!(
        guard.get(&Variant::Integer(1)),
        Some(Variant::String("root".into()))
    );
    assert_eq!(
        guard.get(&Variant::Integer(2)),
        Some(Variant::String("func1/func11 (optional)".into()))
    );
    assert_eq!(
        guard.get(&Variant::Integer(3)),
        Some(Variant::String("func2/func22 (opt1/opt2)".into()))
    );
    assert_eq!(
        guard.get(&Variant::Integer(4)),
        Some(Variant::String("func3 {}".into()))
    );
    assert_eq!(
        guard.get(&Variant::Integer(5)),
        Some(Variant::String("func4 {integer}".into()))
    );
}

/// The call stack includes the library name for library functions.
#[test]
fn call_stack_with_library() {
    let script = execute_script(
        r"
        import core

        library test

        function func one
            return call stack
        end

        set a to func one
        ",
    );
    let value = script.get_variable("a");
    let stack = value.as_collection().expect("call stack collection");
    let guard = stack.read().unwrap();
    assert_eq!(
        guard.get(&Variant::Integer(1)),
        Some(Variant::String("root".into()))
    );
    assert_eq!(
        guard.get(&Variant::Integer(2)),
        Some(Variant::String("test func one".into()))
    );
}

/// `variable` and `set variable` access variables by computed name.
#[test]
fn dynamic_variable_access() {
    let script = execute_script(
        r#"
        import core

        set score to 10
        set a to variable "score"
        set bonus to 0
        set variable "bonus" to 5
        set b to bonus + a
        "#,
    );
    assert_eq!(script.get_variable("a"), 10);
    assert_eq!(script.get_variable("b"), 15);
}

/// The newline property is a readonly "\n".
#[test]
fn newline_property() {
    let script = execute_script(
        r"
        import core

        set a to newline
        ",
    );
    assert_eq!(script.get_variable("a"), "\n");

    // Writing to it fails at compile time.
    let runtime = common::test_runtime();
    assert!(
        runtime
            .compile(
                r#"
                import core

                set newline to "x"
                "#,
                "test",
                &[],
            )
            .is_none()
    );
}
