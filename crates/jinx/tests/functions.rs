//! Script-defined functions: signatures, parameters, recursion, and the
//! return-value discipline.

mod common;

use common::{assert_compile_fails, execute_script};
use jinx::Variant;

#[test]
fn simple_function() {
    let script = execute_script(
        r"
        function do nothing
        end

        do nothing
        ",
    );
    assert!(script.is_finished());
}

/// A function without a return statement yields null when used as a value.
#[test]
fn function_without_return_yields_null() {
    let script = execute_script(
        r"
        function do nothing
        end

        set a to do nothing
        ",
    );
    assert_eq!(script.get_variable("a"), Variant::Null);
}

#[test]
fn function_with_return_value() {
    let script = execute_script(
        r"
        function lucky number
            return 7
        end

        set a to lucky number
        ",
    );
    assert_eq!(script.get_variable("a"), 7);
}

/// Alternative names are interchangeable at the call site.
#[test]
fn alternate_names() {
    let script = execute_script(
        r"
        function do nothing/nada/zilch
        end

        do nothing
        do nada
        do zilch
        ",
    );
    assert!(script.is_finished());
}

/// Optional name parts may be freely included or omitted.
#[test]
fn optional_name_parts() {
    let script = execute_script(
        r"
        function (the) answer
            return 42
        end

        set a to the answer
        set b to answer
        ",
    );
    assert_eq!(script.get_variable("a"), 42);
    assert_eq!(script.get_variable("b"), 42);
}

#[test]
fn function_parameters() {
    let script = execute_script(
        r"
        function {x} plus {y}
            return x + y
        end

        set a to 3 plus 4
        set b to (1 + 1) plus (2 * 2)
        ",
    );
    assert_eq!(script.get_variable("a"), 7);
    assert_eq!(script.get_variable("b"), 6);
}

/// Typed parameters cast their argument at call time.
#[test]
fn typed_parameters() {
    let script = execute_script(
        r#"
        function stringified {string s}
            return s
        end

        set a to stringified 42
        "#,
    );
    assert_eq!(script.get_variable("a"), "42");
}

/// Recursive calls resolve because the signature registers before its body
/// parses.
#[test]
fn recursion() {
    let script = execute_script(
        r"
        function factorial {x}
            if x <= 1
                return 1
            end
            return x * factorial (x - 1)
        end

        set a to factorial 7
        ",
    );
    assert_eq!(script.get_variable("a"), 5040);
}

/// Returning a comma list produces an indexed collection.
#[test]
fn multiple_return_values() {
    let script = execute_script(
        r#"
        function some values
            return "wolf", "goat", "cabbage"
        end

        set wolf to some values [1]
        set goat to some values [2]
        set cabbage to some values [3]
        "#,
    );
    assert_eq!(script.get_variable("wolf"), "wolf");
    assert_eq!(script.get_variable("goat"), "goat");
    assert_eq!(script.get_variable("cabbage"), "cabbage");
}

/// Keywords may appear inside a signature as long as one part is not a
/// keyword.
#[test]
fn keywords_in_signatures() {
    let script = execute_script(
        r"
        function count to {integer y}
            return y
        end

        set a to count to 5
        ",
    );
    assert_eq!(script.get_variable("a"), 5);
}

/// A leading `return` keyword marks the signature as value-returning and
/// requires every path to return.
#[test]
fn return_discipline() {
    let script = execute_script(
        r"
        function return pick {x}
            if x > 0
                return 1
            else
                return 2
            end
        end

        set a to pick 5
        set b to pick -5
        ",
    );
    assert_eq!(script.get_variable("a"), 1);
    assert_eq!(script.get_variable("b"), 2);

    // A path that falls off the end fails to compile.
    assert_compile_fails(
        r"
        function return pick {x}
            if x > 0
                return 1
            end
        end
        ",
    );
}

#[test]
fn functions_must_be_root_level() {
    assert_compile_fails(
        r"
        begin
            function nested
            end
        end
        ",
    );
    assert_compile_fails(
        r"
        function outer
            function inner
            end
        end
        ",
    );
}

#[test]
fn duplicate_function_fails() {
    assert_compile_fails(
        r"
        function do thing
        end
        function do thing
        end
        ",
    );
}

/// Calls match the longest signature when several share a prefix.
#[test]
fn longest_signature_wins() {
    let script = execute_script(
        r#"
        function describe {x}
            return "short"
        end

        function describe {x} fully
            return "long"
        end

        set a to describe 1
        set b to describe 1 fully
        "#,
    );
    assert_eq!(script.get_variable("a"), "short");
    assert_eq!(script.get_variable("b"), "long");
}
