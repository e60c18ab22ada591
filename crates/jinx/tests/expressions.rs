//! Expression evaluation: precedence, arithmetic, comparison, and logical
//! operators.

mod common;

use common::{execute_script, execute_script_with, test_runtime};
use jinx::{Variant, Visibility};

/// Multiplication binds tighter than addition; parentheses override.
#[test]
fn operator_precedence() {
    let script = execute_script(
        r"
        set a to 1 + 2 * 3
        set b to (1 + 2) * 3
        ",
    );
    assert_eq!(script.get_variable("a"), 7);
    assert_eq!(script.get_variable("b"), 9);
}

/// Integer arithmetic stays integral; mixed operands become numbers.
#[test]
fn numeric_type_propagation() {
    let script = execute_script(
        r"
        set a to 2 + 3
        set b to 2 + 3.0
        set c to 2 * 3
        set d to 2.5 * 2
        ",
    );
    assert_eq!(script.get_variable("a"), 5);
    assert_eq!(script.get_variable("b"), 5.0);
    assert_eq!(script.get_variable("c"), 6);
    assert_eq!(script.get_variable("d"), 5.0);
}

/// Integer division is exact or becomes a number; a number operand always
/// yields a number.
#[test]
fn division_exactness() {
    let script = execute_script(
        r"
        set a to 6 / 3
        set b to 3 / 2
        set c to 6.0 / 3
        ",
    );
    assert_eq!(script.get_variable("a"), 2);
    assert_eq!(script.get_variable("b"), 1.5);
    assert_eq!(script.get_variable("c"), 2.0);
}

/// The result of mod carries the divisor's sign, for integers and numbers.
#[test]
fn mod_sign_follows_divisor() {
    let script = execute_script(
        r"
        set a to 5 % 3
        set b to -5 % 3
        set c to 5 % -3
        set d to -5.0 % 3.0
        ",
    );
    assert_eq!(script.get_variable("a"), 2);
    assert_eq!(script.get_variable("b"), 1);
    assert_eq!(script.get_variable("c"), -1);
    assert_eq!(script.get_variable("d"), 1.0);
}

/// String + anything concatenates the stringified right operand.
#[test]
fn string_concatenation() {
    let script = execute_script(
        r#"
        set a to "value: " + 42
        set b to "flag: " + true
        "#,
    );
    assert_eq!(script.get_variable("a"), "value: 42");
    assert_eq!(script.get_variable("b"), "flag: true");
}

#[test]
fn unary_negation() {
    let script = execute_script(
        r"
        set x to 5
        set a to -x
        set b to -x * 2
        ",
    );
    assert_eq!(script.get_variable("a"), -5);
    assert_eq!(script.get_variable("b"), -10);
}

#[test]
fn comparisons() {
    let script = execute_script(
        r#"
        set a to 1 < 2
        set b to 2 <= 2
        set c to 3 > 4
        set d to 1.5 >= 1
        set e to "apple" < "banana"
        set f to 1 = 1.0
        set g to 1 != "1"
        "#,
    );
    assert_eq!(script.get_variable("a"), true);
    assert_eq!(script.get_variable("b"), true);
    assert_eq!(script.get_variable("c"), false);
    assert_eq!(script.get_variable("d"), true);
    assert_eq!(script.get_variable("e"), true);
    assert_eq!(script.get_variable("f"), true);
    assert_eq!(script.get_variable("g"), true);
}

/// `not` binds looser than comparisons and tighter than `and`.
#[test]
fn logical_operators() {
    let script = execute_script(
        r"
        set a to true and false
        set b to true or false
        set c to not 1 = 2
        set d to not false and true
        set e to true and true and false
        ",
    );
    assert_eq!(script.get_variable("a"), false);
    assert_eq!(script.get_variable("b"), true);
    assert_eq!(script.get_variable("c"), true);
    assert_eq!(script.get_variable("d"), true);
    assert_eq!(script.get_variable("e"), false);
}

/// The right side of and/or is not evaluated when the left side decides the
/// result.
#[test]
fn short_circuit_evaluation() {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    let runtime = test_runtime();
    let calls = Arc::new(AtomicUsize::new(0));
    let library = runtime.get_library("test");
    let counter = Arc::clone(&calls);
    library.register_function(Visibility::Public, "tracked truth", move |_script, _params| {
        counter.fetch_add(1, Ordering::SeqCst);
        Variant::Boolean(true)
    });

    let script = execute_script_with(
        r"
        import test

        set a to false and tracked truth
        set b to true or tracked truth
        set c to true and tracked truth
        set d to false or tracked truth
        ",
        &runtime,
    );
    assert_eq!(script.get_variable("a"), false);
    assert_eq!(script.get_variable("b"), true);
    assert_eq!(script.get_variable("c"), true);
    assert_eq!(script.get_variable("d"), true);
    // Only the last two statements may evaluate the call.
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

/// Subscripts chain on arbitrary expressions, not just variables.
#[test]
fn expression_subscripts() {
    let script = execute_script(
        r#"
        set rows to [1, "one"], [2, "two"]
        set a to (rows) [2]
        set inner to [10, "x"], [20, "y"]
        set nested to [1, inner]
        set b to nested [1] [20]
        "#,
    );
    assert_eq!(script.get_variable("a"), "two");
    assert_eq!(script.get_variable("b"), "y");
}
