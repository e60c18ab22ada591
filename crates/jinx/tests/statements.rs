//! Statement-level behavior: assignment forms, comments, multi-word
//! identifiers, external variables, and scoped blocks.

mod common;

use common::{assert_compile_fails, drive_to_completion, execute_script, test_runtime};
use jinx::Variant;

/// Line comments, inline and multi-line block comments all lex away.
#[test]
fn comments() {
    let script = execute_script(
        r"
        -- Single line comment

        --- Multiline
            comment ---

        ---------
        Alternate
        multiline
        comment
        ---------

        set a --- some comment --- to 123
        ",
    );
    assert_eq!(script.get_variable("a"), 123);
}

#[test]
fn variables_and_basic_statements() {
    let script = execute_script(
        r#"
        set a to "Hello world!"
        set b to 5.5
        set c to 123
        set d to true
        set e to null
        "#,
    );
    assert_eq!(script.get_variable("a"), "Hello world!");
    assert_eq!(script.get_variable("b"), 5.5);
    assert_eq!(script.get_variable("c"), 123);
    assert_eq!(script.get_variable("d"), true);
    assert_eq!(script.get_variable("e"), Variant::Null);
}

/// Variable names may span multiple words.
#[test]
fn multiple_word_variables() {
    let script = execute_script(
        r#"
        set a a to "Hello world!"
        set b b b to 5.5
        "#,
    );
    assert_eq!(script.get_variable("a a"), "Hello world!");
    assert_eq!(script.get_variable("b b b"), 5.5);
}

/// Multi-word variable names may contain reserved words.
#[test]
fn multiple_word_variables_with_keywords() {
    let script = execute_script(
        r#"
        set some string to "Hello world!"
        set some number to 5.5
        set some integer to 123
        set some boolean to true
        set some null to null
        "#,
    );
    assert_eq!(script.get_variable("some string"), "Hello world!");
    assert_eq!(script.get_variable("some number"), 5.5);
    assert_eq!(script.get_variable("some integer"), 123);
    assert_eq!(script.get_variable("some boolean"), true);
    assert_eq!(script.get_variable("some null"), Variant::Null);
}

/// The legacy `<name> is <expression>` assignment form still works.
#[test]
fn is_assignment() {
    let script = execute_script(
        r"
        a is 42
        b is a + 1
        ",
    );
    assert_eq!(script.get_variable("a"), 42);
    assert_eq!(script.get_variable("b"), 43);
}

/// Variables set in an inner scope disappear when the scope ends; outer
/// variables remain assignable from inner scopes.
#[test]
fn begin_end_scoping() {
    let script = execute_script(
        r"
        set outer to 1
        begin
            set inner to 2
            set outer to 3
        end
        ",
    );
    assert_eq!(script.get_variable("outer"), 3);
    assert_eq!(script.get_variable("inner"), Variant::Null);
}

/// The host seeds external variables before execution.
#[test]
fn external_variables() {
    let runtime = test_runtime();
    let bytecode = runtime
        .compile(
            r"
            external some other string
            set a to some other string + 1
            ",
            "test",
            &[],
        )
        .expect("script should compile");
    let mut script = runtime.create_script(bytecode, None);
    script.set_variable("some other string", Variant::Integer(41));
    drive_to_completion(&mut script);
    assert_eq!(script.get_variable("a"), 42);
}

/// The `type` postfix yields value-type constants comparable with type
/// literals.
#[test]
fn variable_type_operator() {
    let script = execute_script(
        r"
        set a to 123
        set b to a type
        set c to b = integer
        set d to 1.5 type = number
        ",
    );
    assert_eq!(script.get_variable("c"), true);
    assert_eq!(script.get_variable("d"), true);
}

/// Increment and decrement, with and without an explicit amount.
#[test]
fn increment_decrement() {
    let script = execute_script(
        r"
        set a to 1
        increment a
        set b to 10
        decrement b by 4
        set high score to 100
        increment high score by 50
        ",
    );
    assert_eq!(script.get_variable("a"), 2);
    assert_eq!(script.get_variable("b"), 6);
    assert_eq!(script.get_variable("high score"), 150);
}

/// Quoted names allow otherwise-reserved or spaced identifiers.
#[test]
fn quoted_names() {
    let script = execute_script(
        r"
        set 'my list' to 1, 2, 3
        set total to 'my list'[1] + 'my list'[2] + 'my list'[3]
        ",
    );
    assert_eq!(script.get_variable("total"), 6);
    assert!(script.get_variable("my list").is_collection());
}

/// External declarations are only legal at the root scope of the root
/// frame.
#[test]
fn external_requires_root() {
    assert_compile_fails(
        r"
        begin
            external foo
        end
        ",
    );
    assert_compile_fails(
        r"
        function nested thing
            external foo
        end
        ",
    );
}

/// An ellipse joins physical lines into one statement.
#[test]
fn ellipse_continuation() {
    let script = execute_script(
        r"
        set a to 1 + ...
            2 + ...
            3
        ",
    );
    assert_eq!(script.get_variable("a"), 6);
}
