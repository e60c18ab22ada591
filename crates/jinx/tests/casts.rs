//! Explicit conversions with the `as` operator and the conversion matrix.

mod common;

use common::execute_script;
use jinx::{ValueType, Variant};
use pretty_assertions::assert_eq;

#[test]
fn basic_casts() {
    let script = execute_script(
        r#"
        set a to 123.456 as integer
        set b to true as string
        set c to "false" as boolean
        set d to "456" as integer
        set e to "-123.456" as number
        set f to (4 + 5 + 6) as string
        set g to 0 as null
        "#,
    );
    assert_eq!(script.get_variable("a"), Variant::Integer(123));
    assert_eq!(script.get_variable("b"), "true");
    assert_eq!(script.get_variable("c"), false);
    assert_eq!(script.get_variable("d"), 456);
    assert_eq!(script.get_variable("e"), -123.456);
    assert_eq!(script.get_variable("f"), "15");
    assert_eq!(script.get_variable("g"), Variant::Null);
}

#[test]
fn round_trip_casts() {
    let script = execute_script(
        r#"
        set a to 12345
        set b to a as string
        set c to b as integer
        set d to true as string as boolean
        "#,
    );
    assert_eq!(script.get_variable("b"), "12345");
    assert_eq!(script.get_variable("c"), 12345);
    assert_eq!(script.get_variable("d"), true);
}

/// Number to string uses six decimal places; integer to string is plain
/// base ten.
#[test]
fn numeric_string_forms() {
    let script = execute_script(
        r"
        set a to 5.5 as string
        set b to 42 as string
        ",
    );
    assert_eq!(script.get_variable("a"), "5.500000");
    assert_eq!(script.get_variable("b"), "42");
}

#[test]
fn guid_casts() {
    let script = execute_script(
        r#"
        set a to "0F8FAD5B-D9CB-469F-A165-70867728950E" as guid
        set b to a as string
        "#,
    );
    assert_eq!(script.get_variable("a").value_type(), ValueType::Guid);
    assert_eq!(
        script.get_variable("b"),
        "0F8FAD5B-D9CB-469F-A165-70867728950E"
    );
}

/// Failed casts produce null rather than an error.
#[test]
fn failed_casts_become_null() {
    let script = execute_script(
        r#"
        set a to "not a number" as integer
        set b to "maybe" as boolean
        set c to "not a guid" as guid
        "#,
    );
    assert_eq!(script.get_variable("a"), Variant::Null);
    assert_eq!(script.get_variable("b"), Variant::Null);
    assert_eq!(script.get_variable("c"), Variant::Null);
}

/// Null converts to the zero value of each basic type.
#[test]
fn null_conversions() {
    let script = execute_script(
        r#"
        set a to null as integer
        set b to null as number
        set c to null as boolean
        set d to null as string
        "#,
    );
    assert_eq!(script.get_variable("a"), 0);
    assert_eq!(script.get_variable("b"), 0.0);
    assert_eq!(script.get_variable("c"), false);
    assert_eq!(script.get_variable("d"), "null");
}

/// The `type` operator yields comparable value-type constants.
#[test]
fn type_operator_constants() {
    let script = execute_script(
        r"
        set a to 5 type
        set b to a = integer
        set c to (1, 2) type = collection
        ",
    );
    assert_eq!(script.get_variable("b"), true);
    assert_eq!(script.get_variable("c"), true);
}

/// A collection converts to boolean by emptiness.
#[test]
fn collection_to_boolean() {
    let script = execute_script(
        r"
        set full to 1, 2
        set empty to []
        set a to full as boolean
        set b to empty as boolean
        ",
    );
    assert_eq!(script.get_variable("a"), true);
    assert_eq!(script.get_variable("b"), false);
}
