//! Error handling: lex errors, parse errors, and runtime errors that poison
//! the script.

mod common;

use common::{assert_compile_fails, assert_runtime_error, test_runtime};
use jinx::GlobalParams;

// =====================================================================
// Lex errors
// =====================================================================

#[test]
fn mismatched_string_quote() {
    assert_compile_fails("set a to \"unterminated\n");
}

#[test]
fn malformed_numbers() {
    assert_compile_fails("set a to 1.2.3");
    assert_compile_fails("set a to 12abc");
}

#[test]
fn bare_exclamation() {
    assert_compile_fails("set a to 1 ! 2");
}

#[test]
fn unterminated_block_comment() {
    assert_compile_fails("--- this never ends\nset a to 1");
}

// =====================================================================
// Parse errors
// =====================================================================

#[test]
fn incomplete_statements() {
    assert_compile_fails("set");
    assert_compile_fails("set a");
    assert_compile_fails("set a to");
    assert_compile_fails("if true\nset a to 1");
    assert_compile_fails("loop while true\nend extra");
}

#[test]
fn break_outside_loop() {
    assert_compile_fails("break");
}

#[test]
fn duplicate_properties() {
    assert_compile_fails(
        r"
        set private counter to 0
        set private counter to 1
        ",
    );
}

#[test]
fn missing_end() {
    assert_compile_fails(
        r"
        if true
            set a to 1
        ",
    );
}

#[test]
fn keyword_only_signature() {
    assert_compile_fails(
        r"
        function set
        end
        ",
    );
}

#[test]
fn adjacent_parameters_in_signature() {
    assert_compile_fails(
        r"
        function bad {a} {b}
        end
        ",
    );
}

// =====================================================================
// Runtime errors
// =====================================================================

#[test]
fn divide_by_zero() {
    assert_runtime_error("set a to 1 / 0");
    assert_runtime_error("set a to 1 % 0");
}

#[test]
fn arithmetic_on_non_numeric() {
    assert_runtime_error("set a to true + 1");
    assert_runtime_error("set a to null * 2");
}

#[test]
fn invalid_comparison() {
    assert_runtime_error(r#"set a to 1 < "two""#);
    assert_runtime_error("set a to null < null");
}

#[test]
fn missing_collection_key() {
    assert_runtime_error(
        r#"
        set a to [1, "one"]
        set b to a [99]
        "#,
    );
}

#[test]
fn subscript_of_non_collection() {
    assert_runtime_error(
        r"
        set a to 5
        set b to a [1]
        ",
    );
}

#[test]
fn invalid_collection_key_type() {
    assert_runtime_error(
        r"
        set bad key to null
        set a to [bad key, 1]
        ",
    );
}

#[test]
fn invalid_parameter_cast() {
    assert_runtime_error(
        r#"
        function wants integer {integer x}
            return x
        end

        set a to wants integer "not numeric"
        "#,
    );
}

#[test]
fn zero_loop_increment() {
    assert_runtime_error(
        r"
        loop i from 1 to 10 by 0
            set a to 1
        end
        ",
    );
}

/// Budget exhaustion is fatal when the flag is set, a yield otherwise.
#[test]
fn instruction_budget() {
    let fatal = GlobalParams {
        enable_logging: false,
        max_instructions: 100,
        error_on_max_instructions: true,
        ..GlobalParams::default()
    };
    let runtime = jinx::Runtime::with_params(fatal);
    let bytecode = runtime
        .compile("loop while true\nend", "test", &[])
        .expect("script should compile");
    let mut script = runtime.create_script(bytecode, None);
    assert!(!script.execute(), "budget exhaustion should be fatal");
    assert!(script.is_finished());

    let lenient = GlobalParams {
        enable_logging: false,
        max_instructions: 100,
        error_on_max_instructions: false,
        ..GlobalParams::default()
    };
    let runtime = jinx::Runtime::with_params(lenient);
    let bytecode = runtime
        .compile("loop while true\nend", "test", &[])
        .expect("script should compile");
    let mut script = runtime.create_script(bytecode, None);
    assert!(script.execute(), "budget exhaustion should yield");
    assert!(!script.is_finished(), "the script is merely suspended");
}

/// A runtime error poisons the script: execute fails once and is_finished
/// reports true thereafter.
#[test]
fn errors_poison_the_script() {
    let runtime = test_runtime();
    let bytecode = runtime
        .compile("set a to 1 / 0", "test", &[])
        .expect("script should compile");
    let mut script = runtime.create_script(bytecode, None);
    assert!(!script.execute());
    assert!(script.is_finished());
    assert!(!script.execute(), "a poisoned script stays failed");
}

/// Compile failures return None rather than panicking, and report through
/// the log sink.
#[test]
fn compile_errors_are_logged() {
    use std::sync::{Arc, Mutex};

    let errors = Arc::new(Mutex::new(String::new()));
    let sink = Arc::clone(&errors);
    let params = GlobalParams {
        log_fn: Some(Arc::new(move |level, text| {
            if level == jinx::LogLevel::Error {
                sink.lock().unwrap().push_str(text);
            }
        })),
        ..GlobalParams::default()
    };
    let runtime = jinx::Runtime::with_params(params);
    assert!(runtime.compile("set a to \"oops\n", "myscript", &[]).is_none());
    let logged = errors.lock().unwrap();
    assert!(logged.contains("myscript"), "log should name the script: {logged}");
    assert!(logged.contains("line 1"), "log should give the line: {logged}");
}
