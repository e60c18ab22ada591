//! Shared helpers for the integration tests.

use std::sync::{Arc, Mutex};

use jinx::{GlobalParams, LogLevel, Runtime, Script};

/// Creates a runtime with logging silenced, so expected-error tests don't
/// spam the test output.
#[allow(dead_code)]
pub fn test_runtime() -> Arc<Runtime> {
    let params = GlobalParams {
        enable_logging: false,
        ..GlobalParams::default()
    };
    Runtime::with_params(params)
}

/// Creates a runtime whose Info-level output (script `write` calls) is
/// captured into a shared string.
#[allow(dead_code)]
pub fn capture_runtime() -> (Arc<Runtime>, Arc<Mutex<String>>) {
    let output = Arc::new(Mutex::new(String::new()));
    let sink = Arc::clone(&output);
    let params = GlobalParams {
        log_fn: Some(Arc::new(move |level, text| {
            if level == LogLevel::Info {
                sink.lock().unwrap().push_str(text);
            }
        })),
        ..GlobalParams::default()
    };
    (Runtime::with_params(params), output)
}

/// Compiles and runs a script to completion on a fresh runtime.
#[allow(dead_code)]
pub fn execute_script(source: &str) -> Script {
    execute_script_with(source, &test_runtime())
}

/// Compiles and runs a script to completion on the given runtime, asserting
/// every execution cycle succeeds.
#[allow(dead_code)]
pub fn execute_script_with(source: &str, runtime: &Arc<Runtime>) -> Script {
    let bytecode = runtime
        .compile(source, "test", &[])
        .expect("script should compile");
    let mut script = runtime.create_script(bytecode, None);
    drive_to_completion(&mut script);
    script
}

/// Executes a script until finished, bounding the number of cycles so a
/// broken wait loop fails the test instead of hanging it.
#[allow(dead_code)]
pub fn drive_to_completion(script: &mut Script) {
    for _ in 0..10_000 {
        assert!(script.execute(), "script should execute without errors");
        if script.is_finished() {
            return;
        }
    }
    panic!("script did not finish within the cycle limit");
}

/// Asserts that a script fails to compile.
#[allow(dead_code)]
pub fn assert_compile_fails(source: &str) {
    let runtime = test_runtime();
    assert!(
        runtime.compile(source, "test", &[]).is_none(),
        "script should fail to compile:\n{source}"
    );
}

/// Asserts that a script compiles but dies with a runtime error.
#[allow(dead_code)]
pub fn assert_runtime_error(source: &str) {
    let runtime = test_runtime();
    let bytecode = runtime
        .compile(source, "test", &[])
        .expect("script should compile");
    let mut script = runtime.create_script(bytecode, None);
    for _ in 0..10_000 {
        if !script.execute() {
            assert!(script.is_finished());
            return;
        }
        if script.is_finished() {
            panic!("script finished without a runtime error:\n{source}");
        }
    }
    panic!("script did not finish within the cycle limit");
}
