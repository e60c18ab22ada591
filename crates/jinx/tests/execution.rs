//! Cooperative execution: wait semantics, property-driven completion, and
//! performance statistics.

mod common;

use common::test_runtime;

/// Scenario: a script waits on a property-updating function until it
/// reports completion.
#[test]
fn wait_until_function_completes() {
    let runtime = test_runtime();
    let bytecode = runtime
        .compile(
            r"
            set private counter to 0

            function counter to finished
                increment counter
                return counter >= 10
            end

            wait until counter to finished
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
        assert!(executions < 100, "script should have finished");
    }
    assert!(executions >= 10, "expected at least 10 cycles, got {executions}");
    assert_eq!(runtime.get_library("").get_property("counter"), 10);
}

#[test]
fn wait_in_loop_counts_cycles() {
    let runtime = test_runtime();
    let bytecode = runtime
        .compile(
            r"
            set ticks to 0
            loop while ticks < 3
                increment ticks
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
        assert!(executions < 100);
    }
    assert_eq!(script.get_variable("ticks"), 3);
    assert!(executions >= 3);
}

/// A bare wait suspends exactly until the next execute call.
#[test]
fn single_wait() {
    let runtime = test_runtime();
    let bytecode = runtime
        .compile(
            r"
            set a to 1
            wait
            set a to 2
            ",
            "test",
            &[],
        )
        .expect("script should compile");
    let mut script = runtime.create_script(bytecode, None);
    assert!(script.execute());
    assert!(!script.is_finished());
    assert_eq!(script.get_variable("a"), 1);
    assert!(script.execute());
    assert!(script.is_finished());
    assert_eq!(script.get_variable("a"), 2);
}

/// Performance counters accumulate and reset on demand.
#[test]
fn performance_stats() {
    let runtime = test_runtime();
    let bytecode = runtime
        .compile("set a to 1 + 2", "test", &[])
        .expect("script should compile");
    let mut script = runtime.create_script(bytecode, None);
    common::drive_to_completion(&mut script);

    let stats = runtime.get_script_performance_stats(true);
    assert_eq!(stats.script_compilation_count, 1);
    assert!(stats.script_execution_count >= 1);
    assert_eq!(stats.script_completion_count, 1);
    assert!(stats.instruction_count > 0);

    // After a reset the counters start over.
    let stats = runtime.get_script_performance_stats(false);
    assert_eq!(stats.script_compilation_count, 0);
    assert_eq!(stats.instruction_count, 0);
}
