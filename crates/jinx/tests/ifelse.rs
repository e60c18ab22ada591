//! Conditional execution: if, else, else-if chains, and nesting.

mod common;

use common::execute_script;

#[test]
fn simple_if() {
    let script = execute_script(
        r"
        set a to 0
        if true
            set a to 1
        end
        if false
            set a to 2
        end
        ",
    );
    assert_eq!(script.get_variable("a"), 1);
}

#[test]
fn if_else() {
    let script = execute_script(
        r"
        if 1 > 2
            set a to 1
        else
            set a to 2
        end
        ",
    );
    assert_eq!(script.get_variable("a"), 2);
}

#[test]
fn else_if_chain() {
    let script = execute_script(
        r#"
        set value to 3
        if value = 1
            set name to "one"
        else if value = 2
            set name to "two"
        else if value = 3
            set name to "three"
        else
            set name to "many"
        end
        "#,
    );
    assert_eq!(script.get_variable("name"), "three");
}

#[test]
fn else_fallthrough() {
    let script = execute_script(
        r#"
        set value to 9
        if value = 1
            set name to "one"
        else if value = 2
            set name to "two"
        else
            set name to "many"
        end
        "#,
    );
    assert_eq!(script.get_variable("name"), "many");
}

#[test]
fn nested_conditionals() {
    let script = execute_script(
        r"
        set a to 10
        set b to 20
        set result to 0
        if a = 10
            if b = 20
                set result to 1
            else
                set result to 2
            end
        end
        ",
    );
    assert_eq!(script.get_variable("result"), 1);
}

/// Conditions use full expressions, including and/or and comparisons.
#[test]
fn compound_conditions() {
    let script = execute_script(
        r"
        set a to 5
        set hit to false
        if a > 1 and a < 10 and not a = 4
            set hit to true
        end
        ",
    );
    assert_eq!(script.get_variable("hit"), true);
}
