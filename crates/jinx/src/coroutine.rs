//! Coroutines: asynchronous execution of a single bytecode function.
//!
//! A coroutine wraps a child [`Script`] sharing the parent's runtime and user
//! context but owning its own operand and frame stacks. The child executes
//! just the target function (arguments pre-pushed, `wait_on_return` set on
//! the call frame), one cooperative cycle per [`is_finished`](Coroutine::is_finished)
//! poll, and captures the function's return value when it completes.

use std::sync::Arc;

use crate::bytecode::Bytecode;
use crate::runtime::{FunctionBody, FunctionDefinition, Runtime, UserContext};
use crate::script::Script;
use crate::variant::Variant;

/// A function executing asynchronously on its own script.
pub struct Coroutine {
    script: Option<Script>,
    return_value: Variant,
}

impl Coroutine {
    pub(crate) fn new(
        runtime: Arc<Runtime>,
        definition: Arc<FunctionDefinition>,
        params: Vec<Variant>,
        user_context: Option<UserContext>,
    ) -> Self {
        let FunctionBody::Bytecode { bytecode, .. } = &definition.body else {
            return Self {
                script: None,
                return_value: Variant::Null,
            };
        };
        let bytecode: Bytecode = bytecode.clone();
        let mut script = Script::new(runtime, bytecode, user_context);
        for param in params {
            script.push_value(param);
        }
        script.call_bytecode_function(&definition, true);

        let mut coroutine = Self {
            script: Some(script),
            return_value: Variant::Null,
        };
        // Initial execution cycle; trivial functions finish immediately.
        coroutine.drive();
        coroutine
    }

    fn drive(&mut self) {
        if let Some(script) = &mut self.script {
            script.execute();
            if script.is_finished() {
                self.return_value = script.pop_value();
                self.script = None;
            }
        }
    }

    /// Checks whether the coroutine has completed, running one execution
    /// cycle when it has not.
    pub fn is_finished(&mut self) -> bool {
        if self.script.is_none() {
            return true;
        }
        self.drive();
        self.script.is_none()
    }

    /// The function's return value once finished; null before that.
    #[must_use]
    pub fn get_return_value(&self) -> Variant {
        self.return_value.clone()
    }
}

impl std::fmt::Debug for Coroutine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coroutine")
            .field("finished", &self.script.is_none())
            .field("return_value", &self.return_value)
            .finish()
    }
}
