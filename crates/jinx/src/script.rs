//! The script VM: a stack-based bytecode interpreter with cooperative
//! multitasking.
//!
//! A [`Script`] executes at most `max_instructions` opcodes per call to
//! [`execute`](Script::execute), yielding at `wait` statements, so a host can
//! drive many scripts from a single update loop. Variables live directly in
//! operand-stack slots: each execution frame carries a scope stack of
//! id-to-slot maps, pushed and popped by the `ScopeBegin`/`ScopeEnd` opcodes,
//! and binding a new variable simply records the slot at the top of the
//! stack.
//!
//! Runtime errors poison the script: `execute` returns false once and
//! [`is_finished`](Script::is_finished) reports true from then on.

use std::sync::Arc;
use std::time::Instant;

use ahash::AHashMap;

use crate::bytecode::{
    BYTECODE_HEADER_SIZE, BinaryReader, Bytecode, BytecodeHeader, DebugInfo, Opcode,
};
use crate::collection::{CollectionItr, collection_read, collection_write, create_collection};
use crate::coroutine::Coroutine;
use crate::error::RunError;
use crate::hash::get_hash;
use crate::library::{LibraryRef, PropertyName};
use crate::logging::LogLevel;
use crate::runtime::{
    FunctionBody, FunctionDefinition, INVALID_ID, Runtime, RuntimeId, UserContext,
};
use crate::signature::{FunctionSignature, canonical_text, parse_signature_string};
use crate::unicode::fold_case;
use crate::variant::{ValueType, Variant};

/// One lexical scope at runtime: variable bindings plus the stack height to
/// restore when the scope ends.
#[derive(Debug, Default)]
struct ScopeFrame {
    id_map: AHashMap<RuntimeId, usize>,
    stack_top: usize,
}

/// One active function call (or the top-level script body).
struct ExecutionFrame {
    bytecode: Bytecode,
    /// Instruction pointer: an absolute byte offset into `bytecode`.
    ip: usize,
    /// Definition of the function this frame executes; None for the script
    /// body.
    definition: Option<Arc<FunctionDefinition>>,
    scopes: Vec<ScopeFrame>,
    /// Stack height to truncate to when this frame returns.
    stack_top: usize,
    /// Stop execution when this frame returns (coroutine semantics).
    wait_on_return: bool,
}

impl ExecutionFrame {
    fn new(bytecode: Bytecode, definition: Option<Arc<FunctionDefinition>>) -> Self {
        Self {
            bytecode,
            ip: BYTECODE_HEADER_SIZE,
            definition,
            scopes: vec![ScopeFrame::default()],
            stack_top: 0,
            wait_on_return: false,
        }
    }

    fn name(&self) -> &str {
        self.definition.as_ref().map_or("root", |d| d.name.as_str())
    }
}

/// Flow control result of executing one opcode.
enum Flow {
    Continue,
    Yield,
    Finished,
}

/// A script instance executing compiled bytecode.
///
/// Create scripts with [`Runtime::create_script`]; call [`execute`](Self::execute)
/// once per update tick until [`is_finished`](Self::is_finished) reports
/// true.
pub struct Script {
    runtime: Arc<Runtime>,
    library: LibraryRef,
    execution: Vec<ExecutionFrame>,
    stack: Vec<Variant>,
    user_context: Option<UserContext>,
    name: String,
    finished: bool,
    error: bool,
}

impl Script {
    pub(crate) fn new(
        runtime: Arc<Runtime>,
        bytecode: Bytecode,
        user_context: Option<UserContext>,
    ) -> Self {
        let library = runtime.get_library("");
        let name = DebugInfo::read(&bytecode)
            .map(|d| d.script_name)
            .unwrap_or_default();
        let mut script = Self {
            runtime,
            library,
            execution: vec![ExecutionFrame::new(bytecode.clone(), None)],
            stack: Vec::with_capacity(32),
            user_context,
            name,
            finished: false,
            error: false,
        };
        let mut reader = BinaryReader::new(bytecode.as_bytes());
        match BytecodeHeader::read(&mut reader) {
            Some(header) if header.is_valid() => {}
            _ => script.runtime_error("Invalid bytecode"),
        }
        script
    }

    // -----------------------------------------------------------------
    // Host interface
    // -----------------------------------------------------------------

    /// Executes up to the instruction budget, returning false if a runtime
    /// error occurred. Poll [`is_finished`](Self::is_finished) to learn
    /// whether the script completed or merely yielded.
    pub fn execute(&mut self) -> bool {
        if self.error {
            return false;
        }
        // A finished script restarts from the top on the next execute call.
        if self.finished {
            self.finished = false;
            if let Some(frame) = self.execution.last_mut() {
                frame.ip = BYTECODE_HEADER_SIZE;
            }
        }

        let start = Instant::now();
        let max_instructions = self.runtime.max_instructions();
        let mut instruction_count: u64 = 0;
        let result = loop {
            if instruction_count >= u64::from(max_instructions) {
                if self.runtime.error_on_max_instructions() {
                    self.runtime_error("Exceeded maximum instruction count");
                    break false;
                }
                break true;
            }
            instruction_count += 1;
            match self.step() {
                Ok(Flow::Continue) => {}
                Ok(Flow::Yield) => break true,
                Ok(Flow::Finished) => {
                    self.finished = true;
                    break true;
                }
                Err(error) => {
                    self.runtime_error(&error.message);
                    break false;
                }
            }
        };
        let elapsed = start.elapsed().as_nanos() as u64;
        self.runtime
            .add_execution_perf(self.finished, elapsed, instruction_count);
        result
    }

    /// True once the script has completed or hit a fatal error.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished || self.error
    }

    /// Reads a variable of the current frame by name. Returns null for
    /// unknown names.
    #[must_use]
    pub fn get_variable(&self, name: &str) -> Variant {
        let folded = fold_case(name);
        self.get_variable_by_id(get_hash(folded.as_bytes()))
    }

    /// Writes a variable of the current frame by name, creating it in the
    /// innermost scope when new. This is also how hosts seed `external`
    /// variables before the first execute call.
    pub fn set_variable(&mut self, name: &str, value: Variant) {
        let folded = fold_case(name);
        self.set_variable_by_id(get_hash(folded.as_bytes()), value);
    }

    /// Finds a function id from its canonical signature string, optionally
    /// scoped to a library. Returns [`INVALID_ID`] when no such function is
    /// registered.
    #[must_use]
    pub fn find_function(&self, library: Option<&LibraryRef>, signature: &str) -> RuntimeId {
        let Some(parts) = parse_signature_string(signature) else {
            return INVALID_ID;
        };
        let library_name = library.map_or("", |l| l.name());
        let id = get_hash(canonical_text(library_name, &parts).as_bytes());
        match self.runtime.find_function(id) {
            Some(_) => id,
            None => INVALID_ID,
        }
    }

    /// Calls a function synchronously and returns its value.
    ///
    /// Native targets run inline. Bytecode targets run on a private child
    /// script driven to completion; a `wait` inside only yields within that
    /// drive loop.
    pub fn call_function(&mut self, id: RuntimeId, params: &[Variant]) -> Variant {
        let Some(definition) = self.runtime.find_function(id) else {
            self.runtime
                .log(LogLevel::Error, "Could not find function definition");
            return Variant::Null;
        };
        match &definition.body {
            FunctionBody::Native(callback) => {
                let callback = callback.clone();
                callback(self, params)
            }
            FunctionBody::Bytecode { .. } => {
                let mut coroutine = Coroutine::new(
                    self.runtime.clone(),
                    definition,
                    params.to_vec(),
                    self.user_context.clone(),
                );
                while !coroutine.is_finished() {}
                coroutine.get_return_value()
            }
        }
    }

    /// Starts a bytecode function asynchronously, returning the coroutine
    /// driving it. Returns `None` for unknown ids and native targets.
    pub fn call_async_function(&mut self, id: RuntimeId, params: &[Variant]) -> Option<Coroutine> {
        let Some(definition) = self.runtime.find_function(id) else {
            self.runtime
                .log(LogLevel::Error, "Could not find function definition");
            return None;
        };
        if matches!(definition.body, FunctionBody::Native(_)) {
            self.runtime.log(
                LogLevel::Error,
                "A native function cannot be called asynchronously as a coroutine",
            );
            return None;
        }
        Some(Coroutine::new(
            self.runtime.clone(),
            definition,
            params.to_vec(),
            self.user_context.clone(),
        ))
    }

    /// The script name given at compile time (empty when the bytecode was
    /// stripped of debug info).
    #[must_use]
    pub fn get_name(&self) -> &str {
        &self.name
    }

    /// The per-script user context, if one was provided.
    #[must_use]
    pub fn get_user_context(&self) -> Option<UserContext> {
        self.user_context.clone()
    }

    /// The library this script currently belongs to.
    #[must_use]
    pub fn get_library(&self) -> LibraryRef {
        self.library.clone()
    }

    /// The active call stack as function names, outermost ("root") first.
    #[must_use]
    pub fn get_call_stack(&self) -> Vec<String> {
        self.execution.iter().map(|f| f.name().to_owned()).collect()
    }

    pub(crate) fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    // -----------------------------------------------------------------
    // Stack and variables
    // -----------------------------------------------------------------

    pub(crate) fn push_value(&mut self, value: Variant) {
        self.stack.push(value);
    }

    pub(crate) fn pop_value(&mut self) -> Variant {
        self.stack.pop().unwrap_or(Variant::Null)
    }

    fn pop(&mut self) -> Result<Variant, RunError> {
        self.stack
            .pop()
            .ok_or_else(|| RunError::new("Stack underflow"))
    }

    fn peek(&self) -> Result<&Variant, RunError> {
        self.stack
            .last()
            .ok_or_else(|| RunError::new("Stack underflow"))
    }

    fn get_variable_by_id(&self, id: RuntimeId) -> Variant {
        let Some(frame) = self.execution.last() else {
            return Variant::Null;
        };
        for scope in frame.scopes.iter().rev() {
            if let Some(&index) = scope.id_map.get(&id) {
                return self.stack.get(index).cloned().unwrap_or(Variant::Null);
            }
        }
        Variant::Null
    }

    fn set_variable_by_id(&mut self, id: RuntimeId, value: Variant) {
        let Some(frame) = self.execution.last_mut() else {
            return;
        };
        for scope in frame.scopes.iter().rev() {
            if let Some(&index) = scope.id_map.get(&id) {
                if let Some(slot) = self.stack.get_mut(index) {
                    *slot = value;
                }
                return;
            }
        }
        // Unknown name: bind a fresh slot in the innermost scope.
        if let Some(scope) = frame.scopes.last_mut() {
            scope.id_map.insert(id, self.stack.len());
            self.stack.push(value);
        }
    }

    /// Pushes an execution frame for a bytecode function whose arguments are
    /// already on the stack.
    pub(crate) fn call_bytecode_function(
        &mut self,
        definition: &Arc<FunctionDefinition>,
        wait_on_return: bool,
    ) {
        let FunctionBody::Bytecode { bytecode, offset } = &definition.body else {
            return;
        };
        let stack_top = self
            .stack
            .len()
            .saturating_sub(definition.parameter_count);
        let mut frame = ExecutionFrame::new(bytecode.clone(), Some(definition.clone()));
        frame.ip = *offset;
        frame.stack_top = stack_top;
        if let Some(scope) = frame.scopes.last_mut() {
            scope.stack_top = stack_top;
        }
        self.execution.push(frame);
    }

    // -----------------------------------------------------------------
    // Bytecode reading
    // -----------------------------------------------------------------

    fn frame_mut(&mut self) -> Result<&mut ExecutionFrame, RunError> {
        self.execution
            .last_mut()
            .ok_or_else(|| RunError::new("No active execution frame"))
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], RunError> {
        let frame = self.frame_mut()?;
        let end = frame.ip + N;
        let bytes = frame
            .bytecode
            .as_bytes()
            .get(frame.ip..end)
            .ok_or_else(|| RunError::new("Unexpected end of bytecode"))?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        frame.ip = end;
        Ok(out)
    }

    fn read_u8(&mut self) -> Result<u8, RunError> {
        Ok(self.read_array::<1>()?[0])
    }

    fn read_u32(&mut self) -> Result<u32, RunError> {
        Ok(u32::from_le_bytes(self.read_array::<4>()?))
    }

    fn read_i32(&mut self) -> Result<i32, RunError> {
        Ok(i32::from_le_bytes(self.read_array::<4>()?))
    }

    fn read_u64(&mut self) -> Result<u64, RunError> {
        Ok(u64::from_le_bytes(self.read_array::<8>()?))
    }

    /// Runs a structured read (string, variant, signature) at the current
    /// instruction pointer.
    fn read_with<T>(
        &mut self,
        read: impl FnOnce(&mut BinaryReader) -> Option<T>,
    ) -> Result<T, RunError> {
        let frame = self.frame_mut()?;
        let bytecode = frame.bytecode.clone();
        let mut reader = BinaryReader::new(bytecode.as_bytes());
        reader.seek(frame.ip);
        let result = read(&mut reader);
        frame.ip = reader.tell();
        result.ok_or_else(|| RunError::new("Unexpected end of bytecode"))
    }

    fn jump_to(&mut self, address: u32) -> Result<(), RunError> {
        self.frame_mut()?.ip = address as usize;
        Ok(())
    }

    // -----------------------------------------------------------------
    // Error reporting
    // -----------------------------------------------------------------

    fn runtime_error(&mut self, message: &str) {
        let position = self.execution.last().map(|f| (f.bytecode.clone(), f.ip));
        let line = position
            .and_then(|(bytecode, ip)| DebugInfo::read(&bytecode).and_then(|d| d.line_at(ip)));
        let text = match (self.name.is_empty(), line) {
            (false, Some(line)) => {
                format!("Runtime error in '{}' at line {}: {}", self.name, line, message)
            }
            (false, None) => format!("Runtime error in '{}': {}", self.name, message),
            (true, Some(line)) => format!("Runtime error at line {line}: {message}"),
            (true, None) => format!("Runtime error: {message}"),
        };
        self.runtime.log(LogLevel::Error, &text);
        self.error = true;
        self.finished = true;
    }

    // -----------------------------------------------------------------
    // The interpreter
    // -----------------------------------------------------------------

    fn step(&mut self) -> Result<Flow, RunError> {
        let opcode = Opcode::from_byte(self.read_u8()?)
            .ok_or_else(|| RunError::new("Invalid operation in bytecode"))?;
        match opcode {
            Opcode::Add => {
                let right = self.pop()?;
                let left = self.pop()?;
                let result = left
                    .checked_add(&right)
                    .ok_or_else(|| RunError::new("Invalid operands for addition"))?;
                self.stack.push(result);
            }
            Opcode::Subtract => {
                let right = self.pop()?;
                let left = self.pop()?;
                let result = left
                    .checked_subtract(&right)
                    .ok_or_else(|| RunError::new("Invalid operands for subtraction"))?;
                self.stack.push(result);
            }
            Opcode::Multiply => {
                let right = self.pop()?;
                let left = self.pop()?;
                let result = left
                    .checked_multiply(&right)
                    .ok_or_else(|| RunError::new("Invalid operands for multiplication"))?;
                self.stack.push(result);
            }
            Opcode::Divide => {
                let right = self.pop()?;
                let left = self.pop()?;
                if right.to_number() == Some(0.0) {
                    return Err(RunError::new("Divide by zero"));
                }
                let result = left
                    .checked_divide(&right)
                    .ok_or_else(|| RunError::new("Invalid operands for division"))?;
                self.stack.push(result);
            }
            Opcode::Mod => {
                let right = self.pop()?;
                let left = self.pop()?;
                if right.to_number() == Some(0.0) {
                    return Err(RunError::new("Mod by zero"));
                }
                let result = left
                    .checked_modulo(&right)
                    .ok_or_else(|| RunError::new("Invalid operands for mod"))?;
                self.stack.push(result);
            }
            Opcode::Negate => {
                let value = self.pop()?;
                let result = value
                    .negate()
                    .ok_or_else(|| RunError::new("Invalid operand for negation"))?;
                self.stack.push(result);
            }
            Opcode::And => {
                let right = self.pop()?;
                let left = self.pop()?;
                self.stack
                    .push(Variant::Boolean(left.to_boolean() && right.to_boolean()));
            }
            Opcode::Or => {
                let right = self.pop()?;
                let left = self.pop()?;
                self.stack
                    .push(Variant::Boolean(left.to_boolean() || right.to_boolean()));
            }
            Opcode::Not => {
                let value = self.pop()?;
                self.stack.push(Variant::Boolean(!value.to_boolean()));
            }
            Opcode::Equals => {
                let right = self.pop()?;
                let left = self.pop()?;
                self.stack.push(Variant::Boolean(left == right));
            }
            Opcode::NotEquals => {
                let right = self.pop()?;
                let left = self.pop()?;
                self.stack.push(Variant::Boolean(left != right));
            }
            Opcode::Less => self.compare_op(opcode)?,
            Opcode::LessEq => self.compare_op(opcode)?,
            Opcode::Greater => self.compare_op(opcode)?,
            Opcode::GreaterEq => self.compare_op(opcode)?,
            Opcode::Cast => {
                let value_type = ValueType::from_byte(self.read_u8()?)
                    .ok_or_else(|| RunError::new("Invalid cast type in bytecode"))?;
                let top = self
                    .stack
                    .last_mut()
                    .ok_or_else(|| RunError::new("Stack underflow"))?;
                // A failed cast leaves null; only parameter casts are fatal.
                top.convert_to(value_type);
            }
            Opcode::Increment | Opcode::Decrement => {
                let delta = self.pop()?;
                let value = self.pop()?;
                if !delta.is_numeric() {
                    return Err(RunError::new("Cannot increment by a non-numeric type"));
                }
                if !value.is_numeric() {
                    return Err(RunError::new("Cannot increment a non-numeric type"));
                }
                let result = if opcode == Opcode::Increment {
                    value.checked_add(&delta)
                } else {
                    value.checked_subtract(&delta)
                }
                .ok_or_else(|| RunError::new("Invalid increment operands"))?;
                self.stack.push(result);
            }
            Opcode::Jump => {
                let address = self.read_u32()?;
                self.jump_to(address)?;
            }
            Opcode::JumpTrue => {
                let address = self.read_u32()?;
                let value = self.pop()?;
                if value.to_boolean() {
                    self.jump_to(address)?;
                }
            }
            Opcode::JumpFalse => {
                let address = self.read_u32()?;
                let value = self.pop()?;
                if !value.to_boolean() {
                    self.jump_to(address)?;
                }
            }
            Opcode::JumpTrueCheck => {
                let address = self.read_u32()?;
                if self.peek()?.to_boolean() {
                    self.jump_to(address)?;
                }
            }
            Opcode::JumpFalseCheck => {
                let address = self.read_u32()?;
                if !self.peek()?.to_boolean() {
                    self.jump_to(address)?;
                }
            }
            Opcode::PushVal => {
                let value = self.read_with(Variant::read)?;
                self.stack.push(value);
            }
            Opcode::PushVar => {
                let id = self.read_u64()?;
                let value = self.get_variable_by_id(id);
                self.stack.push(value);
            }
            Opcode::PushProp => {
                let id = self.read_u64()?;
                let value = self.runtime.get_property(id);
                self.stack.push(value);
            }
            Opcode::PushVarKey => {
                let id = self.read_u64()?;
                let key = self.pop()?;
                let value = self.get_variable_by_id(id);
                self.stack.push(Self::index_collection(&value, &key)?);
            }
            Opcode::PushPropKeyVal => {
                let id = self.read_u64()?;
                let key = self.pop()?;
                let value = self.runtime.get_property(id);
                self.stack.push(Self::index_collection(&value, &key)?);
            }
            Opcode::PushKeyVal => {
                let key = self.pop()?;
                let value = self.pop()?;
                self.stack.push(Self::index_collection(&value, &key)?);
            }
            Opcode::PushTop => {
                let top = self.peek()?.clone();
                self.stack.push(top);
            }
            Opcode::PushColl => {
                let count = self.read_u32()? as usize;
                let needed = count * 2;
                if self.stack.len() < needed {
                    return Err(RunError::new("Malformed collection initializer"));
                }
                let start = self.stack.len() - needed;
                let collection = create_collection();
                {
                    let mut guard = collection_write(&collection);
                    for i in 0..count {
                        let key = self.stack[start + i * 2].clone();
                        if !key.is_key_type() {
                            return Err(RunError::new("Invalid key type"));
                        }
                        let value = self.stack[start + i * 2 + 1].clone();
                        guard.insert(key, value);
                    }
                }
                self.stack.truncate(start);
                self.stack.push(Variant::Collection(collection));
            }
            Opcode::PushList => {
                let count = self.read_u32()? as usize;
                if self.stack.len() < count {
                    return Err(RunError::new("Malformed list initializer"));
                }
                let start = self.stack.len() - count;
                let collection = create_collection();
                {
                    let mut guard = collection_write(&collection);
                    for (i, value) in self.stack[start..].iter().enumerate() {
                        guard.insert(Variant::Integer(i as i64 + 1), value.clone());
                    }
                }
                self.stack.truncate(start);
                self.stack.push(Variant::Collection(collection));
            }
            Opcode::PushItr => {
                let top = self.peek()?;
                let Some(collection) = top.as_collection() else {
                    return Err(RunError::new("Expected collection type"));
                };
                let itr = CollectionItr::at_begin(collection.clone());
                self.stack.push(Variant::CollectionItr(itr));
            }
            Opcode::Pop => {
                self.pop()?;
            }
            Opcode::PopCount => {
                let count = self.read_u32()?;
                for _ in 0..count {
                    self.pop()?;
                }
            }
            Opcode::CallFunc => {
                let id = self.read_u64()?;
                let Some(definition) = self.runtime.find_function(id) else {
                    return Err(RunError::new("Could not find function definition"));
                };
                match &definition.body {
                    FunctionBody::Bytecode { .. } => {
                        if self.stack.len() < definition.parameter_count {
                            return Err(RunError::new("Stack underflow in function call"));
                        }
                        self.call_bytecode_function(&definition, false);
                    }
                    FunctionBody::Native(callback) => {
                        let count = definition.parameter_count;
                        if self.stack.len() < count {
                            return Err(RunError::new("Stack underflow in function call"));
                        }
                        let params = self.stack.split_off(self.stack.len() - count);
                        let callback = callback.clone();
                        let result = callback(self, &params);
                        self.stack.push(result);
                    }
                }
            }
            Opcode::Return => {
                let value = self.pop()?;
                if self.execution.len() == 1 {
                    // A return from the script body finishes the script,
                    // leaving variables readable by the host.
                    self.stack.push(value);
                    return Ok(Flow::Finished);
                }
                let frame = self
                    .execution
                    .pop()
                    .ok_or_else(|| RunError::new("No active execution frame"))?;
                self.stack.truncate(frame.stack_top);
                self.stack.push(value);
                if frame.wait_on_return {
                    return Ok(Flow::Finished);
                }
            }
            Opcode::SetVar => {
                let id = self.read_u64()?;
                let value = self.pop()?;
                self.set_variable_by_id(id, value);
            }
            Opcode::SetProp => {
                let id = self.read_u64()?;
                let value = self.pop()?;
                self.runtime.set_property(id, value);
            }
            Opcode::SetVarKey => {
                let id = self.read_u64()?;
                let value = self.pop()?;
                let key = self.pop()?;
                if !key.is_key_type() {
                    return Err(RunError::new("Invalid key type"));
                }
                let target = self.get_variable_by_id(id);
                let Some(collection) = target.as_collection() else {
                    return Err(RunError::new("Expected collection when accessing by key"));
                };
                collection_write(collection).insert(key, value);
            }
            Opcode::SetPropKeyVal => {
                let id = self.read_u64()?;
                let value = self.pop()?;
                let key = self.pop()?;
                if !key.is_key_type() {
                    return Err(RunError::new("Invalid key type"));
                }
                let target = self.runtime.get_property(id);
                let Some(collection) = target.as_collection() else {
                    return Err(RunError::new("Expected collection when accessing by key"));
                };
                collection_write(collection).insert(key, value);
            }
            Opcode::SetIndex => {
                let id = self.read_u64()?;
                let stack_index = self.read_i32()?;
                let value_type = ValueType::from_byte(self.read_u8()?)
                    .ok_or_else(|| RunError::new("Invalid cast type in bytecode"))?;
                let index = self.stack.len() as i64 + i64::from(stack_index);
                let index = usize::try_from(index)
                    .ok()
                    .filter(|i| *i < self.stack.len())
                    .ok_or_else(|| RunError::new("Invalid stack index"))?;
                if value_type != ValueType::Any && !self.stack[index].convert_to(value_type) {
                    return Err(RunError::new("Invalid function parameter cast"));
                }
                let frame = self.frame_mut()?;
                if let Some(scope) = frame.scopes.last_mut() {
                    scope.id_map.insert(id, index);
                }
            }
            Opcode::EraseVar => {
                let id = self.read_u64()?;
                if let Variant::CollectionItr(itr) = self.get_variable_by_id(id) {
                    let mut itr = itr;
                    itr.erase();
                    self.set_variable_by_id(id, Variant::CollectionItr(itr));
                }
            }
            Opcode::EraseProp => {
                let id = self.read_u64()?;
                if let Variant::CollectionItr(itr) = self.runtime.get_property(id) {
                    let mut itr = itr;
                    itr.erase();
                    self.runtime.set_property(id, Variant::CollectionItr(itr));
                }
            }
            Opcode::EraseVarElem => {
                let id = self.read_u64()?;
                let key = self.pop()?;
                let target = self.get_variable_by_id(id);
                if let Some(collection) = target.as_collection() {
                    if !key.is_key_type() {
                        return Err(RunError::new("Invalid key type"));
                    }
                    collection_write(collection).remove(&key);
                }
            }
            Opcode::ErasePropElem => {
                let id = self.read_u64()?;
                let key = self.pop()?;
                let target = self.runtime.get_property(id);
                if let Some(collection) = target.as_collection() {
                    if !key.is_key_type() {
                        return Err(RunError::new("Invalid key type"));
                    }
                    collection_write(collection).remove(&key);
                }
            }
            Opcode::ScopeBegin => {
                let stack_top = self.stack.len();
                let frame = self.frame_mut()?;
                frame.scopes.push(ScopeFrame {
                    id_map: AHashMap::new(),
                    stack_top,
                });
            }
            Opcode::ScopeEnd => {
                let frame = self.frame_mut()?;
                let scope = frame
                    .scopes
                    .pop()
                    .ok_or_else(|| RunError::new("Scope stack mismatch"))?;
                self.stack.truncate(scope.stack_top);
            }
            Opcode::Function => {
                let signature = self.read_with(FunctionSignature::read)?;
                if signature.visibility() != crate::signature::VisibilityType::Local {
                    self.library.register_function_signature(signature.clone());
                }
                let frame = self.frame_mut()?;
                // The body starts past the jump instruction that follows.
                let offset = frame.ip + 5;
                let bytecode = frame.bytecode.clone();
                self.runtime
                    .register_function_bytecode(&signature, bytecode, offset);
            }
            Opcode::Library => {
                let name = self.read_with(|reader| reader.read_str())?;
                self.library = self.runtime.get_library(&name);
            }
            Opcode::Property => {
                let property = self.read_with(PropertyName::read)?;
                self.library.register_property_name(property.clone(), false);
                self.runtime
                    .set_property(property.id(), property.default_value().clone());
            }
            Opcode::LoopCount => {
                self.loop_count()?;
            }
            Opcode::LoopOver => {
                self.loop_over()?;
            }
            Opcode::Type => {
                let value = self.pop()?;
                self.stack.push(Variant::ValType(value.value_type()));
            }
            Opcode::Wait => return Ok(Flow::Yield),
            Opcode::Exit => return Ok(Flow::Finished),
        }
        Ok(Flow::Continue)
    }

    fn compare_op(&mut self, opcode: Opcode) -> Result<(), RunError> {
        let right = self.pop()?;
        let left = self.pop()?;
        if !Variant::validate_comparison(&left, &right) {
            return Err(RunError::new(format!(
                "Incompatible types in {opcode} comparison"
            )));
        }
        let order = Variant::compare_order(&left, &right)
            .ok_or_else(|| RunError::new("Invalid comparison"))?;
        let result = match opcode {
            Opcode::Less => order.is_lt(),
            Opcode::LessEq => order.is_le(),
            Opcode::Greater => order.is_gt(),
            _ => order.is_ge(),
        };
        self.stack.push(Variant::Boolean(result));
        Ok(())
    }

    fn index_collection(value: &Variant, key: &Variant) -> Result<Variant, RunError> {
        let Some(collection) = value.as_collection() else {
            return Err(RunError::new("Expected collection when accessing by key"));
        };
        collection_read(collection)
            .get(key)
            .ok_or_else(|| RunError::new("Specified key does not exist in collection"))
    }

    /// Advances a counting loop. Stack: `[counter][limit][step]`; pushes the
    /// continue flag. A null step is inferred as ±1 from the counter
    /// direction.
    fn loop_count(&mut self) -> Result<(), RunError> {
        if self.stack.len() < 3 {
            return Err(RunError::new("Stack underflow in loop"));
        }
        let top = self.stack.len() - 1;
        let counter = self.stack[top - 2].clone();
        let limit = self.stack[top - 1].clone();
        let step = if self.stack[top].is_null() {
            match Variant::compare_order(&counter, &limit) {
                Some(std::cmp::Ordering::Greater) => Variant::Integer(-1),
                Some(_) => Variant::Integer(1),
                None => return Err(RunError::new("Invalid loop range")),
            }
        } else {
            self.stack[top].clone()
        };
        let counter = counter
            .checked_add(&step)
            .ok_or_else(|| RunError::new("Invalid loop counter"))?;
        self.stack[top - 2] = counter.clone();
        let direction = step
            .to_number()
            .ok_or_else(|| RunError::new("Invalid loop increment"))?;
        let order = Variant::compare_order(&counter, &limit)
            .ok_or_else(|| RunError::new("Invalid loop range"))?;
        if direction > 0.0 {
            self.stack.push(Variant::Boolean(order.is_le()));
        } else if direction < 0.0 {
            self.stack.push(Variant::Boolean(order.is_ge()));
        } else {
            return Err(RunError::new("Incremented loop counter by zero"));
        }
        Ok(())
    }

    /// Advances an iteration loop. Stack: `[collection][iterator]`; pushes
    /// the finished flag.
    fn loop_over(&mut self) -> Result<(), RunError> {
        let top = self
            .stack
            .len()
            .checked_sub(1)
            .ok_or_else(|| RunError::new("Stack underflow in loop"))?;
        let Variant::CollectionItr(itr) = &self.stack[top] else {
            return Err(RunError::new("Expected iterator in loop"));
        };
        let mut itr = itr.clone();
        let mut finished = itr.is_at_end();
        if !finished {
            itr.advance();
            finished = itr.is_at_end();
        }
        self.stack[top] = Variant::CollectionItr(itr);
        self.stack.push(Variant::Boolean(finished));
        Ok(())
    }
}

impl std::fmt::Debug for Script {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Script")
            .field("name", &self.name)
            .field("finished", &self.finished)
            .field("error", &self.error)
            .field("frames", &self.execution.len())
            .field("stack", &self.stack.len())
            .finish()
    }
}
