//! The runtime: process-level registries shared by every script.
//!
//! A [`Runtime`] owns the library map, the function registry, and the
//! property registry, and provides the compile entry point. Functions and
//! properties registered by any script (or by the host) are visible to all
//! scripts sharing the runtime. Scripts may execute on separate threads; the
//! registries are guarded by mutexes, sharded by id for the two hot maps.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;

use ahash::AHashMap;

use crate::bytecode::{BinaryReader, Bytecode, BytecodeHeader, Opcode};
use crate::library::{Library, LibraryRef, PropertyName};
use crate::lexer::{self, Symbol, SymbolKind, TokenValue};
use crate::logging::{LogFn, LogLevel, LogSink};
use crate::parser::Parser;
use crate::script::Script;
use crate::signature::FunctionSignature;
use crate::variant::{ValueType, Variant};

/// Opaque 64-bit identifier for functions, properties, and variables.
pub type RuntimeId = u64;

/// The reserved invalid id.
pub const INVALID_ID: RuntimeId = 0;

/// Shard count for the function and property registries.
const NUM_SHARDS: usize = 8;

/// Per-script user context passed through to native functions.
pub type UserContext = Arc<dyn std::any::Any + Send + Sync>;

/// Native function callback: receives the calling script and the evaluated
/// parameters, and returns the function's value (null for none).
pub type FunctionCallback = Arc<dyn Fn(&mut Script, &[Variant]) -> Variant + Send + Sync>;

/// Global parameters affecting logging and execution behavior.
#[derive(Clone)]
pub struct GlobalParams {
    /// Master switch for the log sink.
    pub enable_logging: bool,
    /// Log the symbol list after lexing.
    pub log_symbols: bool,
    /// Log a disassembly after compilation.
    pub log_bytecode: bool,
    /// Embed the debug (line info) section in compiled bytecode.
    pub enable_debug_info: bool,
    /// Custom log callback; None writes to stdout/stderr.
    pub log_fn: Option<LogFn>,
    /// Maximum opcodes executed per [`Script::execute`] call.
    pub max_instructions: u32,
    /// Treat instruction-budget exhaustion as a fatal script error instead
    /// of a yield.
    pub error_on_max_instructions: bool,
}

impl Default for GlobalParams {
    fn default() -> Self {
        Self {
            enable_logging: true,
            log_symbols: false,
            log_bytecode: false,
            enable_debug_info: true,
            log_fn: None,
            max_instructions: 2000,
            error_on_max_instructions: true,
        }
    }
}

/// Accumulated script performance statistics.
///
/// Counters accumulate from runtime creation or from the last call to
/// [`Runtime::get_script_performance_stats`] with `reset` set.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerformanceStats {
    /// Total compilation time of all scripts in nanoseconds.
    pub compilation_time_ns: u64,
    /// Total execution time of all scripts in nanoseconds.
    pub execution_time_ns: u64,
    /// Length of the sampling window in nanoseconds.
    pub perf_time_ns: u64,
    /// Number of scripts compiled.
    pub script_compilation_count: u64,
    /// Number of calls to [`Script::execute`].
    pub script_execution_count: u64,
    /// Number of scripts that ran to completion.
    pub script_completion_count: u64,
    /// Number of instructions executed.
    pub instruction_count: u64,
}

/// Executable body of a registered function.
pub(crate) enum FunctionBody {
    /// A script function: a bytecode buffer and the byte offset of its body.
    Bytecode { bytecode: Bytecode, offset: usize },
    /// A host-registered native callback.
    Native(FunctionCallback),
}

impl std::fmt::Debug for FunctionBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bytecode { offset, .. } => write!(f, "Bytecode {{ offset: {offset} }}"),
            Self::Native(_) => f.write_str("Native"),
        }
    }
}

/// A function registered with the runtime, looked up by id at call time.
#[derive(Debug)]
pub(crate) struct FunctionDefinition {
    /// Canonical signature text, used by the script-visible call stack.
    pub name: String,
    pub parameter_count: usize,
    pub body: FunctionBody,
}

struct PerfState {
    stats: PerformanceStats,
    start_time: Instant,
}

/// The shared scripting environment.
///
/// Create one per host "world" with [`Runtime::new`], register native
/// functions through [`Runtime::get_library`], then compile and run scripts.
pub struct Runtime {
    params: GlobalParams,
    sink: LogSink,
    libraries: Mutex<AHashMap<String, LibraryRef>>,
    functions: [Mutex<AHashMap<RuntimeId, Arc<FunctionDefinition>>>; NUM_SHARDS],
    properties: [Mutex<AHashMap<RuntimeId, Variant>>; NUM_SHARDS],
    perf: Mutex<PerfState>,
    self_ref: Weak<Self>,
}

impl Runtime {
    /// Creates a runtime with default parameters and the `core` library
    /// registered.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_params(GlobalParams::default())
    }

    /// Creates a runtime with explicit global parameters.
    #[must_use]
    pub fn with_params(params: GlobalParams) -> Arc<Self> {
        let runtime = Arc::new_cyclic(|self_ref| Self {
            sink: LogSink::new(params.enable_logging, params.log_fn.clone()),
            params,
            libraries: Mutex::new(AHashMap::new()),
            functions: std::array::from_fn(|_| Mutex::new(AHashMap::new())),
            properties: std::array::from_fn(|_| Mutex::new(AHashMap::new())),
            perf: Mutex::new(PerfState {
                stats: PerformanceStats::default(),
                start_time: Instant::now(),
            }),
            self_ref: self_ref.clone(),
        });
        crate::lib_core::register_lib_core(&runtime);
        runtime
    }

    /// Compiles script text into bytecode.
    ///
    /// `name` identifies the script in diagnostics; `imports` is a list of
    /// libraries imported by default. Returns `None` on any lex or parse
    /// error (details go to the log sink).
    pub fn compile(&self, source: &str, name: &str, imports: &[&str]) -> Option<Bytecode> {
        let begin = Instant::now();
        let symbols = match lexer::lex(source, name) {
            Ok(symbols) => symbols,
            Err(error) => {
                self.log(LogLevel::Error, &error.to_string());
                return None;
            }
        };
        if self.params.log_symbols {
            self.log_symbols(&symbols);
        }
        let parser = Parser::new(self, name, &symbols, imports);
        let (bytecode, id_names) = match parser.execute() {
            Ok(result) => result,
            Err(error) => {
                self.log(LogLevel::Error, &error.to_string());
                return None;
            }
        };
        if self.params.log_bytecode {
            self.log_bytecode(&bytecode, &id_names);
        }
        let elapsed = begin.elapsed().as_nanos() as u64;
        {
            let mut perf = self.perf();
            perf.stats.script_compilation_count += 1;
            perf.stats.compilation_time_ns += elapsed;
        }
        Some(bytecode)
    }

    /// Creates a script from compiled bytecode.
    #[must_use]
    pub fn create_script(
        self: &Arc<Self>,
        bytecode: Bytecode,
        user_context: Option<UserContext>,
    ) -> Script {
        Script::new(Arc::clone(self), bytecode, user_context)
    }

    /// Compiles and creates a script in one step.
    pub fn create_script_from_source(
        self: &Arc<Self>,
        source: &str,
        user_context: Option<UserContext>,
        name: &str,
        imports: &[&str],
    ) -> Option<Script> {
        let bytecode = self.compile(source, name, imports)?;
        Some(self.create_script(bytecode, user_context))
    }

    /// Compiles, creates, and begins executing a script.
    ///
    /// The script has run one execution cycle when this returns; drive it
    /// with [`Script::execute`] until [`Script::is_finished`].
    pub fn execute_script(
        self: &Arc<Self>,
        source: &str,
        user_context: Option<UserContext>,
        name: &str,
        imports: &[&str],
    ) -> Option<Script> {
        let mut script = self.create_script_from_source(source, user_context, name, imports)?;
        script.execute();
        Some(script)
    }

    /// Retrieves a library by name, creating it if missing.
    pub fn get_library(&self, name: &str) -> LibraryRef {
        let mut libraries = self
            .libraries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(library) = libraries.get(name) {
            return Arc::clone(library);
        }
        let library = Arc::new(Library::new(self.self_ref.clone(), name));
        libraries.insert(name.to_owned(), Arc::clone(&library));
        library
    }

    /// Returns true when a library of this name has been created.
    pub(crate) fn library_exists(&self, name: &str) -> bool {
        self.libraries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Retrieves accumulated performance statistics, optionally resetting
    /// the counters.
    pub fn get_script_performance_stats(&self, reset: bool) -> PerformanceStats {
        let mut perf = self.perf();
        let now = Instant::now();
        perf.stats.perf_time_ns = now.duration_since(perf.start_time).as_nanos() as u64;
        let stats = perf.stats;
        if reset {
            perf.stats = PerformanceStats::default();
            perf.start_time = now;
        }
        stats
    }

    /// Returns a copy of `bytecode` with the debug section removed.
    ///
    /// Already-stripped buffers are returned unchanged. Returns `None` when
    /// the buffer is not valid bytecode.
    pub fn strip_debug_info(&self, bytecode: &Bytecode) -> Option<Bytecode> {
        let mut reader = BinaryReader::new(bytecode.as_bytes());
        let header = BytecodeHeader::read(&mut reader)?;
        if !header.is_valid() || (header.data_size as usize) > bytecode.size() {
            return None;
        }
        if (header.data_size as usize) == bytecode.size() {
            return Some(bytecode.clone());
        }
        Some(Bytecode::new(
            bytecode.as_bytes()[..header.data_size as usize].to_vec(),
        ))
    }

    // -----------------------------------------------------------------
    // Internal registries
    // -----------------------------------------------------------------

    fn function_shard(
        &self,
        id: RuntimeId,
    ) -> MutexGuard<'_, AHashMap<RuntimeId, Arc<FunctionDefinition>>> {
        self.functions[(id % NUM_SHARDS as u64) as usize]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn property_shard(&self, id: RuntimeId) -> MutexGuard<'_, AHashMap<RuntimeId, Variant>> {
        self.properties[(id % NUM_SHARDS as u64) as usize]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn find_function(&self, id: RuntimeId) -> Option<Arc<FunctionDefinition>> {
        self.function_shard(id).get(&id).cloned()
    }

    pub(crate) fn register_function_bytecode(
        &self,
        signature: &FunctionSignature,
        bytecode: Bytecode,
        offset: usize,
    ) {
        let definition = Arc::new(FunctionDefinition {
            name: signature.display_name(),
            parameter_count: signature.parameter_count(),
            body: FunctionBody::Bytecode { bytecode, offset },
        });
        self.function_shard(signature.id())
            .insert(signature.id(), definition);
    }

    pub(crate) fn register_function_native(
        &self,
        signature: &FunctionSignature,
        callback: FunctionCallback,
    ) {
        let definition = Arc::new(FunctionDefinition {
            name: signature.display_name(),
            parameter_count: signature.parameter_count(),
            body: FunctionBody::Native(callback),
        });
        self.function_shard(signature.id())
            .insert(signature.id(), definition);
    }

    pub(crate) fn get_property(&self, id: RuntimeId) -> Variant {
        self.property_shard(id).get(&id).cloned().unwrap_or_default()
    }

    pub(crate) fn set_property(&self, id: RuntimeId, value: Variant) {
        self.property_shard(id).insert(id, value);
    }

    // -----------------------------------------------------------------
    // Performance and logging
    // -----------------------------------------------------------------

    fn perf(&self) -> MutexGuard<'_, PerfState> {
        self.perf.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn add_execution_perf(
        &self,
        finished: bool,
        execution_time_ns: u64,
        instruction_count: u64,
    ) {
        let mut perf = self.perf();
        perf.stats.execution_time_ns += execution_time_ns;
        perf.stats.instruction_count += instruction_count;
        perf.stats.script_execution_count += 1;
        if finished {
            perf.stats.script_completion_count += 1;
        }
    }

    pub(crate) fn max_instructions(&self) -> u32 {
        self.params.max_instructions
    }

    pub(crate) fn error_on_max_instructions(&self) -> bool {
        self.params.error_on_max_instructions
    }

    pub(crate) fn enable_debug_info(&self) -> bool {
        self.params.enable_debug_info
    }

    pub(crate) fn log(&self, level: LogLevel, message: &str) {
        self.sink.write_line(level, message);
    }

    pub(crate) fn log_write(&self, level: LogLevel, message: &str) {
        self.sink.write(level, message);
    }

    fn log_symbols(&self, symbols: &[Symbol]) {
        self.log(LogLevel::Info, "\nSymbols:\n====================");
        let mut line = String::new();
        for symbol in symbols {
            match (&symbol.kind, &symbol.value) {
                (SymbolKind::NewLine, _) => {
                    self.log(LogLevel::Info, &line);
                    line.clear();
                }
                (_, TokenValue::Name(name)) => {
                    if name.contains(' ') {
                        line.push_str(&format!("'{name}' "));
                    } else {
                        line.push_str(&format!("{name} "));
                    }
                }
                (_, TokenValue::Str(text)) => line.push_str(&format!("\"{text}\" ")),
                (_, TokenValue::Number(n)) => line.push_str(&format!("{n} ")),
                (_, TokenValue::Integer(i)) => line.push_str(&format!("{i} ")),
                (_, TokenValue::Boolean(b)) => line.push_str(&format!("{b} ")),
                (kind, TokenValue::None) => line.push_str(&format!("{} ", kind.text())),
            }
        }
        if !line.is_empty() {
            self.log(LogLevel::Info, &line);
        }
    }

    /// Logs a human-readable disassembly of a compiled buffer.
    fn log_bytecode(&self, bytecode: &Bytecode, id_names: &AHashMap<RuntimeId, String>) {
        const COLUMN_WIDTH: usize = 16;
        self.log(LogLevel::Info, "\nBytecode:\n====================");
        let mut reader = BinaryReader::new(bytecode.as_bytes());
        let Some(header) = BytecodeHeader::read(&mut reader) else {
            return;
        };
        let data_size = header.data_size as usize;
        let mut instruction_count = 0u32;
        while reader.tell() < data_size.min(bytecode.size()) {
            let Some(opcode) = reader.read_u8().and_then(Opcode::from_byte) else {
                self.log(LogLevel::Info, "Invalid operation in bytecode");
                return;
            };
            instruction_count += 1;
            let mut line = format!("{:<width$}", opcode.to_string(), width = COLUMN_WIDTH);
            let operands = self.read_operand_text(opcode, &mut reader, id_names);
            match operands {
                Some(text) => line.push_str(&text),
                None => {
                    self.log(LogLevel::Info, "Truncated bytecode");
                    return;
                }
            }
            self.log(LogLevel::Info, &line);
        }
        self.log(
            LogLevel::Info,
            &format!("\nInstruction Count: {instruction_count}\n"),
        );
    }

    fn read_operand_text(
        &self,
        opcode: Opcode,
        reader: &mut BinaryReader,
        id_names: &AHashMap<RuntimeId, String>,
    ) -> Option<String> {
        let name_of = |id: RuntimeId| {
            id_names
                .get(&id)
                .cloned()
                .unwrap_or_else(|| format!("{id:#x}"))
        };
        Some(match opcode {
            Opcode::CallFunc
            | Opcode::EraseProp
            | Opcode::ErasePropElem
            | Opcode::EraseVar
            | Opcode::EraseVarElem
            | Opcode::PushProp
            | Opcode::PushPropKeyVal
            | Opcode::PushVar
            | Opcode::PushVarKey
            | Opcode::SetProp
            | Opcode::SetPropKeyVal
            | Opcode::SetVar
            | Opcode::SetVarKey => name_of(reader.read_u64()?),
            Opcode::Cast => ValueType::from_byte(reader.read_u8()?)?.to_string(),
            Opcode::Library => reader.read_str()?,
            Opcode::Function => {
                let signature = FunctionSignature::read(reader)?;
                signature.display_name()
            }
            Opcode::Property => {
                let property = PropertyName::read(reader)?;
                property.name().to_owned()
            }
            Opcode::Jump
            | Opcode::JumpFalse
            | Opcode::JumpFalseCheck
            | Opcode::JumpTrue
            | Opcode::JumpTrueCheck
            | Opcode::PopCount
            | Opcode::PushColl
            | Opcode::PushList => reader.read_u32()?.to_string(),
            Opcode::PushVal => Variant::read(reader)?.to_string_value(),
            Opcode::SetIndex => {
                let id = reader.read_u64()?;
                let index = reader.read_i32()?;
                let value_type = ValueType::from_byte(reader.read_u8()?)?;
                format!("{} {index} {value_type}", name_of(id))
            }
            _ => String::new(),
        })
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime").finish_non_exhaustive()
    }
}

/// Creates a runtime with default parameters.
///
/// Convenience alias for [`Runtime::new`].
#[must_use]
pub fn create_runtime() -> Arc<Runtime> {
    Runtime::new()
}
