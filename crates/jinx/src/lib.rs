#![doc = include_str!("../../../README.md")]

mod buffer;
mod bytecode;
mod collection;
mod coroutine;
mod error;
mod guid;
mod hash;
mod lexer;
mod lib_core;
mod library;
mod logging;
mod parser;
mod runtime;
mod script;
mod signature;
mod unicode;
mod variant;

pub use crate::{
    buffer::{Buffer, BufferRef, create_buffer},
    bytecode::Bytecode,
    collection::{Collection, CollectionItr, CollectionRef, create_collection},
    coroutine::Coroutine,
    error::CompileError,
    guid::Guid,
    library::{Access, Library, LibraryRef, Visibility},
    logging::{LogFn, LogLevel},
    runtime::{
        FunctionCallback, GlobalParams, INVALID_ID, PerformanceStats, Runtime, RuntimeId,
        UserContext, create_runtime,
    },
    script::Script,
    unicode::{fold_case, is_case_folded},
    variant::{UserObject, UserObjectRef, ValueType, Variant},
};
