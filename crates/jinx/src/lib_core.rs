//! The `core` library: fundamental functions every runtime registers.
//!
//! Registered automatically at runtime creation. Scripts opt in with
//! `import core` (or by qualifying names with `core`).

use std::sync::{Mutex, PoisonError};

use crate::collection::{collection_read, collection_write, create_collection};
use crate::coroutine::Coroutine;
use crate::library::{Access, Visibility};
use crate::logging::LogLevel;
use crate::runtime::Runtime;
use crate::script::Script;
use crate::variant::{UserObject, Variant};
use crate::buffer::buffer_read;

/// A script-visible coroutine handle, passed around as an opaque user
/// object.
struct ScriptCoroutine(Mutex<Coroutine>);

impl UserObject for ScriptCoroutine {}

impl ScriptCoroutine {
    fn from_variant(value: &Variant) -> Option<&Self> {
        let object = value.as_user_object()?;
        let any: &dyn std::any::Any = object.as_ref();
        any.downcast_ref::<Self>()
    }
}

fn write_variant(script: &mut Script, value: &Variant) {
    if let Variant::Collection(collection) = value {
        let entries: Vec<Variant> = collection_read(collection)
            .iter()
            .map(|(_, v)| v.clone())
            .collect();
        for entry in entries {
            write_variant(script, &entry);
        }
    } else {
        let text = value.to_string_value();
        script.runtime().log_write(LogLevel::Info, &text);
    }
}

fn write(script: &mut Script, params: &[Variant]) -> Variant {
    if let Some(value) = params.first() {
        write_variant(script, value);
    }
    Variant::Null
}

fn write_line(script: &mut Script, params: &[Variant]) -> Variant {
    if let Some(value) = params.first() {
        write_variant(script, value);
    }
    script.runtime().log_write(LogLevel::Info, "\n");
    Variant::Null
}

fn size(_script: &mut Script, params: &[Variant]) -> Variant {
    match &params[0] {
        Variant::Collection(c) => Variant::Integer(collection_read(c).size() as i64),
        Variant::String(s) => Variant::Integer(s.chars().count() as i64),
        Variant::Buffer(b) => Variant::Integer(buffer_read(b).size() as i64),
        _ => Variant::Null,
    }
}

fn is_empty(_script: &mut Script, params: &[Variant]) -> Variant {
    match &params[0] {
        Variant::Collection(c) => Variant::Boolean(collection_read(c).is_empty()),
        Variant::String(s) => Variant::Boolean(s.is_empty()),
        Variant::Buffer(b) => Variant::Boolean(buffer_read(b).is_empty()),
        _ => Variant::Null,
    }
}

fn get_key(_script: &mut Script, params: &[Variant]) -> Variant {
    match &params[0] {
        Variant::CollectionItr(itr) => itr.key(),
        _ => Variant::Null,
    }
}

fn get_value(_script: &mut Script, params: &[Variant]) -> Variant {
    match &params[0] {
        Variant::CollectionItr(itr) => itr.value(),
        Variant::UserObject(_) => match ScriptCoroutine::from_variant(&params[0]) {
            Some(coroutine) => coroutine.lock().get_return_value(),
            None => Variant::Null,
        },
        _ => Variant::Null,
    }
}

fn get_call_stack(script: &mut Script, _params: &[Variant]) -> Variant {
    let collection = create_collection();
    {
        let mut guard = collection_write(&collection);
        for (i, name) in script.get_call_stack().into_iter().enumerate() {
            guard.insert(Variant::Integer(i as i64 + 1), Variant::String(name));
        }
    }
    Variant::Collection(collection)
}

/// Appends a value under the next free integer key at or after size + 1.
fn append_to_collection(collection: &crate::collection::CollectionRef, value: Variant) {
    let mut guard = collection_write(collection);
    let mut index = guard.size() as i64 + 1;
    while guard.contains_key(&Variant::Integer(index)) {
        index += 1;
    }
    guard.insert(Variant::Integer(index), value);
}

fn add_to(_script: &mut Script, params: &[Variant]) -> Variant {
    let Some(target) = params[1].as_collection() else {
        return Variant::Null;
    };
    if let Some(source) = params[0].as_collection() {
        // Merge, moving colliding keys to fresh integer keys.
        let entries: Vec<(Variant, Variant)> = collection_read(source)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (key, value) in entries {
            let exists = collection_read(target).contains_key(&key);
            if exists {
                append_to_collection(target, value);
            } else {
                collection_write(target).insert(key, value);
            }
        }
    } else {
        append_to_collection(target, params[0].clone());
    }
    Variant::Null
}

fn remove_from(_script: &mut Script, params: &[Variant]) -> Variant {
    let Some(target) = params[1].as_collection() else {
        return Variant::Null;
    };
    if let Some(keys) = params[0].as_collection() {
        // The source's values are the keys to remove.
        let values: Vec<Variant> = collection_read(keys)
            .iter()
            .map(|(_, v)| v.clone())
            .collect();
        let mut guard = collection_write(target);
        for value in values {
            guard.remove(&value);
        }
    } else {
        collection_write(target).remove(&params[0]);
    }
    Variant::Null
}

fn remove_values_from(_script: &mut Script, params: &[Variant]) -> Variant {
    let Some(target) = params[1].as_collection() else {
        return Variant::Null;
    };
    let values: Vec<Variant> = match params[0].as_collection() {
        Some(source) => collection_read(source)
            .iter()
            .map(|(_, v)| v.clone())
            .collect(),
        None => vec![params[0].clone()],
    };
    let keys_to_remove: Vec<Variant> = collection_read(target)
        .iter()
        .filter(|(_, v)| values.iter().any(|needle| needle == *v))
        .map(|(k, _)| k.clone())
        .collect();
    let mut guard = collection_write(target);
    for key in keys_to_remove {
        guard.remove(&key);
    }
    Variant::Null
}

fn get_variable(script: &mut Script, params: &[Variant]) -> Variant {
    script.get_variable(&params[0].to_string_value())
}

fn set_variable(script: &mut Script, params: &[Variant]) -> Variant {
    script.set_variable(&params[0].to_string_value(), params[1].clone());
    Variant::Null
}

/// Expands a `with` argument into call parameters: a collection passes its
/// values in key order, anything else passes as a single parameter.
fn expand_call_params(value: &Variant) -> Vec<Variant> {
    match value.as_collection() {
        Some(collection) => collection_read(collection)
            .iter()
            .map(|(_, v)| v.clone())
            .collect(),
        None => vec![value.clone()],
    }
}

fn function_id(value: &Variant) -> Option<crate::runtime::RuntimeId> {
    match value {
        Variant::Integer(id) => Some(*id as u64),
        _ => None,
    }
}

fn call_function(script: &mut Script, params: &[Variant]) -> Variant {
    let Some(id) = function_id(&params[0]) else {
        return Variant::Null;
    };
    let args = params.get(1).map(expand_call_params).unwrap_or_default();
    script.call_function(id, &args)
}

fn async_call_function(script: &mut Script, params: &[Variant]) -> Variant {
    let Some(id) = function_id(&params[0]) else {
        return Variant::Null;
    };
    let args = params.get(1).map(expand_call_params).unwrap_or_default();
    match script.call_async_function(id, &args) {
        Some(coroutine) => {
            Variant::UserObject(std::sync::Arc::new(ScriptCoroutine(Mutex::new(coroutine))))
        }
        None => Variant::Null,
    }
}

fn is_finished(_script: &mut Script, params: &[Variant]) -> Variant {
    match ScriptCoroutine::from_variant(&params[0]) {
        Some(coroutine) => Variant::Boolean(coroutine.lock().is_finished()),
        None => Variant::Null,
    }
}

impl ScriptCoroutine {
    fn lock(&self) -> std::sync::MutexGuard<'_, Coroutine> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Registers the `core` library functions and properties.
pub(crate) fn register_lib_core(runtime: &std::sync::Arc<Runtime>) {
    let library = runtime.get_library("core");

    library.register_function(Visibility::Public, "write {}", write);
    library.register_function(Visibility::Public, "write line {}", write_line);
    library.register_function(Visibility::Public, "{} (get) size", size);
    library.register_function(Visibility::Public, "{} (get) is empty", is_empty);
    library.register_function(Visibility::Public, "{} (get) key", get_key);
    library.register_function(Visibility::Public, "{} (get) value", get_value);
    library.register_function(Visibility::Public, "(get) call stack", get_call_stack);
    library.register_function(Visibility::Public, "add {} to {}", add_to);
    library.register_function(Visibility::Public, "remove {} from {}", remove_from);
    library.register_function(
        Visibility::Public,
        "remove value/values {} from {}",
        remove_values_from,
    );
    library.register_function(Visibility::Public, "variable {}", get_variable);
    library.register_function(Visibility::Public, "set variable {} to {}", set_variable);
    // The `function` word of the script-visible phrasing ("call function
    // count to {}") belongs to the function-reference expression, not to
    // these signatures.
    library.register_function(Visibility::Public, "call {}", call_function);
    library.register_function(Visibility::Public, "call {} with {}", call_function);
    library.register_function(Visibility::Public, "async call {}", async_call_function);
    library.register_function(
        Visibility::Public,
        "async call {} with {}",
        async_call_function,
    );
    library.register_function(Visibility::Public, "{} is finished", is_finished);

    library.register_property(
        Visibility::Public,
        Access::ReadOnly,
        "newline",
        Variant::String("\n".to_owned()),
    );
}
