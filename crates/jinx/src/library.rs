//! Libraries: named registries of functions and properties.
//!
//! A library bundles function signatures and property names under a shared
//! visibility namespace. Scripts select their library with the `library`
//! statement; the host registers native functions and properties through the
//! same tables, which is what makes them callable from scripts.

use std::sync::{Mutex, PoisonError, Weak};

use ahash::AHashMap;

use crate::bytecode::{BinaryReader, BinaryWriter};
use crate::hash::get_hash;
use crate::logging::LogLevel;
use crate::runtime::{Runtime, RuntimeId};
use crate::signature::{
    CallPart, FunctionSignature, FunctionTable, VisibilityType, parse_signature_string,
};
use crate::variant::Variant;

/// Visibility of a host-registered function or property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Visible to any script importing the library.
    Public,
    /// Visible only to scripts belonging to the library.
    Private,
}

impl Visibility {
    pub(crate) fn to_visibility_type(self) -> VisibilityType {
        match self {
            Self::Public => VisibilityType::Public,
            Self::Private => VisibilityType::Private,
        }
    }
}

/// Access mode of a registered property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// The property can be read and written by scripts.
    ReadWrite,
    /// Script writes are rejected at parse time.
    ReadOnly,
}

/// A registered property name: its stable id, visibility, and default value.
///
/// The id hashes the library name and property name together, so the same
/// property resolves to the same id across compilations.
#[derive(Debug, Clone)]
pub(crate) struct PropertyName {
    id: RuntimeId,
    visibility: VisibilityType,
    read_only: bool,
    name: String,
    default_value: Variant,
    part_count: usize,
}

impl PropertyName {
    pub(crate) fn new(
        visibility: VisibilityType,
        read_only: bool,
        library_name: &str,
        name: &str,
        default_value: Variant,
    ) -> Self {
        let combined = format!("{library_name} {name}");
        Self {
            id: get_hash(combined.as_bytes()),
            visibility,
            read_only,
            name: name.to_owned(),
            default_value,
            part_count: name.split(' ').count(),
        }
    }

    pub(crate) fn invalid() -> Self {
        Self {
            id: 0,
            visibility: VisibilityType::Local,
            read_only: false,
            name: String::new(),
            default_value: Variant::Null,
            part_count: 0,
        }
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.visibility != VisibilityType::Local
    }

    pub(crate) fn id(&self) -> RuntimeId {
        self.id
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn visibility(&self) -> VisibilityType {
        self.visibility
    }

    pub(crate) fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub(crate) fn part_count(&self) -> usize {
        self.part_count
    }

    pub(crate) fn default_value(&self) -> &Variant {
        &self.default_value
    }

    pub(crate) fn write(&self, writer: &mut BinaryWriter) {
        writer.write_u64(self.id);
        writer.write_bool(self.read_only);
        writer.write_str(&self.name);
        writer.write_u8(self.visibility.to_byte());
        writer.write_u32(self.part_count as u32);
        self.default_value.write(writer);
    }

    pub(crate) fn read(reader: &mut BinaryReader) -> Option<Self> {
        let id = reader.read_u64()?;
        let read_only = reader.read_bool()?;
        let name = reader.read_str()?;
        let visibility = VisibilityType::from_byte(reader.read_u8()?)?;
        let part_count = reader.read_u32()? as usize;
        let default_value = Variant::read(reader)?;
        Some(Self {
            id,
            visibility,
            read_only,
            name,
            default_value,
            part_count,
        })
    }
}

#[derive(Debug, Default)]
struct LibraryState {
    functions: FunctionTable,
    properties: AHashMap<String, PropertyName>,
    max_property_parts: usize,
}

/// A named module of functions and properties.
///
/// Libraries are created on demand by [`Runtime::get_library`] and live as
/// long as the runtime. The empty name designates the default library every
/// script starts in.
#[derive(Debug)]
pub struct Library {
    name: String,
    state: Mutex<LibraryState>,
    runtime: Weak<Runtime>,
}

/// Shared handle to a [`Library`].
pub type LibraryRef = std::sync::Arc<Library>;

impl Library {
    pub(crate) fn new(runtime: Weak<Runtime>, name: &str) -> Self {
        Self {
            name: name.to_owned(),
            state: Mutex::new(LibraryState::default()),
            runtime,
        }
    }

    /// The library's name; empty for the default library.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> std::sync::MutexGuard<'_, LibraryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a native function for use by scripts.
    ///
    /// The signature string uses whitespace-separated parts: `{}` or
    /// `{typename}` for parameters, `/` between alternate names, and
    /// parentheses around optional name parts (`"write line {}"`,
    /// `"{} (get) size"`). Returns false when the signature is malformed or
    /// already registered.
    pub fn register_function(
        &self,
        visibility: Visibility,
        signature: &str,
        callback: impl Fn(&mut crate::script::Script, &[Variant]) -> Variant + Send + Sync + 'static,
    ) -> bool {
        let Some(runtime) = self.runtime.upgrade() else {
            return false;
        };
        let Some(parts) = parse_signature_string(signature) else {
            runtime.log(
                LogLevel::Error,
                &format!("Invalid signature for registered function '{signature}'"),
            );
            return false;
        };
        let signature = FunctionSignature::new(
            visibility.to_visibility_type(),
            true,
            &self.name,
            parts,
        );
        {
            let mut state = self.state();
            if !state.functions.register(signature.clone(), true) {
                runtime.log(
                    LogLevel::Error,
                    &format!(
                        "Function '{}' already registered in library",
                        signature.display_name()
                    ),
                );
                return false;
            }
        }
        runtime.register_function_native(&signature, std::sync::Arc::new(callback));
        true
    }

    /// Registers a library property with a default value.
    pub fn register_property(
        &self,
        visibility: Visibility,
        access: Access,
        name: &str,
        value: Variant,
    ) -> bool {
        let Some(runtime) = self.runtime.upgrade() else {
            return false;
        };
        let folded = crate::unicode::fold_case(name);
        let property = PropertyName::new(
            visibility.to_visibility_type(),
            access == Access::ReadOnly,
            &self.name,
            &folded,
            Variant::Null,
        );
        let id = property.id();
        if !self.register_property_name(property, true) {
            return false;
        }
        runtime.set_property(id, value);
        true
    }

    /// Reads a property value by name. Returns null when the property does
    /// not exist.
    #[must_use]
    pub fn get_property(&self, name: &str) -> Variant {
        let folded = crate::unicode::fold_case(name);
        let id = match self.state().properties.get(&folded) {
            Some(p) => p.id(),
            None => return Variant::Null,
        };
        match self.runtime.upgrade() {
            Some(runtime) => runtime.get_property(id),
            None => Variant::Null,
        }
    }

    /// Writes a property value by name. Unknown names are ignored.
    pub fn set_property(&self, name: &str, value: Variant) {
        let folded = crate::unicode::fold_case(name);
        let id = match self.state().properties.get(&folded) {
            Some(p) => p.id(),
            None => return,
        };
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.set_property(id, value);
        }
    }

    // -----------------------------------------------------------------
    // Internal interface used by the parser and VM
    // -----------------------------------------------------------------

    pub(crate) fn register_property_name(
        &self,
        property: PropertyName,
        check_for_duplicates: bool,
    ) -> bool {
        let mut state = self.state();
        if check_for_duplicates && state.properties.contains_key(property.name()) {
            return false;
        }
        if property.part_count() > state.max_property_parts {
            state.max_property_parts = property.part_count();
        }
        state.properties.insert(property.name().to_owned(), property);
        true
    }

    pub(crate) fn property_name_exists(&self, name: &str) -> bool {
        self.state().properties.contains_key(name)
    }

    pub(crate) fn get_property_name(&self, name: &str) -> PropertyName {
        self.state()
            .properties
            .get(name)
            .cloned()
            .unwrap_or_else(PropertyName::invalid)
    }

    pub(crate) fn max_property_parts(&self) -> usize {
        self.state().max_property_parts
    }

    pub(crate) fn register_function_signature(&self, signature: FunctionSignature) -> bool {
        self.state().functions.register(signature, false)
    }

    pub(crate) fn register_function_signature_checked(
        &self,
        signature: FunctionSignature,
    ) -> bool {
        self.state().functions.register(signature, true)
    }

    /// Finds the best signature in this library matching a call-part prefix.
    pub(crate) fn find_function_signature(
        &self,
        call_parts: &[CallPart],
    ) -> Option<FunctionSignature> {
        self.state().functions.find(call_parts).cloned()
    }
}
