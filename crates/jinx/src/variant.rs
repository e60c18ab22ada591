//! The tagged variant value model.
//!
//! [`Variant`] is the single runtime value type: every operand on the VM
//! stack, every collection key and value, every function parameter and return
//! value, and every property is a variant. Conversion, arithmetic, and
//! comparison rules here are the contract the VM, the parser (for literal
//! casts), and the host API all rely on.

use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::bytecode::{BinaryReader, BinaryWriter};
use crate::collection::{
    CollectionItr, CollectionRef, collection_read, create_collection, parse_table,
};
use crate::buffer::{BufferRef, buffer_read, buffer_write, create_buffer};
use crate::guid::Guid;

/// Discriminant of the [`Variant`] sum type.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum ValueType {
    Null,
    Number,
    Integer,
    Boolean,
    String,
    Collection,
    CollectionItr,
    UserObject,
    Buffer,
    Guid,
    ValType,
    /// Sentinel used by the parser for untyped function parameters. Scripts
    /// never observe a value of this type.
    Any,
}

impl ValueType {
    const ALL: [Self; 12] = [
        Self::Null,
        Self::Number,
        Self::Integer,
        Self::Boolean,
        Self::String,
        Self::Collection,
        Self::CollectionItr,
        Self::UserObject,
        Self::Buffer,
        Self::Guid,
        Self::ValType,
        Self::Any,
    ];

    /// Serialized byte form, stable across platforms.
    #[must_use]
    pub(crate) fn to_byte(self) -> u8 {
        Self::ALL
            .iter()
            .position(|t| *t == self)
            .unwrap_or_default() as u8
    }

    /// Inverse of [`to_byte`](Self::to_byte).
    #[must_use]
    pub(crate) fn from_byte(byte: u8) -> Option<Self> {
        Self::ALL.get(byte as usize).copied()
    }

    /// Parses a value type from its script-visible name (`"integer"`,
    /// `"collectionitr"`, ...). The internal `any` sentinel is not
    /// recognized.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        match Self::from_str(text) {
            Ok(Self::Any) | Err(_) => None,
            Ok(t) => Some(t),
        }
    }
}

/// Opaque host-defined object storable in a variant.
///
/// User objects compare by identity and are never inspected by the VM; the
/// host downcasts them back via [`Any`].
pub trait UserObject: Any + Send + Sync {}

/// Shared handle to a [`UserObject`].
pub type UserObjectRef = Arc<dyn UserObject>;

fn user_object_addr(object: &UserObjectRef) -> usize {
    Arc::as_ptr(object).cast::<()>() as usize
}

/// A tagged runtime value.
#[derive(Clone, Default)]
pub enum Variant {
    /// The absence of a value.
    #[default]
    Null,
    /// A 64-bit floating-point number.
    Number(f64),
    /// A 64-bit signed integer.
    Integer(i64),
    /// A boolean.
    Boolean(bool),
    /// A UTF-8 string.
    String(String),
    /// A shared ordered map (see [`crate::collection`]).
    Collection(CollectionRef),
    /// An iterator into a shared collection.
    CollectionItr(CollectionItr),
    /// An opaque host object.
    UserObject(UserObjectRef),
    /// A shared byte buffer.
    Buffer(BufferRef),
    /// A 128-bit globally unique id.
    Guid(Guid),
    /// A value-type constant, as produced by the `type` operator.
    ValType(ValueType),
}

impl Variant {
    /// The active type tag.
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Null => ValueType::Null,
            Self::Number(_) => ValueType::Number,
            Self::Integer(_) => ValueType::Integer,
            Self::Boolean(_) => ValueType::Boolean,
            Self::String(_) => ValueType::String,
            Self::Collection(_) => ValueType::Collection,
            Self::CollectionItr(_) => ValueType::CollectionItr,
            Self::UserObject(_) => ValueType::UserObject,
            Self::Buffer(_) => ValueType::Buffer,
            Self::Guid(_) => ValueType::Guid,
            Self::ValType(_) => ValueType::ValType,
        }
    }

    /// True for Null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// True for Integer and Number.
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer(_) | Self::Number(_))
    }

    /// True for types usable as collection keys: Number, Integer, Boolean,
    /// String, and Guid.
    #[must_use]
    pub fn is_key_type(&self) -> bool {
        matches!(
            self,
            Self::Number(_) | Self::Integer(_) | Self::Boolean(_) | Self::String(_) | Self::Guid(_)
        )
    }

    /// True if the variant holds a collection.
    #[must_use]
    pub fn is_collection(&self) -> bool {
        matches!(self, Self::Collection(_))
    }

    // ---------------------------------------------------------------------
    // Coercing accessors
    // ---------------------------------------------------------------------

    /// Converts to a boolean, returning false when no conversion exists.
    #[must_use]
    pub fn to_boolean(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Number(n) => *n != 0.0,
            Self::Integer(i) => *i != 0,
            Self::Boolean(b) => *b,
            Self::String(s) => s == "true",
            Self::Collection(c) => !collection_read(c).is_empty(),
            _ => false,
        }
    }

    /// Converts to an integer where the conversion matrix allows it.
    #[must_use]
    pub fn to_integer(&self) -> Option<i64> {
        match self {
            Self::Null => Some(0),
            Self::Number(n) => Some(*n as i64),
            Self::Integer(i) => Some(*i),
            Self::Boolean(b) => Some(i64::from(*b)),
            Self::String(s) => parse_string_integer(s),
            _ => None,
        }
    }

    /// Converts to a number where the conversion matrix allows it.
    #[must_use]
    pub fn to_number(&self) -> Option<f64> {
        match self {
            Self::Null => Some(0.0),
            Self::Number(n) => Some(*n),
            Self::Integer(i) => Some(*i as f64),
            Self::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::String(s) => parse_string_number(s),
            _ => None,
        }
    }

    /// Converts to a string. Types without a string form yield an empty
    /// string.
    #[must_use]
    pub fn to_string_value(&self) -> String {
        match self {
            Self::Null => "null".to_owned(),
            Self::Number(n) => format!("{n:.6}"),
            Self::Integer(i) => i.to_string(),
            Self::Boolean(b) => if *b { "true" } else { "false" }.to_owned(),
            Self::String(s) => s.clone(),
            Self::Guid(g) => g.to_string(),
            Self::ValType(t) => t.to_string(),
            _ => String::new(),
        }
    }

    /// Borrows the collection, if this is one.
    #[must_use]
    pub fn as_collection(&self) -> Option<&CollectionRef> {
        match self {
            Self::Collection(c) => Some(c),
            _ => None,
        }
    }

    /// Borrows the collection iterator, if this is one.
    #[must_use]
    pub fn as_collection_itr(&self) -> Option<&CollectionItr> {
        match self {
            Self::CollectionItr(i) => Some(i),
            _ => None,
        }
    }

    /// Borrows the buffer, if this is one.
    #[must_use]
    pub fn as_buffer(&self) -> Option<&BufferRef> {
        match self {
            Self::Buffer(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the guid, if this is one.
    #[must_use]
    pub fn as_guid(&self) -> Option<Guid> {
        match self {
            Self::Guid(g) => Some(*g),
            _ => None,
        }
    }

    /// Returns the value-type constant, if this is one.
    #[must_use]
    pub fn as_val_type(&self) -> Option<ValueType> {
        match self {
            Self::ValType(t) => Some(*t),
            _ => None,
        }
    }

    /// Borrows the user object, if this is one.
    #[must_use]
    pub fn as_user_object(&self) -> Option<&UserObjectRef> {
        match self {
            Self::UserObject(o) => Some(o),
            _ => None,
        }
    }

    // ---------------------------------------------------------------------
    // Conversion
    // ---------------------------------------------------------------------

    /// Returns true if [`convert_to`](Self::convert_to) would succeed.
    #[must_use]
    pub fn can_convert_to(&self, target: ValueType) -> bool {
        self.clone().convert_to(target)
    }

    /// Converts this variant in place per the conversion matrix.
    ///
    /// On failure the variant becomes null and false is returned. Converting
    /// to the current type or to null always succeeds.
    pub fn convert_to(&mut self, target: ValueType) -> bool {
        if self.value_type() == target {
            return true;
        }
        if target == ValueType::Null {
            *self = Self::Null;
            return true;
        }
        let converted = match (&*self, target) {
            (Self::Null | Self::Number(_) | Self::Integer(_) | Self::Boolean(_), ValueType::Number) => {
                self.to_number().map(Self::Number)
            }
            (Self::Null | Self::Number(_) | Self::Integer(_) | Self::Boolean(_), ValueType::Integer) => {
                self.to_integer().map(Self::Integer)
            }
            (
                Self::Null | Self::Number(_) | Self::Integer(_) | Self::Collection(_),
                ValueType::Boolean,
            ) => Some(Self::Boolean(self.to_boolean())),
            (
                Self::Null
                | Self::Number(_)
                | Self::Integer(_)
                | Self::Boolean(_)
                | Self::Guid(_)
                | Self::ValType(_),
                ValueType::String,
            ) => Some(Self::String(self.to_string_value())),
            (Self::String(s), ValueType::Number) => parse_string_number(s).map(Self::Number),
            (Self::String(s), ValueType::Integer) => parse_string_integer(s).map(Self::Integer),
            (Self::String(s), ValueType::Boolean) => match s.as_str() {
                "true" => Some(Self::Boolean(true)),
                "false" => Some(Self::Boolean(false)),
                _ => None,
            },
            (Self::String(s), ValueType::Guid) => Guid::parse(s).map(Self::Guid),
            (Self::String(s), ValueType::ValType) => ValueType::parse(s).map(Self::ValType),
            (Self::String(s), ValueType::Collection) => parse_table(s).map(Self::Collection),
            _ => None,
        };
        match converted {
            Some(value) => {
                *self = value;
                true
            }
            None => {
                *self = Self::Null;
                false
            }
        }
    }

    // ---------------------------------------------------------------------
    // Arithmetic
    // ---------------------------------------------------------------------

    /// Addition: string concatenation when the left operand is a string,
    /// otherwise numeric. None on invalid operands.
    pub(crate) fn checked_add(&self, right: &Self) -> Option<Self> {
        if let Self::String(s) = self {
            let mut result = s.clone();
            result.push_str(&right.to_string_value());
            return Some(Self::String(result));
        }
        match (self, right) {
            (Self::Integer(a), Self::Integer(b)) => Some(Self::Integer(a.wrapping_add(*b))),
            _ => Some(Self::Number(self.number_operand()? + right.number_operand()?)),
        }
    }

    pub(crate) fn checked_subtract(&self, right: &Self) -> Option<Self> {
        match (self, right) {
            (Self::Integer(a), Self::Integer(b)) => Some(Self::Integer(a.wrapping_sub(*b))),
            _ => Some(Self::Number(self.number_operand()? - right.number_operand()?)),
        }
    }

    pub(crate) fn checked_multiply(&self, right: &Self) -> Option<Self> {
        match (self, right) {
            (Self::Integer(a), Self::Integer(b)) => Some(Self::Integer(a.wrapping_mul(*b))),
            _ => Some(Self::Number(self.number_operand()? * right.number_operand()?)),
        }
    }

    /// Division. Integer ÷ Integer stays Integer iff it divides exactly,
    /// otherwise the result is a Number. The caller is responsible for the
    /// divide-by-zero check.
    pub(crate) fn checked_divide(&self, right: &Self) -> Option<Self> {
        match (self, right) {
            (Self::Integer(a), Self::Integer(b)) => {
                if a.wrapping_rem(*b) == 0 {
                    Some(Self::Integer(a.wrapping_div(*b)))
                } else {
                    Some(Self::Number(*a as f64 / *b as f64))
                }
            }
            _ => Some(Self::Number(self.number_operand()? / right.number_operand()?)),
        }
    }

    /// Modulo with Euclidean-style semantics: the result carries the sign of
    /// the divisor. The caller is responsible for the mod-by-zero check.
    pub(crate) fn checked_modulo(&self, right: &Self) -> Option<Self> {
        match (self, right) {
            (Self::Integer(a), Self::Integer(b)) => {
                Some(Self::Integer(a.wrapping_rem(*b).wrapping_add(*b).wrapping_rem(*b)))
            }
            _ => {
                let a = self.number_operand()?;
                let b = right.number_operand()?;
                Some(Self::Number(((a % b) + b) % b))
            }
        }
    }

    /// Numeric negation.
    pub(crate) fn negate(&self) -> Option<Self> {
        match self {
            Self::Integer(i) => Some(Self::Integer(i.wrapping_neg())),
            Self::Number(n) => Some(Self::Number(-n)),
            _ => None,
        }
    }

    fn number_operand(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    // ---------------------------------------------------------------------
    // Comparison
    // ---------------------------------------------------------------------

    /// Validates the operands of `<`, `<=`, `>`, `>=`: both must be of a
    /// comparable type (numeric, Boolean, String, Guid, UserObject), and of
    /// the same type unless both are numeric.
    #[must_use]
    pub(crate) fn validate_comparison(left: &Self, right: &Self) -> bool {
        let comparable = |v: &Self| {
            matches!(
                v,
                Self::Number(_)
                    | Self::Integer(_)
                    | Self::Boolean(_)
                    | Self::String(_)
                    | Self::Guid(_)
                    | Self::UserObject(_)
            )
        };
        if !comparable(left) || !comparable(right) {
            return false;
        }
        left.value_type() == right.value_type() || (left.is_numeric() && right.is_numeric())
    }

    /// Orders two validated operands. None signals an invalid comparison
    /// (including NaN operands).
    #[must_use]
    pub(crate) fn compare_order(left: &Self, right: &Self) -> Option<Ordering> {
        match (left, right) {
            (Self::Integer(a), Self::Integer(b)) => Some(a.cmp(b)),
            (Self::Number(a), Self::Number(b)) => a.partial_cmp(b),
            (Self::Integer(a), Self::Number(b)) => (*a as f64).partial_cmp(b),
            (Self::Number(a), Self::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Boolean(a), Self::Boolean(b)) => Some(a.cmp(b)),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Guid(a), Self::Guid(b)) => Some(a.cmp(b)),
            (Self::UserObject(a), Self::UserObject(b)) => {
                Some(user_object_addr(a).cmp(&user_object_addr(b)))
            }
            _ => None,
        }
    }

    // ---------------------------------------------------------------------
    // Serialization
    // ---------------------------------------------------------------------

    /// Writes the variant as a type byte plus payload.
    ///
    /// Collections, iterators, and user objects serialize their tag only;
    /// their contents never persist.
    pub(crate) fn write(&self, writer: &mut BinaryWriter) {
        writer.write_u8(self.value_type().to_byte());
        match self {
            Self::Null | Self::Collection(_) | Self::CollectionItr(_) | Self::UserObject(_) => {}
            Self::Number(n) => writer.write_f64(*n),
            Self::Integer(i) => writer.write_i64(*i),
            Self::Boolean(b) => writer.write_bool(*b),
            Self::String(s) => writer.write_str(s),
            Self::Buffer(b) => {
                let guard = buffer_read(b);
                writer.write_u32(guard.size() as u32);
                writer.write_bytes(guard.as_slice());
            }
            Self::Guid(g) => writer.write_bytes(g.as_bytes()),
            Self::ValType(t) => writer.write_u8(t.to_byte()),
        }
    }

    /// Reads a variant previously written with [`write`](Self::write).
    pub(crate) fn read(reader: &mut BinaryReader) -> Option<Self> {
        let value_type = ValueType::from_byte(reader.read_u8()?)?;
        Some(match value_type {
            ValueType::Null | ValueType::Any => Self::Null,
            ValueType::Number => Self::Number(reader.read_f64()?),
            ValueType::Integer => Self::Integer(reader.read_i64()?),
            ValueType::Boolean => Self::Boolean(reader.read_bool()?),
            ValueType::String => Self::String(reader.read_str()?),
            ValueType::Collection => Self::Collection(create_collection()),
            ValueType::CollectionItr | ValueType::UserObject => Self::Null,
            ValueType::Buffer => {
                let size = reader.read_u32()? as usize;
                let bytes = reader.read_bytes(size)?;
                let buffer = create_buffer();
                buffer_write(&buffer).write(bytes);
                Self::Buffer(buffer)
            }
            ValueType::Guid => {
                let bytes = reader.read_bytes(16)?;
                let mut raw = [0u8; 16];
                raw.copy_from_slice(bytes);
                Self::Guid(Guid::from_bytes(raw))
            }
            ValueType::ValType => Self::ValType(ValueType::from_byte(reader.read_u8()?)?),
        })
    }
}

// String parsing mirrors the conversion matrix: an optional sign, digits, and
// (for numbers) at most one decimal point. Over-long digit strings fail
// rather than silently losing precision.

fn parse_string_number(text: &str) -> Option<f64> {
    let trimmed = text.strip_prefix(['-', '+']).unwrap_or(text);
    let mut digits = 0;
    let mut decimal = false;
    for c in trimmed.chars() {
        match c {
            '0'..='9' => digits += 1,
            '.' if !decimal => decimal = true,
            _ => return None,
        }
    }
    if digits == 0 || digits > 16 {
        return None;
    }
    text.parse().ok()
}

fn parse_string_integer(text: &str) -> Option<i64> {
    let trimmed = text.strip_prefix(['-', '+']).unwrap_or(text);
    if trimmed.is_empty() || trimmed.len() > 18 || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

impl PartialEq for Variant {
    /// Equality per the coercion rules: mismatched types compare unequal,
    /// except Integer and Number which compare numerically. Reference types
    /// compare by identity. Never errors.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Integer(a), Self::Number(b)) | (Self::Number(b), Self::Integer(a)) => {
                (*a as f64) == *b
            }
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Collection(a), Self::Collection(b)) => Arc::ptr_eq(a, b),
            (Self::CollectionItr(a), Self::CollectionItr(b)) => a == b,
            (Self::UserObject(a), Self::UserObject(b)) => {
                user_object_addr(a) == user_object_addr(b)
            }
            (Self::Buffer(a), Self::Buffer(b)) => Arc::ptr_eq(a, b),
            (Self::Guid(a), Self::Guid(b)) => a == b,
            (Self::ValType(a), Self::ValType(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Number(n) => write!(f, "Number({n})"),
            Self::Integer(i) => write!(f, "Integer({i})"),
            Self::Boolean(b) => write!(f, "Boolean({b})"),
            Self::String(s) => write!(f, "String({s:?})"),
            Self::Collection(c) => write!(f, "Collection(len={})", collection_read(c).size()),
            Self::CollectionItr(i) => write!(f, "CollectionItr(key={:?})", i.key()),
            Self::UserObject(o) => write!(f, "UserObject({:#x})", user_object_addr(o)),
            Self::Buffer(b) => write!(f, "Buffer(len={})", buffer_read(b).size()),
            Self::Guid(g) => write!(f, "Guid({g})"),
            Self::ValType(t) => write!(f, "ValType({t})"),
        }
    }
}

// Comparisons against plain Rust values keep host code and tests terse:
// `script.get_variable("a") == 42`.

impl PartialEq<i64> for Variant {
    fn eq(&self, other: &i64) -> bool {
        *self == Self::Integer(*other)
    }
}

impl PartialEq<f64> for Variant {
    fn eq(&self, other: &f64) -> bool {
        *self == Self::Number(*other)
    }
}

impl PartialEq<bool> for Variant {
    fn eq(&self, other: &bool) -> bool {
        matches!(self, Self::Boolean(b) if b == other)
    }
}

impl PartialEq<&str> for Variant {
    fn eq(&self, other: &&str) -> bool {
        matches!(self, Self::String(s) if s == other)
    }
}

impl From<()> for Variant {
    fn from((): ()) -> Self {
        Self::Null
    }
}

impl From<bool> for Variant {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i32> for Variant {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<i64> for Variant {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Variant {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Variant {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<CollectionRef> for Variant {
    fn from(value: CollectionRef) -> Self {
        Self::Collection(value)
    }
}

impl From<CollectionItr> for Variant {
    fn from(value: CollectionItr) -> Self {
        Self::CollectionItr(value)
    }
}

impl From<BufferRef> for Variant {
    fn from(value: BufferRef) -> Self {
        Self::Buffer(value)
    }
}

impl From<Guid> for Variant {
    fn from(value: Guid) -> Self {
        Self::Guid(value)
    }
}

impl From<ValueType> for Variant {
    fn from(value: ValueType) -> Self {
        Self::ValType(value)
    }
}

impl From<UserObjectRef> for Variant {
    fn from(value: UserObjectRef) -> Self {
        Self::UserObject(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_division_exactness() {
        let six = Variant::Integer(6);
        let three = Variant::Integer(3);
        let four = Variant::Integer(4);
        assert_eq!(six.checked_divide(&three), Some(Variant::Integer(2)));
        assert_eq!(six.checked_divide(&four), Some(Variant::Number(1.5)));
    }

    #[test]
    fn modulo_takes_divisor_sign() {
        let cases = [(5i64, 3i64, 2i64), (-5, 3, 1), (5, -3, -1), (-5, -3, -2)];
        for (a, b, expected) in cases {
            assert_eq!(
                Variant::Integer(a).checked_modulo(&Variant::Integer(b)),
                Some(Variant::Integer(expected)),
                "{a} mod {b}"
            );
        }
        let m = Variant::Number(-5.0)
            .checked_modulo(&Variant::Number(3.0))
            .unwrap();
        assert_eq!(m, Variant::Number(1.0));
    }

    #[test]
    fn string_addition_concatenates() {
        let s = Variant::String("count: ".into());
        assert_eq!(
            s.checked_add(&Variant::Integer(3)),
            Some(Variant::String("count: 3".into()))
        );
    }

    #[test]
    fn arithmetic_rejects_non_numeric() {
        assert_eq!(Variant::Null.checked_add(&Variant::Integer(1)), None);
        assert_eq!(
            Variant::Boolean(true).checked_multiply(&Variant::Integer(2)),
            None
        );
    }

    #[test]
    fn equality_across_numeric_types() {
        assert_eq!(Variant::Integer(1), Variant::Number(1.0));
        assert_ne!(Variant::Integer(1), Variant::String("1".into()));
        assert_ne!(Variant::Null, Variant::Integer(0));
    }

    #[test]
    fn comparison_validation() {
        assert!(Variant::validate_comparison(
            &Variant::Integer(1),
            &Variant::Number(2.0)
        ));
        assert!(Variant::validate_comparison(
            &Variant::String("a".into()),
            &Variant::String("b".into())
        ));
        assert!(!Variant::validate_comparison(
            &Variant::Integer(1),
            &Variant::String("a".into())
        ));
        assert!(!Variant::validate_comparison(&Variant::Null, &Variant::Null));
    }

    #[test]
    fn conversion_failures_become_null() {
        let mut v = Variant::String("not a number".into());
        assert!(!v.convert_to(ValueType::Integer));
        assert!(v.is_null());
    }

    #[test]
    fn number_to_string_uses_six_decimals() {
        assert_eq!(Variant::Number(5.5).to_string_value(), "5.500000");
    }

    #[test]
    fn string_to_valtype() {
        let mut v = Variant::String("integer".into());
        assert!(v.convert_to(ValueType::ValType));
        assert_eq!(v, Variant::ValType(ValueType::Integer));
    }
}
