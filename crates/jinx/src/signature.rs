//! Multi-part function signatures.
//!
//! A Jinx function signature is an ordered list of parts: name parts (one or
//! more alternative words, optionally skippable) and parameter parts
//! (`{}` or `{integer}`). `do/perform (the) thing {value}` matches
//! `do thing 5`, `perform the thing x`, and so on.
//!
//! Library-visible signatures derive a stable [`RuntimeId`] by hashing their
//! canonical text, so separately compiled scripts agree on ids; local
//! signatures get random ids so they can never collide with another script's
//! functions.

use smallvec::SmallVec;

use crate::bytecode::{BinaryReader, BinaryWriter};
use crate::hash::{get_hash, get_random_id};
use crate::lexer::is_keyword_text;
use crate::runtime::RuntimeId;
use crate::unicode::fold_case;
use crate::variant::ValueType;

/// Internal visibility of a signature or property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VisibilityType {
    /// Visible only to the defining script.
    Local,
    /// Visible to scripts of the defining library.
    Private,
    /// Visible to any script importing the library.
    Public,
}

impl VisibilityType {
    pub(crate) fn to_byte(self) -> u8 {
        match self {
            Self::Local => 0,
            Self::Private => 1,
            Self::Public => 2,
        }
    }

    pub(crate) fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Local),
            1 => Some(Self::Private),
            2 => Some(Self::Public),
            _ => None,
        }
    }
}

/// Kind of a signature part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SignaturePartKind {
    Name,
    Parameter,
}

/// One part of a signature.
#[derive(Debug, Clone)]
pub(crate) struct SignaturePart {
    pub kind: SignaturePartKind,
    /// Name parts only: the part may be omitted at the call site.
    pub optional: bool,
    /// Parameter parts only: expected type, triggering a cast on call.
    /// [`ValueType::Any`] means untyped.
    pub value_type: ValueType,
    /// Alternative names for a name part; the binding variable name (if any)
    /// for a parameter part.
    pub names: SmallVec<[String; 1]>,
}

impl SignaturePart {
    pub(crate) fn name(names: SmallVec<[String; 1]>, optional: bool) -> Self {
        Self {
            kind: SignaturePartKind::Name,
            optional,
            value_type: ValueType::Any,
            names,
        }
    }

    pub(crate) fn parameter(name: Option<String>, value_type: ValueType) -> Self {
        Self {
            kind: SignaturePartKind::Parameter,
            optional: false,
            value_type,
            names: name.into_iter().collect(),
        }
    }

    fn is_parameter(&self) -> bool {
        self.kind == SignaturePartKind::Parameter
    }

    /// Parts are equivalent when they have the same kind and (for names) any
    /// overlapping alternative.
    fn overlaps(&self, other: &Self) -> bool {
        if self.kind != other.kind {
            return false;
        }
        if self.is_parameter() {
            return true;
        }
        self.names.iter().any(|n| other.names.contains(n))
    }
}

/// A part of a call site being matched against registered signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CallPart {
    /// A bare word (folded).
    Name(String),
    /// A variable or property reference: usable as a parameter, but its
    /// text may equally match a signature name part (`counter to finished`
    /// must stay callable when `counter` is also a property).
    NamedParameter(String),
    /// A value: a literal, a parenthesized or bracketed group, or a function
    /// reference.
    Parameter,
}

/// A complete function signature.
#[derive(Debug, Clone)]
pub(crate) struct FunctionSignature {
    id: RuntimeId,
    visibility: VisibilityType,
    returns_value: bool,
    library: String,
    parts: Vec<SignaturePart>,
}

impl FunctionSignature {
    pub(crate) fn new(
        visibility: VisibilityType,
        returns_value: bool,
        library: &str,
        parts: Vec<SignaturePart>,
    ) -> Self {
        let id = if visibility == VisibilityType::Local {
            get_random_id()
        } else {
            get_hash(canonical_text(library, &parts).as_bytes())
        };
        Self {
            id,
            visibility,
            returns_value,
            library: library.to_owned(),
            parts,
        }
    }

    pub(crate) fn id(&self) -> RuntimeId {
        self.id
    }

    pub(crate) fn visibility(&self) -> VisibilityType {
        self.visibility
    }

    pub(crate) fn returns_value(&self) -> bool {
        self.returns_value
    }

    pub(crate) fn library(&self) -> &str {
        &self.library
    }

    pub(crate) fn parts(&self) -> &[SignaturePart] {
        &self.parts
    }

    pub(crate) fn is_valid(&self) -> bool {
        !self.parts.is_empty()
    }

    /// Human-readable canonical name, also used for id hashing and the
    /// script-visible call stack.
    pub(crate) fn display_name(&self) -> String {
        canonical_text(&self.library, &self.parts)
    }

    pub(crate) fn parameter_count(&self) -> usize {
        self.parts.iter().filter(|p| p.is_parameter()).count()
    }

    /// The parameter parts, in call order.
    pub(crate) fn parameters(&self) -> impl DoubleEndedIterator<Item = &SignaturePart> {
        self.parts.iter().filter(|p| p.is_parameter())
    }

    /// Matches `call_parts` against this signature, returning the number of
    /// call parts consumed when the whole signature matches a prefix.
    ///
    /// A source name matches a name part when it equals any alternative, and
    /// may also stand in for a parameter part (an unresolved name evaluates
    /// to null at runtime). Optional name parts may be skipped.
    pub(crate) fn matches_prefix(&self, call_parts: &[CallPart]) -> Option<usize> {
        if call_parts.is_empty() {
            return None;
        }
        let mut consumed = 0;
        for part in &self.parts {
            let Some(source) = call_parts.get(consumed) else {
                if !part.is_parameter() && part.optional {
                    continue;
                }
                return None;
            };
            match (part.kind, source) {
                (
                    SignaturePartKind::Name,
                    CallPart::Name(text) | CallPart::NamedParameter(text),
                ) => {
                    if part.names.iter().any(|n| n == text) {
                        consumed += 1;
                    } else if part.optional {
                        continue;
                    } else {
                        return None;
                    }
                }
                (SignaturePartKind::Name, CallPart::Parameter) => {
                    if part.optional {
                        continue;
                    }
                    return None;
                }
                (SignaturePartKind::Parameter, _) => consumed += 1,
            }
        }
        Some(consumed)
    }

    /// Equivalence for duplicate detection: same shape with overlapping
    /// names part-for-part.
    pub(crate) fn is_equivalent(&self, other: &Self) -> bool {
        self.parts.len() == other.parts.len()
            && self
                .parts
                .iter()
                .zip(&other.parts)
                .all(|(a, b)| a.overlaps(b))
    }

    pub(crate) fn write(&self, writer: &mut BinaryWriter) {
        writer.write_u64(self.id);
        writer.write_u8(self.visibility.to_byte());
        writer.write_bool(self.returns_value);
        writer.write_str(&self.library);
        writer.write_u8(self.parts.len() as u8);
        for part in &self.parts {
            writer.write_u8(match part.kind {
                SignaturePartKind::Name => 0,
                SignaturePartKind::Parameter => 1,
            });
            writer.write_bool(part.optional);
            writer.write_u8(part.value_type.to_byte());
            writer.write_u8(part.names.len() as u8);
            for name in &part.names {
                writer.write_str(name);
            }
        }
    }

    pub(crate) fn read(reader: &mut BinaryReader) -> Option<Self> {
        let id = reader.read_u64()?;
        let visibility = VisibilityType::from_byte(reader.read_u8()?)?;
        let returns_value = reader.read_bool()?;
        let library = reader.read_str()?;
        let part_count = reader.read_u8()?;
        let mut parts = Vec::with_capacity(part_count as usize);
        for _ in 0..part_count {
            let kind = match reader.read_u8()? {
                0 => SignaturePartKind::Name,
                1 => SignaturePartKind::Parameter,
                _ => return None,
            };
            let optional = reader.read_bool()?;
            let value_type = ValueType::from_byte(reader.read_u8()?)?;
            let name_count = reader.read_u8()?;
            let mut names = SmallVec::new();
            for _ in 0..name_count {
                names.push(reader.read_str()?);
            }
            parts.push(SignaturePart {
                kind,
                optional,
                value_type,
                names,
            });
        }
        Some(Self {
            id,
            visibility,
            returns_value,
            library,
            parts,
        })
    }
}

/// Renders the canonical signature text: the library name (when any), then
/// each part separated by single spaces. Name alternates join with `/`,
/// optional parts wrap in parentheses, parameters render as `{}` or
/// `{typename}`.
pub(crate) fn canonical_text(library: &str, parts: &[SignaturePart]) -> String {
    let mut text = String::with_capacity(64);
    if !library.is_empty() {
        text.push_str(library);
    }
    for part in parts {
        if !text.is_empty() {
            text.push(' ');
        }
        match part.kind {
            SignaturePartKind::Parameter => {
                if part.value_type == ValueType::Any {
                    text.push_str("{}");
                } else {
                    text.push('{');
                    text.push_str(&part.value_type.to_string());
                    text.push('}');
                }
            }
            SignaturePartKind::Name => {
                if part.optional {
                    text.push('(');
                }
                for (i, name) in part.names.iter().enumerate() {
                    if i > 0 {
                        text.push('/');
                    }
                    text.push_str(name);
                }
                if part.optional {
                    text.push(')');
                }
            }
        }
    }
    text
}

/// Parses a host-side registration string into signature parts.
///
/// Parts are whitespace separated: `{}` or `{typename}` for parameters,
/// `name/alternate` for names, `(name)` for optional names. Returns `None`
/// for malformed strings or signatures consisting solely of keywords.
pub(crate) fn parse_signature_string(text: &str) -> Option<Vec<SignaturePart>> {
    let mut parts = Vec::new();
    let mut has_non_keyword_name = false;
    let mut has_name_part = false;
    for token in text.split_whitespace() {
        if let Some(inner) = token.strip_prefix('{') {
            let inner = inner.strip_suffix('}')?;
            let value_type = if inner.is_empty() {
                ValueType::Any
            } else {
                ValueType::parse(&fold_case(inner))?
            };
            parts.push(SignaturePart::parameter(None, value_type));
        } else {
            let (body, optional) = match token.strip_prefix('(') {
                Some(rest) => (rest.strip_suffix(')')?, true),
                None => (token, false),
            };
            if body.is_empty() || body.contains(['{', '}']) {
                return None;
            }
            let mut names = SmallVec::new();
            for name in body.split('/') {
                if name.is_empty() {
                    return None;
                }
                let folded = fold_case(name);
                if !is_keyword_text(&folded) {
                    has_non_keyword_name = true;
                }
                names.push(folded);
            }
            has_name_part = true;
            parts.push(SignaturePart::name(names, optional));
        }
    }
    if parts.is_empty() || !has_name_part || !has_non_keyword_name {
        return None;
    }
    Some(parts)
}

/// A registry of signatures: a script's local function table, or the
/// function table of a library.
#[derive(Debug, Default)]
pub(crate) struct FunctionTable {
    signatures: Vec<FunctionSignature>,
}

impl FunctionTable {
    /// Registers a signature. With `check_duplicates`, an equivalent existing
    /// signature makes the registration fail.
    pub(crate) fn register(&mut self, signature: FunctionSignature, check_duplicates: bool) -> bool {
        if check_duplicates && self.signatures.iter().any(|s| s.is_equivalent(&signature)) {
            return false;
        }
        self.signatures.push(signature);
        true
    }

    /// Finds the best (longest) signature matching a prefix of `call_parts`.
    pub(crate) fn find(&self, call_parts: &[CallPart]) -> Option<&FunctionSignature> {
        let mut best: Option<(usize, usize, &FunctionSignature)> = None;
        for signature in &self.signatures {
            if let Some(consumed) = signature.matches_prefix(call_parts) {
                let candidate = (consumed, signature.parts().len(), signature);
                match best {
                    Some((c, l, _)) if (consumed, signature.parts().len()) <= (c, l) => {}
                    _ => best = Some(candidate),
                }
            }
        }
        best.map(|(_, _, s)| s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts_of(text: &str) -> Vec<SignaturePart> {
        parse_signature_string(text).expect("valid signature")
    }

    #[test]
    fn canonical_text_round_trips_shape() {
        let parts = parts_of("do/perform (the) thing {integer}");
        assert_eq!(
            canonical_text("test", &parts),
            "test do/perform (the) thing {integer}"
        );
        assert_eq!(canonical_text("", &parts), "do/perform (the) thing {integer}");
    }

    #[test]
    fn library_ids_are_stable() {
        let a = FunctionSignature::new(
            VisibilityType::Public,
            false,
            "core",
            parts_of("write {}"),
        );
        let b = FunctionSignature::new(
            VisibilityType::Public,
            false,
            "core",
            parts_of("write {}"),
        );
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn local_ids_are_random() {
        let a = FunctionSignature::new(VisibilityType::Local, false, "", parts_of("do thing"));
        let b = FunctionSignature::new(VisibilityType::Local, false, "", parts_of("do thing"));
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn optional_parts_may_be_skipped() {
        let sig = FunctionSignature::new(
            VisibilityType::Public,
            true,
            "core",
            parts_of("{} (get) size"),
        );
        let with = [
            CallPart::Parameter,
            CallPart::Name("get".into()),
            CallPart::Name("size".into()),
        ];
        let without = [CallPart::Parameter, CallPart::Name("size".into())];
        assert_eq!(sig.matches_prefix(&with), Some(3));
        assert_eq!(sig.matches_prefix(&without), Some(2));
    }

    #[test]
    fn longest_signature_wins() {
        let mut table = FunctionTable::default();
        assert!(table.register(
            FunctionSignature::new(VisibilityType::Public, false, "t", parts_of("write {}")),
            true
        ));
        assert!(table.register(
            FunctionSignature::new(
                VisibilityType::Public,
                false,
                "t",
                parts_of("write line {}")
            ),
            true
        ));
        let call = [
            CallPart::Name("write".into()),
            CallPart::Name("line".into()),
            CallPart::Parameter,
        ];
        let found = table.find(&call).expect("match");
        assert_eq!(found.display_name(), "t write line {}");
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut table = FunctionTable::default();
        let sig = FunctionSignature::new(VisibilityType::Public, false, "t", parts_of("do it"));
        assert!(table.register(sig.clone(), true));
        let again = FunctionSignature::new(VisibilityType::Public, false, "t", parts_of("do it"));
        assert!(!table.register(again, true));
    }

    #[test]
    fn keyword_only_signatures_are_rejected() {
        assert!(parse_signature_string("set to").is_none());
        assert!(parse_signature_string("{}").is_none());
        assert!(parse_signature_string("{} is finished").is_some());
    }

    #[test]
    fn serialization_round_trip() {
        let sig = FunctionSignature::new(
            VisibilityType::Public,
            true,
            "test",
            parts_of("do/perform (the) thing {integer}"),
        );
        let mut writer = BinaryWriter::new();
        sig.write(&mut writer);
        let bc = writer.into_bytecode();
        let mut reader = BinaryReader::new(bc.as_bytes());
        let read = FunctionSignature::read(&mut reader).expect("read");
        assert_eq!(read.id(), sig.id());
        assert_eq!(read.display_name(), sig.display_name());
        assert!(read.returns_value());
    }
}
