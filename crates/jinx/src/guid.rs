//! The `Guid` value type.

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

/// A 128-bit globally unique identifier.
///
/// Guids are valid collection keys and compare by byte order. The canonical
/// string form is uppercase hyphenated
/// (`xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`); parsing accepts either case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Guid(Uuid);

impl Guid {
    /// The all-zero guid.
    pub const NIL: Self = Self(Uuid::nil());

    /// Creates a new random (version 4) guid.
    #[must_use]
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a guid from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Returns the raw bytes of the guid.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Parses a guid from its canonical string form.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        Uuid::from_str(text).ok().map(Self)
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buffer = [0u8; uuid::fmt::Hyphenated::LENGTH];
        f.write_str(self.0.as_hyphenated().encode_upper(&mut buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_form_round_trips() {
        let guid = Guid::new_random();
        let text = guid.to_string();
        assert_eq!(Guid::parse(&text), Some(guid));
        assert_eq!(text, text.to_uppercase());
    }

    #[test]
    fn parse_accepts_lowercase() {
        let guid = Guid::parse("0f8fad5b-d9cb-469f-a165-70867728950e").unwrap();
        assert_eq!(guid.to_string(), "0F8FAD5B-D9CB-469F-A165-70867728950E");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(Guid::parse("not a guid"), None);
    }
}
