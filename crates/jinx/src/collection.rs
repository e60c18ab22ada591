//! The `Collection` value type and its iterator.
//!
//! A collection is an ordered mapping from variant keys to variant values.
//! Iteration order is key order: keys sort numerically across Integer and
//! Number (so `1` and `1.0` are the same key), then by type, then by value.
//! Collections are shared: every variant holding one refers to the same
//! underlying map, and mutation through any handle is visible through all.
//!
//! Iterators are positions by key rather than raw pointers, which keeps every
//! outstanding iterator coherent across mutation: erasing the current entry
//! through one handle leaves the iterator at the next valid position, and
//! erasing at end is a no-op that stays at end.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::variant::{ValueType, Variant};

/// Internal key wrapper giving variants the total order collections use.
#[derive(Debug, Clone, PartialEq)]
struct CollectionKey(Variant);

impl Eq for CollectionKey {}

impl PartialOrd for CollectionKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CollectionKey {
    fn cmp(&self, other: &Self) -> Ordering {
        key_order(&self.0, &other.0)
    }
}

fn type_rank(value: &Variant) -> u8 {
    match value.value_type() {
        ValueType::Number | ValueType::Integer => 0,
        ValueType::Boolean => 1,
        ValueType::String => 2,
        ValueType::Guid => 3,
        // Non-key types never make it into a collection, but give them a
        // stable rank anyway so ordering is total.
        _ => 4,
    }
}

/// Total order over key-type variants.
pub(crate) fn key_order(left: &Variant, right: &Variant) -> Ordering {
    match (left, right) {
        (Variant::Integer(a), Variant::Integer(b)) => a.cmp(b),
        (Variant::Integer(a), Variant::Number(b)) => (*a as f64).total_cmp(b),
        (Variant::Number(a), Variant::Integer(b)) => a.total_cmp(&(*b as f64)),
        (Variant::Number(a), Variant::Number(b)) => a.total_cmp(b),
        (Variant::Boolean(a), Variant::Boolean(b)) => a.cmp(b),
        (Variant::String(a), Variant::String(b)) => a.cmp(b),
        (Variant::Guid(a), Variant::Guid(b)) => a.cmp(b),
        _ => type_rank(left).cmp(&type_rank(right)),
    }
}

/// An ordered mapping from variant keys to variant values.
#[derive(Debug, Default, Clone)]
pub struct Collection {
    entries: BTreeMap<CollectionKey, Variant>,
}

impl Collection {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    #[must_use]
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when the collection has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts or replaces an entry. Returns false if `key` is not a valid
    /// key type (Number, Integer, Boolean, String, or Guid).
    pub fn insert(&mut self, key: Variant, value: Variant) -> bool {
        if !key.is_key_type() {
            return false;
        }
        self.entries.insert(CollectionKey(key), value);
        true
    }

    /// Looks up the value stored at `key`.
    #[must_use]
    pub fn get(&self, key: &Variant) -> Option<Variant> {
        self.entries.get(&CollectionKey(key.clone())).cloned()
    }

    /// Returns true if an entry exists at `key`.
    #[must_use]
    pub fn contains_key(&self, key: &Variant) -> bool {
        self.entries.contains_key(&CollectionKey(key.clone()))
    }

    /// Removes the entry at `key`, returning its value.
    pub fn remove(&mut self, key: &Variant) -> Option<Variant> {
        self.entries.remove(&CollectionKey(key.clone()))
    }

    /// Removes all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// The first key in iteration order.
    #[must_use]
    pub fn first_key(&self) -> Option<Variant> {
        self.entries.keys().next().map(|k| k.0.clone())
    }

    /// The first key strictly greater than `key`.
    #[must_use]
    pub fn next_key_after(&self, key: &Variant) -> Option<Variant> {
        self.entries
            .range((
                Bound::Excluded(CollectionKey(key.clone())),
                Bound::Unbounded,
            ))
            .next()
            .map(|(k, _)| k.0.clone())
    }

    /// Iterates entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&Variant, &Variant)> {
        self.entries.iter().map(|(k, v)| (&k.0, v))
    }
}

/// Shared handle to a [`Collection`].
pub type CollectionRef = Arc<RwLock<Collection>>;

/// Creates a new, empty shared collection.
#[must_use]
pub fn create_collection() -> CollectionRef {
    Arc::new(RwLock::new(Collection::new()))
}

/// Read-locks a shared collection, ignoring lock poisoning.
pub(crate) fn collection_read(collection: &CollectionRef) -> RwLockReadGuard<'_, Collection> {
    collection.read().unwrap_or_else(PoisonError::into_inner)
}

/// Write-locks a shared collection, ignoring lock poisoning.
pub(crate) fn collection_write(collection: &CollectionRef) -> RwLockWriteGuard<'_, Collection> {
    collection.write().unwrap_or_else(PoisonError::into_inner)
}

/// An iterator into a shared collection: the collection plus a current key.
///
/// A position of `None` means the iterator is at end.
#[derive(Debug, Clone)]
pub struct CollectionItr {
    collection: CollectionRef,
    position: Option<Box<Variant>>,
}

impl CollectionItr {
    /// Creates an iterator at the first entry of `collection` (or at end if
    /// the collection is empty).
    #[must_use]
    pub fn at_begin(collection: CollectionRef) -> Self {
        let position = collection_read(&collection).first_key().map(Box::new);
        Self {
            collection,
            position,
        }
    }

    /// The collection this iterator refers into.
    #[must_use]
    pub fn collection(&self) -> &CollectionRef {
        &self.collection
    }

    /// Returns true when the iterator is past the last entry.
    #[must_use]
    pub fn is_at_end(&self) -> bool {
        match &self.position {
            None => true,
            // The entry may have been erased behind our back.
            Some(key) => !collection_read(&self.collection).contains_key(key.as_ref()),
        }
    }

    /// The key at the current position, or null at end.
    #[must_use]
    pub fn key(&self) -> Variant {
        self.position.as_deref().cloned().unwrap_or(Variant::Null)
    }

    /// The value at the current position, or null at end.
    #[must_use]
    pub fn value(&self) -> Variant {
        match &self.position {
            Some(key) => collection_read(&self.collection)
                .get(key)
                .unwrap_or(Variant::Null),
            None => Variant::Null,
        }
    }

    /// Advances to the next entry in key order.
    pub fn advance(&mut self) {
        if let Some(key) = &self.position {
            self.position = collection_read(&self.collection)
                .next_key_after(key)
                .map(Box::new);
        }
    }

    /// Erases the entry at the current position and advances to the next
    /// valid position. Erasing at end is a no-op that stays at end.
    pub fn erase(&mut self) {
        if let Some(key) = self.position.take() {
            let mut collection = collection_write(&self.collection);
            collection.remove(&key);
            self.position = collection.next_key_after(&key).map(Box::new);
        }
    }
}

impl PartialEq for CollectionItr {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.collection, &other.collection) && self.position == other.position
    }
}

/// Parses delimited tabular text into a collection of collections.
///
/// The first line is the header. The delimiter is whichever of `,`, `;`, or
/// tab appears first in the header; a `;` delimiter switches numeric parsing
/// to continental format (comma as the decimal separator). Fields may be
/// quoted with `"` to embed delimiters, and `""` inside a quoted field is a
/// literal quote. Rows are keyed by their first column; row cells are keyed
/// by header name. Cell text parses as Integer, then Number, then Boolean,
/// falling back to String.
pub(crate) fn parse_table(text: &str) -> Option<CollectionRef> {
    let mut lines = split_table_lines(text);
    let header_line = loop {
        let line = lines.next()?;
        if !line.is_empty() {
            break line;
        }
    };

    let delimiter = header_line
        .chars()
        .find(|c| matches!(c, ',' | ';' | '\t'))?;
    let continental = delimiter == ';';

    let headers: Vec<Variant> = split_table_fields(header_line, delimiter)
        .into_iter()
        .map(|f| parse_table_cell(&f, continental))
        .collect();
    if headers.is_empty() {
        return None;
    }

    let table = create_collection();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let fields = split_table_fields(line, delimiter);
        let mut fields = fields.into_iter();
        let row_key = parse_table_cell(&fields.next()?, continental);
        if !row_key.is_key_type() {
            return None;
        }
        let row = create_collection();
        {
            let mut row_guard = collection_write(&row);
            row_guard.insert(headers[0].clone(), row_key.clone());
            for (header, field) in headers.iter().skip(1).zip(fields) {
                row_guard.insert(header.clone(), parse_table_cell(&field, continental));
            }
        }
        collection_write(&table).insert(row_key, Variant::Collection(row));
    }
    Some(table)
}

/// Splits on any of the accepted line endings (`\r\n`, `\n`, `\r`).
fn split_table_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split(['\r', '\n'])
}

fn split_table_fields(line: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars().peekable();
    let mut quoted = false;
    while let Some(c) = chars.next() {
        if quoted {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    quoted = false;
                }
            } else {
                current.push(c);
            }
        } else if c == '"' && current.is_empty() {
            quoted = true;
        } else if c == delimiter {
            fields.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    fields.push(current);
    fields
}

fn parse_table_cell(field: &str, continental: bool) -> Variant {
    if let Ok(i) = field.parse::<i64>() {
        return Variant::Integer(i);
    }
    let numeric = if continental {
        field.replace(',', ".")
    } else {
        field.to_owned()
    };
    if !numeric.is_empty() && let Ok(n) = numeric.parse::<f64>() {
        return Variant::Number(n);
    }
    match field {
        "true" => Variant::Boolean(true),
        "false" => Variant::Boolean(false),
        _ => Variant::String(field.to_owned()),
    }
}
