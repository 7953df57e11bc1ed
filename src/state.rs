//! The threaded state value and its layered record representation.

use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// The value threaded through a chain.
///
/// The combinator itself treats the state as opaque: it only ever hands it
/// to step functions and threads whatever they return. The one structural
/// requirement comes from flags, whose tallies live *inside* the state as
/// derived [`Record`] fields.
///
/// # Examples
///
/// ```
/// use kusari::{Record, State};
///
/// let number: State = 42.into();
/// assert_eq!(number, State::Int(42));
///
/// let record: State = Record::from_fields([("name", State::from("monkey"))]).into();
/// assert!(matches!(record, State::Record(_)));
/// ```
#[derive(Debug, Clone)]
pub enum State {
    /// The absent value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A floating point number.
    Float(f64),
    /// A string.
    Text(String),
    /// An ordered sequence of states.
    List(Vec<State>),
    /// A layered record, see [`Record`].
    Record(Record),
}

impl State {
    /// Returns a short name for the kind of this state value.
    ///
    /// Used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            State::Null => "null",
            State::Bool(_) => "bool",
            State::Int(_) => "int",
            State::Float(_) => "float",
            State::Text(_) => "text",
            State::List(_) => "list",
            State::Record(_) => "record",
        }
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (State::Null, State::Null) => true,
            (State::Bool(a), State::Bool(b)) => a == b,
            (State::Int(a), State::Int(b)) => a == b,
            (State::Float(a), State::Float(b)) => a == b,
            (State::Text(a), State::Text(b)) => a == b,
            (State::List(a), State::List(b)) => a == b,
            (State::Record(a), State::Record(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for State {
    fn from(value: bool) -> Self {
        State::Bool(value)
    }
}

impl From<i64> for State {
    fn from(value: i64) -> Self {
        State::Int(value)
    }
}

impl From<i32> for State {
    fn from(value: i32) -> Self {
        State::Int(value.into())
    }
}

impl From<f64> for State {
    fn from(value: f64) -> Self {
        State::Float(value)
    }
}

impl From<&str> for State {
    fn from(value: &str) -> Self {
        State::Text(value.to_string())
    }
}

impl From<String> for State {
    fn from(value: String) -> Self {
        State::Text(value)
    }
}

impl From<Vec<State>> for State {
    fn from(value: Vec<State>) -> Self {
        State::List(value)
    }
}

impl From<Record> for State {
    fn from(value: Record) -> Self {
        State::Record(value)
    }
}

impl Serialize for State {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            State::Null => serializer.serialize_unit(),
            State::Bool(value) => serializer.serialize_bool(*value),
            State::Int(value) => serializer.serialize_i64(*value),
            State::Float(value) => serializer.serialize_f64(*value),
            State::Text(value) => serializer.serialize_str(value),
            State::List(items) => items.serialize(serializer),
            State::Record(record) => record.serialize(serializer),
        }
    }
}

/// A persistent, layered record.
///
/// Every transformation produces a new record; nothing is ever written to
/// an existing one. [`Record::derive`] creates a child layer holding only
/// its own fields plus a link to the parent layer, and [`Record::get`]
/// reads through to ancestors for fields the child does not set. This is
/// how flag tallies accumulate without disturbing sibling fields: derived
/// fields are always new own-fields, never writes to an ancestor.
///
/// Cloning a record is cheap (one reference-count bump).
///
/// # Examples
///
/// ```
/// use kusari::{Record, State};
///
/// let base = Record::from_fields([("name", State::from("monkey"))]);
/// let derived = base.with("hungry", State::Bool(true));
///
/// // The child reads through to the parent...
/// assert_eq!(derived.get("name"), Some(&State::from("monkey")));
/// assert_eq!(derived.get("hungry"), Some(&State::Bool(true)));
///
/// // ...and the parent is untouched.
/// assert_eq!(base.get("hungry"), None);
/// ```
#[derive(Clone)]
pub struct Record {
    layer: Arc<Layer>,
}

#[derive(Debug)]
struct Layer {
    parent: Option<Arc<Layer>>,
    fields: HashMap<String, State>,
}

impl Record {
    /// Creates an empty record.
    pub fn new() -> Self {
        Record {
            layer: Arc::new(Layer {
                parent: None,
                fields: HashMap::new(),
            }),
        }
    }

    /// Creates a single-layer record from the given fields.
    pub fn from_fields<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, State)>,
        K: Into<String>,
    {
        Record {
            layer: Arc::new(Layer {
                parent: None,
                fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            }),
        }
    }

    /// Creates a child record whose own fields are `fields` and whose
    /// remaining fields read through to `self`.
    pub fn derive<I, K>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, State)>,
        K: Into<String>,
    {
        Record {
            layer: Arc::new(Layer {
                parent: Some(self.layer.clone()),
                fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            }),
        }
    }

    /// Shorthand for [`Record::derive`] with a single field.
    pub fn with(&self, key: impl Into<String>, value: State) -> Self {
        self.derive([(key.into(), value)])
    }

    /// Returns the value for `key`, walking ancestor layers if the own
    /// layer does not set it.
    pub fn get(&self, key: &str) -> Option<&State> {
        let mut layer = &self.layer;
        loop {
            if let Some(value) = layer.fields.get(key) {
                return Some(value);
            }
            match &layer.parent {
                Some(parent) => layer = parent,
                None => return None,
            }
        }
    }

    /// Returns `true` if the record (or any ancestor) sets `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Returns the number of effective fields.
    pub fn len(&self) -> usize {
        self.effective().len()
    }

    /// Returns `true` if the record has no effective fields.
    pub fn is_empty(&self) -> bool {
        self.effective().is_empty()
    }

    /// Effective view: every visible field, own fields shadowing inherited
    /// ones, in key order.
    fn effective(&self) -> BTreeMap<&str, &State> {
        let mut out = BTreeMap::new();
        let mut layer = Some(&self.layer);
        while let Some(current) = layer {
            for (key, value) in &current.fields {
                out.entry(key.as_str()).or_insert(value);
            }
            layer = current.parent.as_ref();
        }
        out
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.effective()).finish()
    }
}

/// Records compare by their effective fields, not by layering. Two records
/// that read identically are equal no matter how they were derived.
impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.effective() == other.effective()
    }
}

/// Records serialize as flat maps over their effective fields.
impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fields = self.effective();
        let mut map = serializer.serialize_map(Some(fields.len()))?;
        for (key, value) in fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_through_to_parent() {
        let base = Record::from_fields([("a", State::Int(1)), ("b", State::Int(2))]);
        let child = base.with("b", State::Int(20));

        assert_eq!(child.get("a"), Some(&State::Int(1)));
        assert_eq!(child.get("b"), Some(&State::Int(20)));
        assert_eq!(base.get("b"), Some(&State::Int(2)));
    }

    #[test]
    fn test_derivation_never_touches_ancestor() {
        let base = Record::new();
        let left = base.with("x", State::Int(1));
        let right = base.with("x", State::Int(2));

        assert_eq!(base.get("x"), None);
        assert_eq!(left.get("x"), Some(&State::Int(1)));
        assert_eq!(right.get("x"), Some(&State::Int(2)));
    }

    #[test]
    fn test_effective_equality_ignores_layering() {
        let layered = Record::new()
            .with("a", State::Int(1))
            .with("b", State::Int(2));
        let flat = Record::from_fields([("a", State::Int(1)), ("b", State::Int(2))]);

        assert_eq!(layered, flat);
        assert_eq!(layered.len(), 2);
        assert!(!layered.is_empty());
    }

    #[test]
    fn test_state_kind() {
        assert_eq!(State::Null.kind(), "null");
        assert_eq!(State::Int(1).kind(), "int");
        assert_eq!(State::Record(Record::new()).kind(), "record");
    }

    #[test]
    fn test_state_equality_across_kinds() {
        assert_ne!(State::Int(1), State::Float(1.0));
        assert_eq!(State::from("a"), State::Text("a".to_string()));
        assert_eq!(
            State::List(vec![State::Int(1)]),
            State::List(vec![State::Int(1)])
        );
    }

    #[test]
    fn test_serialize_flattens_layers() {
        let record = Record::from_fields([("a", State::Int(1))])
            .with("b", State::from("two"))
            .with("a", State::Int(10));
        let json = serde_json::to_string(&State::Record(record)).expect("serializable");
        assert_eq!(json, r#"{"a":10,"b":"two"}"#);
    }

    #[test]
    fn test_serialize_scalars() {
        let json = serde_json::to_string(&State::List(vec![
            State::Null,
            State::Bool(true),
            State::Int(3),
            State::from("x"),
        ]))
        .expect("serializable");
        assert_eq!(json, r#"[null,true,3,"x"]"#);
    }
}
