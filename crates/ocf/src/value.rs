use std::sync::Arc;

use indexmap::IndexMap;
use indexmap::map::{Iter, Keys};

use serde::{Deserialize, Serialize};

/// A property value belonging to a plain object graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Absence of a value.
    Null,
    /// A [`bool`] value.
    Bool(bool),
    /// An integer value.
    Integer(i64),
    /// A floating point value.
    Double(f64),
    /// A string value.
    String(String),
    /// An array of values.
    ///
    /// Arrays are opaque to the representation codec: their elements are
    /// never converted.
    Array(Vec<Value>),
    /// A nested [`Object`].
    Object(Object),
}

impl Value {
    /// Checks whether the value is [`Value::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the [`bool`] contained in the value, if any.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        if let Self::Bool(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    /// Returns the integer contained in the value, if any.
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        if let Self::Integer(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    /// Returns the value as a floating point number, if it is numeric.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(value) => Some(*value),
            Self::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    /// Returns the string contained in the value, if any.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        if let Self::String(value) = self {
            Some(value)
        } else {
            None
        }
    }

    /// Returns the array contained in the value, if any.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        if let Self::Array(values) = self {
            Some(values)
        } else {
            None
        }
    }

    /// Returns the [`Object`] contained in the value, if any.
    #[must_use]
    pub const fn as_object(&self) -> Option<&Object> {
        if let Self::Object(object) = self {
            Some(object)
        } else {
            None
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Self::Array(values)
    }
}

impl From<Object> for Value {
    fn from(object: Object) -> Self {
        Self::Object(object)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(value) => Self::Bool(value),
            serde_json::Value::Number(number) => number
                .as_i64()
                .map_or_else(|| Self::Double(number.as_f64().unwrap_or(f64::NAN)), Self::Integer),
            serde_json::Value::String(value) => Self::String(value),
            serde_json::Value::Array(values) => {
                Self::Array(values.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(map) => Self::Object(
                map.into_iter()
                    .map(|(key, value)| (key, Self::from(value)))
                    .collect(),
            ),
        }
    }
}

/// An ordered property map.
///
/// Cloning an [`Object`] shares its content: two clones are the same object
/// as far as [`Object::ptr_eq`] is concerned. Mutating a shared object
/// detaches it from the other clones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Object(Arc<IndexMap<String, Value>>);

impl Object {
    /// Creates an empty [`Object`].
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a property, returning the [`Object`].
    #[must_use]
    #[inline]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts a property, returning the previous value, if any.
    #[inline]
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        Arc::make_mut(&mut self.0).insert(key.into(), value.into())
    }

    /// Removes a property preserving the order of the remaining ones.
    #[inline]
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        if !self.0.contains_key(key) {
            return None;
        }
        Arc::make_mut(&mut self.0).shift_remove(key)
    }

    /// Returns the value of a property.
    #[must_use]
    #[inline]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Checks whether a property exists.
    #[must_use]
    #[inline]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Returns the number of properties.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Checks whether the object has no properties.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns an iterator over the properties in insertion order.
    #[inline]
    pub fn iter(&self) -> Iter<'_, String, Value> {
        self.0.iter()
    }

    /// Returns an iterator over the property names in insertion order.
    #[inline]
    pub fn keys(&self) -> Keys<'_, String, Value> {
        self.0.keys()
    }

    /// Merges the given [`Object`] into this one.
    ///
    /// New properties are added, existing ones are overwritten, properties
    /// absent from `other` are left untouched.
    pub fn merge(&mut self, other: &Self) {
        if other.is_empty() {
            return;
        }
        let map = Arc::make_mut(&mut self.0);
        for (key, value) in other.iter() {
            map.insert(key.clone(), value.clone());
        }
    }

    /// Checks whether two objects share the same content allocation.
    #[must_use]
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn identity(&self) -> *const IndexMap<String, Value> {
        Arc::as_ptr(&self.0)
    }
}

impl<K, V> FromIterator<(K, V)> for Object
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(Arc::new(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        ))
    }
}

impl<'a> IntoIterator for &'a Object {
    type Item = (&'a String, &'a Value);
    type IntoIter = Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Object, Value};

    #[test]
    fn object_from_json() {
        let object: Object = serde_json::from_value(json!({
            "power": "on",
            "brightness": 40,
            "ratio": 0.5,
            "tags": ["a", 1],
            "nested": { "enabled": true, "missing": null },
        }))
        .unwrap();

        assert_eq!(object.len(), 5);
        assert_eq!(object.get("power"), Some(&Value::from("on")));
        assert_eq!(object.get("brightness"), Some(&Value::Integer(40)));
        assert_eq!(object.get("ratio"), Some(&Value::Double(0.5)));
        assert_eq!(
            object.get("tags"),
            Some(&Value::Array(vec![Value::from("a"), Value::Integer(1)]))
        );

        let nested = object.get("nested").and_then(Value::as_object).unwrap();
        assert_eq!(nested.get("enabled"), Some(&Value::Bool(true)));
        assert!(nested.get("missing").is_some_and(Value::is_null));

        // The same graph is obtained through the `serde_json::Value` conversion.
        let converted = Value::from(json!({
            "power": "on",
            "brightness": 40,
            "ratio": 0.5,
            "tags": ["a", 1],
            "nested": { "enabled": true, "missing": null },
        }));
        assert_eq!(converted, Value::Object(object));
    }

    #[test]
    fn object_order_and_removal() {
        let mut object = Object::new().with("a", 1).with("b", 2).with("c", 3);

        assert_eq!(object.remove("b"), Some(Value::Integer(2)));
        assert_eq!(object.remove("b"), None);
        assert_eq!(object.keys().collect::<Vec<_>>(), ["a", "c"]);
    }

    #[test]
    fn merge_rule() {
        let mut properties = Object::new().with("power", "off").with("brightness", 10);
        let update = Object::new().with("power", "on").with("color", "red");

        properties.merge(&update);

        assert_eq!(
            properties,
            Object::new()
                .with("power", "on")
                .with("brightness", 10)
                .with("color", "red")
        );
    }

    #[test]
    fn shared_identity() {
        let object = Object::new().with("a", 1);
        let mut shared = object.clone();

        assert!(object.ptr_eq(&shared));

        // Mutation detaches the clone.
        shared.insert("b", 2);
        assert!(!object.ptr_eq(&shared));
        assert_eq!(object.len(), 1);
        assert_eq!(shared.len(), 2);
    }
}
