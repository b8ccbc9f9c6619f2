use std::borrow::Cow;
use std::collections::btree_map::{self, BTreeMap};

/// A single request parameter value before it is rendered for signing.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue<'a> {
    StringValue(Cow<'a, str>),
    IntValue(i64),
    FloatValue(f64),
}

impl<'a> From<&'a str> for ParamValue<'a> {
    fn from(s: &'a str) -> Self {
        ParamValue::StringValue(s.into())
    }
}

impl<'a> From<&'a String> for ParamValue<'a> {
    fn from(s: &'a String) -> Self {
        ParamValue::StringValue(s.as_str().into())
    }
}

impl From<String> for ParamValue<'_> {
    fn from(s: String) -> Self {
        ParamValue::StringValue(s.into())
    }
}

impl From<i64> for ParamValue<'_> {
    fn from(n: i64) -> Self {
        ParamValue::IntValue(n)
    }
}

impl From<u32> for ParamValue<'_> {
    fn from(n: u32) -> Self {
        ParamValue::IntValue(n.into())
    }
}

impl From<f64> for ParamValue<'_> {
    fn from(n: f64) -> Self {
        ParamValue::FloatValue(n)
    }
}

impl ParamValue<'_> {
    pub fn render(&self) -> Cow<'_, str> {
        match self {
            ParamValue::StringValue(s) => Cow::Borrowed(s.as_ref()),
            ParamValue::IntValue(n) => Cow::Owned(n.to_string()),
            ParamValue::FloatValue(n) => Cow::Owned(n.to_string()),
        }
    }
}

/// Additional query or body parameters that take part in the signature.
///
/// Keys are unique; inserting an existing key replaces its value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestParams {
    params: BTreeMap<String, String>,
}

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<'a, K, V>(&mut self, key: K, value: V) -> &mut Self
    where
        K: Into<String>,
        V: Into<ParamValue<'a>>,
    {
        self.params
            .insert(key.into(), value.into().render().into_owned());
        self
    }

    pub fn with<'a, K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<ParamValue<'a>>,
    {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.params.iter()
    }
}

impl<'p> IntoIterator for &'p RequestParams {
    type Item = (&'p String, &'p String);
    type IntoIter = btree_map::Iter<'p, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.params.iter()
    }
}

impl<'a, K, V> FromIterator<(K, V)> for RequestParams
where
    K: Into<String>,
    V: Into<ParamValue<'a>>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = RequestParams::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}
