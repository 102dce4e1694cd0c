use std::fmt;

use serde::Serialize;

/// Composite cache key: operation name followed by serialized parameters.
///
/// Keys compare segment-wise, so `["followers"]` is a prefix of
/// `["followers", "aaaaa-aa"]` but `["follow"]` is not.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn new(operation: impl Into<String>) -> Self {
        Self(vec![operation.into()])
    }

    /// The empty key; a prefix of every key.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Append a parameter rendered with `Display`.
    pub fn with(mut self, part: impl fmt::Display) -> Self {
        self.0.push(part.to_string());
        self
    }

    /// Append a structured parameter as compact JSON.
    ///
    /// Struct fields serialize in declaration order, so equal inputs always
    /// produce equal keys.
    pub fn with_param<P: Serialize + ?Sized>(mut self, param: &P) -> Result<Self, serde_json::Error> {
        self.0.push(serde_json::to_string(param)?);
        Ok(self)
    }

    pub fn operation(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("*");
        }
        f.write_str(&self.0.join("/"))
    }
}
