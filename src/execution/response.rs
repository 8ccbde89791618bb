//! GraphQL response types

use serde::{Deserialize, Serialize};

use crate::protocol::ResultValue;

/// Location of an error in the request document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

/// A path segment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

impl From<&str> for PathSegment {
    fn from(s: &str) -> Self {
        Self::Field(s.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(i: usize) -> Self {
        Self::Index(i)
    }
}

/// A GraphQL error as reported inside a response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphQLError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<Location>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<PathSegment>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<serde_json::Value>,
}

impl GraphQLError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: None,
            path: None,
            extensions: None,
        }
    }

    pub fn with_path(mut self, path: Vec<PathSegment>) -> Self {
        self.path = Some(path);
        self
    }
}

/// One result produced by the execution engine
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub data: Option<ResultValue>,
    pub errors: Vec<GraphQLError>,
}

impl Response {
    /// A response carrying data
    pub fn data(data: impl Into<ResultValue>) -> Self {
        Self {
            data: Some(data.into()),
            errors: Vec::new(),
        }
    }

    /// A response carrying only errors
    pub fn errors(errors: Vec<GraphQLError>) -> Self {
        Self { data: None, errors }
    }

    /// Payload of a `data` message: `data` when present, `errors` when non-empty
    pub fn into_payload(self) -> ResultValue {
        let mut fields = Vec::with_capacity(2);
        if let Some(data) = self.data {
            fields.push(("data".to_string(), data));
        }
        if !self.errors.is_empty() {
            let errors = self
                .errors
                .into_iter()
                .map(|error| {
                    serde_json::to_value(&error)
                        .map(ResultValue::from)
                        .unwrap_or_else(|_| ResultValue::object([("message", error.message.into())]))
                })
                .collect();
            fields.push(("errors".to_string(), ResultValue::List(errors)));
        }
        ResultValue::Object(fields)
    }
}
