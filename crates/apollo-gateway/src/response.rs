//! GraphQL [responses](https://spec.graphql.org/October2021/#sec-Response-Format)
//! as produced by the gateway.
//!
//! Every outcome that made it past envelope parsing is a [`Response`]:
//! request errors (no `data` key), field errors (`data` present, possibly `null`),
//! and internal failures (a single opaque error, no `data` key).

use crate::JsonMap;
use crate::JsonValue;
use apollo_compiler::parser::SourceMap;
use apollo_compiler::parser::SourceSpan;
use apollo_compiler::Name;
use serde::Serialize;

/// Message of the single error sent for an internal failure.
/// Details are logged, never sent to the client.
pub const INTERNAL_ERROR_MESSAGE: &str = "internal server error";

/// Possible key in the [`Error::extensions`] map
pub const EXTENSION_SUSPECTED_VALIDATION_BUG: &str = "SUSPECTED_VALIDATION_BUG";

/// <https://spec.graphql.org/October2021/#sec-Response-Format>
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    // <https://spec.graphql.org/October2021/#note-6f005> suggests serializing this first
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<Error>,

    /// * `None`: the request failed before or outside of execution, the `data` key is absent
    /// * `Some(JsonValue::Null)`: a field error was propagated all the way to the root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

/// <https://spec.graphql.org/October2021/#sec-Errors.Error-result-format>
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Error {
    pub message: String,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<Location>,

    /// Empty for request errors
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<PathElement>,

    #[serde(skip_serializing_if = "JsonMap::is_empty")]
    pub extensions: JsonMap,

    /// Set for unanticipated failures, which fail the whole request
    #[serde(skip)]
    pub(crate) internal: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

/// A segment of [`Error::path`]: a response key or a list index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathElement {
    Field(Name),
    ListIndex(usize),
}

/// Stable, machine-readable values for `extensions.code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorCode {
    MalformedRequest,
    UnknownQuery,
    QueryNotWhitelisted,
    PersistedQueryRequired,
    ValidationFailed,
    AmbiguousOperation,
    OperationNotFound,
    OperationNotSupported,
    Forbidden,
    Timeout,
    InternalServerError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::MalformedRequest => "MALFORMED_REQUEST",
            ErrorCode::UnknownQuery => "UNKNOWN_QUERY",
            ErrorCode::QueryNotWhitelisted => "QUERY_NOT_WHITELISTED",
            ErrorCode::PersistedQueryRequired => "PERSISTED_QUERY_REQUIRED",
            ErrorCode::ValidationFailed => "GRAPHQL_VALIDATION_FAILED",
            ErrorCode::AmbiguousOperation => "AMBIGUOUS_OPERATION",
            ErrorCode::OperationNotFound => "OPERATION_NOT_FOUND",
            ErrorCode::OperationNotSupported => "OPERATION_NOT_SUPPORTED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::InternalServerError => "INTERNAL_SERVER_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Linked-list version of `Vec<PathElement>`, taking advantage of the call stack
pub(crate) type LinkedPath<'a> = Option<&'a LinkedPathElement<'a>>;

pub(crate) struct LinkedPathElement<'a> {
    pub(crate) element: PathElement,
    pub(crate) next: LinkedPath<'a>,
}

pub(crate) fn path_to_vec(mut link: LinkedPath<'_>) -> Vec<PathElement> {
    let mut path = Vec::new();
    while let Some(node) = link {
        path.push(node.element.clone());
        link = node.next;
    }
    path.reverse();
    path
}

pub(crate) fn to_locations(location: Option<SourceSpan>, sources: &SourceMap) -> Vec<Location> {
    location
        .into_iter()
        .filter_map(|span| span.line_column(sources))
        .map(|line_column| Location {
            line: line_column.line,
            column: line_column.column,
        })
        .collect()
}

pub(crate) fn field_error(
    message: impl Into<String>,
    path: LinkedPath<'_>,
    location: Option<SourceSpan>,
    sources: &SourceMap,
) -> Error {
    let mut error = Error::new(message);
    error.path = path_to_vec(path);
    error.locations = to_locations(location, sources);
    error
}

impl Error {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: Vec::new(),
            path: Vec::new(),
            extensions: JsonMap::new(),
            internal: false,
        }
    }

    /// The opaque error standing in for any internal failure
    pub fn internal() -> Self {
        let mut error = Self::new(INTERNAL_ERROR_MESSAGE).with_code(ErrorCode::InternalServerError);
        error.internal = true;
        error
    }

    pub fn with_code(mut self, code: ErrorCode) -> Self {
        self.extensions.insert("code", code.as_str().into());
        self
    }

    pub fn with_extension(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
        self.extensions.insert(key, value.into());
        self
    }

    pub fn with_locations(mut self, locations: Vec<Location>) -> Self {
        self.locations = locations;
        self
    }

    /// The `extensions.code` entry, if any
    pub fn code(&self) -> Option<&str> {
        self.extensions.get("code").and_then(|code| code.as_str())
    }

    pub fn is_internal(&self) -> bool {
        self.internal
    }

    pub(crate) fn suspected_validation_bug(mut self) -> Self {
        self.extensions
            .insert(EXTENSION_SUSPECTED_VALIDATION_BUG, true.into());
        self
    }
}

impl Response {
    /// A response for a request that failed before execution started.
    ///
    /// Does not contain a `data` entry. This is different from `data: null`.
    ///
    /// <https://spec.graphql.org/October2021/#sec-Errors.Request-errors>
    pub fn request_errors(errors: Vec<Error>) -> Self {
        Self { errors, data: None }
    }

    pub fn request_error(error: Error) -> Self {
        Self::request_errors(vec![error])
    }

    /// The whole request failed for reasons not to be disclosed to the client
    pub fn internal_failure() -> Self {
        Self::request_error(Error::internal())
    }

    pub fn is_request_error(&self) -> bool {
        self.data.is_none()
    }

    /// Serializes to the JSON wire format
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

impl Serialize for PathElement {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            PathElement::Field(name) => name.as_str().serialize(serializer),
            PathElement::ListIndex(index) => index.serialize(serializer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_errors_have_no_data_key() {
        let response = Response::request_error(Error::new("nope").with_code(ErrorCode::UnknownQuery));
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(
            json,
            r#"{"errors":[{"message":"nope","extensions":{"code":"UNKNOWN_QUERY"}}]}"#
        );
    }

    #[test]
    fn null_data_is_serialized() {
        let response = Response {
            errors: Vec::new(),
            data: Some(JsonValue::Null),
        };
        assert_eq!(serde_json::to_string(&response).unwrap(), r#"{"data":null}"#);
    }

    #[test]
    fn internal_errors_are_opaque() {
        let error = Error::internal();
        assert!(error.is_internal());
        assert_eq!(error.code(), Some("INTERNAL_SERVER_ERROR"));
        let json = serde_json::to_string(&error).unwrap();
        assert!(!json.contains("internal\":"), "{json}");
    }

    #[test]
    fn path_serializes_keys_and_indices() {
        let mut error = Error::new("boom");
        error.path = vec![
            PathElement::Field(Name::new("users").unwrap()),
            PathElement::ListIndex(1),
            PathElement::Field(Name::new("email").unwrap()),
        ];
        let json = serde_json::to_string(&error).unwrap();
        assert_eq!(json, r#"{"message":"boom","path":["users",1,"email"]}"#);
    }
}
