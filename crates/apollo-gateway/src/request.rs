//! The request envelope: `{ "query" | "id", "variables", "operationName" }`.

use crate::registry::QueryId;
use crate::response::Error;
use crate::response::ErrorCode;
use crate::response::Response;
use crate::ByteString;
use crate::JsonMap;
use crate::JsonValue;
use serde::de::IgnoredAny;
use serde::de::MapAccess;
use serde::de::SeqAccess;
use serde::de::Visitor;
use serde::Deserialize;
use serde::Deserializer;
use std::fmt;

/// Where the operation document of a request comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestSource {
    /// A persisted query, looked up in the registry
    Id(QueryId),
    /// Ad-hoc query text, only accepted in open mode
    Query(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRequest {
    pub source: RequestSource,
    pub variables: JsonMap,
    pub operation_name: Option<String>,
}

/// The request could not be understood as a GraphQL request at all.
///
/// This is the only failure reported outside of a GraphQL response body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum MalformedRequest {
    #[error("invalid request body: {0}")]
    InvalidJson(String),
    #[error("request must not contain both `query` and `id`")]
    BothQueryAndId,
    #[error("request must contain either `query` or `id`")]
    MissingQuery,
    #[error("request `id` must not be empty")]
    EmptyId,
    #[error("`variables` must be a JSON object")]
    VariablesNotObject,
    #[error("variable `{0}` is given more than once")]
    DuplicateVariable(String),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    variables: Option<Variables>,
    #[serde(default, rename = "operationName")]
    operation_name: Option<String>,
}

/// `variables` as found on the wire.
///
/// Problems are recorded instead of failing deserialization
/// so they map to their own [`MalformedRequest`] variant.
enum Variables {
    Object(JsonMap),
    Duplicate(String),
    NotObject,
}

impl ExecutionRequest {
    pub fn persisted(id: QueryId) -> Self {
        Self {
            source: RequestSource::Id(id),
            variables: JsonMap::new(),
            operation_name: None,
        }
    }

    pub fn query(text: impl Into<String>) -> Self {
        Self {
            source: RequestSource::Query(text.into()),
            variables: JsonMap::new(),
            operation_name: None,
        }
    }

    pub fn with_variables(mut self, variables: JsonMap) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_variable(mut self, name: &str, value: impl Into<JsonValue>) -> Self {
        self.variables.insert(name, value.into());
        self
    }

    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// Parses the JSON envelope. Unknown keys (such as `extensions`) are ignored.
    pub fn from_json(json: &[u8]) -> Result<Self, MalformedRequest> {
        let envelope: Envelope = serde_json::from_slice(json)
            .map_err(|err| MalformedRequest::InvalidJson(err.to_string()))?;
        let source = match (envelope.query, envelope.id) {
            (Some(_), Some(_)) => return Err(MalformedRequest::BothQueryAndId),
            (None, None) => return Err(MalformedRequest::MissingQuery),
            (Some(query), None) => RequestSource::Query(query),
            (None, Some(id)) => {
                RequestSource::Id(QueryId::new(id).map_err(|_| MalformedRequest::EmptyId)?)
            }
        };
        let variables = match envelope.variables {
            None => JsonMap::new(),
            Some(Variables::Object(map)) => map,
            Some(Variables::Duplicate(name)) => {
                return Err(MalformedRequest::DuplicateVariable(name))
            }
            Some(Variables::NotObject) => return Err(MalformedRequest::VariablesNotObject),
        };
        Ok(Self {
            source,
            variables,
            operation_name: envelope.operation_name,
        })
    }
}

impl MalformedRequest {
    /// HTTP status for transports that have one
    pub fn status_code(&self) -> u16 {
        400
    }

    /// The error body sent back, for transports without a separate status channel
    pub fn to_response(&self) -> Response {
        Response::request_error(Error::new(self.to_string()).with_code(ErrorCode::MalformedRequest))
    }
}

impl<'de> Deserialize<'de> for Variables {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(VariablesVisitor)
    }
}

struct VariablesVisitor;

macro_rules! not_an_object {
    ($($method: ident: $ty: ty,)+) => {
        $(
            fn $method<E>(self, _value: $ty) -> Result<Variables, E>
            where
                E: serde::de::Error,
            {
                Ok(Variables::NotObject)
            }
        )+
    };
}

impl<'de> Visitor<'de> for VariablesVisitor {
    type Value = Variables;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map of variable values")
    }

    fn visit_map<A>(self, mut map: A) -> Result<Variables, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut variables = JsonMap::new();
        let mut duplicate = None;
        while let Some(key) = map.next_key::<String>()? {
            if duplicate.is_some() {
                map.next_value::<IgnoredAny>()?;
            } else if variables.contains_key(key.as_str()) {
                map.next_value::<IgnoredAny>()?;
                duplicate = Some(key);
            } else {
                let value = map.next_value::<JsonValue>()?;
                variables.insert(ByteString::from(key), value);
            }
        }
        Ok(match duplicate {
            Some(name) => Variables::Duplicate(name),
            None => Variables::Object(variables),
        })
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Variables, A::Error>
    where
        A: SeqAccess<'de>,
    {
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(Variables::NotObject)
    }

    fn visit_unit<E>(self) -> Result<Variables, E>
    where
        E: serde::de::Error,
    {
        Ok(Variables::Object(JsonMap::new()))
    }

    not_an_object! {
        visit_bool: bool,
        visit_i64: i64,
        visit_u64: u64,
        visit_f64: f64,
        visit_str: &str,
    }
}
