//! A persisted-query GraphQL gateway.
//!
//! Incoming requests go through the [`QueryRegistry`] (persisted documents and their allow-list),
//! the [`Validator`] (document, operation and variables checked against the schema),
//! then the execution engine, with the [`MutationPipeline`] acting as the mutation root.
//!
//! Mutations follow a fixed shape built by [`SchemaBuilder`]:
//! one `input` argument, a payload with a `result` union of success and business failures,
//! and a `query` field re-exposing the root query object.

#[macro_use]
mod execution;
mod config;
mod context;
mod gateway;
mod mutation;
mod registry;
mod request;
mod response;
mod schema;
mod validation;

pub use self::config::ExecutionConfig;
pub use self::config::GatewayConfig;
pub use self::context::Context;
pub use self::execution::execute;
pub use self::execution::FieldError;
pub use self::execution::ObjectValue;
pub use self::execution::ResolveInfo;
pub use self::execution::ResolvedValue;
pub use self::execution::Resolver;
pub use self::gateway::Gateway;
pub use self::gateway::GatewayBuildError;
pub use self::gateway::GatewayBuilder;
pub use self::gateway::ManifestError;
pub use self::gateway::RegistrationError;
pub use self::mutation::BusinessFailure;
pub use self::mutation::MutationFailure;
pub use self::mutation::MutationOutcome;
pub use self::mutation::MutationPayload;
pub use self::mutation::MutationPipeline;
pub use self::mutation::MutationResolver;
pub use self::mutation::MutationResultKind;
pub use self::registry::LookupError;
pub use self::registry::OperationDocument;
pub use self::registry::PersistedQueryEntry;
pub use self::registry::QueryId;
pub use self::registry::QueryRegistry;
pub use self::registry::RegistryError;
pub use self::registry::RegistryMode;
pub use self::request::ExecutionRequest;
pub use self::request::MalformedRequest;
pub use self::request::RequestSource;
pub use self::response::Error;
pub use self::response::ErrorCode;
pub use self::response::Location;
pub use self::response::PathElement;
pub use self::response::Response;
pub use self::response::EXTENSION_SUSPECTED_VALIDATION_BUG;
pub use self::response::INTERNAL_ERROR_MESSAGE;
pub use self::schema::check_mutation_shapes;
pub use self::schema::EnumDef;
pub use self::schema::FailureDef;
pub use self::schema::FieldDef;
pub use self::schema::GatewaySchema;
pub use self::schema::InputObjectDef;
pub use self::schema::InputValueDef;
pub use self::schema::InterfaceDef;
pub use self::schema::MutationDef;
pub use self::schema::MutationShape;
pub use self::schema::ObjectDef;
pub use self::schema::SchemaBuilder;
pub use self::schema::SchemaDefinitionError;
pub use self::schema::UnionDef;
pub use self::validation::ValidatedOperation;
pub use self::validation::ValidationError;
pub use self::validation::Validator;
pub use self::validation::Violation;
pub use serde_json_bytes::ByteString;
pub use serde_json_bytes::Value as JsonValue;

/// Represents a JSON object
pub type JsonMap = serde_json_bytes::Map<ByteString, JsonValue>;

#[doc(hidden)]
pub mod __private {
    pub use futures::future::BoxFuture;
}
