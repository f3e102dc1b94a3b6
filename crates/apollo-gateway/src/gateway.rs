//! Entry point: request envelope in, GraphQL response out.

use crate::config::GatewayConfig;
use crate::context::Context;
use crate::execution::execute;
use crate::execution::ObjectValue;
use crate::execution::Resolver;
use crate::mutation::MutationPipeline;
use crate::mutation::MutationResolver;
use crate::registry::QueryId;
use crate::registry::QueryRegistry;
use crate::registry::RegistryError;
use crate::request::ExecutionRequest;
use crate::request::MalformedRequest;
use crate::response::Response;
use crate::schema::GatewaySchema;
use crate::schema::QUERY_ROOT;
use crate::validation::ValidationError;
use crate::validation::Validator;
use apollo_compiler::ast::OperationType;
use apollo_compiler::Name;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

const MANIFEST_FORMAT: &str = "apollo-persisted-query-manifest";
const MANIFEST_VERSION: u64 = 1;

/// Validates, then executes requests against one schema.
///
/// Shared by every request task, typically behind an `Arc`.
pub struct Gateway {
    schema: GatewaySchema,
    config: GatewayConfig,
    validator: Validator,
    query_root: Arc<ObjectValue<'static>>,
    mutations: MutationPipeline,
}

pub struct GatewayBuilder {
    schema: GatewaySchema,
    config: GatewayConfig,
    query_root: Option<Arc<ObjectValue<'static>>>,
    handlers: Vec<(String, Arc<dyn MutationResolver>)>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum GatewayBuildError {
    #[error("no resolver was provided for the `Query` root")]
    MissingQueryRoot,
    #[error("the query root resolver has type `{0}`, expected `Query`")]
    QueryRootTypeMismatch(String),
    #[error("mutation `{0}` has no registered handler")]
    MissingMutationHandler(Name),
    #[error("a handler was registered for `{0}`, which is not a mutation of the schema")]
    UnknownMutationHandler(String),
}

/// Why an administrative registration failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum RegistrationError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ManifestError {
    #[error("invalid persisted query manifest: {0}")]
    Json(String),
    #[error("unsupported manifest format `{format}` version {version}")]
    UnsupportedFormat { format: String, version: u64 },
    #[error("manifest operation `{id}`: {source}")]
    Operation {
        id: String,
        source: RegistrationError,
    },
    /// Nothing from the manifest was registered
    #[error("manifest conflicts with the registry: {0}")]
    Registry(RegistryError),
}

/// <https://www.apollographql.com/docs/graphos/operations/persisted-queries>
#[derive(Deserialize)]
struct Manifest {
    format: String,
    version: u64,
    operations: Vec<ManifestOperation>,
}

#[derive(Deserialize)]
struct ManifestOperation {
    id: String,
    body: String,
}

impl GatewayBuilder {
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    /// The object the `Query` root resolves to,
    /// also re-exposed as the `query` field of every mutation payload
    pub fn query_root(mut self, resolver: impl Resolver + Send + 'static) -> Self {
        self.query_root = Some(Arc::new(resolver));
        self
    }

    pub fn mutation_handler(
        mut self,
        mutation: impl Into<String>,
        handler: impl MutationResolver + 'static,
    ) -> Self {
        self.handlers.push((mutation.into(), Arc::new(handler)));
        self
    }

    pub fn build(self) -> Result<Gateway, GatewayBuildError> {
        let query_root = self.query_root.ok_or(GatewayBuildError::MissingQueryRoot)?;
        if query_root.type_name() != QUERY_ROOT {
            return Err(GatewayBuildError::QueryRootTypeMismatch(
                query_root.type_name().to_owned(),
            ));
        }
        let mut handlers = HashMap::new();
        for (mutation, handler) in self.handlers {
            let Some(shape) = self.schema.mutation(&mutation) else {
                return Err(GatewayBuildError::UnknownMutationHandler(mutation));
            };
            handlers.insert(shape.field.clone(), handler);
        }
        if let Some(missing) = self
            .schema
            .mutations()
            .find(|shape| !handlers.contains_key(&shape.field))
        {
            return Err(GatewayBuildError::MissingMutationHandler(
                missing.field.clone(),
            ));
        }
        let registry = Arc::new(QueryRegistry::new(self.config.registry_mode));
        let validator = Validator::new(self.schema.schema().clone(), registry);
        let mutations = MutationPipeline::new(
            self.schema.clone(),
            handlers,
            query_root.clone(),
            self.config.mutation_timeout(),
        );
        tracing::info!(
            registry_mode = ?self.config.registry_mode,
            mutations = self.schema.mutations().count(),
            "gateway ready"
        );
        Ok(Gateway {
            schema: self.schema,
            config: self.config,
            validator,
            query_root,
            mutations,
        })
    }
}

impl Gateway {
    pub fn builder(schema: GatewaySchema) -> GatewayBuilder {
        GatewayBuilder {
            schema,
            config: GatewayConfig::default(),
            query_root: None,
            handlers: Vec::new(),
        }
    }

    pub fn schema(&self) -> &GatewaySchema {
        &self.schema
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<QueryRegistry> {
        self.validator.registry()
    }

    /// Validates then executes one request.
    ///
    /// Every outcome is a GraphQL response: rejected requests get request errors
    /// without `data`, execution yields data and field errors.
    pub async fn execute(&self, request: &ExecutionRequest, context: &Context) -> Response {
        let operation = match self.validator.validate(request) {
            Ok(operation) => operation,
            Err(error) => {
                tracing::warn!(code = %error.code(), %error, "request rejected");
                return error.to_response();
            }
        };
        tracing::debug!(
            operation_type = %operation.operation_type(),
            operation_name = operation.operation_name(),
            query_id = operation.query_id().map(QueryId::as_str),
            "executing operation"
        );
        let root: &ObjectValue<'_> = match operation.operation_type() {
            OperationType::Query => &*self.query_root,
            OperationType::Mutation => &self.mutations,
            OperationType::Subscription => {
                return ValidationError::UnsupportedOperation(OperationType::Subscription)
                    .to_response()
            }
        };
        execute(&operation, root, context, &self.config.execution).await
    }

    /// Parses the JSON envelope, then [`execute`][Self::execute]s it.
    ///
    /// `Err` only for envelope problems, which never reach validation.
    pub async fn execute_json(
        &self,
        json: &[u8],
        context: &Context,
    ) -> Result<Response, MalformedRequest> {
        let request = ExecutionRequest::from_json(json).inspect_err(|error| {
            tracing::warn!(%error, "malformed request");
        })?;
        Ok(self.execute(&request, context).await)
    }

    /// Validates a document against the schema and registers it
    /// under its content-derived identifier.
    pub fn register(&self, document: &str) -> Result<QueryId, RegistrationError> {
        let document = self.validator.parse(document)?;
        Ok(self.registry().register(document)?)
    }

    pub fn register_with_id(
        &self,
        id: QueryId,
        document: &str,
    ) -> Result<QueryId, RegistrationError> {
        let document = self.validator.parse(document)?;
        Ok(self.registry().register_with_id(id, document)?)
    }

    pub fn set_allowed(&self, id: &QueryId, allowed: bool) -> Result<(), RegistryError> {
        self.registry().set_allowed(id, allowed)
    }

    pub fn remove(&self, id: &QueryId) -> Result<(), RegistryError> {
        self.registry().remove(id).map(drop)
    }

    /// Registers and allows every operation of a persisted query manifest.
    ///
    /// Nothing is registered unless every operation is valid and no identifier
    /// conflicts, within the manifest or with the registry.
    pub fn load_manifest(&self, json: &[u8]) -> Result<Vec<QueryId>, ManifestError> {
        let manifest: Manifest =
            serde_json::from_slice(json).map_err(|error| ManifestError::Json(error.to_string()))?;
        if manifest.format != MANIFEST_FORMAT || manifest.version != MANIFEST_VERSION {
            return Err(ManifestError::UnsupportedFormat {
                format: manifest.format,
                version: manifest.version,
            });
        }
        let mut parsed = Vec::with_capacity(manifest.operations.len());
        for operation in manifest.operations {
            let manifest_error = |source: RegistrationError| ManifestError::Operation {
                id: operation.id.clone(),
                source,
            };
            let id = QueryId::new(&operation.id)
                .map_err(|error| manifest_error(error.into()))?;
            let document = self
                .validator
                .parse(&operation.body)
                .map_err(|error| manifest_error(error.into()))?;
            parsed.push((id, document));
        }
        let ids = self
            .registry()
            .register_allowed(parsed)
            .map_err(ManifestError::Registry)?;
        tracing::info!(operations = ids.len(), "loaded persisted query manifest");
        Ok(ids)
    }
}
