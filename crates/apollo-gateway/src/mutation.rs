//! Mutation root of the gateway.
//!
//! Each mutation field is served by a [`MutationResolver`] handler that receives the
//! coerced `input` object and returns either the success object or a [`MutationFailure`].
//! The pipeline wraps the outcome in the generated payload type:
//! `result` (the success/failure union) and `query` (the root query object, for re-fetching).

use crate::context::Context;
use crate::execution::FieldError;
use crate::execution::ObjectValue;
use crate::execution::ResolveInfo;
use crate::execution::ResolvedValue;
use crate::execution::Resolver;
use crate::schema::GatewaySchema;
use crate::schema::MutationShape;
use crate::schema::MUTATION_ROOT;
use crate::JsonMap;
use crate::JsonValue;
use apollo_compiler::Name;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Handler for one mutation field.
///
/// Handlers may be dropped mid-flight when the mutation timeout expires,
/// so they must not leave partial state behind when cancelled.
pub trait MutationResolver: Send + Sync {
    fn resolve<'a>(
        &'a self,
        input: &'a JsonMap,
        context: &'a Context,
    ) -> BoxFuture<'a, Result<Box<ObjectValue<'static>>, MutationFailure>>;
}

/// Why a mutation did not produce its success object
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum MutationFailure {
    /// Anticipated failure, returned to the client as data inside the `result` union
    #[error(transparent)]
    Business(BusinessFailure),

    /// Unanticipated failure. The whole request fails with an opaque error.
    #[error("internal error: {0}")]
    Internal(Box<dyn std::error::Error + Send + Sync>),
}

/// A failure variant of a mutation `result` union.
///
/// Its `typename` must be one of the failure types declared for the mutation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{typename} ({code}): {message}")]
pub struct BusinessFailure {
    pub typename: String,
    /// Stable, machine-readable
    pub code: String,
    /// For humans
    pub message: String,
    /// Extra fields declared on the failure type
    pub fields: JsonMap,
}

/// What the handler returned, once checked against the mutation declaration
pub enum MutationOutcome {
    Success(Box<ObjectValue<'static>>),
    Failure(BusinessFailure),
}

/// The value of a mutation field: `{ result, query }`
pub struct MutationPayload {
    typename: Name,
    outcome: MutationOutcome,
    query: Arc<ObjectValue<'static>>,
}

/// Serves every field of the mutation root
pub struct MutationPipeline {
    schema: GatewaySchema,
    handlers: HashMap<Name, Arc<dyn MutationResolver>>,
    query_root: Arc<ObjectValue<'static>>,
    timeout: Option<Duration>,
}

/// Client-side view of a `result` value from a mutation response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationResultKind {
    Success {
        typename: String,
    },
    Failure {
        typename: String,
        /// `None` when the `code` field was not selected
        code: Option<String>,
    },
    /// Missing or unknown `__typename`, for example a variant added after the client was built
    Unrecognized,
}

impl MutationFailure {
    pub fn business(
        typename: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Business(BusinessFailure::new(typename, code, message))
    }

    pub fn internal(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Internal(error.into())
    }
}

impl From<BusinessFailure> for MutationFailure {
    fn from(failure: BusinessFailure) -> Self {
        Self::Business(failure)
    }
}

impl BusinessFailure {
    pub fn new(
        typename: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            typename: typename.into(),
            code: code.into(),
            message: message.into(),
            fields: JsonMap::new(),
        }
    }

    pub fn with_field(mut self, name: &str, value: impl Into<JsonValue>) -> Self {
        self.fields.insert(name, value.into());
        self
    }
}

impl Resolver for BusinessFailure {
    fn type_name(&self) -> &str {
        &self.typename
    }

    fn resolve_field<'a>(
        &'a self,
        info: &'a ResolveInfo<'a>,
    ) -> BoxFuture<'a, Result<ResolvedValue<'a>, FieldError>> {
        let value = match info.field_name() {
            "code" => ResolvedValue::leaf(self.code.as_str()),
            "message" => ResolvedValue::leaf(self.message.as_str()),
            name => self
                .fields
                .get(name)
                .cloned()
                .map_or_else(ResolvedValue::null, ResolvedValue::Leaf),
        };
        Box::pin(async move { Ok(value) })
    }
}

impl MutationPayload {
    /// Name of the generated payload type, e.g. `SetUserEmailPayload`
    pub fn typename(&self) -> &str {
        &self.typename
    }

    pub fn outcome(&self) -> &MutationOutcome {
        &self.outcome
    }
}

impl Resolver for MutationPayload {
    fn type_name(&self) -> &str {
        &self.typename
    }

    fn resolve_field<'a>(
        &'a self,
        info: &'a ResolveInfo<'a>,
    ) -> BoxFuture<'a, Result<ResolvedValue<'a>, FieldError>> {
        let result = match info.field_name() {
            "result" => match &self.outcome {
                MutationOutcome::Success(object) => Ok(ResolvedValue::object(&**object)),
                MutationOutcome::Failure(failure) => Ok(ResolvedValue::object(failure)),
            },
            "query" => Ok(ResolvedValue::object(&*self.query)),
            name => Err(FieldError::new(format!(
                "no resolver for field {name} of {}",
                self.type_name()
            ))),
        };
        Box::pin(async move { result })
    }
}

impl fmt::Debug for MutationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationOutcome::Success(object) => f
                .debug_tuple("Success")
                .field(&object.type_name())
                .finish(),
            MutationOutcome::Failure(failure) => f.debug_tuple("Failure").field(failure).finish(),
        }
    }
}

impl fmt::Debug for MutationPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationPayload")
            .field("typename", &self.typename)
            .field("outcome", &self.outcome)
            .finish_non_exhaustive()
    }
}

impl MutationPipeline {
    pub fn new(
        schema: GatewaySchema,
        handlers: HashMap<Name, Arc<dyn MutationResolver>>,
        query_root: Arc<ObjectValue<'static>>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            schema,
            handlers,
            query_root,
            timeout,
        }
    }

    /// Runs the handler of one mutation and wraps its outcome in the payload.
    ///
    /// `Err` is a field error of the mutation field:
    /// an unknown mutation, a timeout, or an internal failure.
    pub async fn run_mutation(
        &self,
        name: &str,
        input: &JsonMap,
        context: &Context,
    ) -> Result<MutationPayload, FieldError> {
        let Some(shape) = self.schema.mutation(name) else {
            return Err(FieldError::new(format!("no mutation named `{name}`")));
        };
        let Some(handler) = self.handlers.get(name) else {
            return Err(FieldError::new(format!(
                "no handler registered for mutation `{name}`"
            )));
        };
        tracing::debug!(mutation = name, "running mutation");
        let future = handler.resolve(input, context);
        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, future).await {
                Ok(result) => result,
                Err(_elapsed) => {
                    tracing::warn!(mutation = name, ?limit, "mutation timed out");
                    return Err(FieldError::Timeout(limit));
                }
            },
            None => future.await,
        };
        let outcome = match result {
            Ok(object) => MutationOutcome::Success(object),
            Err(MutationFailure::Business(failure)) => {
                check_declared_failure(shape, &failure)?;
                tracing::debug!(
                    mutation = name,
                    failure = %failure.typename,
                    code = %failure.code,
                    "mutation returned a business failure"
                );
                MutationOutcome::Failure(failure)
            }
            Err(MutationFailure::Internal(error)) => return Err(FieldError::Internal(error)),
        };
        Ok(MutationPayload {
            typename: shape.payload_type.clone(),
            outcome,
            query: self.query_root.clone(),
        })
    }
}

fn check_declared_failure(shape: &MutationShape, failure: &BusinessFailure) -> Result<(), FieldError> {
    if shape.declares_failure(&failure.typename) {
        Ok(())
    } else {
        Err(FieldError::internal(format!(
            "mutation `{}` returned failure type `{}` which is not a member of `{}`",
            shape.field, failure.typename, shape.result_type
        )))
    }
}

impl Resolver for MutationPipeline {
    fn type_name(&self) -> &str {
        MUTATION_ROOT
    }

    fn resolve_field<'a>(
        &'a self,
        info: &'a ResolveInfo<'a>,
    ) -> BoxFuture<'a, Result<ResolvedValue<'a>, FieldError>> {
        Box::pin(async move {
            let Some(input) = info.argument("input").and_then(JsonValue::as_object) else {
                return Err(FieldError::new(format!(
                    "mutation `{}` expects an `input` object",
                    info.field_name()
                )));
            };
            self.run_mutation(info.field_name(), input, info.context())
                .await
                .map(ResolvedValue::object)
        })
    }
}

impl MutationResultKind {
    /// Classifies the `result` value of a mutation response
    /// against the declaration of that mutation.
    pub fn classify(shape: &MutationShape, result: &JsonValue) -> Self {
        let Some(typename) = result.get("__typename").and_then(JsonValue::as_str) else {
            return Self::Unrecognized;
        };
        if shape.success_type.as_str() == typename {
            Self::Success {
                typename: typename.to_owned(),
            }
        } else if shape.declares_failure(typename) {
            Self::Failure {
                typename: typename.to_owned(),
                code: result
                    .get("code")
                    .and_then(JsonValue::as_str)
                    .map(str::to_owned),
            }
        } else {
            Self::Unrecognized
        }
    }
}
