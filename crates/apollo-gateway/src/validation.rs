//! Checks an [`ExecutionRequest`] against the registry and the schema,
//! and selects the operation to execute.

use crate::execution::input_coercion::coerce_variable_values;
use crate::registry::LookupError;
use crate::registry::OperationDocument;
use crate::registry::QueryId;
use crate::registry::QueryRegistry;
use crate::registry::RegistryMode;
use crate::request::ExecutionRequest;
use crate::request::RequestSource;
use crate::response::Error;
use crate::response::ErrorCode;
use crate::response::Location;
use crate::response::Response;
use crate::JsonMap;
use apollo_compiler::ast::OperationType;
use apollo_compiler::executable::Operation;
use apollo_compiler::validation::Valid;
use apollo_compiler::ExecutableDocument;
use apollo_compiler::Node;
use apollo_compiler::Schema;
use std::fmt;
use std::sync::Arc;

/// Source name used in diagnostics for documents sent or registered as text
const DOCUMENT_SOURCE_NAME: &str = "operation.graphql";

/// One problem found while validating a document or coercing variables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub message: String,
    pub locations: Vec<Location>,
}

/// Why a request was rejected before execution.
///
/// Always reported as request errors: the response has no `data` key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ValidationError {
    #[error("persisted query `{0}` is not registered")]
    UnknownQuery(QueryId),

    #[error("persisted query `{0}` is not allowed")]
    QueryNotWhitelisted(QueryId),

    #[error("only persisted queries may be executed")]
    PersistedQueryRequired,

    /// Every problem found in the document or in variable values
    #[error("invalid operation:\n{}", DisplayViolations(.violations))]
    SchemaValidation { violations: Vec<Violation> },

    #[error("the document defines several operations, `operationName` is required")]
    AmbiguousOperation,

    #[error("no operation named `{0}` in the document")]
    OperationNotFound(String),

    #[error("{0} operations are not supported")]
    UnsupportedOperation(OperationType),
}

struct DisplayViolations<'a>(&'a [Violation]);

/// A request that passed validation, ready for execution
#[derive(Debug, Clone)]
pub struct ValidatedOperation {
    schema: Arc<Valid<Schema>>,
    document: Arc<OperationDocument>,
    operation: Node<Operation>,
    variables: JsonMap,
    query_id: Option<QueryId>,
}

/// Validates requests against one schema and one registry.
#[derive(Debug, Clone)]
pub struct Validator {
    schema: Arc<Valid<Schema>>,
    registry: Arc<QueryRegistry>,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.locations.first() {
            Some(location) => write!(f, "{}:{}: {}", location.line, location.column, self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl fmt::Display for DisplayViolations<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, violation) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{violation}")?;
        }
        Ok(())
    }
}

impl ValidationError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ValidationError::UnknownQuery(_) => ErrorCode::UnknownQuery,
            ValidationError::QueryNotWhitelisted(_) => ErrorCode::QueryNotWhitelisted,
            ValidationError::PersistedQueryRequired => ErrorCode::PersistedQueryRequired,
            ValidationError::SchemaValidation { .. } => ErrorCode::ValidationFailed,
            ValidationError::AmbiguousOperation => ErrorCode::AmbiguousOperation,
            ValidationError::OperationNotFound(_) => ErrorCode::OperationNotFound,
            ValidationError::UnsupportedOperation(_) => ErrorCode::OperationNotSupported,
        }
    }

    /// Request errors, one per violation for [`SchemaValidation`][Self::SchemaValidation]
    pub fn to_errors(&self) -> Vec<Error> {
        let code = self.code();
        match self {
            ValidationError::SchemaValidation { violations } => violations
                .iter()
                .map(|violation| {
                    Error::new(violation.message.clone())
                        .with_locations(violation.locations.clone())
                        .with_code(code)
                })
                .collect(),
            _ => vec![Error::new(self.to_string()).with_code(code)],
        }
    }

    pub fn to_response(&self) -> Response {
        Response::request_errors(self.to_errors())
    }
}

impl From<LookupError> for ValidationError {
    fn from(error: LookupError) -> Self {
        match error {
            LookupError::UnknownQuery(id) => ValidationError::UnknownQuery(id),
            LookupError::QueryNotWhitelisted(id) => ValidationError::QueryNotWhitelisted(id),
        }
    }
}

impl Validator {
    pub fn new(schema: Arc<Valid<Schema>>, registry: Arc<QueryRegistry>) -> Self {
        Self { schema, registry }
    }

    pub fn schema(&self) -> &Arc<Valid<Schema>> {
        &self.schema
    }

    pub fn registry(&self) -> &Arc<QueryRegistry> {
        &self.registry
    }

    /// Parses and validates document text against the schema.
    ///
    /// Used both for ad-hoc query text and for registration,
    /// so it does not consult the registry mode.
    pub fn parse(&self, text: &str) -> Result<OperationDocument, ValidationError> {
        match ExecutableDocument::parse_and_validate(&self.schema, text, DOCUMENT_SOURCE_NAME) {
            Ok(document) => Ok(OperationDocument::new(text, document)),
            Err(with_errors) => {
                let violations = with_errors
                    .errors
                    .iter()
                    .map(|diagnostic| {
                        let json = diagnostic.to_json();
                        Violation {
                            message: json.message,
                            locations: json
                                .locations
                                .into_iter()
                                .map(|line_column| Location {
                                    line: line_column.line,
                                    column: line_column.column,
                                })
                                .collect(),
                        }
                    })
                    .collect();
                Err(ValidationError::SchemaValidation { violations })
            }
        }
    }

    /// Resolves the document, selects the operation and coerces variables.
    pub fn validate(&self, request: &ExecutionRequest) -> Result<ValidatedOperation, ValidationError> {
        let (document, query_id) = match &request.source {
            RequestSource::Id(id) => (self.registry.lookup(id)?, Some(id.clone())),
            RequestSource::Query(text) => match self.registry.mode() {
                RegistryMode::Whitelist => return Err(ValidationError::PersistedQueryRequired),
                RegistryMode::Open => self.ad_hoc_document(text)?,
            },
        };
        let operation = select_operation(document.document(), request.operation_name.as_deref())?;
        if operation.operation_type == OperationType::Subscription {
            return Err(ValidationError::UnsupportedOperation(operation.operation_type));
        }
        let variables = coerce_variable_values(
            &self.schema,
            &document.document().sources,
            &operation,
            &request.variables,
        )
        .map_err(|violations| ValidationError::SchemaValidation { violations })?;
        Ok(ValidatedOperation {
            schema: self.schema.clone(),
            document,
            operation,
            variables,
            query_id,
        })
    }

    /// Text identical to a registered document reuses its parsed form
    fn ad_hoc_document(
        &self,
        text: &str,
    ) -> Result<(Arc<OperationDocument>, Option<QueryId>), ValidationError> {
        let id = QueryId::for_document(text);
        if let Ok(document) = self.registry.resolve(&id) {
            if document.source() == text {
                return Ok((document, Some(id)));
            }
        }
        Ok((Arc::new(self.parse(text)?), None))
    }
}

/// <https://spec.graphql.org/October2021/#GetOperation()>
fn select_operation(
    document: &ExecutableDocument,
    operation_name: Option<&str>,
) -> Result<Node<Operation>, ValidationError> {
    let operations = &document.operations;
    if let Some(name) = operation_name {
        return operations
            .named
            .get(name)
            .cloned()
            .ok_or_else(|| ValidationError::OperationNotFound(name.to_owned()));
    }
    match (&operations.anonymous, operations.named.len()) {
        (Some(operation), 0) => Ok(operation.clone()),
        (None, 1) => operations
            .named
            .values()
            .next()
            .cloned()
            .ok_or(ValidationError::AmbiguousOperation),
        _ => Err(ValidationError::AmbiguousOperation),
    }
}

impl ValidatedOperation {
    pub fn schema(&self) -> &Valid<Schema> {
        &self.schema
    }

    pub fn document(&self) -> &Valid<ExecutableDocument> {
        self.document.document()
    }

    pub fn source(&self) -> &str {
        self.document.source()
    }

    pub fn operation(&self) -> &Node<Operation> {
        &self.operation
    }

    pub fn operation_type(&self) -> OperationType {
        self.operation.operation_type
    }

    pub fn operation_name(&self) -> Option<&str> {
        self.operation.name.as_ref().map(|name| name.as_str())
    }

    /// Coerced variable values, including defaults
    pub fn variables(&self) -> &JsonMap {
        &self.variables
    }

    /// Set when the document came from the registry
    pub fn query_id(&self) -> Option<&QueryId> {
        self.query_id.as_ref()
    }
}
