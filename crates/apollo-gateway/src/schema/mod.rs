//! Programmatic schema construction and the mutation shape rules.
//!
//! The schema is assembled from typed definitions with [`SchemaBuilder`],
//! converted to an AST document and validated by `apollo-compiler`.

mod builder;
mod type_ref;

pub use self::builder::EnumDef;
pub use self::builder::FailureDef;
pub use self::builder::FieldDef;
pub use self::builder::InputObjectDef;
pub use self::builder::InputValueDef;
pub use self::builder::InterfaceDef;
pub use self::builder::MutationDef;
pub use self::builder::ObjectDef;
pub use self::builder::SchemaBuilder;
pub use self::builder::UnionDef;
use apollo_compiler::ast::Type;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::validation::Valid;
use apollo_compiler::Name;
use apollo_compiler::Schema;
use indexmap::IndexMap;
use std::sync::Arc;

/// Name of the interface implemented by every business failure type
pub(crate) const MUTATION_ERROR_INTERFACE: &str = "MutationError";

pub(crate) const MUTATION_ROOT: &str = "Mutation";

pub(crate) const QUERY_ROOT: &str = "Query";

/// A validated schema, plus what the builder generated for each mutation
#[derive(Debug, Clone)]
pub struct GatewaySchema {
    schema: Arc<Valid<Schema>>,
    mutations: IndexMap<Name, MutationShape>,
}

/// The types generated for one mutation field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationShape {
    /// The field of the mutation root, e.g. `setUserEmail`
    pub field: Name,
    /// e.g. `SetUserEmailInput`
    pub input_type: Name,
    /// e.g. `SetUserEmailPayload`
    pub payload_type: Name,
    /// e.g. `SetUserEmailResult`
    pub result_type: Name,
    pub success_type: Name,
    pub failure_types: Vec<Name>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum SchemaDefinitionError {
    #[error("the schema must define a `Query` object type")]
    MissingQueryRoot,
    #[error("`{0}` is reserved for generated mutation types")]
    ReservedTypeName(String),
    #[error("invalid type reference `{0}`")]
    InvalidTypeReference(String),
    #[error("invalid GraphQL name `{0}`")]
    InvalidName(String),
    #[error("mutation `{mutation}` has no {missing}")]
    IncompleteMutation {
        mutation: String,
        missing: &'static str,
    },
    #[error("failure type `{0}` is defined more than once with different fields")]
    ConflictingFailureType(String),
    #[error("invalid mutation fields:\n{}", .0.join("\n"))]
    MutationShape(Vec<String>),
    #[error("invalid schema:\n{}", .0.join("\n"))]
    Invalid(Vec<String>),
}

impl GatewaySchema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    pub fn schema(&self) -> &Arc<Valid<Schema>> {
        &self.schema
    }

    pub fn mutation(&self, field: &str) -> Option<&MutationShape> {
        self.mutations.get(field)
    }

    pub fn mutations(&self) -> impl Iterator<Item = &MutationShape> {
        self.mutations.values()
    }

    /// The schema in SDL syntax
    pub fn to_sdl(&self) -> String {
        self.schema.to_string()
    }
}

impl MutationShape {
    pub fn declares_failure(&self, type_name: &str) -> bool {
        self.failure_types.iter().any(|name| name.as_str() == type_name)
    }
}

/// Checks that every field of the mutation root takes exactly one argument,
/// named `input`, of a non-null input object type.
///
/// Every offending field is reported in a single [`SchemaDefinitionError::MutationShape`].
pub fn check_mutation_shapes(schema: &Schema) -> Result<(), SchemaDefinitionError> {
    let Some(root_name) = &schema.schema_definition.mutation else {
        return Ok(());
    };
    let Some(root) = schema.get_object(root_name.as_str()) else {
        return Ok(());
    };
    let mut violations = Vec::new();
    for (field_name, field) in &root.fields {
        match field.arguments.as_slice() {
            [argument] if argument.name.as_str() == "input" => {
                let ty: &Type = &argument.ty;
                let is_input_object = match ty {
                    Type::NonNullNamed(ty) => {
                        matches!(schema.types.get(ty), Some(ExtendedType::InputObject(_)))
                    }
                    _ => false,
                };
                if !is_input_object {
                    violations.push(format!(
                        "argument `{}.{field_name}(input:)` must be a non-null input object, found `{}`",
                        root.name, ty
                    ))
                }
            }
            [argument] => violations.push(format!(
                "the argument of `{}.{field_name}` must be named `input`, found `{}`",
                root.name, argument.name
            )),
            arguments => violations.push(format!(
                "`{}.{field_name}` must take exactly one argument, found {}",
                root.name,
                arguments.len()
            )),
        }
    }
    if violations.is_empty() {
        Ok(())
    } else {
        Err(SchemaDefinitionError::MutationShape(violations))
    }
}
