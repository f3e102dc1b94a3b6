use crate::schema::check_mutation_shapes;
use crate::schema::type_ref::parse_type_reference;
use crate::schema::GatewaySchema;
use crate::schema::MutationShape;
use crate::schema::SchemaDefinitionError;
use crate::schema::MUTATION_ERROR_INTERFACE;
use crate::schema::MUTATION_ROOT;
use crate::schema::QUERY_ROOT;
use apollo_compiler::ast;
use apollo_compiler::ast::Definition;
use apollo_compiler::Name;
use apollo_compiler::Node;
use indexmap::IndexMap;
use std::sync::Arc;

/// Assembles a [`GatewaySchema`] from typed definitions.
///
/// ```
/// use apollo_gateway::MutationDef;
/// use apollo_gateway::ObjectDef;
/// use apollo_gateway::SchemaBuilder;
///
/// let schema = SchemaBuilder::new()
///     .object(ObjectDef::new("Query").field("viewer", "User"))
///     .object(ObjectDef::new("User").field("id", "ID!").field("email", "String!"))
///     .mutation(
///         MutationDef::new("setUserEmail")
///             .input_field("email", "String!")
///             .success(ObjectDef::new("SetUserEmailSuccess").field("user", "User!"))
///             .failure("EmailTakenError"),
///     )
///     .build()
///     .unwrap();
/// assert!(schema.to_sdl().contains("union SetUserEmailResult"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    objects: Vec<ObjectDef>,
    interfaces: Vec<InterfaceDef>,
    unions: Vec<UnionDef>,
    enums: Vec<EnumDef>,
    input_objects: Vec<InputObjectDef>,
    scalars: Vec<String>,
    mutations: Vec<MutationDef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    name: String,
    ty: String,
    arguments: Vec<InputValueDef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputValueDef {
    name: String,
    ty: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectDef {
    name: String,
    implements: Vec<String>,
    fields: Vec<FieldDef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceDef {
    name: String,
    fields: Vec<FieldDef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnionDef {
    name: String,
    members: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDef {
    name: String,
    values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputObjectDef {
    name: String,
    fields: Vec<InputValueDef>,
}

/// A business failure variant of mutation results.
///
/// Always has `code: String!` and `message: String!` from the `MutationError` interface,
/// plus any extra fields declared here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureDef {
    name: String,
    fields: Vec<FieldDef>,
}

/// One RPC-style mutation: an input object, a success type and failure variants
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationDef {
    name: String,
    input_fields: Vec<InputValueDef>,
    success: Option<ObjectDef>,
    failures: Vec<FailureDef>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            arguments: Vec::new(),
        }
    }

    pub fn argument(mut self, name: impl Into<String>, ty: impl Into<String>) -> Self {
        self.arguments.push(InputValueDef::new(name, ty));
        self
    }
}

impl InputValueDef {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
        }
    }
}

impl ObjectDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            implements: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.implements.push(interface.into());
        self
    }

    /// Adds a field without arguments
    pub fn field(self, name: impl Into<String>, ty: impl Into<String>) -> Self {
        self.field_def(FieldDef::new(name, ty))
    }

    pub fn field_def(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl InterfaceDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(self, name: impl Into<String>, ty: impl Into<String>) -> Self {
        self.field_def(FieldDef::new(name, ty))
    }

    pub fn field_def(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }
}

impl UnionDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
        }
    }

    pub fn member(mut self, name: impl Into<String>) -> Self {
        self.members.push(name.into());
        self
    }
}

impl EnumDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
        }
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.values.push(value.into());
        self
    }
}

impl InputObjectDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, ty: impl Into<String>) -> Self {
        self.fields.push(InputValueDef::new(name, ty));
        self
    }
}

impl FailureDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, ty: impl Into<String>) -> Self {
        self.fields.push(FieldDef::new(name, ty));
        self
    }
}

impl From<&str> for FailureDef {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl MutationDef {
    /// `name` is the field of the mutation root, in camel case (`setUserEmail`)
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input_fields: Vec::new(),
            success: None,
            failures: Vec::new(),
        }
    }

    pub fn input_field(mut self, name: impl Into<String>, ty: impl Into<String>) -> Self {
        self.input_fields.push(InputValueDef::new(name, ty));
        self
    }

    pub fn success(mut self, success: ObjectDef) -> Self {
        self.success = Some(success);
        self
    }

    pub fn failure(mut self, failure: impl Into<FailureDef>) -> Self {
        self.failures.push(failure.into());
        self
    }
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object(mut self, object: ObjectDef) -> Self {
        self.objects.push(object);
        self
    }

    pub fn interface(mut self, interface: InterfaceDef) -> Self {
        self.interfaces.push(interface);
        self
    }

    pub fn union(mut self, union_: UnionDef) -> Self {
        self.unions.push(union_);
        self
    }

    pub fn enumeration(mut self, enum_: EnumDef) -> Self {
        self.enums.push(enum_);
        self
    }

    pub fn input_object(mut self, input_object: InputObjectDef) -> Self {
        self.input_objects.push(input_object);
        self
    }

    /// Declares a custom scalar. Values pass through result coercion as-is.
    pub fn scalar(mut self, name: impl Into<String>) -> Self {
        self.scalars.push(name.into());
        self
    }

    pub fn mutation(mut self, mutation: MutationDef) -> Self {
        self.mutations.push(mutation);
        self
    }

    pub fn build(self) -> Result<GatewaySchema, SchemaDefinitionError> {
        if !self.objects.iter().any(|object| object.name == QUERY_ROOT) {
            return Err(SchemaDefinitionError::MissingQueryRoot);
        }
        let mut definitions = Vec::new();
        for object in &self.objects {
            reject_reserved(&object.name)?;
            definitions.push(object_definition(object, &[])?);
        }
        for interface in &self.interfaces {
            reject_reserved(&interface.name)?;
            definitions.push(Definition::InterfaceTypeDefinition(Node::new(
                ast::InterfaceTypeDefinition {
                    description: None,
                    name: name(&interface.name)?,
                    implements_interfaces: Vec::new(),
                    directives: Default::default(),
                    fields: field_definitions(&interface.fields)?,
                },
            )));
        }
        for union_ in &self.unions {
            reject_reserved(&union_.name)?;
            definitions.push(union_definition(&union_.name, &union_.members)?);
        }
        for enum_ in &self.enums {
            reject_reserved(&enum_.name)?;
            definitions.push(Definition::EnumTypeDefinition(Node::new(
                ast::EnumTypeDefinition {
                    description: None,
                    name: name(&enum_.name)?,
                    directives: Default::default(),
                    values: enum_
                        .values
                        .iter()
                        .map(|value| {
                            Ok(Node::new(ast::EnumValueDefinition {
                                description: None,
                                value: name(value)?,
                                directives: Default::default(),
                            }))
                        })
                        .collect::<Result<_, SchemaDefinitionError>>()?,
                },
            )));
        }
        for input_object in &self.input_objects {
            reject_reserved(&input_object.name)?;
            definitions.push(input_object_definition(
                &input_object.name,
                &input_object.fields,
            )?);
        }
        for scalar in &self.scalars {
            reject_reserved(scalar)?;
            definitions.push(Definition::ScalarTypeDefinition(Node::new(
                ast::ScalarTypeDefinition {
                    description: None,
                    name: name(scalar)?,
                    directives: Default::default(),
                },
            )));
        }
        let mutations = self.mutation_definitions(&mut definitions)?;

        let mut document = ast::Document::new();
        document.definitions = definitions;
        let schema = document.to_schema_validate().map_err(|invalid| {
            SchemaDefinitionError::Invalid(
                invalid
                    .errors
                    .iter()
                    .map(|diagnostic| diagnostic.to_json().message)
                    .collect(),
            )
        })?;
        check_mutation_shapes(&schema)?;
        Ok(GatewaySchema {
            schema: Arc::new(schema),
            mutations,
        })
    }

    /// Generates the input, result union, payload and failure types of every mutation,
    /// then the mutation root itself.
    fn mutation_definitions(
        &self,
        definitions: &mut Vec<Definition>,
    ) -> Result<IndexMap<Name, MutationShape>, SchemaDefinitionError> {
        let mut shapes = IndexMap::new();
        if self.mutations.is_empty() {
            return Ok(shapes);
        }
        let mut failures = IndexMap::<&str, &FailureDef>::new();
        let mut root_fields = Vec::new();
        for mutation in &self.mutations {
            let field = name(&mutation.name)?;
            let Some(success) = &mutation.success else {
                return Err(SchemaDefinitionError::IncompleteMutation {
                    mutation: mutation.name.clone(),
                    missing: "success type",
                });
            };
            if mutation.failures.is_empty() {
                return Err(SchemaDefinitionError::IncompleteMutation {
                    mutation: mutation.name.clone(),
                    missing: "failure variant",
                });
            }
            reject_reserved(&success.name)?;
            for failure in &mutation.failures {
                reject_reserved(&failure.name)?;
                match failures.get(failure.name.as_str()) {
                    Some(existing) if *existing != failure => {
                        return Err(SchemaDefinitionError::ConflictingFailureType(
                            failure.name.clone(),
                        ))
                    }
                    Some(_) => {}
                    None => {
                        failures.insert(&failure.name, failure);
                    }
                }
            }

            let prefix = upper_camel_case(&mutation.name);
            let shape = MutationShape {
                field: field.clone(),
                input_type: name(&format!("{prefix}Input"))?,
                payload_type: name(&format!("{prefix}Payload"))?,
                result_type: name(&format!("{prefix}Result"))?,
                success_type: name(&success.name)?,
                failure_types: mutation
                    .failures
                    .iter()
                    .map(|failure| name(&failure.name))
                    .collect::<Result<_, _>>()?,
            };
            definitions.push(input_object_definition(
                &shape.input_type,
                &mutation.input_fields,
            )?);
            definitions.push(object_definition(success, &[])?);
            let members: Vec<String> = std::iter::once(&shape.success_type)
                .chain(&shape.failure_types)
                .map(|member| member.to_string())
                .collect();
            definitions.push(union_definition(&shape.result_type, &members)?);
            let payload = ObjectDef::new(shape.payload_type.as_str())
                .field("result", format!("{}!", shape.result_type))
                .field("query", format!("{QUERY_ROOT}!"));
            definitions.push(object_definition(&payload, &[])?);
            root_fields.push(
                FieldDef::new(field.as_str(), format!("{}!", shape.payload_type))
                    .argument("input", format!("{}!", shape.input_type)),
            );
            shapes.insert(field, shape);
        }

        let common_fields = [
            FieldDef::new("code", "String!"),
            FieldDef::new("message", "String!"),
        ];
        definitions.push(Definition::InterfaceTypeDefinition(Node::new(
            ast::InterfaceTypeDefinition {
                description: None,
                name: name(MUTATION_ERROR_INTERFACE)?,
                implements_interfaces: Vec::new(),
                directives: Default::default(),
                fields: field_definitions(&common_fields)?,
            },
        )));
        for failure in failures.values() {
            let object = ObjectDef {
                name: failure.name.clone(),
                implements: vec![MUTATION_ERROR_INTERFACE.to_owned()],
                fields: failure.fields.clone(),
            };
            definitions.push(object_definition(&object, &common_fields)?);
        }
        let root = ObjectDef {
            name: MUTATION_ROOT.to_owned(),
            implements: Vec::new(),
            fields: root_fields,
        };
        definitions.push(object_definition(&root, &[])?);
        Ok(shapes)
    }
}

fn reject_reserved(type_name: &str) -> Result<(), SchemaDefinitionError> {
    if type_name == MUTATION_ROOT || type_name == MUTATION_ERROR_INTERFACE {
        Err(SchemaDefinitionError::ReservedTypeName(type_name.to_owned()))
    } else {
        Ok(())
    }
}

fn name(name: &str) -> Result<Name, SchemaDefinitionError> {
    Name::new(name).map_err(|_| SchemaDefinitionError::InvalidName(name.to_owned()))
}

/// `setUserEmail` -> `SetUserEmail`
fn upper_camel_case(field: &str) -> String {
    let mut chars = field.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn object_definition(
    object: &ObjectDef,
    leading_fields: &[FieldDef],
) -> Result<Definition, SchemaDefinitionError> {
    let mut fields = field_definitions(leading_fields)?;
    fields.extend(field_definitions(&object.fields)?);
    Ok(Definition::ObjectTypeDefinition(Node::new(
        ast::ObjectTypeDefinition {
            description: None,
            name: name(&object.name)?,
            implements_interfaces: object
                .implements
                .iter()
                .map(|interface| name(interface))
                .collect::<Result<_, _>>()?,
            directives: Default::default(),
            fields,
        },
    )))
}

fn union_definition(
    union_name: &str,
    members: &[String],
) -> Result<Definition, SchemaDefinitionError> {
    Ok(Definition::UnionTypeDefinition(Node::new(
        ast::UnionTypeDefinition {
            description: None,
            name: name(union_name)?,
            directives: Default::default(),
            members: members
                .iter()
                .map(|member| name(member))
                .collect::<Result<_, _>>()?,
        },
    )))
}

fn input_object_definition(
    input_name: &str,
    fields: &[InputValueDef],
) -> Result<Definition, SchemaDefinitionError> {
    Ok(Definition::InputObjectTypeDefinition(Node::new(
        ast::InputObjectTypeDefinition {
            description: None,
            name: name(input_name)?,
            directives: Default::default(),
            fields: input_value_definitions(fields)?,
        },
    )))
}

fn field_definitions(
    fields: &[FieldDef],
) -> Result<Vec<Node<ast::FieldDefinition>>, SchemaDefinitionError> {
    fields
        .iter()
        .map(|field| {
            Ok(Node::new(ast::FieldDefinition {
                description: None,
                name: name(&field.name)?,
                arguments: input_value_definitions(&field.arguments)?,
                ty: parse_type_reference(&field.ty)?,
                directives: Default::default(),
            }))
        })
        .collect()
}

fn input_value_definitions(
    values: &[InputValueDef],
) -> Result<Vec<Node<ast::InputValueDefinition>>, SchemaDefinitionError> {
    values
        .iter()
        .map(|value| {
            Ok(Node::new(ast::InputValueDefinition {
                description: None,
                name: name(&value.name)?,
                ty: Node::new(parse_type_reference(&value.ty)?),
                default_value: None,
                directives: Default::default(),
            }))
        })
        .collect()
}
