use crate::config::ExecutionConfig;
use crate::context::Context;
use crate::execution::input_coercion::coerce_argument_values;
use crate::execution::resolver::FieldError;
use crate::execution::resolver::ObjectValue;
use crate::execution::resolver::ResolveInfo;
use crate::execution::resolver::ResolvedValue;
use crate::execution::result_coercion::complete_value;
use crate::response::field_error;
use crate::response::Error;
use crate::response::LinkedPath;
use crate::response::LinkedPathElement;
use crate::response::PathElement;
use crate::response::Response;
use crate::validation::ValidatedOperation;
use crate::JsonMap;
use crate::JsonValue;
use apollo_compiler::ast::OperationType;
use apollo_compiler::ast::Type;
use apollo_compiler::ast::Value;
use apollo_compiler::executable::Field;
use apollo_compiler::executable::Selection;
use apollo_compiler::parser::SourceSpan;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::schema::FieldDefinition;
use apollo_compiler::schema::ObjectType;
use apollo_compiler::validation::Valid;
use apollo_compiler::ExecutableDocument;
use apollo_compiler::Name;
use apollo_compiler::Schema;
use futures::stream;
use futures::StreamExt;
use indexmap::IndexMap;
use std::collections::HashSet;

/// <https://spec.graphql.org/October2021/#sec-Normal-and-Serial-Execution>
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum ExecutionMode {
    /// Sibling fields may resolve concurrently, up to the configured limit
    Normal,
    /// One root field at a time, in document order (mutations)
    Sequential,
}

/// A field error was recorded at a non-null position:
/// the nearest nullable parent becomes `null`.
///
/// <https://spec.graphql.org/October2021/#sec-Handling-Field-Errors>
pub(crate) struct PropagateNull;

/// What one request executes against. Shared by concurrently executing fields.
pub(crate) struct ExecutionContext<'a> {
    pub(crate) schema: &'a Valid<Schema>,
    pub(crate) document: &'a Valid<ExecutableDocument>,
    pub(crate) variable_values: &'a JsonMap,
    pub(crate) context: &'a Context,
    pub(crate) config: &'a ExecutionConfig,
}

/// Grouped field set of one selection set, keyed by response key in document order
type FieldGroups<'a> = IndexMap<&'a Name, Vec<&'a Field>>;

/// A finished field of a selection set, with the errors recorded below it
struct FieldOutcome<'a> {
    response_key: &'a Name,
    value: Result<JsonValue, PropagateNull>,
    errors: Vec<Error>,
}

/// Executes a validated query or mutation, starting from `root`.
///
/// * <https://spec.graphql.org/October2021/#ExecuteQuery()>
/// * <https://spec.graphql.org/October2021/#ExecuteMutation()>
///
/// Field errors are reported next to partial data.
/// If any resolver failed with [`FieldError::Internal`], the whole response is
/// replaced with a single opaque error and no data.
pub async fn execute(
    operation: &ValidatedOperation,
    root: &ObjectValue<'_>,
    context: &Context,
    config: &ExecutionConfig,
) -> Response {
    let definition = operation.operation();
    let root_type_name = &definition.selection_set.ty;
    let Some(root_type) = operation.schema().get_object(root_type_name) else {
        return Response::request_error(
            Error::new(format!(
                "root operation type {root_type_name} is undefined or not an object type"
            ))
            .suspected_validation_bug(),
        );
    };
    let mode = if definition.operation_type == OperationType::Mutation {
        ExecutionMode::Sequential
    } else {
        ExecutionMode::Normal
    };
    let ctx = ExecutionContext {
        schema: operation.schema(),
        document: operation.document(),
        variable_values: operation.variables(),
        context,
        config,
    };
    // The root object is checked like any other, before its first field
    if let Err(error) = root.authorize(context) {
        tracing::debug!(root_type = %root_type.name, "root object access denied");
        let sources = &ctx.document.sources;
        let error = error.into_graphql_error(None, definition.location(), sources);
        if error.is_internal() {
            return Response::internal_failure();
        }
        return Response {
            errors: vec![error],
            data: Some(JsonValue::Null),
        };
    }
    let mut errors = Vec::new();
    let data = execute_selection_set(
        &ctx,
        &mut errors,
        None,
        mode,
        root_type,
        root,
        &definition.selection_set.selections,
    )
    .await;
    if let Some(internal) = errors.iter().find(|error| error.is_internal()) {
        tracing::error!(
            path = ?internal.path,
            "request failed with an internal error"
        );
        return Response::internal_failure();
    }
    Response {
        errors,
        data: Some(data.map_or(JsonValue::Null, JsonValue::Object)),
    }
}

impl<'a> ExecutionContext<'a> {
    /// Records a field error at `path`, then starts null propagation
    pub(crate) fn report(
        &self,
        errors: &mut Vec<Error>,
        path: LinkedPath<'_>,
        location: Option<SourceSpan>,
        message: impl Into<String>,
    ) -> PropagateNull {
        errors.push(field_error(message, path, location, &self.document.sources));
        PropagateNull
    }

    /// Like [`report`][Self::report], for a state validation should have prevented
    pub(crate) fn report_validation_bug(
        &self,
        errors: &mut Vec<Error>,
        path: LinkedPath<'_>,
        location: Option<SourceSpan>,
        message: impl Into<String>,
    ) -> PropagateNull {
        let error = field_error(message, path, location, &self.document.sources);
        errors.push(error.suspected_validation_bug());
        PropagateNull
    }

    fn is_query_root(&self, object_type: &ObjectType) -> bool {
        self.schema
            .schema_definition
            .query
            .as_ref()
            .is_some_and(|query| query.name == object_type.name)
    }

    /// `@skip(if: true)` or `@include(if: false)`
    fn is_excluded(&self, selection: &Selection) -> bool {
        let condition =
            |directive| directive_condition(selection, directive, self.variable_values);
        condition("skip") == Some(true) || condition("include") == Some(false)
    }

    /// <https://spec.graphql.org/October2021/#DoesFragmentTypeApply()>
    fn type_condition_applies(&self, type_condition: &Name, object_type: &ObjectType) -> bool {
        match self.schema.types.get(type_condition) {
            Some(ExtendedType::Object(def)) => def.name == object_type.name,
            Some(ExtendedType::Interface(_)) => {
                object_type.implements_interfaces.contains(type_condition)
            }
            Some(ExtendedType::Union(def)) => def.members.contains(&object_type.name),
            // Not an output type: rejected by validation
            _ => false,
        }
    }

    /// <https://spec.graphql.org/October2021/#CollectFields()>
    fn collect_fields(
        &self,
        object_type: &ObjectType,
        selections: impl IntoIterator<Item = &'a Selection>,
        visited_fragments: &mut HashSet<&'a Name>,
        groups: &mut FieldGroups<'a>,
    ) {
        for selection in selections {
            if self.is_excluded(selection) {
                continue;
            }
            let nested = match selection {
                Selection::Field(field) => {
                    groups
                        .entry(field.response_key())
                        .or_default()
                        .push(field.as_ref());
                    continue;
                }
                Selection::FragmentSpread(spread) => {
                    if !visited_fragments.insert(&spread.fragment_name) {
                        continue;
                    }
                    match self.document.fragments.get(&spread.fragment_name) {
                        Some(fragment)
                            if self.type_condition_applies(
                                fragment.type_condition(),
                                object_type,
                            ) =>
                        {
                            &fragment.selection_set
                        }
                        _ => continue,
                    }
                }
                Selection::InlineFragment(inline) => {
                    let applies = inline.type_condition.as_ref().map_or(true, |condition| {
                        self.type_condition_applies(condition, object_type)
                    });
                    if !applies {
                        continue;
                    }
                    &inline.selection_set
                }
            };
            self.collect_fields(object_type, &nested.selections, visited_fragments, groups);
        }
    }
}

/// Value of the `if` argument of `@skip` or `@include` on a selection, if any
fn directive_condition(
    selection: &Selection,
    directive: &str,
    variable_values: &JsonMap,
) -> Option<bool> {
    let condition = selection
        .directives()
        .get(directive)?
        .specified_argument_by_name("if")?;
    match condition.as_ref() {
        Value::Boolean(value) => Some(*value),
        Value::Variable(name) => variable_values.get(name.as_str())?.as_bool(),
        _ => None,
    }
}

impl FieldOutcome<'_> {
    /// Moves errors and value into the parent. Returns whether null propagation continues.
    fn merge_into(mut self, data: &mut JsonMap, errors: &mut Vec<Error>) -> bool {
        errors.append(&mut self.errors);
        match self.value {
            Ok(value) => {
                data.insert(self.response_key.as_str(), value);
                false
            }
            Err(PropagateNull) => true,
        }
    }
}

/// <https://spec.graphql.org/October2021/#ExecuteSelectionSet()>
pub(crate) async fn execute_selection_set<'a>(
    ctx: &ExecutionContext<'a>,
    errors: &mut Vec<Error>,
    path: LinkedPath<'_>,
    mode: ExecutionMode,
    object_type: &'a ObjectType,
    object_value: &ObjectValue<'_>,
    selections: impl IntoIterator<Item = &'a Selection>,
) -> Result<JsonMap, PropagateNull> {
    let mut groups = FieldGroups::new();
    ctx.collect_fields(object_type, selections, &mut HashSet::new(), &mut groups);
    // Built eagerly so that no closure is held across the awaits below
    let pending: Vec<_> = groups
        .iter()
        .filter_map(|(&response_key, fields)| {
            // Validation guarantees every selected field is defined
            let field_def = ctx
                .schema
                .type_field(&object_type.name, &fields[0].name)
                .ok()?;
            Some(async move {
                let field_path = LinkedPathElement {
                    element: PathElement::Field(response_key.clone()),
                    next: path,
                };
                let mut errors = Vec::new();
                let value = execute_field(
                    ctx,
                    &mut errors,
                    Some(&field_path),
                    object_type,
                    object_value,
                    field_def,
                    fields,
                )
                .await;
                FieldOutcome {
                    response_key,
                    value,
                    errors,
                }
            })
        })
        .collect();
    let mut data = JsonMap::with_capacity(groups.len());
    let mut propagate = false;
    match mode {
        ExecutionMode::Normal => {
            // Completion order may differ, `buffered` yields in document order
            let outcomes: Vec<_> = stream::iter(pending)
                .buffered(ctx.config.concurrency())
                .collect()
                .await;
            for outcome in outcomes {
                propagate |= outcome.merge_into(&mut data, errors);
            }
        }
        ExecutionMode::Sequential => {
            for field in pending {
                let outcome = field.await;
                let internal = outcome.errors.iter().any(Error::is_internal);
                propagate = outcome.merge_into(&mut data, errors);
                if internal || propagate {
                    // Later root fields are never started
                    return Err(PropagateNull);
                }
            }
        }
    }
    if propagate {
        Err(PropagateNull)
    } else {
        Ok(data)
    }
}

/// <https://spec.graphql.org/October2021/#ExecuteField()>
async fn execute_field<'a>(
    ctx: &ExecutionContext<'a>,
    errors: &mut Vec<Error>,
    path: LinkedPath<'_>,
    object_type: &ObjectType,
    object_value: &ObjectValue<'_>,
    field_def: &'a FieldDefinition,
    fields: &[&'a Field],
) -> Result<JsonValue, PropagateNull> {
    let field = fields[0];
    let arguments = match coerce_argument_values(ctx, errors, path, field_def, field) {
        Ok(arguments) => arguments,
        Err(PropagateNull) => return null_if_nullable(&field_def.ty, Err(PropagateNull)),
    };
    let info = ResolveInfo {
        schema: ctx.schema,
        document: ctx.document,
        fields,
        arguments: &arguments,
        context: ctx.context,
        path,
    };
    let completed = match resolve(ctx, object_type, object_value, &info).await {
        Ok(resolved) => complete_value(ctx, errors, path, field.ty(), resolved, fields).await,
        Err(error) => {
            let location = field.name.location();
            errors.push(error.into_graphql_error(path, location, &ctx.document.sources));
            Err(PropagateNull)
        }
    };
    null_if_nullable(&field_def.ty, completed)
}

/// Answers meta fields, then delegates to the resolver,
/// bounded by the configured resolver timeout. On expiry the resolver future is dropped.
async fn resolve<'b>(
    ctx: &ExecutionContext<'_>,
    object_type: &ObjectType,
    object_value: &'b ObjectValue<'_>,
    info: &'b ResolveInfo<'b>,
) -> Result<ResolvedValue<'b>, FieldError> {
    match info.field_name() {
        "__typename" => return Ok(ResolvedValue::leaf(object_type.name.as_str())),
        "__schema" | "__type" if ctx.is_query_root(object_type) => {
            return Err(FieldError::new("schema introspection is disabled"))
        }
        _ => {}
    }
    let future = object_value.resolve_field(info);
    let Some(limit) = ctx.config.resolver_timeout() else {
        return future.await;
    };
    tokio::time::timeout(limit, future)
        .await
        .unwrap_or(Err(FieldError::Timeout(limit)))
}

/// Stops null propagation at a nullable position
pub(crate) fn null_if_nullable(
    ty: &Type,
    result: Result<JsonValue, PropagateNull>,
) -> Result<JsonValue, PropagateNull> {
    result.or_else(|PropagateNull| {
        if ty.is_non_null() {
            Err(PropagateNull)
        } else {
            Ok(JsonValue::Null)
        }
    })
}
