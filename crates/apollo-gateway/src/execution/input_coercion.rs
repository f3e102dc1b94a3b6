use crate::execution::engine::ExecutionContext;
use crate::execution::engine::PropagateNull;
use crate::response::to_locations;
use crate::response::Error;
use crate::response::LinkedPath;
use crate::validation::Violation;
use crate::JsonMap;
use crate::JsonValue;
use apollo_compiler::ast::Type;
use apollo_compiler::ast::Value;
use apollo_compiler::executable::Field;
use apollo_compiler::executable::Operation;
use apollo_compiler::parser::SourceMap;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::schema::FieldDefinition;
use apollo_compiler::Node;
use apollo_compiler::Schema;
use std::collections::HashMap;

/// <https://spec.graphql.org/October2021/#CoerceVariableValues()>
///
/// Unlike the algorithm in the GraphQL specification, every problem is collected
/// instead of stopping at the first one.
pub(crate) fn coerce_variable_values(
    schema: &Schema,
    sources: &SourceMap,
    operation: &Operation,
    values: &JsonMap,
) -> Result<JsonMap, Vec<Violation>> {
    let mut coerced_values = JsonMap::new();
    let mut violations = Vec::new();
    for variable_def in &operation.variables {
        let name = variable_def.name.as_str();
        let mut problems = Vec::new();
        if let Some((key, value)) = values.get_key_value(name) {
            let value = coerce_variable_value(
                schema,
                &mut problems,
                &format!("${name}"),
                &variable_def.ty,
                value,
            );
            coerced_values.insert(key.clone(), value);
        } else if let Some(default) = &variable_def.default_value {
            match graphql_value_to_json(default) {
                Ok(value) => {
                    coerced_values.insert(name, value);
                }
                Err(problem) => problems.push(format!("default value of `${name}`: {problem}")),
            }
        } else if variable_def.ty.is_non_null() {
            problems.push(format!(
                "missing value for non-null variable `${name}` of type `{}`",
                variable_def.ty
            ))
        } else {
            // Nullable variable with no provided value nor explicit default.
            // GraphQL says nothing for this case, but for the similar case in input objects:
            //
            // > there is a semantic difference between the explicitly provided value null
            // > versus having not provided a value
        }
        violations.extend(problems.into_iter().map(|message| Violation {
            message,
            locations: to_locations(variable_def.location(), sources),
        }));
    }
    if violations.is_empty() {
        Ok(coerced_values)
    } else {
        Err(violations)
    }
}

fn coerce_variable_value(
    schema: &Schema,
    problems: &mut Vec<String>,
    path: &str,
    ty: &Type,
    value: &JsonValue,
) -> JsonValue {
    if value.is_null() {
        if ty.is_non_null() {
            problems.push(format!("null value for non-null `{path}` of type `{ty}`"));
        }
        return JsonValue::Null;
    }
    let ty_name = match ty {
        Type::List(inner) | Type::NonNullList(inner) => {
            // https://spec.graphql.org/October2021/#sec-List.Input-Coercion
            return match value.as_array() {
                Some(items) => items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| {
                        coerce_variable_value(
                            schema,
                            problems,
                            &format!("{path}[{index}]"),
                            inner,
                            item,
                        )
                    })
                    .collect(),
                // If not an array, treat the value as an array of size one
                None => {
                    JsonValue::Array(vec![coerce_variable_value(
                        schema, problems, path, inner, value,
                    )])
                }
            };
        }
        Type::Named(ty_name) | Type::NonNullNamed(ty_name) => ty_name,
    };
    let Some(ty_def) = schema.types.get(ty_name) else {
        problems.push(format!("undefined type `{ty_name}` for `{path}`"));
        return JsonValue::Null;
    };
    let accepted = match ty_def {
        ExtendedType::Object(_) | ExtendedType::Interface(_) | ExtendedType::Union(_) => {
            problems.push(format!("non-input type `{ty_name}` for `{path}`"));
            return JsonValue::Null;
        }
        ExtendedType::Scalar(_) => match ty_name.as_str() {
            // https://spec.graphql.org/October2021/#sec-Int.Input-Coercion
            "Int" => value
                .as_i64()
                .is_some_and(|value| i32::try_from(value).is_ok()),
            // https://spec.graphql.org/October2021/#sec-Float.Input-Coercion
            "Float" => value.as_f64().is_some(),
            // https://spec.graphql.org/October2021/#sec-String.Input-Coercion
            "String" => value.is_string(),
            // https://spec.graphql.org/October2021/#sec-Boolean.Input-Coercion
            "Boolean" => value.is_boolean(),
            // https://spec.graphql.org/October2021/#sec-ID.Input-Coercion
            "ID" => value.is_string() || value.is_i64(),
            // Custom scalar
            _ => true,
        },
        // https://spec.graphql.org/October2021/#sec-Enums.Input-Coercion
        ExtendedType::Enum(ty_def) => value
            .as_str()
            .is_some_and(|str| ty_def.values.contains_key(str)),
        ExtendedType::InputObject(ty_def) => {
            // https://spec.graphql.org/October2021/#sec-Input-Objects.Input-Coercion
            let Some(object) = value.as_object() else {
                problems.push(format!(
                    "expected an object of input type `{ty_name}` for `{path}`, found {value}"
                ));
                return JsonValue::Null;
            };
            for key in object.keys() {
                if !ty_def.fields.contains_key(key.as_str()) {
                    problems.push(format!(
                        "unknown field `{}` in `{path}` of input type `{ty_name}`",
                        key.as_str()
                    ))
                }
            }
            let mut coerced_object = JsonMap::new();
            for (field_name, field_def) in &ty_def.fields {
                let field_path = format!("{path}.{field_name}");
                if let Some(field_value) = object.get(field_name.as_str()) {
                    let coerced = coerce_variable_value(
                        schema,
                        problems,
                        &field_path,
                        &field_def.ty,
                        field_value,
                    );
                    coerced_object.insert(field_name.as_str(), coerced);
                } else if let Some(default) = &field_def.default_value {
                    match graphql_value_to_json(default) {
                        Ok(default) => {
                            coerced_object.insert(field_name.as_str(), default);
                        }
                        Err(problem) => {
                            problems.push(format!("default value of `{field_path}`: {problem}"))
                        }
                    }
                } else if field_def.ty.is_non_null() {
                    problems.push(format!(
                        "missing value for non-null `{field_path}` of type `{}`",
                        field_def.ty
                    ))
                } else {
                    // Field not required
                }
            }
            return coerced_object.into();
        }
    };
    if !accepted {
        problems.push(format!(
            "could not coerce `{path}`: {value} to type `{ty_name}`"
        ));
    }
    coerce_id(ty_name, value.clone())
}

/// IDs are serialized as strings, whether the input was a string or an integer
fn coerce_id(ty_name: &str, value: JsonValue) -> JsonValue {
    match value.as_i64() {
        Some(int) if ty_name == "ID" => int.to_string().into(),
        _ => value,
    }
}

pub(crate) fn graphql_value_to_json(value: &Value) -> Result<JsonValue, String> {
    match value {
        Value::Null => Ok(JsonValue::Null),
        Value::Variable(name) => Err(format!("unexpected variable `${name}`")),
        Value::Enum(value) => Ok(value.as_str().into()),
        Value::String(value) => Ok(value.as_str().into()),
        Value::Boolean(value) => Ok((*value).into()),
        // Rely on `serde_json::Number`’s own parser to use whatever precision it supports
        Value::Int(value) => value
            .as_str()
            .parse()
            .map(JsonValue::Number)
            .map_err(|_| format!("Int value overflow: {}", value.as_str())),
        Value::Float(value) => value
            .as_str()
            .parse()
            .map(JsonValue::Number)
            .map_err(|_| format!("Float value overflow: {}", value.as_str())),
        Value::List(value) => value
            .iter()
            .map(|value| graphql_value_to_json(value))
            .collect(),
        Value::Object(value) => value
            .iter()
            .map(|(key, value)| Ok((key.as_str(), graphql_value_to_json(value)?)))
            .collect(),
    }
}

/// <https://spec.graphql.org/October2021/#sec-Coercing-Field-Arguments>
///
/// Variables were coerced by validation, so they are used as-is.
pub(crate) fn coerce_argument_values(
    ctx: &ExecutionContext<'_>,
    errors: &mut Vec<Error>,
    path: LinkedPath<'_>,
    field_def: &FieldDefinition,
    field: &Field,
) -> Result<JsonMap, PropagateNull> {
    let mut arguments = JsonMap::new();
    for arg_def in &field_def.arguments {
        let arg_name = &arg_def.name;
        let given = field.arguments.iter().find(|arg| arg.name == *arg_name);
        let value = match given.map(|arg| (arg, arg.value.as_variable())) {
            // A variable without a value falls back to the default, like an absent argument
            Some((arg, Some(var_name))) => match ctx.variable_values.get(var_name.as_str()) {
                Some(JsonValue::Null) if arg_def.ty.is_non_null() => {
                    let message = format!("null value for non-nullable argument {arg_name}");
                    return Err(ctx.report(errors, path, arg.value.location(), message));
                }
                Some(var_value) => Some(var_value.clone()),
                None => None,
            },
            Some((arg, None)) => Some(coerce_argument_value(
                ctx,
                errors,
                path,
                arg_name,
                &arg_def.ty,
                &arg.value,
            )?),
            None => None,
        };
        let value = match (value, &arg_def.default_value) {
            (Some(value), _) => value,
            (None, Some(default)) => graphql_value_to_json(default).map_err(|message| {
                ctx.report_validation_bug(errors, path, default.location(), message)
            })?,
            (None, None) if arg_def.ty.is_non_null() => {
                let message = format!("missing value for required argument {arg_name}");
                return Err(ctx.report(errors, path, field.name.location(), message));
            }
            (None, None) => continue,
        };
        arguments.insert(arg_name.as_str(), value);
    }
    Ok(arguments)
}

/// Converts one literal argument value to JSON.
/// Scalars and enums were checked by validation, input objects get their defaults filled in.
fn coerce_argument_value(
    ctx: &ExecutionContext<'_>,
    errors: &mut Vec<Error>,
    path: LinkedPath<'_>,
    name: &str,
    ty: &Type,
    value: &Node<Value>,
) -> Result<JsonValue, PropagateNull> {
    let location = value.location();
    if value.is_null() {
        return if ty.is_non_null() {
            Err(ctx.report(errors, path, location, format!("null value for non-null {name}")))
        } else {
            Ok(JsonValue::Null)
        };
    }
    if let Some(var_name) = value.as_variable() {
        return match ctx.variable_values.get(var_name.as_str()) {
            Some(JsonValue::Null) | None if ty.is_non_null() => {
                let message = format!("missing or null variable for non-null {name}");
                Err(ctx.report(errors, path, location, message))
            }
            Some(var_value) => Ok(var_value.clone()),
            None => Ok(JsonValue::Null),
        };
    }
    let ty_name = match ty {
        Type::Named(ty_name) | Type::NonNullNamed(ty_name) => ty_name,
        // https://spec.graphql.org/October2021/#sec-List.Input-Coercion
        Type::List(item_ty) | Type::NonNullList(item_ty) => {
            // A single value stands for a list of one
            let items = value.as_list().unwrap_or(std::slice::from_ref(value));
            return items
                .iter()
                .map(|item| coerce_argument_value(ctx, errors, path, name, item_ty, item))
                .collect();
        }
    };
    let input_object = match ctx.schema.types.get(ty_name) {
        Some(ExtendedType::InputObject(def)) => def,
        Some(_) => {
            return graphql_value_to_json(value)
                .map(|json| coerce_id(ty_name, json))
                .map_err(|message| ctx.report(errors, path, location, message))
        }
        None => {
            let message = format!("undefined type {ty_name} for {name}");
            return Err(ctx.report_validation_bug(errors, path, location, message));
        }
    };
    // https://spec.graphql.org/October2021/#sec-Input-Objects.Input-Coercion
    let Some(entries) = value.as_object() else {
        let message = format!("could not coerce {name}: {value} to type {ty_name}");
        return Err(ctx.report(errors, path, location, message));
    };
    if let Some((key, _)) = entries
        .iter()
        .find(|(key, _)| !input_object.fields.contains_key(key))
    {
        let message = format!("input object has key {key} not in type {ty_name}");
        return Err(ctx.report(errors, path, location, message));
    }
    let entries: HashMap<_, _> = entries.iter().map(|(key, value)| (key, value)).collect();
    let mut coerced = JsonMap::new();
    for (field_name, field_def) in &input_object.fields {
        let field_value = if let Some(field_value) = entries.get(field_name) {
            let field_path = format!("{name}.{field_name}");
            coerce_argument_value(ctx, errors, path, &field_path, &field_def.ty, field_value)?
        } else if let Some(default) = &field_def.default_value {
            graphql_value_to_json(default).map_err(|message| {
                ctx.report_validation_bug(errors, path, location, message)
            })?
        } else if field_def.ty.is_non_null() {
            let message =
                format!("missing value for non-null input object field {ty_name}.{field_name}");
            return Err(ctx.report(errors, path, location, message));
        } else {
            continue;
        };
        coerced.insert(field_name.as_str(), field_value);
    }
    Ok(coerced.into())
}
