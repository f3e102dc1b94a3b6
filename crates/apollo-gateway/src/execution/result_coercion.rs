//! Completing resolved values into response JSON, checked against the field's type.

use crate::execution::engine::execute_selection_set;
use crate::execution::engine::null_if_nullable;
use crate::execution::engine::ExecutionContext;
use crate::execution::engine::ExecutionMode;
use crate::execution::engine::PropagateNull;
use crate::execution::resolver::FieldError;
use crate::execution::resolver::ObjectValue;
use crate::execution::resolver::ResolvedValue;
use crate::response::Error;
use crate::response::LinkedPath;
use crate::response::LinkedPathElement;
use crate::response::PathElement;
use crate::JsonValue;
use apollo_compiler::ast::Type;
use apollo_compiler::executable::Field;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::schema::ObjectType;
use apollo_compiler::Name;
use apollo_compiler::Schema;
use async_recursion::async_recursion;
use futures::stream::BoxStream;
use futures::Stream;
use futures::StreamExt;

/// <https://spec.graphql.org/October2021/#CompleteValue()>
///
/// Selection sets below the root always execute in normal mode, even inside a mutation.
#[async_recursion]
pub(crate) async fn complete_value<'a, 'c, 'r: 'c>(
    ctx: &'c ExecutionContext<'a>,
    errors: &'c mut Vec<Error>,
    path: LinkedPath<'c>,
    ty: &'c Type,
    resolved: ResolvedValue<'r>,
    fields: &'c [&'a Field],
) -> Result<JsonValue, PropagateNull> {
    let location = fields[0].name.location();
    let object = match resolved {
        ResolvedValue::Leaf(JsonValue::Null) => {
            return if ty.is_non_null() {
                let message = format!("non-null type {ty} resolved to null");
                Err(ctx.report(errors, path, location, message))
            } else {
                Ok(JsonValue::Null)
            };
        }
        ResolvedValue::List(items) => {
            return complete_list_value(ctx, errors, path, ty, fields, items).await
        }
        ResolvedValue::Leaf(value) => {
            let (ty_name, ty_def) = named_output_type(ctx, errors, path, fields, ty)?;
            return match check_leaf(ty_name, ty_def, &value) {
                Ok(()) => Ok(value),
                Err(message) => Err(ctx.report(errors, path, location, message)),
            };
        }
        ResolvedValue::Object(object) => object,
    };
    let (ty_name, ty_def) = named_output_type(ctx, errors, path, fields, ty)?;
    let object_type = match runtime_object_type(ctx.schema, ty_name, ty_def, &*object) {
        Ok(object_type) => object_type,
        Err(message) => return Err(ctx.report(errors, path, location, message)),
    };
    // Checked for every object value, whichever path reached it
    if let Err(error) = object.authorize(ctx.context) {
        tracing::debug!(
            object_type = %object_type.name,
            field = %fields[0].name,
            "object access denied"
        );
        errors.push(error.into_graphql_error(path, location, &ctx.document.sources));
        return Err(PropagateNull);
    }
    let selections = fields
        .iter()
        .flat_map(|field| &field.selection_set.selections);
    execute_selection_set(
        ctx,
        errors,
        path,
        ExecutionMode::Normal,
        object_type,
        &*object,
        selections,
    )
    .await
    .map(JsonValue::Object)
}

/// Name and definition of a non-list type, for a resolved value that is not a list
fn named_output_type<'s, 't>(
    ctx: &ExecutionContext<'s>,
    errors: &mut Vec<Error>,
    path: LinkedPath<'_>,
    fields: &[&Field],
    ty: &'t Type,
) -> Result<(&'t Name, &'s ExtendedType), PropagateNull> {
    let location = fields[0].name.location();
    let ty_name = match ty {
        Type::Named(name) | Type::NonNullNamed(name) => name,
        Type::List(_) | Type::NonNullList(_) => {
            let message = format!("list type {ty} resolved to a single value");
            return Err(ctx.report(errors, path, location, message));
        }
    };
    match ctx.schema.types.get(ty_name) {
        Some(ExtendedType::InputObject(_)) => {
            let message = format!("field with input object type {ty_name}");
            Err(ctx.report_validation_bug(errors, path, location, message))
        }
        Some(ty_def) => Ok((ty_name, ty_def)),
        None => {
            let message = format!("undefined type {ty_name}");
            Err(ctx.report_validation_bug(errors, path, location, message))
        }
    }
}

/// The object type a resolver claims for its value,
/// which must be (or belong to) the expected output type
fn runtime_object_type<'s>(
    schema: &'s Schema,
    ty_name: &Name,
    ty_def: &'s ExtendedType,
    object: &ObjectValue<'_>,
) -> Result<&'s ObjectType, String> {
    let resolved = object.type_name();
    match ty_def {
        ExtendedType::Object(def) if def.name.as_str() == resolved => Ok(def),
        ExtendedType::Interface(_) | ExtendedType::Union(_) => {
            let Some(def) = schema.get_object(resolved) else {
                return Err(format!(
                    "resolver returned an object of type {resolved} not defined in the schema"
                ));
            };
            match ty_def {
                ExtendedType::Union(union_def) if !union_def.members.contains(resolved) => {
                    Err(format!(
                        "resolver returned an object of type {resolved}, \
                         expected a member of union type {ty_name}"
                    ))
                }
                ExtendedType::Interface(_) if !def.implements_interfaces.contains(ty_name) => {
                    Err(format!(
                        "resolver returned an object of type {resolved} \
                         which does not implement interface {ty_name}"
                    ))
                }
                _ => Ok(def),
            }
        }
        _ => Err(format!(
            "resolver returned an object of type {resolved}, expected {ty_name}"
        )),
    }
}

async fn complete_list_value<'a, 'b>(
    ctx: &ExecutionContext<'a>,
    errors: &mut Vec<Error>,
    path: LinkedPath<'_>,
    ty: &Type,
    fields: &[&'a Field],
    items: BoxStream<'b, Result<ResolvedValue<'b>, FieldError>>,
) -> Result<JsonValue, PropagateNull> {
    let location = fields[0].name.location();
    let item_ty = match ty {
        Type::List(item_ty) | Type::NonNullList(item_ty) => item_ty,
        Type::Named(_) | Type::NonNullNamed(_) => {
            let message = format!("non-list type {ty} resolved to a list");
            return Err(ctx.report(errors, path, location, message));
        }
    };
    let mut list = Vec::with_capacity(items.size_hint().0);
    let mut items = items.enumerate();
    while let Some((index, item)) = items.next().await {
        let item_path = LinkedPathElement {
            element: PathElement::ListIndex(index),
            next: path,
        };
        let completed = match item {
            Ok(resolved) => {
                complete_value(ctx, errors, Some(&item_path), item_ty, resolved, fields).await
            }
            Err(error) => {
                let sources = &ctx.document.sources;
                errors.push(error.into_graphql_error(Some(&item_path), location, sources));
                Err(PropagateNull)
            }
        };
        match null_if_nullable(item_ty, completed) {
            Ok(value) => list.push(value),
            // A non-null item failed: the list itself is nulled if it can be
            Err(PropagateNull) => return null_if_nullable(ty, Err(PropagateNull)),
        }
    }
    Ok(list.into())
}

/// Result coercion of enums and built-in scalars.
/// Custom scalars accept any JSON value as-is.
///
/// <https://spec.graphql.org/October2021/#sec-Scalars.Result-Coercion-and-Serialization>
fn check_leaf(ty_name: &Name, ty_def: &ExtendedType, value: &JsonValue) -> Result<(), String> {
    let accepted = match ty_def {
        ExtendedType::Enum(def) => value
            .as_str()
            .is_some_and(|value| def.values.contains_key(value)),
        ExtendedType::Scalar(_) => match ty_name.as_str() {
            // Non-integer values are never coerced to Int
            "Int" => match value.as_i64() {
                Some(int) if i32::try_from(int).is_err() => {
                    return Err(format!("resolver returned {value} which overflows Int"))
                }
                Some(_) => true,
                None => false,
            },
            "Float" => value.is_number(),
            "String" => value.is_string(),
            "Boolean" => value.is_boolean(),
            "ID" => value.is_string() || value.is_i64(),
            _ => true,
        },
        ExtendedType::Object(_)
        | ExtendedType::Interface(_)
        | ExtendedType::Union(_)
        | ExtendedType::InputObject(_) => {
            return Err(format!(
                "resolver returned a leaf value but expected an object for type {ty_name}"
            ))
        }
    };
    if accepted {
        Ok(())
    } else if let ExtendedType::Enum(_) = ty_def {
        Err(format!("resolver returned {value}, expected enum {ty_name}"))
    } else {
        Err(format!("resolver returned {value}, expected {ty_name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json_bytes::json;

    fn schema() -> Schema {
        Schema::parse("type Query { a: Int } enum Color { RED GREEN }", "schema.graphql")
            .unwrap()
    }

    fn check(schema: &Schema, ty: &str, value: JsonValue) -> Result<(), String> {
        let name = Name::new(ty).unwrap();
        check_leaf(&name, &schema.types[&name], &value)
    }

    #[test]
    fn leaf_coercion() {
        let schema = schema();
        assert_eq!(check(&schema, "Int", json!(7)), Ok(()));
        assert_eq!(
            check(&schema, "Int", json!(1.5)),
            Err("resolver returned 1.5, expected Int".into())
        );
        assert_eq!(
            check(&schema, "Int", json!(3_000_000_000_i64)),
            Err("resolver returned 3000000000 which overflows Int".into())
        );
        assert_eq!(check(&schema, "Float", json!(1)), Ok(()));
        assert_eq!(check(&schema, "ID", json!(12)), Ok(()));
        assert_eq!(
            check(&schema, "Boolean", json!("true")),
            Err(r#"resolver returned "true", expected Boolean"#.into())
        );
        assert_eq!(check(&schema, "Color", json!("RED")), Ok(()));
        assert_eq!(
            check(&schema, "Color", json!("BLUE")),
            Err(r#"resolver returned "BLUE", expected enum Color"#.into())
        );
        assert_eq!(
            check(&schema, "Query", json!(1)),
            Err("resolver returned a leaf value but expected an object for type Query".into())
        );
    }
}
