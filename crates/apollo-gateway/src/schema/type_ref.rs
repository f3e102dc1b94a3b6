use crate::schema::SchemaDefinitionError;
use apollo_compiler::ast::Type;
use apollo_compiler::Name;

/// Parses a GraphQL type reference such as `ID!` or `[User!]!`
pub(crate) fn parse_type_reference(reference: &str) -> Result<Type, SchemaDefinitionError> {
    parse(reference.trim())
        .ok_or_else(|| SchemaDefinitionError::InvalidTypeReference(reference.to_owned()))
}

fn parse(reference: &str) -> Option<Type> {
    let (inner, non_null) = match reference.strip_suffix('!') {
        Some(inner) => (inner.trim_end(), true),
        None => (reference, false),
    };
    if let Some(list) = inner.strip_prefix('[') {
        let item = Box::new(parse(list.strip_suffix(']')?.trim())?);
        Some(if non_null {
            Type::NonNullList(item)
        } else {
            Type::List(item)
        })
    } else {
        let name = Name::new(inner).ok()?;
        Some(if non_null {
            Type::NonNullNamed(name)
        } else {
            Type::Named(name)
        })
    }
}
