use crate::context::Context;
use crate::response::field_error;
use crate::response::path_to_vec;
use crate::response::Error;
use crate::response::ErrorCode;
use crate::response::LinkedPath;
use crate::response::PathElement;
use crate::JsonMap;
use crate::JsonValue;
use apollo_compiler::executable::Field;
use apollo_compiler::parser::SourceMap;
use apollo_compiler::parser::SourceSpan;
use apollo_compiler::validation::Valid;
use apollo_compiler::ExecutableDocument;
use apollo_compiler::Schema;
use futures::future::BoxFuture;
use futures::stream;
use futures::stream::BoxStream;
use futures::Stream;
use std::time::Duration;

/// A GraphQL object whose fields can be resolved during execution
pub type ObjectValue<'a> = dyn Resolver + Send + 'a;

/// Application data backing one GraphQL object.
///
/// Most implementations come from [`impl_resolver!`][crate::impl_resolver].
pub trait Resolver: Sync {
    /// `__typename` of this object: a concrete object type of the schema
    fn type_name(&self) -> &str;

    /// Produces the value of `info.field_name()`, shaped like the field's schema type
    fn resolve_field<'a>(
        &'a self,
        info: &'a ResolveInfo<'a>,
    ) -> BoxFuture<'a, Result<ResolvedValue<'a>, FieldError>>;

    /// Capability check run by the engine each time a value of this object is completed,
    /// whichever field led to it. Authorization is never inherited from a parent object.
    fn authorize(&self, context: &Context) -> Result<(), FieldError> {
        let _ = context;
        Ok(())
    }
}

impl<T: Resolver + ?Sized> Resolver for &T {
    fn type_name(&self) -> &str {
        (**self).type_name()
    }

    fn resolve_field<'a>(
        &'a self,
        info: &'a ResolveInfo<'a>,
    ) -> BoxFuture<'a, Result<ResolvedValue<'a>, FieldError>> {
        (**self).resolve_field(info)
    }

    fn authorize(&self, context: &Context) -> Result<(), FieldError> {
        (**self).authorize(context)
    }
}

/// Everything a resolver may need to know about the field being resolved
pub struct ResolveInfo<'a> {
    pub(crate) schema: &'a Valid<Schema>,
    pub(crate) document: &'a Valid<ExecutableDocument>,
    pub(crate) fields: &'a [&'a Field],
    pub(crate) arguments: &'a JsonMap,
    pub(crate) context: &'a Context,
    pub(crate) path: LinkedPath<'a>,
}

impl<'a> ResolveInfo<'a> {
    pub fn schema(&self) -> &'a Valid<Schema> {
        self.schema
    }

    pub fn document(&self) -> &'a Valid<ExecutableDocument> {
        self.document
    }

    /// The field definition from the schema
    pub fn field_definition(&self) -> &'a apollo_compiler::schema::FieldDefinition {
        &self.fields[0].definition
    }

    /// The grouped field set: one or more fields with the same response key
    pub fn fields(&self) -> &'a [&'a Field] {
        self.fields
    }

    pub fn field_name(&self) -> &'a str {
        &self.fields[0].name
    }

    /// Field arguments, coerced according to their definition in the schema
    pub fn arguments(&self) -> &'a JsonMap {
        self.arguments
    }

    pub fn argument(&self, name: &str) -> Option<&'a JsonValue> {
        self.arguments.get(name)
    }

    pub fn context(&self) -> &'a Context {
        self.context
    }

    /// Path in the response data of the field being resolved
    pub fn path(&self) -> Vec<PathElement> {
        path_to_vec(self.path)
    }
}

/// Implements [`Resolver`] from a list of field bodies.
///
/// The input names the Rust type and a literal `__typename`, then optionally an
/// `authorize(&this, context)` block, then one `async fn` per schema field.
/// Field bodies evaluate to `Result<ResolvedValue, FieldError>`. They may bind the
/// receiver under any name other than `self`, and [`&ResolveInfo`][crate::ResolveInfo]
/// as a second parameter.
///
/// ```
/// use apollo_gateway::impl_resolver;
/// use apollo_gateway::ResolvedValue;
///
/// struct User {
///     id: String,
/// }
///
/// impl_resolver! {
///     for User:
///
///     __typename = "User";
///
///     async fn id(&self_) {
///         Ok(ResolvedValue::leaf(self_.id.as_str()))
///     }
///
///     async fn greeting(&self_, info) {
///         let name = info.argument("name").and_then(|name| name.as_str()).unwrap_or("you");
///         Ok(ResolvedValue::leaf(format!("hello {name}, from {}", self_.id)))
///     }
/// }
/// ```
#[macro_export]
macro_rules! impl_resolver {
    (
        for $ty: ty:
        __typename = $type_name: expr;
        $(
            authorize(&$auth_self: ident, $auth_context: ident) $auth_block: block
        )?
        $(
            async fn $field_name: ident(
                $( &$self_: ident $(, $( $info: ident $(,)? )? )? )?
            ) $block: block
        )*

    ) => {
        impl $crate::Resolver for $ty {
            fn type_name(&self) -> &str {
                $type_name
            }

            fn resolve_field<'a>(
                &'a self,
                info: &'a $crate::ResolveInfo<'a>,
            ) -> $crate::__private::BoxFuture<'a, Result<$crate::ResolvedValue<'a>, $crate::FieldError>> {
                Box::pin(async move {
                    let requested = info.field_name();
                    $(
                        if requested == stringify!($field_name) {
                            $(
                                let $self_ = self;
                                $($( let $info = info; )?)?
                            )?
                            return $block;
                        }
                    )*
                    Err($crate::FieldError::new(format!(
                        "no resolver for field {requested} of {}",
                        $type_name
                    )))
                })
            }

            $(
                fn authorize(&self, context: &$crate::Context) -> Result<(), $crate::FieldError> {
                    let $auth_self = self;
                    let $auth_context = context;
                    $auth_block
                }
            )?
        }
    };
}

/// The value of a resolved field
pub enum ResolvedValue<'a> {
    /// Scalar, enum (as a string) or null. Custom scalars pass through unchecked.
    Leaf(JsonValue),

    /// For object, interface and union types
    Object(Box<ObjectValue<'a>>),

    /// An `Err` item nulls that item only
    List(BoxStream<'a, Result<ResolvedValue<'a>, FieldError>>),
}

impl<'a> ResolvedValue<'a> {
    pub fn null() -> Self {
        Self::Leaf(JsonValue::Null)
    }

    pub fn leaf(json: impl Into<JsonValue>) -> Self {
        Self::Leaf(json.into())
    }

    pub fn object(resolver: impl Resolver + Send + 'a) -> Self {
        Self::Object(Box::new(resolver))
    }

    /// `None` resolves to null
    pub fn opt_object(resolver: Option<impl Resolver + Send + 'a>) -> Self {
        resolver.map_or_else(Self::null, Self::object)
    }

    /// Items are completed in stream order
    pub fn list_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Self, FieldError>> + Send + 'a,
    {
        Self::List(Box::pin(stream))
    }

    pub fn list<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Self>,
        I::IntoIter: Send + 'a,
    {
        Self::list_stream(stream::iter(items.into_iter().map(Ok)))
    }
}

/// A field resolution failure.
///
/// All variants but [`Internal`][Self::Internal] stay local to the field:
/// it becomes `null` and one error with its path is reported.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum FieldError {
    /// An anticipated failure, reported to the client as-is
    #[error("{message}")]
    Resolver { message: String, extensions: JsonMap },

    #[error("resolver timed out after {0:?}")]
    Timeout(Duration),

    #[error("not authorized")]
    Forbidden,

    /// Unanticipated failure. Logged, and the whole request fails with an opaque error.
    #[error("internal error: {0}")]
    Internal(Box<dyn std::error::Error + Send + Sync>),
}

impl FieldError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Resolver {
            message: message.into(),
            extensions: JsonMap::new(),
        }
    }

    pub fn internal(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Internal(error.into())
    }

    /// Sets `extensions.code`. Only meaningful for [`FieldError::Resolver`].
    pub fn with_code(self, code: &str) -> Self {
        self.with_extension("code", code)
    }

    /// Only meaningful for [`FieldError::Resolver`].
    pub fn with_extension(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
        if let Self::Resolver { extensions, .. } = &mut self {
            extensions.insert(key, value.into());
        }
        self
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_))
    }

    pub(crate) fn into_graphql_error(
        self,
        path: LinkedPath<'_>,
        location: Option<SourceSpan>,
        sources: &SourceMap,
    ) -> Error {
        match self {
            FieldError::Resolver {
                message,
                extensions,
            } => {
                let mut error = field_error(message, path, location, sources);
                error.extensions = extensions;
                error
            }
            FieldError::Timeout(_) => {
                field_error(self.to_string(), path, location, sources).with_code(ErrorCode::Timeout)
            }
            FieldError::Forbidden => field_error(self.to_string(), path, location, sources)
                .with_code(ErrorCode::Forbidden),
            FieldError::Internal(source) => {
                tracing::error!(
                    path = ?path_to_vec(path),
                    error = %source,
                    "internal error while resolving a field"
                );
                Error::internal()
            }
        }
    }
}

impl From<String> for FieldError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for FieldError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}
