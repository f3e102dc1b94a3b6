//! Resolver-driven execution of a validated operation.
//!
//! Sibling fields run concurrently (bounded by [`ExecutionConfig::max_concurrent_fields`]),
//! except for the top-level fields of a mutation which run one after the other.
//! Field errors become `null` plus an error entry, propagated to the nearest nullable place.
//!
//! [`ExecutionConfig::max_concurrent_fields`]: crate::ExecutionConfig::max_concurrent_fields

#[macro_use]
mod resolver;
mod engine;
pub(crate) mod input_coercion;
mod result_coercion;

pub use self::engine::execute;
pub use self::resolver::FieldError;
pub use self::resolver::ObjectValue;
pub use self::resolver::ResolveInfo;
pub use self::resolver::ResolvedValue;
pub use self::resolver::Resolver;
