//! Tool storage and discovery for UTCP.
//!
//! - [`ToolRepository`] / [`InMemToolRepository`]: the concurrent index of manuals and tools.
//! - [`ToolSearchStrategy`] / [`TagAndDescriptionWordMatchStrategy`]: ranked tool search.
//! - [`OpenApiConverter`]: turns OpenAPI documents into manuals.

pub mod openapi;
pub mod repository;
pub mod search;

pub use openapi::{OpenApiConversionError, OpenApiConverter, is_openapi_document, parse_openapi_document_value};
pub use repository::{InMemToolRepository, ToolRepository};
pub use search::{TagAndDescriptionWordMatchStrategy, ToolSearchStrategy};
