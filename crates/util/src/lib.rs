//! Helpers shared by the UTCP crates: variable substitution and loaders,
//! server-sent-event decoding, URL path parameters, value heuristics,
//! cancellation wrappers and log redaction.

pub mod cancel;
pub mod dotenv;
pub mod path_params;
pub mod redaction;
pub mod sse;
pub mod substitution;
pub mod value;

pub use cancel::{cancellable, cancellable_with_timeout};
pub use dotenv::DotEnvVariableLoader;
pub use path_params::{argument_to_string, fill_path_placeholders};
pub use redaction::{redact_header_value, redact_sensitive};
pub use sse::{SseDecoder, SseEvent, forward_sse_stream};
pub use substitution::{SubstitutionConfig, VariableLoader, VariableSubstitutor, namespaced_variable_name};
pub use value::{deserialize_to_closest, parse_response_body, parse_text_content, try_parse_json_candidate};
