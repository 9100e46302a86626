//! Discriminator-to-constructor registry for the `Auth` and `CallTemplate` unions.
//!
//! A registry can be built and passed around explicitly; serde decoding of the
//! model types goes through the shared instance returned by
//! [`PolymorphicRegistry::global`], which starts with the built-in variants.
//! Registration is last-write-wins and discriminators are matched
//! case-insensitively.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::auth::{AUTH_TYPE_FIELD, Auth, CustomAuth};
use crate::call_template::{CALL_TEMPLATE_TYPE_FIELD, CallTemplate, CustomCallTemplate};
use crate::error::SerializerValidationError;

/// Builds a `CallTemplate` from a decoded JSON object (discriminator included).
pub type CallTemplateConstructor = Arc<dyn Fn(Value) -> Result<CallTemplate, SerializerValidationError> + Send + Sync>;

/// Builds an `Auth` from a decoded JSON object (discriminator included).
pub type AuthConstructor = Arc<dyn Fn(Value) -> Result<Auth, SerializerValidationError> + Send + Sync>;

static GLOBAL_REGISTRY: Lazy<PolymorphicRegistry> = Lazy::new(PolymorphicRegistry::with_builtins);

/// Maps wire discriminators to variant constructors.
#[derive(Default)]
pub struct PolymorphicRegistry {
    call_templates: RwLock<HashMap<String, CallTemplateConstructor>>,
    auths: RwLock<HashMap<String, AuthConstructor>>,
}

impl std::fmt::Debug for PolymorphicRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolymorphicRegistry")
            .field("call_templates", &self.call_template_types())
            .field("auths", &self.auth_types())
            .finish()
    }
}

impl PolymorphicRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every built-in variant.
    pub fn with_builtins() -> Self {
        let registry = Self::new();

        registry.register_auth_type("api_key", typed_auth::<crate::auth::ApiKeyAuth>("api_key", Auth::ApiKey));
        registry.register_auth_type("basic", typed_auth::<crate::auth::BasicAuth>("basic", Auth::Basic));
        registry.register_auth_type("oauth2", typed_auth::<crate::auth::OAuth2Auth>("oauth2", Auth::OAuth2));

        registry.register_call_template_type("http", typed_template("http", CallTemplate::Http));
        registry.register_call_template_type("streamable_http", typed_template("streamable_http", CallTemplate::StreamableHttp));
        registry.register_call_template_type("cli", typed_template("cli", CallTemplate::Cli));
        registry.register_call_template_type("graphql", typed_template("graphql", CallTemplate::GraphQl));
        registry.register_call_template_type("gql", typed_template("gql", CallTemplate::GraphQl));
        registry.register_call_template_type("grpc", typed_template("grpc", CallTemplate::Grpc));
        registry.register_call_template_type("tcp", typed_template("tcp", CallTemplate::Tcp));
        registry.register_call_template_type("udp", typed_template("udp", CallTemplate::Udp));
        registry.register_call_template_type("text", typed_template("text", CallTemplate::Text));
        registry.register_call_template_type("mcp", typed_template("mcp", CallTemplate::Mcp));
        registry
    }

    /// The shared registry used when the model types are decoded through serde.
    pub fn global() -> &'static PolymorphicRegistry {
        &GLOBAL_REGISTRY
    }

    /// Registers (or replaces) the constructor for a call template discriminator.
    pub fn register_call_template_type<F>(&self, discriminator: &str, constructor: F)
    where
        F: Fn(Value) -> Result<CallTemplate, SerializerValidationError> + Send + Sync + 'static,
    {
        let mut call_templates = self.call_templates.write().unwrap_or_else(PoisonError::into_inner);
        call_templates.insert(discriminator.to_ascii_lowercase(), Arc::new(constructor));
    }

    /// Registers (or replaces) the constructor for an auth discriminator.
    pub fn register_auth_type<F>(&self, discriminator: &str, constructor: F)
    where
        F: Fn(Value) -> Result<Auth, SerializerValidationError> + Send + Sync + 'static,
    {
        let mut auths = self.auths.write().unwrap_or_else(PoisonError::into_inner);
        auths.insert(discriminator.to_ascii_lowercase(), Arc::new(constructor));
    }

    /// Registers a discriminator whose payloads are kept verbatim as [`CallTemplate::Custom`].
    pub fn register_custom_call_template_type(&self, discriminator: &str) {
        let discriminator_name = discriminator.to_string();
        self.register_call_template_type(discriminator, move |value| {
            serde_json::from_value::<CustomCallTemplate>(value)
                .map(CallTemplate::Custom)
                .map_err(|error| SerializerValidationError::invalid_payload(discriminator_name.clone(), error))
        });
    }

    /// Registers a discriminator whose payloads are kept verbatim as [`Auth::Custom`].
    pub fn register_custom_auth_type(&self, discriminator: &str) {
        let discriminator_name = discriminator.to_string();
        self.register_auth_type(discriminator, move |value| {
            serde_json::from_value::<CustomAuth>(value)
                .map(Auth::Custom)
                .map_err(|error| SerializerValidationError::invalid_payload(discriminator_name.clone(), error))
        });
    }

    pub fn resolve_call_template_type(&self, discriminator: &str) -> Result<CallTemplateConstructor, SerializerValidationError> {
        let call_templates = self.call_templates.read().unwrap_or_else(PoisonError::into_inner);
        call_templates
            .get(&discriminator.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| SerializerValidationError::unknown_discriminator("CallTemplate", discriminator))
    }

    pub fn resolve_auth_type(&self, discriminator: &str) -> Result<AuthConstructor, SerializerValidationError> {
        let auths = self.auths.read().unwrap_or_else(PoisonError::into_inner);
        auths
            .get(&discriminator.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| SerializerValidationError::unknown_discriminator("Auth", discriminator))
    }

    /// Decodes a call template from its JSON form.
    pub fn decode_call_template(&self, value: Value) -> Result<CallTemplate, SerializerValidationError> {
        let discriminator = read_discriminator(&value, CALL_TEMPLATE_TYPE_FIELD)?;
        // The lock is released before the constructor runs so nested auth decoding never contends with it.
        let constructor = self.resolve_call_template_type(&discriminator)?;
        constructor(value)
    }

    /// Decodes an auth descriptor from its JSON form.
    pub fn decode_auth(&self, value: Value) -> Result<Auth, SerializerValidationError> {
        let discriminator = read_discriminator(&value, AUTH_TYPE_FIELD)?;
        let constructor = self.resolve_auth_type(&discriminator)?;
        constructor(value)
    }

    /// Registered call template discriminators, sorted.
    pub fn call_template_types(&self) -> Vec<String> {
        let call_templates = self.call_templates.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = call_templates.keys().cloned().collect();
        names.sort();
        names
    }

    /// Registered auth discriminators, sorted.
    pub fn auth_types(&self) -> Vec<String> {
        let auths = self.auths.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = auths.keys().cloned().collect();
        names.sort();
        names
    }
}

fn typed_template<T>(discriminator: &'static str, wrap: fn(T) -> CallTemplate) -> impl Fn(Value) -> Result<CallTemplate, SerializerValidationError>
where
    T: DeserializeOwned,
{
    move |value| {
        serde_json::from_value::<T>(value)
            .map(wrap)
            .map_err(|error| SerializerValidationError::invalid_payload(discriminator, error))
    }
}

fn typed_auth<T>(discriminator: &'static str, wrap: fn(T) -> Auth) -> impl Fn(Value) -> Result<Auth, SerializerValidationError>
where
    T: DeserializeOwned,
{
    move |value| {
        serde_json::from_value::<T>(value)
            .map(wrap)
            .map_err(|error| SerializerValidationError::invalid_payload(discriminator, error))
    }
}

fn read_discriminator(value: &Value, field: &str) -> Result<String, SerializerValidationError> {
    let Value::Object(object) = value else {
        return Err(SerializerValidationError {
            message: format!("Expected a JSON object carrying '{field}'"),
            discriminator: None,
        });
    };
    match object.get(field) {
        Some(Value::String(discriminator)) if !discriminator.trim().is_empty() => Ok(discriminator.clone()),
        _ => Err(SerializerValidationError::missing_discriminator(field)),
    }
}

/// Inserts the discriminator into an encoded variant body.
pub(crate) fn with_discriminator(body: Value, field: &str, discriminator: &str) -> Value {
    match body {
        Value::Object(fields) => {
            let mut tagged = serde_json::Map::with_capacity(fields.len() + 1);
            tagged.insert(field.to_string(), Value::String(discriminator.to_string()));
            tagged.extend(fields);
            Value::Object(tagged)
        }
        other => other,
    }
}
