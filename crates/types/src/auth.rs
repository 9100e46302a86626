//! Authentication descriptors attached to call templates.
//!
//! `Auth` is a discriminated union keyed by `auth_type` on the wire. Decoding
//! goes through the process-wide [`PolymorphicRegistry`](crate::PolymorphicRegistry)
//! so hosts can add their own schemes next to the built-in `api_key`, `basic`
//! and `oauth2` variants.

use serde::de::Error as _;
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map as JsonMap, Value};

use crate::polymorphic::{PolymorphicRegistry, with_discriminator};

/// Wire field that selects the `Auth` variant.
pub const AUTH_TYPE_FIELD: &str = "auth_type";

/// Where an API key is placed on the outgoing request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyLocation {
    #[default]
    Header,
    Query,
    Cookie,
}

/// API key authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyAuth {
    /// The key value, usually a `${VAR}` placeholder resolved at call time.
    pub api_key: String,
    /// Header, query parameter, or cookie name carrying the key.
    #[serde(alias = "var_name")]
    pub key_name: String,
    #[serde(default)]
    pub location: ApiKeyLocation,
}

/// HTTP basic authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

/// OAuth2 client-credentials authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuth2Auth {
    pub token_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
}

/// An auth scheme registered at runtime, kept as its raw fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomAuth {
    pub auth_type: String,
    #[serde(flatten)]
    pub fields: JsonMap<String, Value>,
}

/// Authentication attached to a call template.
#[derive(Debug, Clone, PartialEq)]
pub enum Auth {
    ApiKey(ApiKeyAuth),
    Basic(BasicAuth),
    OAuth2(OAuth2Auth),
    Custom(CustomAuth),
}

impl Auth {
    /// The wire discriminator for this variant.
    pub fn auth_type(&self) -> &str {
        match self {
            Auth::ApiKey(_) => "api_key",
            Auth::Basic(_) => "basic",
            Auth::OAuth2(_) => "oauth2",
            Auth::Custom(custom) => &custom.auth_type,
        }
    }
}

impl Serialize for Auth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let body = match self {
            Auth::ApiKey(auth) => serde_json::to_value(auth),
            Auth::Basic(auth) => serde_json::to_value(auth),
            Auth::OAuth2(auth) => serde_json::to_value(auth),
            Auth::Custom(auth) => return auth.serialize(serializer),
        }
        .map_err(S::Error::custom)?;
        with_discriminator(body, AUTH_TYPE_FIELD, self.auth_type()).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Auth {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        PolymorphicRegistry::global().decode_auth(value).map_err(D::Error::custom)
    }
}
