use std::any::{Any, TypeId};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

use crate::error::BootstrapError;
use crate::value::Value;

pub const PROTOCOL: &str = "protocol";
pub const HOST: &str = "host";
pub const PORT: &str = "port";
pub const ROOT_PATH: &str = "rootPath";
pub const SSL_CONTEXT: &str = "sslContext";
pub const SSL_CLIENT_AUTHENTICATION: &str = "sslClientAuthentication";

pub const DEFAULT_PROTOCOL: &str = "HTTP";
pub const DEFAULT_HOST: &str = "localhost";
/// Port sentinel: the provider picks the port.
pub const DEFAULT_PORT: i32 = -1;
pub const DEFAULT_ROOT_PATH: &str = "/";

/// Client certificate policy for secure connections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SslClientAuth {
    #[default]
    None,
    Optional,
    Mandatory,
}

impl fmt::Display for SslClientAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SslClientAuth::None => "NONE",
            SslClientAuth::Optional => "OPTIONAL",
            SslClientAuth::Mandatory => "MANDATORY",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown client authentication policy {0:?} (expected none, optional or mandatory)")]
pub struct ParseSslClientAuthError(String);

impl FromStr for SslClientAuth {
    type Err = ParseSslClientAuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NONE" => Ok(SslClientAuth::None),
            "OPTIONAL" => Ok(SslClientAuth::Optional),
            "MANDATORY" => Ok(SslClientAuth::Mandatory),
            _ => Err(ParseSslClientAuthError(s.to_string())),
        }
    }
}

/// Secure-socket material handed through to the provider untouched.
///
/// The platform default carries no material; providers decide what that
/// means for them.
#[derive(Clone)]
pub struct SslContext {
    name: Arc<str>,
    material: Option<Value>,
}

impl SslContext {
    pub fn platform_default() -> Self {
        Self {
            name: Arc::from("platform-default"),
            material: None,
        }
    }

    pub fn new<T: Any + Send + Sync>(name: impl Into<Arc<str>>, material: T) -> Self {
        Self {
            name: name.into(),
            material: Some(Value::new(material)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_platform_default(&self) -> bool {
        self.material.is_none()
    }

    /// Provider-specific material, if any, as `T`.
    pub fn material<T: Any>(&self) -> Result<Option<&T>, BootstrapError> {
        match &self.material {
            Some(value) => value.cast::<T>(SSL_CONTEXT).map(Some),
            None => Ok(None),
        }
    }
}

impl Default for SslContext {
    fn default() -> Self {
        Self::platform_default()
    }
}

impl fmt::Debug for SslContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SslContext")
            .field("name", &self.name)
            .field("material", &self.material.as_ref().map(Value::type_name))
            .finish()
    }
}

/// Declared type of a recognized key; `None` for keys with no mandated type.
fn declared_type(name: &str) -> Option<(TypeId, &'static str)> {
    let declared = match name {
        PROTOCOL | HOST | ROOT_PATH => (TypeId::of::<String>(), "String"),
        PORT => (TypeId::of::<i32>(), "i32"),
        SSL_CONTEXT => (TypeId::of::<SslContext>(), "SslContext"),
        SSL_CLIENT_AUTHENTICATION => (TypeId::of::<SslClientAuth>(), "SslClientAuth"),
        _ => return None,
    };
    Some(declared)
}

fn default_value(name: &str) -> Option<Value> {
    match name {
        PROTOCOL => Some(Value::from(DEFAULT_PROTOCOL)),
        HOST => Some(Value::from(DEFAULT_HOST)),
        PORT => Some(Value::from(DEFAULT_PORT)),
        ROOT_PATH => Some(Value::from(DEFAULT_ROOT_PATH)),
        SSL_CONTEXT => Some(Value::from(SslContext::platform_default())),
        SSL_CLIENT_AUTHENTICATION => Some(Value::from(SslClientAuth::None)),
        _ => None,
    }
}

/// Immutable snapshot of named, typed options consumed by a provider.
///
/// Unset recognized keys read as their documented defaults. Cloning is cheap
/// and every clone sees the same snapshot.
#[derive(Clone, Default)]
pub struct Configuration {
    properties: Arc<BTreeMap<String, Value>>,
}

impl Configuration {
    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder::new()
    }

    /// Builder seeded with every explicitly set property of this snapshot.
    pub fn to_builder(&self) -> ConfigurationBuilder {
        ConfigurationBuilder {
            properties: (*self.properties).clone(),
        }
    }

    /// The stored value, the documented default, or `None`.
    pub fn property(&self, name: &str) -> Option<Value> {
        self.properties
            .get(name)
            .cloned()
            .or_else(|| default_value(name))
    }

    /// Typed read of any property.
    ///
    /// Fails with [`BootstrapError::TypeMismatch`] when the value exists but is
    /// not a `T`.
    pub fn get<T: Any + Clone>(&self, name: &str) -> Result<Option<T>, BootstrapError> {
        match self.property(name) {
            Some(value) => value.cast::<T>(name).map(|v| Some(v.clone())),
            None => Ok(None),
        }
    }

    /// Names of explicitly set properties, in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    fn stored<T: Any>(&self, name: &str) -> Option<&T> {
        self.properties.get(name).and_then(Value::downcast_ref::<T>)
    }

    pub fn protocol(&self) -> &str {
        self.stored::<String>(PROTOCOL)
            .map_or(DEFAULT_PROTOCOL, String::as_str)
    }

    pub fn host(&self) -> &str {
        self.stored::<String>(HOST).map_or(DEFAULT_HOST, String::as_str)
    }

    /// Requested port; [`DEFAULT_PORT`] means the provider chooses.
    pub fn port(&self) -> i32 {
        self.stored::<i32>(PORT).copied().unwrap_or(DEFAULT_PORT)
    }

    pub fn root_path(&self) -> &str {
        self.stored::<String>(ROOT_PATH)
            .map_or(DEFAULT_ROOT_PATH, String::as_str)
    }

    pub fn ssl_context(&self) -> SslContext {
        self.stored::<SslContext>(SSL_CONTEXT)
            .cloned()
            .unwrap_or_default()
    }

    pub fn ssl_client_authentication(&self) -> SslClientAuth {
        self.stored::<SslClientAuth>(SSL_CLIENT_AUTHENTICATION)
            .copied()
            .unwrap_or_default()
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        map.entry(&PROTOCOL, &self.protocol())
            .entry(&HOST, &self.host())
            .entry(&PORT, &self.port())
            .entry(&ROOT_PATH, &self.root_path())
            .entry(&SSL_CLIENT_AUTHENTICATION, &self.ssl_client_authentication());
        for (name, value) in self.properties.iter() {
            if declared_type(name).is_none() {
                map.entry(name, value);
            }
        }
        map.finish()
    }
}

/// Mutable accumulator producing [`Configuration`] snapshots.
#[derive(Clone, Default)]
pub struct ConfigurationBuilder {
    properties: BTreeMap<String, Value>,
}

impl fmt::Debug for ConfigurationBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.properties.iter()).finish()
    }
}

impl ConfigurationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a property, or reset it to its default with `None`.
    ///
    /// Unknown names are kept as-is. A value of the wrong type for a
    /// recognized key is dropped and the previous value stays in place.
    pub fn property(mut self, name: impl Into<String>, value: Option<Value>) -> Self {
        let name = name.into();
        let Some(value) = value else {
            self.properties.remove(&name);
            return self;
        };

        if let Some((expected, expected_name)) = declared_type(&name) {
            if value.stored_type_id() != expected {
                tracing::debug!(
                    property = %name,
                    expected = expected_name,
                    found = value.type_name(),
                    "Ignoring property value of wrong type"
                );
                return self;
            }
        }

        self.properties.insert(name, value);
        self
    }

    pub fn protocol(self, protocol: impl Into<String>) -> Self {
        self.property(PROTOCOL, Some(Value::from(protocol.into())))
    }

    pub fn host(self, host: impl Into<String>) -> Self {
        self.property(HOST, Some(Value::from(host.into())))
    }

    pub fn port(self, port: i32) -> Self {
        self.property(PORT, Some(Value::from(port)))
    }

    pub fn root_path(self, root_path: impl Into<String>) -> Self {
        self.property(ROOT_PATH, Some(Value::from(root_path.into())))
    }

    pub fn ssl_context(self, context: SslContext) -> Self {
        self.property(SSL_CONTEXT, Some(Value::from(context)))
    }

    pub fn ssl_client_authentication(self, policy: SslClientAuth) -> Self {
        self.property(SSL_CLIENT_AUTHENTICATION, Some(Value::from(policy)))
    }

    /// Snapshot the current properties. The builder stays usable.
    pub fn build(&self) -> Configuration {
        Configuration {
            properties: Arc::new(self.properties.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = Configuration::builder().build();
        assert_eq!(config.protocol(), "HTTP");
        assert_eq!(config.host(), "localhost");
        assert_eq!(config.port(), -1);
        assert_eq!(config.root_path(), "/");
        assert_eq!(config.ssl_client_authentication(), SslClientAuth::None);
        assert!(config.ssl_context().is_platform_default());
        assert_eq!(config.names().count(), 0);
    }

    #[test]
    fn setters_override_defaults() {
        let config = Configuration::builder()
            .protocol("HTTPS")
            .host("0.0.0.0")
            .port(8443)
            .root_path("/api")
            .ssl_client_authentication(SslClientAuth::Mandatory)
            .build();
        assert_eq!(config.protocol(), "HTTPS");
        assert_eq!(config.host(), "0.0.0.0");
        assert_eq!(config.port(), 8443);
        assert_eq!(config.root_path(), "/api");
        assert_eq!(config.ssl_client_authentication(), SslClientAuth::Mandatory);
    }

    #[test]
    fn none_resets_to_default() {
        let config = Configuration::builder()
            .port(8080)
            .property(PORT, None)
            .build();
        assert_eq!(config.port(), -1);
        assert_eq!(config.names().count(), 0);
    }

    #[test]
    fn unknown_property_is_preserved() {
        let config = Configuration::builder()
            .property("custom.unknown", Some("x".into()))
            .build();
        let value = config.property("custom.unknown").unwrap();
        assert_eq!(value.downcast_ref::<String>().unwrap(), "x");
        assert!(config.property("custom.absent").is_none());
    }

    #[test]
    fn wrong_type_for_known_key_is_ignored() {
        let config = Configuration::builder()
            .port(9000)
            .property(PORT, Some("not a port".into()))
            .property(HOST, Some(Value::from(42)))
            .build();
        assert_eq!(config.port(), 9000);
        assert_eq!(config.host(), "localhost");
    }

    #[test]
    fn built_snapshots_are_detached() {
        let builder = Configuration::builder().port(1000);
        let first = builder.build();
        let builder = builder.port(2000).host("example.org");
        let second = builder.build();

        assert_eq!(first.port(), 1000);
        assert_eq!(first.host(), "localhost");
        assert_eq!(second.port(), 2000);
        assert_eq!(second.host(), "example.org");
    }

    #[test]
    fn get_reports_type_mismatch_lazily() {
        let config = Configuration::builder()
            .property("custom.limit", Some(Value::from(10)))
            .build();

        assert_eq!(config.get::<i32>("custom.limit").unwrap(), Some(10));
        assert_eq!(config.get::<i32>(PORT).unwrap(), Some(-1));
        assert_eq!(config.get::<String>("custom.missing").unwrap(), None);

        let err = config.get::<String>("custom.limit").unwrap_err();
        assert!(matches!(err, BootstrapError::TypeMismatch { ref name, .. } if name == "custom.limit"));

        let err = config.get::<u16>(PORT).unwrap_err();
        assert!(matches!(err, BootstrapError::TypeMismatch { .. }));
    }

    #[test]
    fn unknown_client_auth_names_the_input() {
        let err = "sometimes".parse::<SslClientAuth>().unwrap_err();
        assert!(err.to_string().contains("\"sometimes\""));
    }

    #[test]
    fn builder_debug_lists_set_properties() {
        let builder = Configuration::builder().port(8080).property("custom.key", Some("v".into()));
        let rendered = format!("{builder:?}");
        assert!(rendered.contains("\"port\": 8080"), "{rendered}");
        assert!(rendered.contains("\"custom.key\": \"v\""), "{rendered}");
    }

    #[test]
    fn to_builder_keeps_explicit_entries() {
        let original = Configuration::builder()
            .host("127.0.0.1")
            .property("custom.flag", Some(Value::from(true)))
            .build();
        let bound = original.to_builder().port(41234).build();

        assert_eq!(bound.host(), "127.0.0.1");
        assert_eq!(bound.port(), 41234);
        assert_eq!(bound.get::<bool>("custom.flag").unwrap(), Some(true));
        assert_eq!(original.port(), -1);
    }

    #[test]
    fn ssl_context_material_is_typed() {
        let context = SslContext::new("test-keystore", vec![0u8; 4]);
        let config = Configuration::builder().ssl_context(context).build();
        let context = config.ssl_context();

        assert_eq!(context.name(), "test-keystore");
        assert_eq!(context.material::<Vec<u8>>().unwrap().map(Vec::len), Some(4));
        assert!(context.material::<String>().is_err());
        assert_eq!(SslContext::platform_default().material::<String>().unwrap(), None);
    }

    #[test]
    fn client_auth_parses_case_insensitively() {
        assert_eq!("optional".parse::<SslClientAuth>().unwrap(), SslClientAuth::Optional);
        assert_eq!("MANDATORY".parse::<SslClientAuth>().unwrap(), SslClientAuth::Mandatory);
        assert!("sometimes".parse::<SslClientAuth>().is_err());
        assert_eq!(SslClientAuth::None.to_string(), "NONE");
    }
}
