use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::configuration::{SslClientAuth, SslContext};
use crate::error::BootstrapError;

/// An opaque, shareable value of any `'static` type.
///
/// Used for configuration properties and for provider native handles. The
/// stored type is fixed at construction; reading it back as a different type
/// is a [`BootstrapError::TypeMismatch`], never a conversion.
#[derive(Clone)]
pub struct Value {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Value {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Name of the stored type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<T: Any>(&self) -> bool {
        self.inner.is::<T>()
    }

    pub(crate) fn stored_type_id(&self) -> TypeId {
        (*self.inner).type_id()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Borrow the stored value as `T`, reporting a mismatch against `name`.
    pub fn cast<T: Any>(&self, name: &str) -> Result<&T, BootstrapError> {
        self.downcast_ref::<T>()
            .ok_or_else(|| BootstrapError::type_mismatch::<T>(name, self.type_name))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(s) = self.downcast_ref::<String>() {
            return write!(f, "{s:?}");
        }
        if let Some(n) = self.downcast_ref::<i32>() {
            return write!(f, "{n}");
        }
        if let Some(b) = self.downcast_ref::<bool>() {
            return write!(f, "{b}");
        }
        if let Some(auth) = self.downcast_ref::<SslClientAuth>() {
            return write!(f, "{auth:?}");
        }
        write!(f, "<{}>", self.type_name)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::new(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::new(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::new(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::new(value)
    }
}

impl From<SslClientAuth> for Value {
    fn from(value: SslClientAuth) -> Self {
        Value::new(value)
    }
}

impl From<SslContext> for Value {
    fn from(value: SslContext) -> Self {
        Value::new(value)
    }
}
