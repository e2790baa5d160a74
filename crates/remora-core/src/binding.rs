//! Typed method tables for service implementations.
//!
//! A [`ServiceBinding`] pairs an implementation object with a table mapping
//! method names to handler closures. The table is built once, before the
//! binding is registered; calls look the handler up by name and never touch
//! the implementation's type again.
//!
//! # Example
//!
//! ```rust,ignore
//! let binding = ServiceBinding::builder(Arc::new(Greeter))
//!     .method("greet", |svc: Arc<Greeter>, (name,): (String,)| async move {
//!         Ok::<_, ServiceError>(svc.greet(&name))
//!     })
//!     .build();
//! ```

use crate::{RemotingError, Result};
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

/// Failure raised by a service implementation.
///
/// Reaches the caller as an `Application` failure with the same message and
/// data.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ServiceError {
    pub message: String,
    pub data: Option<Value>,
}

impl ServiceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

impl From<String> for ServiceError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ServiceError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<ServiceError> for RemotingError {
    fn from(err: ServiceError) -> Self {
        RemotingError::Application {
            message: err.message,
            data: err.data,
        }
    }
}

/// Future returned by an erased handler.
pub type HandlerFuture = BoxFuture<'static, Result<Value>>;

type Handler = Arc<dyn Fn(Vec<Value>) -> HandlerFuture + Send + Sync>;

/// An implementation object and its method table.
pub struct ServiceBinding {
    implementation: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
    methods: HashMap<String, Handler>,
}

impl ServiceBinding {
    pub fn builder<S: Send + Sync + 'static>(implementation: Arc<S>) -> ServiceBindingBuilder<S> {
        ServiceBindingBuilder {
            implementation,
            methods: HashMap::new(),
        }
    }

    /// The bound implementation, if it is an `S`.
    pub fn implementation<S: Send + Sync + 'static>(&self) -> Option<Arc<S>> {
        self.implementation.clone().downcast::<S>().ok()
    }

    /// Rust type name of the implementation (for logs).
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn handles(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    /// Method names in sorted order.
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Start a call. `None` when the table has no handler for `method`.
    pub(crate) fn invoke(&self, method: &str, args: Vec<Value>) -> Option<HandlerFuture> {
        self.methods.get(method).map(|handler| handler(args))
    }
}

impl std::fmt::Debug for ServiceBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceBinding")
            .field("implementation", &self.type_name)
            .field("methods", &self.method_names())
            .finish()
    }
}

pub struct ServiceBindingBuilder<S> {
    implementation: Arc<S>,
    methods: HashMap<String, Handler>,
}

impl<S: Send + Sync + 'static> ServiceBindingBuilder<S> {
    /// Add a handler for `name`.
    ///
    /// `A` is the argument tuple decoded from the call's argument list
    /// (`()` for no arguments, `(i64,)` for one). A later handler for the same
    /// name replaces the earlier one.
    pub fn method<A, R, F, Fut>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(Arc<S>, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, ServiceError>> + Send + 'static,
    {
        let name = name.into();
        let method = name.clone();
        let implementation = self.implementation.clone();
        let handler = Arc::new(handler);

        let erased: Handler = Arc::new(move |args: Vec<Value>| -> HandlerFuture {
            let method = method.clone();
            let implementation = implementation.clone();
            let handler = handler.clone();
            Box::pin(async move {
                let decoded: A = decode_args(&method, args)?;
                let output = handler(implementation, decoded).await?;
                serde_json::to_value(output).map_err(|e| {
                    RemotingError::Other(format!("Failed to encode result of {}: {}", method, e))
                })
            })
        });

        self.methods.insert(name, erased);
        self
    }

    pub fn build(self) -> ServiceBinding {
        ServiceBinding {
            implementation: self.implementation,
            type_name: std::any::type_name::<S>(),
            methods: self.methods,
        }
    }
}

/// Decode the positional argument list into the handler's argument tuple.
fn decode_args<A: DeserializeOwned>(method: &str, args: Vec<Value>) -> Result<A> {
    let value = if args.is_empty() {
        Value::Null
    } else {
        Value::Array(args)
    };
    serde_json::from_value(value).map_err(|e| RemotingError::ArgumentMismatch {
        method: method.to_string(),
        message: e.to_string(),
    })
}
