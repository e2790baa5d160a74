//! Remora Core - remote service registry and invocation listener.
//!
//! A service is exported by describing its contract, binding an
//! implementation to a typed method table and registering both. The frozen
//! registry is shared with a [`Dispatcher`], which the
//! [`InvocationListener`] feeds with requests read from TCP connections.
//!
//! # Example
//!
//! ```rust,ignore
//! use remora_core::{
//!     Dispatcher, InvocationListener, MethodSignature, ServerConfig, ServiceBinding,
//!     ServiceDescriptor, ServiceError, ServiceRegistry, ValueType,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> remora_core::Result<()> {
//!     let descriptor = ServiceDescriptor::builder("greeter")
//!         .method(
//!             MethodSignature::new("greet")
//!                 .param("name", ValueType::String)
//!                 .returns(ValueType::String),
//!         )
//!         .build()?;
//!     let binding = ServiceBinding::builder(Arc::new(()))
//!         .method("greet", |_: Arc<()>, (name,): (String,)| async move {
//!             Ok::<_, ServiceError>(format!("hello {}", name))
//!         })
//!         .build();
//!
//!     let mut registry = ServiceRegistry::new();
//!     registry.register(descriptor, binding)?;
//!
//!     let config = ServerConfig::default();
//!     let dispatcher = Arc::new(Dispatcher::new(Arc::new(registry), config.call_timeout));
//!     let handle = InvocationListener::bind(&config, dispatcher).await?;
//!     println!("Serving on {}", handle.addr());
//!     Ok(())
//! }
//! ```

pub mod binding;
pub mod client;
pub mod config;
pub mod contract;
pub mod dispatcher;
pub mod error;
pub mod listener;
pub mod protocol;
pub mod registry;

pub use binding::{ServiceBinding, ServiceBindingBuilder, ServiceError};
pub use client::RemoteClient;
pub use config::{ExporterDefaults, ServerConfig};
pub use contract::{MethodSignature, Param, ServiceDescriptor, ValueType};
pub use dispatcher::Dispatcher;
pub use error::{RemotingError, Result};
pub use listener::{InvocationListener, ListenerHandle};
pub use protocol::{Failure, FailureKind, InvocationRequest, InvocationResponse};
pub use registry::{RegisteredService, ServiceRegistry};
