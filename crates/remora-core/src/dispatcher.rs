//! Call dispatcher.
//!
//! Resolves a request against the registry, checks its arguments against the
//! method's signature and runs the bound handler under the per-call timeout.
//! Every per-call error ends up in the returned response; `dispatch` never
//! fails and never unwinds into the listener.

use crate::protocol::{InvocationRequest, InvocationResponse};
use crate::registry::ServiceRegistry;
use crate::{RemotingError, Result};
use futures::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<ServiceRegistry>,
    call_timeout: Duration,
}

impl Dispatcher {
    pub fn new(registry: Arc<ServiceRegistry>, call_timeout: Duration) -> Self {
        Self {
            registry,
            call_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Dispatch one request and build its response.
    pub async fn dispatch(&self, request: InvocationRequest) -> InvocationResponse {
        let id = request.id;
        let service = request.service.clone();
        let method = request.method.clone();
        let started = Instant::now();

        match self.invoke(request).await {
            Ok(result) => {
                debug!(
                    "{}.{} completed in {:?}",
                    service,
                    method,
                    started.elapsed()
                );
                InvocationResponse::success(id, result)
            }
            Err(e) => {
                warn!("{}.{} failed after {:?}: {}", service, method, started.elapsed(), e);
                InvocationResponse::from_error(id, &e)
            }
        }
    }

    async fn invoke(&self, request: InvocationRequest) -> Result<Value> {
        let InvocationRequest {
            service,
            method,
            args,
            ..
        } = request;

        let target = self.registry.lookup(&service)?;

        let signature = target
            .descriptor
            .method(&method)
            .ok_or_else(|| RemotingError::UnknownMethod {
                service: service.clone(),
                method: method.clone(),
            })?;
        signature.check_args(&args)?;

        // Registration guarantees a handler for every declared method.
        let call = target
            .binding
            .invoke(&method, args)
            .ok_or_else(|| RemotingError::UnknownMethod {
                service: service.clone(),
                method: method.clone(),
            })?;

        match tokio::time::timeout(self.call_timeout, AssertUnwindSafe(call).catch_unwind()).await
        {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => Err(RemotingError::Application {
                message: format!("{} panicked: {}", method, panic_message(&*panic)),
                data: None,
            }),
            Err(_) => Err(RemotingError::Timeout(self.call_timeout)),
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
