//! Service registry: service name to (descriptor, binding).
//!
//! Populated through `&mut self` during startup, then frozen behind an `Arc`
//! and shared with the dispatcher. Nothing mutates it afterwards, so lookups
//! from concurrent connections take no locks.

use crate::binding::ServiceBinding;
use crate::contract::ServiceDescriptor;
use crate::{RemotingError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// A registered service.
#[derive(Debug, Clone)]
pub struct RegisteredService {
    pub descriptor: Arc<ServiceDescriptor>,
    pub binding: Arc<ServiceBinding>,
}

#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: HashMap<String, RegisteredService>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service under its descriptor's name.
    ///
    /// Fails with `DuplicateService` if the name is taken (the existing entry
    /// is left untouched) and with `InvalidDescriptor` if the descriptor and
    /// the binding's method table disagree.
    pub fn register(
        &mut self,
        descriptor: impl Into<Arc<ServiceDescriptor>>,
        binding: impl Into<Arc<ServiceBinding>>,
    ) -> Result<()> {
        let descriptor = descriptor.into();
        let binding = binding.into();
        let name = descriptor.name().to_string();

        if self.services.contains_key(&name) {
            return Err(RemotingError::DuplicateService { name });
        }

        for method in descriptor.methods() {
            if !binding.handles(&method.name) {
                return Err(RemotingError::InvalidDescriptor {
                    service: name,
                    message: format!("no handler bound for {}", method),
                });
            }
        }

        if let Some(extra) = binding
            .method_names()
            .into_iter()
            .find(|m| descriptor.method(m).is_none())
        {
            return Err(RemotingError::InvalidDescriptor {
                service: name,
                message: format!("handler {} is not declared in the contract", extra),
            });
        }

        info!(
            "Registered service {} v{} ({} methods, {})",
            name,
            descriptor.version(),
            descriptor.methods().len(),
            binding.type_name()
        );

        self.services
            .insert(name, RegisteredService { descriptor, binding });
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<&RegisteredService> {
        self.services
            .get(name)
            .ok_or_else(|| RemotingError::UnknownService {
                name: name.to_string(),
            })
    }

    /// Registered service names in sorted order.
    pub fn service_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.services.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Descriptors of all services, sorted by name.
    pub fn descriptors(&self) -> Vec<Arc<ServiceDescriptor>> {
        self.service_names()
            .into_iter()
            .filter_map(|name| self.services.get(name))
            .map(|service| service.descriptor.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
