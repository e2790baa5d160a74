//! Startup wiring: implementation, contract, registry, listener.
//!
//! Everything the process serves is built here in one place and handed down
//! explicitly; there is no global registry.

use crate::admin::{start_admin_server, AdminHandle};
use crate::user_service::{user_service_binding, user_service_descriptor, UserService};
use remora_core::{
    Dispatcher, InvocationListener, ListenerHandle, ServerConfig, ServiceRegistry,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// What to export and where.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub server: ServerConfig,
    /// Name remote callers use to address the user service.
    pub service_name: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            service_name: remora_core::ExporterDefaults::SERVICE_NAME.to_string(),
        }
    }
}

/// A bound exporter. Dropping it shuts the listener (and admin endpoint) down.
pub struct RunningExporter {
    pub registry: Arc<ServiceRegistry>,
    pub listener: ListenerHandle,
    admin: Option<AdminHandle>,
}

impl RunningExporter {
    pub fn addr(&self) -> SocketAddr {
        self.listener.addr()
    }

    /// Serve `/health` and `/services` on `port`, same host as the listener.
    ///
    /// The endpoint stops together with the exporter.
    pub async fn serve_admin(&mut self, port: u16) -> anyhow::Result<SocketAddr> {
        if let Some(admin) = &self.admin {
            return Ok(admin.addr());
        }
        let admin = start_admin_server(self.registry.clone(), self.addr().ip(), port).await?;
        let addr = admin.addr();
        self.admin = Some(admin);
        Ok(addr)
    }

    pub fn admin_addr(&self) -> Option<SocketAddr> {
        self.admin.as_ref().map(AdminHandle::addr)
    }

    /// Stop accepting and wait for in-flight calls to finish.
    pub async fn shutdown(self) {
        let RunningExporter {
            listener, admin, ..
        } = self;
        if let Some(admin) = admin {
            admin.shutdown_and_wait().await;
        }
        listener.shutdown_and_wait().await;
    }
}

/// Register `service` as `config.service_name` and start serving it.
///
/// Registration and bind failures are returned before anything is served.
pub async fn export_user_service<S: UserService + 'static>(
    config: &ExportConfig,
    service: Arc<S>,
) -> remora_core::Result<RunningExporter> {
    let mut registry = ServiceRegistry::new();
    registry.register(
        user_service_descriptor(&config.service_name)?,
        user_service_binding(service),
    )?;
    let registry = Arc::new(registry);

    let dispatcher = Arc::new(Dispatcher::new(
        registry.clone(),
        config.server.call_timeout,
    ));
    let listener = InvocationListener::bind(&config.server, dispatcher).await?;

    info!(
        "Exported {} at remora://{}/{}",
        config.service_name,
        listener.addr(),
        config.service_name
    );

    Ok(RunningExporter {
        registry,
        listener,
        admin: None,
    })
}
