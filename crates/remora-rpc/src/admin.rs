//! HTTP admin endpoint using Axum.
//!
//! Read-only introspection next to the invocation listener: a health probe
//! and the list of exported contracts. Calls are never served here.

use axum::{extract::State, routing::get, Json, Router};
use remora_core::{ServiceDescriptor, ServiceRegistry};
use serde_json::{json, Value};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

const MAX_CONCURRENT_REQUESTS: usize = 16;

pub fn admin_router(registry: Arc<ServiceRegistry>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/services", get(handle_services))
        .layer(ConcurrencyLimitLayer::new(MAX_CONCURRENT_REQUESTS))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(registry)
}

/// Handle to a running admin server. Dropping it signals shutdown.
pub struct AdminHandle {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task_handle: Option<JoinHandle<()>>,
}

impl AdminHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Stop serving and wait for open requests to finish.
    pub async fn shutdown_and_wait(mut self) {
        self.shutdown();
        if let Some(handle) = self.task_handle.take() {
            if let Err(e) = handle.await {
                error!("Admin server task failed: {}", e);
            }
        }
    }
}

impl Drop for AdminHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Start the admin server in the background.
///
/// The handle reports the actual bound address (useful when port=0).
pub async fn start_admin_server(
    registry: Arc<ServiceRegistry>,
    host: IpAddr,
    port: u16,
) -> anyhow::Result<AdminHandle> {
    let addr = SocketAddr::new(host, port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Admin endpoint listening on {}", actual_addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let app = admin_router(registry);
    let task_handle = tokio::spawn(async move {
        let served = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        });
        if let Err(e) = served.await {
            error!("Admin server error: {}", e);
        }
        info!("Admin endpoint on {} stopped", actual_addr);
    });

    Ok(AdminHandle {
        addr: actual_addr,
        shutdown_tx: Some(shutdown_tx),
        task_handle: Some(task_handle),
    })
}

pub async fn handle_health(State(registry): State<Arc<ServiceRegistry>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "services": registry.len(),
    }))
}

pub async fn handle_services(
    State(registry): State<Arc<ServiceRegistry>>,
) -> Json<Vec<ServiceDescriptor>> {
    Json(
        registry
            .descriptors()
            .iter()
            .map(|d| d.as_ref().clone())
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user_service::{user_service_binding, user_service_descriptor, InMemoryUserService};
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn registry() -> Arc<ServiceRegistry> {
        let mut registry = ServiceRegistry::new();
        registry
            .register(
                user_service_descriptor("userService").unwrap(),
                user_service_binding(Arc::new(InMemoryUserService::new())),
            )
            .unwrap();
        Arc::new(registry)
    }

    #[tokio::test]
    async fn test_health_reports_service_count() {
        let Json(body) = handle_health(State(registry())).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["services"], 1);
    }

    #[tokio::test]
    async fn test_services_lists_contracts() {
        let Json(descriptors) = handle_services(State(registry())).await;
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].name(), "userService");
        assert!(descriptors[0].method("findById").is_some());
    }

    #[tokio::test]
    async fn test_admin_server_starts_and_stops() {
        let admin = start_admin_server(registry(), IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
            .await
            .unwrap();
        let addr = admin.addr();
        assert!(addr.port() > 0);
        assert!(tokio::net::TcpStream::connect(addr).await.is_ok());

        tokio::time::timeout(std::time::Duration::from_secs(5), admin.shutdown_and_wait())
            .await
            .expect("graceful shutdown should finish");
        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_admin_server_on_ipv6_loopback() {
        // Hosts without IPv6 cannot bind ::1 at all.
        if std::net::TcpListener::bind((Ipv6Addr::LOCALHOST, 0)).is_err() {
            return;
        }

        let admin = start_admin_server(registry(), IpAddr::V6(Ipv6Addr::LOCALHOST), 0)
            .await
            .unwrap();
        assert!(admin.addr().is_ipv6());
        admin.shutdown_and_wait().await;
    }
}
