//! TCP client for calling exported services.
//!
//! # Thread Safety
//!
//! The client uses a tokio `Mutex` to serialize access to the TCP stream,
//! allowing safe concurrent use from multiple async tasks.
//!
//! # Cancellation
//!
//! Each request/response exchange runs in its own task that owns the stream
//! lock. Dropping a `call` future abandons the result but the exchange still
//! completes, so the stream never holds a response nobody reads.

use crate::config::ExporterDefaults;
use crate::protocol::{
    decode_response, encode_request, read_frame, write_frame, InvocationRequest,
    InvocationResponse,
};
use crate::{RemotingError, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug)]
pub struct RemoteClient {
    stream: Arc<Mutex<TcpStream>>,
    addr: SocketAddr,
    next_id: AtomicU64,
    max_frame_size: usize,
}

impl RemoteClient {
    /// Connect to a listener, giving up after `ExporterDefaults::CONNECT_TIMEOUT`.
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = tokio::time::timeout(ExporterDefaults::CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| RemotingError::ConnectionLost { addr })?
            .map_err(|_| RemotingError::ConnectionLost { addr })?;

        debug!("Client connected to {}", addr);

        Ok(Self {
            stream: Arc::new(Mutex::new(stream)),
            addr,
            next_id: AtomicU64::new(1),
            max_frame_size: ExporterDefaults::MAX_FRAME_SIZE,
        })
    }

    /// Call `service.method(args)` and return the raw result.
    ///
    /// A failure response comes back as the matching `RemotingError` variant;
    /// a broken connection is `ConnectionLost`.
    pub async fn call(&self, service: &str, method: &str, args: Vec<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = InvocationRequest::new(service, method, args).with_id(id);
        let request_bytes = encode_request(&request)?;

        let stream = self.stream.clone().lock_owned().await;
        let addr = self.addr;
        let max_frame_size = self.max_frame_size;

        let response = tokio::spawn(async move {
            let mut stream = stream;
            exchange(&mut stream, &request_bytes, max_frame_size, addr).await
        })
        .await
        .map_err(|_| self.lost())??;

        if response.id != Some(id) {
            return Err(RemotingError::Protocol {
                message: format!("Response id {:?} does not match request {}", response.id, id),
            });
        }

        if let Some(failure) = response.error {
            return Err(RemotingError::from_failure(failure, service, method));
        }

        response
            .result
            .ok_or_else(|| RemotingError::Protocol {
                message: "Response carries neither result nor error".to_string(),
            })
    }

    /// Call and decode the result into `T`.
    pub async fn call_as<T: DeserializeOwned>(
        &self,
        service: &str,
        method: &str,
        args: Vec<Value>,
    ) -> Result<T> {
        let value = self.call(service, method, args).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Address of the listener this client talks to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    fn lost(&self) -> RemotingError {
        RemotingError::ConnectionLost { addr: self.addr }
    }
}

/// Write one request frame and read its response frame.
async fn exchange(
    stream: &mut TcpStream,
    request_bytes: &[u8],
    max_frame_size: usize,
    addr: SocketAddr,
) -> Result<InvocationResponse> {
    let lost = || RemotingError::ConnectionLost { addr };
    let (mut reader, mut writer) = stream.split();

    write_frame(&mut writer, request_bytes)
        .await
        .map_err(|_| lost())?;

    let response_bytes = read_frame(&mut reader, max_frame_size)
        .await
        .map_err(|_| lost())?
        .ok_or_else(lost)?;

    decode_response(&response_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{ServiceBinding, ServiceError};
    use crate::config::ServerConfig;
    use crate::contract::{MethodSignature, ServiceDescriptor, ValueType};
    use crate::dispatcher::Dispatcher;
    use crate::listener::{InvocationListener, ListenerHandle};
    use crate::registry::ServiceRegistry;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    struct Math;

    async fn start_math() -> ListenerHandle {
        let descriptor = ServiceDescriptor::builder("math")
            .method(MethodSignature::new("ping").returns(ValueType::String))
            .method(
                MethodSignature::new("add")
                    .param("a", ValueType::Int)
                    .param("b", ValueType::Int)
                    .returns(ValueType::Int),
            )
            .method(
                MethodSignature::new("sleep")
                    .param("millis", ValueType::Int)
                    .returns(ValueType::Int),
            )
            .method(
                MethodSignature::new("divide")
                    .param("a", ValueType::Int)
                    .param("b", ValueType::Int)
                    .returns(ValueType::Int),
            )
            .build()
            .unwrap();
        let binding = ServiceBinding::builder(Arc::new(Math))
            .method("ping", |_m: Arc<Math>, (): ()| async move {
                Ok::<_, ServiceError>("pong")
            })
            .method("add", |_m: Arc<Math>, (a, b): (i64, i64)| async move {
                Ok::<_, ServiceError>(a + b)
            })
            .method("sleep", |_m: Arc<Math>, (millis,): (u64,)| async move {
                tokio::time::sleep(Duration::from_millis(millis)).await;
                Ok::<_, ServiceError>(millis)
            })
            .method("divide", |_m: Arc<Math>, (a, b): (i64, i64)| async move {
                if b == 0 {
                    return Err(ServiceError::new("division by zero"));
                }
                Ok(a / b)
            })
            .build();

        let mut registry = ServiceRegistry::new();
        registry.register(descriptor, binding).unwrap();
        let dispatcher = Arc::new(Dispatcher::new(Arc::new(registry), Duration::from_secs(5)));
        InvocationListener::bind(&ServerConfig::ephemeral(), dispatcher)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_client_call_success() {
        let mut handle = start_math().await;
        let client = RemoteClient::connect(handle.addr()).await.unwrap();

        let result = client.call("math", "ping", vec![]).await.unwrap();
        assert_eq!(result, json!("pong"));

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_client_call_as_typed() {
        let mut handle = start_math().await;
        let client = RemoteClient::connect(handle.addr()).await.unwrap();

        let sum: i64 = client
            .call_as("math", "add", vec![json!(3), json!(4)])
            .await
            .unwrap();
        assert_eq!(sum, 7);

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_client_maps_failures_to_errors() {
        let mut handle = start_math().await;
        let client = RemoteClient::connect(handle.addr()).await.unwrap();

        match client.call("math", "divide", vec![json!(1), json!(0)]).await {
            Err(RemotingError::Application { message, .. }) => {
                assert_eq!(message, "division by zero")
            }
            other => panic!("Expected Application, got: {:?}", other),
        }
        assert!(matches!(
            client.call("math", "sqrt", vec![]).await,
            Err(RemotingError::UnknownMethod { .. })
        ));
        assert!(matches!(
            client.call("ghost", "x", vec![]).await,
            Err(RemotingError::UnknownService { .. })
        ));

        // Still usable after failures.
        assert_eq!(client.call("math", "ping", vec![]).await.unwrap(), json!("pong"));

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_client_recovers_after_cancelled_call() {
        let mut handle = start_math().await;
        let client = RemoteClient::connect(handle.addr()).await.unwrap();

        let cancelled =
            tokio::time::timeout(Duration::from_millis(20), client.call("math", "sleep", vec![json!(200)]))
                .await;
        assert!(cancelled.is_err());

        for _ in 0..3 {
            let slept = client.call("math", "sleep", vec![json!(1)]).await.unwrap();
            assert_eq!(slept, json!(1));
        }
        assert_eq!(client.call("math", "ping", vec![]).await.unwrap(), json!("pong"));

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_client_connect_to_dead_server_returns_connection_lost() {
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        match RemoteClient::connect(addr).await {
            Err(RemotingError::ConnectionLost { addr: lost }) => assert_eq!(lost.port(), 1),
            other => panic!("Expected ConnectionLost, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_client_detects_server_shutdown() {
        let mut handle = start_math().await;
        let client = RemoteClient::connect(handle.addr()).await.unwrap();

        assert!(client.call("math", "ping", vec![]).await.is_ok());

        handle.shutdown();

        // Retry until the server is fully closed (up to 1s)
        let mut detected_shutdown = false;
        for _ in 0..20 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if client.call("math", "ping", vec![]).await.is_err() {
                detected_shutdown = true;
                break;
            }
        }
        assert!(detected_shutdown, "Client should detect server shutdown");
    }
}
