//! TCP invocation listener.
//!
//! Binds the configured address, accepts connections and runs one task per
//! connection. Each task reads request frames, hands them to the
//! [`Dispatcher`] and writes the response frame back; the connection stays
//! open until the peer closes it or the listener shuts down.
//!
//! # Backpressure
//!
//! A semaphore caps live connections at `max_connections`. The accept loop
//! takes a permit before accepting, so excess peers wait in the OS backlog
//! instead of being accepted and dropped.
//!
//! # Shutdown
//!
//! [`ListenerHandle::shutdown`] stops the accept loop and tells connection
//! tasks to stop reading. A call already being dispatched runs to completion
//! and its response is written before the connection closes.

use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::protocol::{decode_request, encode_response, read_frame, write_frame, InvocationResponse};
use crate::{RemotingError, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Handle to a running listener. Dropping it signals shutdown.
pub struct ListenerHandle {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    conn_shutdown_tx: watch::Sender<bool>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl ListenerHandle {
    /// Address the listener is bound to (reports the real port for port 0).
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Stop accepting and signal connections to close after their current
    /// call.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = self.conn_shutdown_tx.send(true);
    }

    /// Wait until the accept loop and every connection task have finished.
    ///
    /// Only returns after [`shutdown`](Self::shutdown) has been called (or
    /// the accept loop died).
    pub async fn wait(mut self) {
        if let Some(handle) = self.task_handle.take() {
            if let Err(e) = handle.await {
                error!("Listener task failed: {}", e);
            }
        }
    }

    /// Shut down and wait for in-flight calls to drain.
    pub async fn shutdown_and_wait(mut self) {
        self.shutdown();
        self.wait().await;
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Accepts connections and feeds their requests to a dispatcher.
pub struct InvocationListener;

impl InvocationListener {
    /// Bind `config.host:config.port` and start serving in background tasks.
    ///
    /// Fails with `InvalidConfig` for limits the listener cannot honor and with
    /// `Bind` if the address is unavailable; nothing is served in either case.
    pub async fn bind(config: &ServerConfig, dispatcher: Arc<Dispatcher>) -> Result<ListenerHandle> {
        config.validate()?;

        let requested = config.socket_addr();
        let listener = TcpListener::bind(requested)
            .await
            .map_err(|source| RemotingError::Bind {
                addr: requested,
                source,
            })?;
        let addr = listener.local_addr()?;

        info!(
            "Listening on {} ({} services)",
            addr,
            dispatcher.registry().len()
        );

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (conn_shutdown_tx, conn_shutdown_rx) = watch::channel(false);

        let task_handle = tokio::spawn(Self::accept_loop(
            listener,
            dispatcher,
            config.clone(),
            shutdown_rx,
            conn_shutdown_rx,
        ));

        Ok(ListenerHandle {
            addr,
            shutdown_tx: Some(shutdown_tx),
            conn_shutdown_tx,
            task_handle: Some(task_handle),
        })
    }

    async fn accept_loop(
        listener: TcpListener,
        dispatcher: Arc<Dispatcher>,
        config: ServerConfig,
        mut shutdown_rx: oneshot::Receiver<()>,
        conn_shutdown_rx: watch::Receiver<bool>,
    ) {
        let permits = Arc::new(Semaphore::new(config.max_connections));
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    info!("Listener on {:?} shutting down", listener.local_addr().ok());
                    break;
                }
                Some(finished) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = finished {
                        error!("Connection task failed: {}", e);
                    }
                }
                permit = permits.clone().acquire_owned() => {
                    let Ok(permit) = permit else { break };

                    // Give the permit back if shutdown wins the race.
                    let accept_result = tokio::select! {
                        _ = &mut shutdown_rx => {
                            info!("Listener on {:?} shutting down", listener.local_addr().ok());
                            break;
                        }
                        result = listener.accept() => result,
                    };

                    match accept_result {
                        Ok((stream, peer_addr)) => {
                            let dispatcher = dispatcher.clone();
                            let mut conn_shutdown = conn_shutdown_rx.clone();
                            let max_frame_size = config.max_frame_size;

                            connections.spawn(async move {
                                let _permit = permit;
                                debug!("Connection from {}", peer_addr);
                                if let Err(e) = Self::handle_connection(
                                    stream,
                                    &dispatcher,
                                    &mut conn_shutdown,
                                    max_frame_size,
                                )
                                .await
                                {
                                    debug!("Connection {} ended: {}", peer_addr, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
            }
        }

        // Stop accepting before draining so no new peer slips in.
        drop(listener);

        while let Some(finished) = connections.join_next().await {
            if let Err(e) = finished {
                error!("Connection task failed: {}", e);
            }
        }
        debug!("All connections drained");
    }

    async fn handle_connection(
        mut stream: TcpStream,
        dispatcher: &Dispatcher,
        shutdown_rx: &mut watch::Receiver<bool>,
        max_frame_size: usize,
    ) -> Result<()> {
        let (mut reader, mut writer) = stream.split();

        loop {
            if *shutdown_rx.borrow() {
                return Ok(());
            }

            // Wait for either a frame or a shutdown signal
            let frame = tokio::select! {
                result = read_frame(&mut reader, max_frame_size) => {
                    match result {
                        Ok(Some(f)) => f,
                        Ok(None) => return Ok(()), // Clean disconnect
                        Err(e @ RemotingError::Protocol { .. }) => {
                            // The stream cannot be resynced after a bad frame.
                            warn!("Closing connection after bad frame: {}", e);
                            let response = InvocationResponse::from_error(None, &e);
                            let _ = write_frame(&mut writer, &encode_response(&response)?).await;
                            return Err(e);
                        }
                        Err(e) => return Err(e),
                    }
                }
                _ = shutdown_rx.changed() => {
                    return Ok(()); // Listener shutting down
                }
            };

            let response = match decode_request(&frame) {
                Ok(request) => dispatcher.dispatch(request).await,
                Err(e) => {
                    warn!("Rejecting request: {}", e);
                    InvocationResponse::from_error(None, &e)
                }
            };

            write_frame(&mut writer, &encode_response(&response)?).await?;
        }
    }
}
