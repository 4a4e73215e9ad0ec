// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::handlers::Handlers;
use crate::http_utils::MAX_REQUEST_CONTENT_LENGTH;
use hyper::{body::Incoming, Request};
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use telemetry_store::{Checkpointer, Storage};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

pub struct CollectorServer {
    listener: TcpListener,
    storage: Arc<dyn Storage>,
    key: Option<String>,
    max_body_size: usize,
}

impl CollectorServer {
    /// Opens the configured storage and binds the configured address.
    pub async fn open(config: &ServerConfig) -> Result<Self, ServerError> {
        let storage = config.storage_config().open().await?;
        let server = Self::bind(&config.address, storage, config.key.clone()).await?;
        Ok(server.with_max_body_size(config.max_request_content_length))
    }

    pub async fn bind(
        address: &str,
        storage: Arc<dyn Storage>,
        key: Option<String>,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(address)
            .await
            .map_err(|source| ServerError::Bind {
                address: address.to_string(),
                source,
            })?;
        Ok(CollectorServer {
            listener,
            storage,
            key,
            max_body_size: MAX_REQUEST_CONTENT_LENGTH,
        })
    }

    #[must_use]
    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves until `cancel` fires. Shutdown stops accepting, drains open
    /// connections, stops the checkpointer and finally closes the storage.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), ServerError> {
        let CollectorServer {
            listener,
            storage,
            key,
            max_body_size,
        } = self;

        let checkpointer = Arc::clone(&storage)
            .periodic_flush()
            .map(|flush| Checkpointer::start(flush, cancel.child_token()));

        let handlers = Handlers::new(Arc::clone(&storage), key).with_max_body_size(max_body_size);
        let server = hyper::server::conn::http1::Builder::new();
        let graceful = GracefulShutdown::new();
        if let Ok(addr) = listener.local_addr() {
            info!("Collector listening on {addr}");
        }

        let result = loop {
            let conn = tokio::select! {
                () = cancel.cancelled() => break Ok(()),
                con_res = listener.accept() => match con_res {
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::ConnectionAborted
                                | io::ErrorKind::ConnectionReset
                                | io::ErrorKind::ConnectionRefused
                        ) =>
                    {
                        continue;
                    }
                    Err(e) => {
                        error!("Server error: {e}");
                        break Err(ServerError::Accept(e));
                    }
                    Ok((conn, _)) => conn,
                },
            };

            let handlers = handlers.clone();
            let service = hyper::service::service_fn(move |req: Request<Incoming>| {
                let handlers = handlers.clone();
                async move { Ok::<_, Infallible>(handlers.handle(req).await) }
            });
            let conn = graceful.watch(server.serve_connection(TokioIo::new(conn), service));
            tokio::spawn(async move {
                if let Err(e) = conn.await {
                    debug!("Connection error: {e}");
                }
            });
        };

        drop(listener);
        info!("Draining connections");
        if tokio::time::timeout(DRAIN_TIMEOUT, graceful.shutdown())
            .await
            .is_err()
        {
            warn!("Timed out waiting for connections to close");
        }
        if let Some(checkpointer) = checkpointer {
            checkpointer.stop().await;
        }
        storage.close().await;
        info!("Collector stopped");
        result
    }
}
