// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use tracing::{error, info};

/// Resolves on SIGINT, or on SIGTERM where the platform has it.
pub async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                error!("Unable to listen for SIGTERM: {e}");
                ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            () = ctrl_c() => {},
            _ = sigterm.recv() => info!("Received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    ctrl_c().await;
}

async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received interrupt"),
        Err(e) => {
            error!("Unable to listen for interrupt: {e}");
            std::future::pending::<()>().await;
        }
    }
}
