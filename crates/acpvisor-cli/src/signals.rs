//! Process signals driving `acpvisor run`

use tokio::signal;
use tracing::{error, info};

/// Resolves on SIGTERM or Ctrl+C
pub async fn shutdown() {
    let sigint = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        _ = sigterm => info!("Received SIGTERM signal"),
        _ = sigint => info!("Received SIGINT signal (Ctrl+C)"),
    }
}

/// Stream of SIGHUP deliveries; never fires off unix
pub struct Hangup {
    #[cfg(unix)]
    stream: Option<signal::unix::Signal>,
}

impl Hangup {
    pub fn install() -> Self {
        #[cfg(unix)]
        {
            let stream = match signal::unix::signal(signal::unix::SignalKind::hangup()) {
                Ok(stream) => Some(stream),
                Err(e) => {
                    error!("Failed to install SIGHUP handler, reload disabled: {}", e);
                    None
                }
            };
            Self { stream }
        }
        #[cfg(not(unix))]
        {
            Self {}
        }
    }

    pub async fn recv(&mut self) {
        #[cfg(unix)]
        {
            let delivered = match self.stream.as_mut() {
                Some(stream) => stream.recv().await.is_some(),
                None => false,
            };
            if delivered {
                return;
            }
            self.stream = None;
        }
        std::future::pending::<()>().await
    }
}
