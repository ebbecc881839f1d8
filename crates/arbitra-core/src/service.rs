//! Consensus service
//!
//! A tokio task that owns the submission inbox for all disputed agreements.
//! Oracles and finalizers talk to it through a cloneable `ConsensusHandle`;
//! every request is answered on a oneshot channel and every client wait is
//! bounded by the configured request timeout. Between requests the task
//! sweeps rounds whose deadline has passed and marks them stalled.

use std::sync::Arc;
use std::time::Duration;

use arbitra_types::{AccountId, ProtocolError};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::consensus::{OracleSubmission, Resolution, SubmissionReceipt};
use crate::protocol::Protocol;

const INBOX_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("no reply within {ms}ms")]
    Timeout { ms: u64 },
    #[error("consensus service is not running")]
    Closed,
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

enum Command {
    Submit {
        submission: OracleSubmission,
        reply: oneshot::Sender<Result<SubmissionReceipt, ProtocolError>>,
    },
    Finalize {
        caller: AccountId,
        agreement: AccountId,
        reply: oneshot::Sender<Result<Resolution, ProtocolError>>,
    },
    Sweep {
        reply: oneshot::Sender<Vec<AccountId>>,
    },
    Shutdown,
}

/// Timing for the service loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceConfig {
    pub sweep_interval: Duration,
    pub request_timeout: Duration,
}

impl ServiceConfig {
    pub fn from_settings(settings: &crate::settings::ProtocolSettings) -> Self {
        Self {
            sweep_interval: Duration::from_secs(settings.sweep_interval_secs.max(1)),
            request_timeout: Duration::from_millis(settings.request_timeout_ms.max(1)),
        }
    }
}

/// The running service
pub struct ConsensusService {
    handle: ConsensusHandle,
    task: JoinHandle<()>,
}

impl ConsensusService {
    pub fn spawn(protocol: Arc<Protocol>, config: ServiceConfig) -> Self {
        let (tx, mut rx) = mpsc::channel::<Command>(INBOX_CAPACITY);
        let sweep_interval = config.sweep_interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            // The first tick completes immediately
            ticker.tick().await;
            info!(interval_ms = sweep_interval.as_millis() as u64, "consensus service started");

            loop {
                tokio::select! {
                    command = rx.recv() => {
                        match command {
                            Some(Command::Submit { submission, reply }) => {
                                let _ = reply.send(protocol.submit_score(submission).await);
                            }
                            Some(Command::Finalize { caller, agreement, reply }) => {
                                let _ = reply.send(protocol.finalize_dispute(caller, agreement).await);
                            }
                            Some(Command::Sweep { reply }) => {
                                let _ = reply.send(protocol.sweep_stalled().await);
                            }
                            Some(Command::Shutdown) | None => break,
                        }
                    }
                    _ = ticker.tick() => {
                        let stalled = protocol.sweep_stalled().await;
                        if !stalled.is_empty() {
                            debug!(count = stalled.len(), "sweep marked stalled rounds");
                        }
                    }
                }
            }
            info!("consensus service stopped");
        });

        Self {
            handle: ConsensusHandle {
                tx,
                timeout: config.request_timeout,
            },
            task,
        }
    }

    pub fn handle(&self) -> ConsensusHandle {
        self.handle.clone()
    }

    /// Stop the loop and wait for it to exit
    pub async fn shutdown(self) {
        let _ = self.handle.tx.send(Command::Shutdown).await;
        let _ = self.task.await;
    }
}

/// Client side of the service
#[derive(Clone)]
pub struct ConsensusHandle {
    tx: mpsc::Sender<Command>,
    timeout: Duration,
}

impl ConsensusHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> ServiceResult<T> {
        let (reply, rx) = oneshot::channel();
        let ms = self.timeout.as_millis() as u64;
        tokio::time::timeout(self.timeout, self.tx.send(build(reply)))
            .await
            .map_err(|_| ServiceError::Timeout { ms })?
            .map_err(|_| ServiceError::Closed)?;
        tokio::time::timeout(self.timeout, rx)
            .await
            .map_err(|_| ServiceError::Timeout { ms })?
            .map_err(|_| ServiceError::Closed)
    }

    pub async fn submit(&self, submission: OracleSubmission) -> ServiceResult<SubmissionReceipt> {
        let result = self
            .request(|reply| Command::Submit { submission, reply })
            .await?;
        Ok(result?)
    }

    pub async fn finalize(&self, caller: AccountId, agreement: AccountId) -> ServiceResult<Resolution> {
        let result = self
            .request(|reply| Command::Finalize {
                caller,
                agreement,
                reply,
            })
            .await?;
        Ok(result?)
    }

    /// Run a sweep now instead of waiting for the next tick
    pub async fn sweep(&self) -> ServiceResult<Vec<AccountId>> {
        self.request(|reply| Command::Sweep { reply }).await
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
