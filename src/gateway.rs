//! Storage gateway used by the panel.
//!
//! Wraps each content operation in one request/response exchange with the
//! background router. Calls made without a router link fail before anything
//! is sent; every reply wait is bounded by the configured timeout.

use std::time::Duration;

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::warn;

use crate::clock::SharedClock;
use crate::protocol::{
    CellSelection, ContentRecord, Origin, Request, ResetResult, Response, SaveResult,
};
use crate::router::{RouterHandle, TransportError};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Not in extension context")]
    ContextUnavailable,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("{0}")]
    Rejected(String),
    #[error("unexpected {kind} result: {source}")]
    BadResult {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Debug, Clone)]
pub struct StorageGateway {
    link: Option<RouterHandle>,
    timeout: Duration,
    clock: SharedClock,
    last_activity: Option<u64>,
}

impl StorageGateway {
    pub fn new(link: RouterHandle, timeout: Duration, clock: SharedClock) -> Self {
        Self {
            link: Some(link),
            timeout,
            clock,
            last_activity: None,
        }
    }

    /// A gateway outside any extension context; every call fails fast.
    pub fn detached(clock: SharedClock) -> Self {
        Self {
            link: None,
            timeout: Duration::ZERO,
            clock,
            last_activity: None,
        }
    }

    pub const fn is_available(&self) -> bool {
        self.link.is_some()
    }

    /// Clock time of the last operation that completed successfully.
    pub const fn last_activity(&self) -> Option<u64> {
        self.last_activity
    }

    /// # Errors
    /// See [`GatewayError`].
    pub fn save(&mut self, content: &str) -> Result<SaveResult> {
        self.call(Request::SaveContent {
            content: content.to_string(),
        })
    }

    /// # Errors
    /// See [`GatewayError`].
    pub fn load(&mut self) -> Result<ContentRecord> {
        self.call(Request::LoadContent)
    }

    /// # Errors
    /// See [`GatewayError`].
    pub fn reset(&mut self) -> Result<ResetResult> {
        self.call(Request::ResetContent)
    }

    /// The router's most recent cell selection, if any page reported one.
    ///
    /// # Errors
    /// See [`GatewayError`].
    pub fn current_cell(&mut self) -> Result<Option<CellSelection>> {
        self.call(Request::GetCurrentCell)
    }

    fn call<T: DeserializeOwned>(&mut self, request: Request) -> Result<T> {
        let link = self.link.as_ref().ok_or(GatewayError::ContextUnavailable)?;
        let kind = request.kind();
        let response = link
            .request(request, Origin::panel(), self.timeout)
            .inspect_err(|err| warn!(kind, error = %err, "gateway transport failure"))?;
        let value = decode(kind, response)?;
        self.last_activity = Some(self.clock.now_ms());
        Ok(value)
    }
}

fn decode<T: DeserializeOwned>(kind: &'static str, response: Response) -> Result<T> {
    if !response.success {
        let message = response
            .error
            .unwrap_or_else(|| format!("Failed to {}", kind.to_lowercase().replacen('_', " ", 1)));
        return Err(GatewayError::Rejected(message));
    }
    let value = response.result.unwrap_or(serde_json::Value::Null);
    serde_json::from_value(value).map_err(|source| GatewayError::BadResult { kind, source })
}
