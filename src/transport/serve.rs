//! # Transport contract.
//!
//! ## Rules
//! - `serve` blocks the calling thread for the lifetime of the service.
//! - The readiness callback is invoked at most once, after the transport is
//!   able to accept calls.
//! - Failing before readiness means returning `Err` without invoking the callback.
//! - A failing remote call is reported to that caller only; it never ends the loop.

use std::sync::Arc;

use serde_json::Value;

use crate::error::TransportError;
use crate::proxy::ServiceProxy;
use crate::transport::RpcConfig;

/// Readiness callback handed to [`Transport::serve`]; receives the bound identity.
pub type ReadyCallback = Box<dyn FnOnce(&Value) + Send>;

/// Service loop hosting a [`ServiceProxy`].
pub trait Transport: Send + Sync + 'static {
    /// Serves `proxy` until the service ends.
    fn serve(
        &self,
        proxy: Arc<ServiceProxy>,
        config: &RpcConfig,
        on_ready: ReadyCallback,
    ) -> Result<(), TransportError>;
}
