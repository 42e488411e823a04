//! # RPC transports.
//!
//! A [`Transport`] owns the service loop of an RPC run. The engine hands it a
//! [`ServiceProxy`](crate::ServiceProxy) and an [`RpcConfig`]; the transport
//! dispatches remote calls to [`ServiceProxy::call`](crate::ServiceProxy::call)
//! and reports readiness exactly once through the [`ReadyCallback`].
//!
//! [`LocalTransport`] is the bundled in-process implementation, reached through
//! [`LocalClient`] handles.

mod config;
mod local;
mod serve;

pub use config::RpcConfig;
pub(crate) use config::ident_label;
pub use local::{LocalClient, LocalTransport};
pub use serve::{ReadyCallback, Transport};
