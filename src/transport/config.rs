//! # Transport options.
//!
//! [`RpcConfig`] is parsed from the `rpc` map of an
//! [`InvocationDescriptor`](crate::InvocationDescriptor).
//!
//! ## Keys
//! - `mode`: transport flavour, string (default `"http"`)
//! - `concurrency`: maximum calls in flight, positive integer (default `10`)
//! - `ident`: identity to listen on, any value (default `0`)
//! - everything else is kept in `extra` for the transport to interpret

use serde_json::{Map, Value};

use crate::error::RunError;

/// Options of an RPC run.
#[derive(Clone, Debug, PartialEq)]
pub struct RpcConfig {
    /// Transport flavour.
    pub mode: String,
    /// Maximum number of calls dispatched concurrently.
    pub concurrency: usize,
    /// Identity the transport listens on (port, socket path, name, ...).
    pub ident: Value,
    /// Transport-specific options.
    pub extra: Map<String, Value>,
}

impl RpcConfig {
    /// Parses the options, applying defaults for missing keys.
    ///
    /// # Example
    /// ```
    /// use launchvisor::RpcConfig;
    /// use serde_json::{json, Map};
    ///
    /// let mut raw = Map::new();
    /// raw.insert("ident".into(), json!(8080));
    /// raw.insert("tls".into(), json!(false));
    ///
    /// let cfg = RpcConfig::from_map(&raw).unwrap();
    /// assert_eq!(cfg.mode, "http");
    /// assert_eq!(cfg.concurrency, 10);
    /// assert_eq!(cfg.ident, json!(8080));
    /// assert_eq!(cfg.extra.get("tls"), Some(&json!(false)));
    /// ```
    pub fn from_map(raw: &Map<String, Value>) -> Result<Self, RunError> {
        let mut cfg = Self::default();
        for (key, value) in raw {
            match key.as_str() {
                "mode" => match value {
                    Value::String(mode) if !mode.is_empty() => cfg.mode = mode.clone(),
                    other => {
                        return Err(RunError::configuration(format!(
                            "rpc mode must be a non-empty string, got {other}"
                        )));
                    }
                },
                "concurrency" => match value.as_u64().filter(|n| *n > 0) {
                    Some(n) => cfg.concurrency = usize::try_from(n).unwrap_or(usize::MAX),
                    None => {
                        return Err(RunError::configuration(format!(
                            "rpc concurrency must be a positive integer, got {value}"
                        )));
                    }
                },
                "ident" => cfg.ident = value.clone(),
                _ => {
                    cfg.extra.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(cfg)
    }

    /// Identity rendered as text.
    pub fn ident_label(&self) -> String {
        ident_label(&self.ident)
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            mode: "http".to_string(),
            concurrency: 10,
            ident: Value::from(0),
            extra: Map::new(),
        }
    }
}

/// Renders an identity for events: strings verbatim, other values as JSON.
pub(crate) fn ident_label(ident: &Value) -> String {
    match ident {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
