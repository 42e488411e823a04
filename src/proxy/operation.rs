//! # Named operations and the delegate capability.
//!
//! Remote callers reach a [`ServiceProxy`](crate::ServiceProxy) by operation name.
//! Operations registered on the proxy are [`Operation`] closures; a bound delegate
//! implements [`Expose`] so its surface can be enumerated before serving.
//!
//! ## Example
//! ```rust
//! use launchvisor::{CallArgs, Expose, TaskError};
//! use serde_json::{json, Value};
//!
//! struct Counter;
//!
//! impl Expose for Counter {
//!     fn operations(&self) -> Vec<String> {
//!         vec!["get".into()]
//!     }
//!     fn invoke(&self, _name: &str, _args: &CallArgs) -> Result<Value, TaskError> {
//!         Ok(json!(42))
//!     }
//! }
//!
//! assert_eq!(Counter.operations(), vec!["get".to_string()]);
//! assert_eq!(Counter.invoke("get", &CallArgs::new()).unwrap(), json!(42));
//! ```

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::TaskError;

/// Callable registered on a proxy under a name.
pub type Operation = Arc<dyn Fn(&CallArgs) -> Result<Value, TaskError> + Send + Sync>;

/// Object whose operations are forwarded to by a proxy.
pub trait Expose: Send + Sync + 'static {
    /// Names this object answers to.
    fn operations(&self) -> Vec<String>;

    /// Invokes the operation `name`. Only called for names listed by [`Expose::operations`].
    fn invoke(&self, name: &str, args: &CallArgs) -> Result<Value, TaskError>;
}

/// Arguments of one remote call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CallArgs {
    /// Positional arguments.
    pub positional: Vec<Value>,
    /// Named arguments.
    pub named: Map<String, Value>,
}

impl CallArgs {
    /// Empty argument list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Sets a named argument.
    pub fn named(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.named.insert(key.into(), value.into());
        self
    }

    /// Looks up a parameter by name, falling back to its position.
    pub fn get(&self, index: usize, name: &str) -> Option<&Value> {
        self.named
            .get(name)
            .or_else(|| self.positional.get(index))
            .filter(|v| !v.is_null())
    }
}
