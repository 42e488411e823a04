//! # Target abstraction and function-backed implementation.
//!
//! A [`Target`] is the callable an invocation runs. It receives a [`CallContext`]
//! carrying the positional arguments, keyword arguments, the extra namespace and,
//! in RPC mode, a handle to the live [`ServiceProxy`].
//!
//! [`TargetFn`] wraps a closure; [`TargetRef`] is the shared handle type.
//!
//! ## Example
//! ```rust
//! use launchvisor::{CallContext, Target, TargetFn, TargetRef, TaskError};
//! use serde_json::{json, Map};
//!
//! let double: TargetRef = TargetFn::arc("math:double", |ctx: &CallContext| {
//!     let x = ctx.get("x").and_then(|v| v.as_i64()).unwrap_or(0);
//!     Ok::<_, TaskError>(json!(x * 2))
//! });
//!
//! let mut kwargs = Map::new();
//! kwargs.insert("x".into(), json!(21));
//! let ctx = CallContext::new(Vec::new(), kwargs, Map::new());
//! assert_eq!(double.call(&ctx).unwrap(), json!(42));
//! ```

use std::borrow::Cow;
use std::sync::{Arc, Weak};

use serde_json::{Map, Value};

use crate::error::TaskError;
use crate::invocation::InvocationDescriptor;
use crate::proxy::ServiceProxy;

/// Name under which the live proxy is made available to targets in RPC mode.
pub const RPC_BINDING: &str = "rpc";

/// Shared handle to a target.
pub type TargetRef = Arc<dyn Target>;

/// # Synchronous callable run by the engine.
pub trait Target: Send + Sync + 'static {
    /// Returns a stable, human-readable target name.
    fn name(&self) -> &str;

    /// Runs the target.
    fn call(&self, ctx: &CallContext) -> Result<Value, TaskError>;
}

/// Arguments and namespace handed to a target.
#[derive(Clone, Debug, Default)]
pub struct CallContext {
    args: Vec<Value>,
    kwargs: Map<String, Value>,
    extra: Map<String, Value>,
    rpc: Option<Weak<ServiceProxy>>,
}

impl CallContext {
    /// Creates a context without an RPC binding.
    pub fn new(args: Vec<Value>, kwargs: Map<String, Value>, extra: Map<String, Value>) -> Self {
        Self {
            args,
            kwargs,
            extra,
            rpc: None,
        }
    }

    /// Creates a context from a descriptor's arguments and namespace.
    pub fn from_descriptor(desc: &InvocationDescriptor) -> Self {
        Self::new(
            desc.args().to_vec(),
            desc.kwargs().clone(),
            desc.extra().clone(),
        )
    }

    /// Injects the proxy under the reserved [`RPC_BINDING`].
    pub(crate) fn with_rpc(mut self, proxy: Weak<ServiceProxy>) -> Self {
        self.extra.remove(RPC_BINDING);
        self.rpc = Some(proxy);
        self
    }

    /// Positional arguments.
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Keyword arguments.
    pub fn kwargs(&self) -> &Map<String, Value> {
        &self.kwargs
    }

    /// Extra namespace.
    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    /// Looks `name` up in the keyword arguments, then in the extra namespace.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.kwargs.get(name).or_else(|| self.extra.get(name))
    }

    /// Keyword arguments overlaid with the extra namespace, as exposed to scripts.
    pub fn bindings(&self) -> Map<String, Value> {
        let mut out = self.kwargs.clone();
        out.extend(self.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        out
    }

    /// The live service proxy when running in RPC mode.
    pub fn rpc(&self) -> Option<Arc<ServiceProxy>> {
        self.rpc.as_ref().and_then(Weak::upgrade)
    }
}

/// Function-backed target implementation.
#[derive(Debug)]
pub struct TargetFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> TargetFn<F>
where
    F: Fn(&CallContext) -> Result<Value, TaskError> + Send + Sync + 'static,
{
    /// Creates a new function-backed target.
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the target and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

impl<F> Target for TargetFn<F>
where
    F: Fn(&CallContext) -> Result<Value, TaskError> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, ctx: &CallContext) -> Result<Value, TaskError> {
        (self.f)(ctx)
    }
}
