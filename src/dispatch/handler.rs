//! Handler descriptors, the resolver registry and the invoker.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use log::{debug, error};

use crate::dispatch::args::ArgumentList;
use crate::dispatch::emitter::Outcome;
use crate::dispatch::error::{BoxError, DispatchError};

/// What a handler returns.
pub type HandlerResult = Result<Outcome, BoxError>;

/// A free-standing handler.
pub trait Handler: Send + Sync {
    fn call(&self, args: ArgumentList) -> HandlerResult;
}

impl<F> Handler for F
where
    F: Fn(ArgumentList) -> HandlerResult + Send + Sync,
{
    fn call(&self, args: ArgumentList) -> HandlerResult {
        self(args)
    }
}

/// An object exposing handler methods by name.
pub trait Controller: Send + Sync {
    /// Run `method`. Returns `None` if the controller has no such method.
    fn invoke(&self, method: &str, args: ArgumentList) -> Option<HandlerResult>;
}

/// Identifies the code a route runs.
#[derive(Clone)]
pub enum HandlerDescriptor {
    /// A function or closure.
    Callable(Arc<dyn Handler>),
    /// A controller type registered with the [`ResolverRegistry`], instantiated
    /// per call, and one of its methods.
    TypeMethod { type_name: String, method: String },
    /// A method on an instance held by the route.
    BoundPair { instance: Arc<dyn Controller>, method: String },
}

impl HandlerDescriptor {
    /// Wrap a function or closure.
    pub fn callable<F>(handler: F) -> Self
    where
        F: Fn(ArgumentList) -> HandlerResult + Send + Sync + 'static,
    {
        HandlerDescriptor::Callable(Arc::new(handler))
    }

    pub fn type_method(type_name: impl Into<String>, method: impl Into<String>) -> Self {
        HandlerDescriptor::TypeMethod {
            type_name: type_name.into(),
            method: method.into(),
        }
    }

    /// Parse a `"Type.method"` name. Both halves must be non-empty.
    pub fn named(name: &str) -> Option<Self> {
        let (type_name, method) = name.split_once('.')?;
        if type_name.is_empty() || method.is_empty() {
            return None;
        }
        Some(Self::type_method(type_name, method))
    }

    pub fn bound(instance: Arc<dyn Controller>, method: impl Into<String>) -> Self {
        HandlerDescriptor::BoundPair {
            instance,
            method: method.into(),
        }
    }

    /// A short human-readable name, used in logs and errors.
    pub fn label(&self) -> String {
        match self {
            HandlerDescriptor::Callable(_) => "<callable>".to_string(),
            HandlerDescriptor::TypeMethod { type_name, method } => format!("{type_name}.{method}"),
            HandlerDescriptor::BoundPair { method, .. } => format!("<bound>.{method}"),
        }
    }
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HandlerDescriptor({})", self.label())
    }
}

type Factory = Arc<dyn Fn() -> Result<Arc<dyn Controller>, BoxError> + Send + Sync>;

/// The closed set of controller types `TypeMethod` descriptors may name.
#[derive(Clone, Default)]
pub struct ResolverRegistry {
    factories: HashMap<String, Factory>,
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under `name`, constructed with `T::default()` on each call.
    pub fn register<T>(&mut self, name: impl Into<String>)
    where
        T: Controller + Default + 'static,
    {
        self.register_factory(name, || Ok(Arc::new(T::default()) as Arc<dyn Controller>));
    }

    /// Register a fallible constructor under `name`. Use this to hand
    /// collaborators to a controller.
    pub fn register_factory<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Result<Arc<dyn Controller>, BoxError> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    fn instantiate(&self, type_name: &str) -> Result<Arc<dyn Controller>, DispatchError> {
        let factory = self.factories.get(type_name).ok_or_else(|| DispatchError::HandlerResolution {
            handler: type_name.to_string(),
            reason: "unknown handler type".to_string(),
        })?;

        guarded(type_name, || factory())
    }
}

impl fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "handler panicked".to_string()),
    }
}

/// Run `f`, turning both its error and a panic into `HandlerInvocation`.
fn guarded<T>(label: &str, f: impl FnOnce() -> Result<T, BoxError>) -> Result<T, DispatchError> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(DispatchError::HandlerInvocation {
            handler: label.to_string(),
            source,
        }),
        Err(payload) => {
            let message = panic_message(payload);
            error!("Handler {label} panicked: {message}");
            Err(DispatchError::HandlerInvocation {
                handler: label.to_string(),
                source: message.into(),
            })
        }
    }
}

fn call_method(
    controller: &dyn Controller,
    label: &str,
    method: &str,
    args: ArgumentList,
) -> Result<Outcome, DispatchError> {
    match guarded(label, || Ok(controller.invoke(method, args)))? {
        Some(Ok(outcome)) => Ok(outcome),
        Some(Err(source)) => Err(DispatchError::HandlerInvocation {
            handler: label.to_string(),
            source,
        }),
        None => Err(DispatchError::HandlerResolution {
            handler: label.to_string(),
            reason: format!("no method named {method}"),
        }),
    }
}

/// Resolve `descriptor` and run it with `args`.
pub fn invoke(
    descriptor: &HandlerDescriptor,
    registry: &ResolverRegistry,
    args: ArgumentList,
) -> Result<Outcome, DispatchError> {
    let label = descriptor.label();
    debug!("Invoking {label} with {n} argument(s)", n = args.len());

    match descriptor {
        HandlerDescriptor::Callable(handler) => guarded(&label, || handler.call(args)),
        HandlerDescriptor::TypeMethod { type_name, method } => {
            let instance = registry.instantiate(type_name)?;
            call_method(instance.as_ref(), &label, method, args)
        }
        HandlerDescriptor::BoundPair { instance, method } => {
            call_method(instance.as_ref(), &label, method, args)
        }
    }
}
