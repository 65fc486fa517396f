//! The ordered route table.

use std::fmt;
use std::sync::Arc;

use crate::dispatch::context::{BodyValue, RequestContext};
use crate::dispatch::error::DispatchError;
use crate::dispatch::handler::HandlerDescriptor;
use crate::dispatch::path::PathMatcher;
use crate::parser::Method;

/// How a route's handler expects its positional arguments.
///
/// Declared per route at registration time; the parameter assembler
/// dispatches on nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentConvention {
    /// `[params...]`
    PathParams,
    /// `[body, params...]`
    BodyFirst,
    /// `[request, params..., body]`
    RequestParamsBody,
    /// `[params[parent], params[item], body]`. Other params are dropped.
    NestedItem { parent: usize, item: usize },
    /// `[request]`, with the decoded body carried by the request.
    RequestWithBody,
}

impl ArgumentConvention {
    /// The convention a route gets when none is declared.
    pub fn default_for(method: Method) -> Self {
        match method {
            Method::GET | Method::HEAD | Method::OPTIONS => ArgumentConvention::PathParams,
            Method::PUT => ArgumentConvention::RequestParamsBody,
            Method::POST | Method::DELETE | Method::PATCH => ArgumentConvention::BodyFirst,
        }
    }

    /// Parent id from the first placeholder, item id from the second.
    pub fn nested_item() -> Self {
        ArgumentConvention::NestedItem { parent: 0, item: 1 }
    }
}

/// Computes a replacement body from the request and the matched params.
pub type BodyRewrite = Arc<dyn Fn(&RequestContext, &[String]) -> BodyValue + Send + Sync>;

/// A registered route.
#[derive(Clone)]
pub struct Route {
    method: Method,
    matcher: PathMatcher,
    handler: HandlerDescriptor,
    convention: ArgumentConvention,
    body_rewrite: Option<BodyRewrite>,
}

impl Route {
    /// Create a route with the method's default convention.
    pub fn new(method: Method, template: &str, handler: HandlerDescriptor) -> Result<Self, DispatchError> {
        Ok(Self {
            method,
            matcher: PathMatcher::compile(template)?,
            handler,
            convention: ArgumentConvention::default_for(method),
            body_rewrite: None,
        })
    }

    pub fn with_convention(mut self, convention: ArgumentConvention) -> Self {
        self.convention = convention;
        self
    }

    /// Substitute the request body before arguments are assembled.
    pub fn with_body_rewrite<F>(mut self, rewrite: F) -> Self
    where
        F: Fn(&RequestContext, &[String]) -> BodyValue + Send + Sync + 'static,
    {
        self.body_rewrite = Some(Arc::new(rewrite));
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn template(&self) -> &str {
        self.matcher.template()
    }

    pub fn handler(&self) -> &HandlerDescriptor {
        &self.handler
    }

    pub fn convention(&self) -> ArgumentConvention {
        self.convention
    }

    /// The context the handler will see: `context` itself, or a copy with the
    /// rewritten body when the route declares a rewrite.
    pub fn prepare_context(&self, context: RequestContext, params: &[String]) -> RequestContext {
        match &self.body_rewrite {
            Some(rewrite) => {
                let body = rewrite(&context, params);
                context.with_body(body)
            }
            None => context,
        }
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("template", &self.template())
            .field("handler", &self.handler)
            .field("convention", &self.convention)
            .field("body_rewrite", &self.body_rewrite.is_some())
            .finish()
    }
}

/// A successful lookup.
#[derive(Debug)]
pub struct MatchResult<'a> {
    pub route: &'a Route,
    /// Captured placeholder values, in template order.
    pub params: Vec<String>,
}

/// Routes in registration order. The first structural match wins.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a route. Duplicate templates are accepted; the earlier one
    /// always wins at match time.
    pub fn push(&mut self, route: Route) {
        self.routes.push(route);
    }

    pub fn register(
        &mut self,
        method: Method,
        template: &str,
        handler: HandlerDescriptor,
        convention: ArgumentConvention,
    ) -> Result<(), DispatchError> {
        let route = Route::new(method, template, handler)?.with_convention(convention);
        self.push(route);
        Ok(())
    }

    /// Find the first route for `method` whose template matches `path`.
    pub fn match_route(&self, method: Method, path: &str) -> Option<MatchResult<'_>> {
        self.routes
            .iter()
            .filter(|route| route.method == method)
            .find_map(|route| {
                route
                    .matcher
                    .matches(path)
                    .map(|params| MatchResult { route, params })
            })
    }

    /// Routes that can never match because an identical (method, template)
    /// pair was registered before them.
    pub fn shadowed(&self) -> Vec<&Route> {
        self.routes
            .iter()
            .enumerate()
            .filter(|(i, route)| {
                self.routes[..*i]
                    .iter()
                    .any(|earlier| earlier.method == route.method && earlier.template() == route.template())
            })
            .map(|(_, route)| route)
            .collect()
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
