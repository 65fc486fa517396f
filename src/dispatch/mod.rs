//! Request dispatch.
//!
//! The [`Dispatcher`] owns the route table and the handler resolver and runs
//! each request through the pipeline:
//!
//! CORS gate → request context → route lookup → parameter assembly →
//! handler invocation → response emission
//!
//! with an error boundary around the whole thing. The pipeline is synchronous
//! and keeps all per-request state in an [`Exchange`] it creates for the
//! request, so one `Dispatcher` can serve any number of requests concurrently.

mod args;
mod context;
mod cors;
mod emitter;
mod error;
mod exchange;
mod handler;
mod path;
mod route;

pub use args::{assemble, Argument, ArgumentList};
pub use context::{negotiate_body, BodyValue, Headers, RequestContext};
pub use cors::CorsConfig;
pub use emitter::{emit, envelope, error_body, Outcome};
pub use error::{BoxError, DispatchError};
pub use exchange::Exchange;
pub use handler::{invoke, Controller, Handler, HandlerDescriptor, HandlerResult, ResolverRegistry};
pub use path::PathMatcher;
pub use route::{ArgumentConvention, BodyRewrite, MatchResult, Route, RouteTable};

use log::{debug, error, info, warn};

use crate::parser::{HttpRequest, Method};
use crate::server::{HttpResponse, StatusCode};

/// The request pipeline. Built once at startup, then shared read-only.
#[derive(Debug, Default)]
pub struct Dispatcher {
    routes: RouteTable,
    resolver: ResolverRegistry,
    not_found: Option<HandlerDescriptor>,
    cors: CorsConfig,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cors(mut self, cors: CorsConfig) -> Self {
        self.cors = cors;
        self
    }

    pub fn with_resolver(mut self, resolver: ResolverRegistry) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn cors(&self) -> &CorsConfig {
        &self.cors
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn resolver(&self) -> &ResolverRegistry {
        &self.resolver
    }

    pub fn resolver_mut(&mut self) -> &mut ResolverRegistry {
        &mut self.resolver
    }

    /// Append a fully configured route.
    pub fn route(&mut self, route: Route) -> &mut Self {
        self.routes.push(route);
        self
    }

    /// Append a route with an explicit argument convention.
    pub fn register(
        &mut self,
        method: Method,
        template: &str,
        handler: HandlerDescriptor,
        convention: ArgumentConvention,
    ) -> Result<&mut Self, DispatchError> {
        self.routes.register(method, template, handler, convention)?;
        Ok(self)
    }

    fn add(&mut self, method: Method, template: &str, handler: HandlerDescriptor) -> Result<&mut Self, DispatchError> {
        self.register(method, template, handler, ArgumentConvention::default_for(method))
    }

    pub fn get(&mut self, template: &str, handler: HandlerDescriptor) -> Result<&mut Self, DispatchError> {
        self.add(Method::GET, template, handler)
    }

    pub fn post(&mut self, template: &str, handler: HandlerDescriptor) -> Result<&mut Self, DispatchError> {
        self.add(Method::POST, template, handler)
    }

    pub fn put(&mut self, template: &str, handler: HandlerDescriptor) -> Result<&mut Self, DispatchError> {
        self.add(Method::PUT, template, handler)
    }

    pub fn patch(&mut self, template: &str, handler: HandlerDescriptor) -> Result<&mut Self, DispatchError> {
        self.add(Method::PATCH, template, handler)
    }

    pub fn delete(&mut self, template: &str, handler: HandlerDescriptor) -> Result<&mut Self, DispatchError> {
        self.add(Method::DELETE, template, handler)
    }

    /// Handler run when no route matches. It receives `[request]`.
    pub fn not_found(&mut self, handler: HandlerDescriptor) -> &mut Self {
        self.not_found = Some(handler);
        self
    }

    /// Check the wiring: every named handler type must be registered with
    /// the resolver. Returns one error per offending route.
    pub fn validate(&self) -> Vec<DispatchError> {
        self.routes
            .routes()
            .iter()
            .map(Route::handler)
            .chain(self.not_found.iter())
            .filter_map(|handler| match handler {
                HandlerDescriptor::TypeMethod { type_name, .. } if !self.resolver.contains(type_name) => {
                    Some(DispatchError::HandlerResolution {
                        handler: handler.label(),
                        reason: "unknown handler type".to_string(),
                    })
                }
                _ => None,
            })
            .collect()
    }

    /// Log the route table and any wiring problems.
    pub fn log_routes(&self) {
        info!("Registered endpoints:");
        for route in self.routes.routes() {
            info!(
                "  {method} {template} -> {handler} ({convention:?})",
                method = route.method(),
                template = route.template(),
                handler = route.handler().label(),
                convention = route.convention()
            );
        }
        for route in self.routes.shadowed() {
            warn!(
                "  {method} {template} is shadowed by an earlier registration and never matches",
                method = route.method(),
                template = route.template()
            );
        }
        for defect in self.validate() {
            error!("Configuration defect: {defect}");
        }
    }

    /// Run one request through the pipeline and return the response.
    ///
    /// Never fails: every error becomes a JSON error response.
    pub fn dispatch(&self, request: &HttpRequest) -> HttpResponse {
        let mut exchange = Exchange::new();
        if let Err(err) = self.run(request, &mut exchange) {
            self.fail(err, request, &mut exchange);
        }
        exchange.finish()
    }

    fn run(&self, request: &HttpRequest, exchange: &mut Exchange) -> Result<(), DispatchError> {
        self.cors.apply_headers(exchange)?;
        if self.cors.handle_preflight(request.method, exchange)? {
            return Ok(());
        }

        let context = RequestContext::from_request(request);

        let Some(matched) = self.routes.match_route(request.method, &request.path) else {
            return self.answer_not_found(context, exchange);
        };

        let route = matched.route;
        debug!(
            "{method} {path} matched {template} with params {params:?}",
            method = request.method,
            path = request.path,
            template = route.template(),
            params = matched.params
        );

        let context = route.prepare_context(context, &matched.params);
        let args = assemble(route.convention(), context, matched.params);
        let outcome = invoke(route.handler(), &self.resolver, args)?;
        emit(outcome, exchange)
    }

    fn answer_not_found(&self, context: RequestContext, exchange: &mut Exchange) -> Result<(), DispatchError> {
        let miss = DispatchError::NoRouteMatch {
            method: context.method(),
            path: context.path().to_string(),
        };
        warn!("{miss}");

        match &self.not_found {
            Some(handler) => {
                let args = assemble(ArgumentConvention::RequestWithBody, context, Vec::new());
                let outcome = invoke(handler, &self.resolver, args)?;
                emit(outcome, exchange)
            }
            None => {
                let body = serde_json::to_vec(&error_body(StatusCode::NotFound.reason_phrase()))
                    .unwrap_or_default();
                exchange.commit(miss.status(), Some("application/json"), body)
            }
        }
    }

    fn fail(&self, err: DispatchError, request: &HttpRequest, exchange: &mut Exchange) {
        let (method, path) = (request.method, &request.path);

        match &err {
            DispatchError::HandlerInvocation { handler, source } => {
                error!("{method} {path}: handler {handler} failed: {source:?}");
            }
            err if err.is_configuration_defect() => {
                error!("{method} {path}: configuration defect: {err}");
            }
            err => error!("{method} {path}: {err}"),
        }

        if exchange.headers_sent() {
            error!("{method} {path}: response already committed, error not reported to client");
            return;
        }
        if let Err(cors_err) = self.cors.apply_headers(exchange) {
            error!("{method} {path}: {cors_err}");
        }

        let body = serde_json::to_vec(&error_body(err.to_string())).unwrap_or_default();
        if let Err(commit_err) = exchange.commit(err.status(), Some("application/json"), body) {
            error!("{method} {path}: {commit_err}");
        }
    }
}
