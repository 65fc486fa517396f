//! Parameter assembly: turning a match into the handler's positional arguments.

use std::sync::Arc;

use crate::dispatch::context::{BodyValue, RequestContext};
use crate::dispatch::error::BoxError;
use crate::dispatch::route::ArgumentConvention;

/// One positional handler argument.
#[derive(Debug, Clone)]
pub enum Argument {
    /// A captured path segment.
    Param(String),
    /// A position the convention names but the match did not supply.
    Absent,
    /// The decoded body. `Empty` when the body was missing or malformed.
    Body(BodyValue),
    /// A handle on the whole request.
    Request(Arc<RequestContext>),
}

static ABSENT: Argument = Argument::Absent;

impl Argument {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Argument::Param(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_body(&self) -> Option<&BodyValue> {
        match self {
            Argument::Body(body) => Some(body),
            _ => None,
        }
    }

    pub fn as_request(&self) -> Option<&RequestContext> {
        match self {
            Argument::Request(request) => Some(request),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Argument::Absent)
    }
}

/// The ordered arguments handed to a handler.
///
/// Reading past the end yields [`Argument::Absent`], so handlers with an
/// optional trailing segment can read it unconditionally.
#[derive(Debug, Clone, Default)]
pub struct ArgumentList(Vec<Argument>);

impl ArgumentList {
    pub fn new(args: Vec<Argument>) -> Self {
        Self(args)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> &Argument {
        self.0.get(index).unwrap_or(&ABSENT)
    }

    /// The path segment at `index`, if that position holds one.
    pub fn param(&self, index: usize) -> Option<&str> {
        self.get(index).as_str()
    }

    /// Like [`ArgumentList::param`], but a missing segment is an error.
    pub fn require_param(&self, index: usize) -> Result<&str, BoxError> {
        self.param(index)
            .ok_or_else(|| format!("missing path parameter at position {index}").into())
    }

    /// The body at `index`; `Empty` if that position holds none.
    pub fn body(&self, index: usize) -> &BodyValue {
        static EMPTY: BodyValue = BodyValue::Empty;
        self.get(index).as_body().unwrap_or(&EMPTY)
    }

    pub fn request(&self, index: usize) -> Option<&RequestContext> {
        self.get(index).as_request()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Argument> {
        self.0.iter()
    }

    pub fn into_vec(self) -> Vec<Argument> {
        self.0
    }
}

fn param_at(params: &[String], index: usize) -> Argument {
    params
        .get(index)
        .map(|p| Argument::Param(p.clone()))
        .unwrap_or(Argument::Absent)
}

/// Assemble the argument list for a matched route.
///
/// | Convention          | Arguments                          |
/// |---------------------|------------------------------------|
/// | `PathParams`        | params                             |
/// | `BodyFirst`         | body, params                       |
/// | `RequestParamsBody` | request, params, body              |
/// | `NestedItem`        | params\[parent\], params\[item\], body |
/// | `RequestWithBody`   | request                            |
pub fn assemble(convention: ArgumentConvention, context: RequestContext, params: Vec<String>) -> ArgumentList {
    let path_args = || params.iter().cloned().map(Argument::Param);

    let args: Vec<Argument> = match convention {
        ArgumentConvention::PathParams => path_args().collect(),
        ArgumentConvention::BodyFirst => std::iter::once(Argument::Body(context.body().clone()))
            .chain(path_args())
            .collect(),
        ArgumentConvention::RequestParamsBody => {
            let body = context.body().clone();
            std::iter::once(Argument::Request(Arc::new(context)))
                .chain(path_args())
                .chain(std::iter::once(Argument::Body(body)))
                .collect()
        }
        ArgumentConvention::NestedItem { parent, item } => vec![
            param_at(&params, parent),
            param_at(&params, item),
            Argument::Body(context.body().clone()),
        ],
        ArgumentConvention::RequestWithBody => vec![Argument::Request(Arc::new(context))],
    };

    ArgumentList::new(args)
}
