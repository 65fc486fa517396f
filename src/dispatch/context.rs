//! Request context: the parsed view of a request handed through the pipeline.

use std::collections::HashMap;

use log::{debug, warn};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::dispatch::error::DispatchError;
use crate::parser::{decode_form, HttpRequest, Method};

/// Request headers with lower-cased names. Values are kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(HashMap<String, String>);

impl Headers {
    /// Build from raw header pairs, lower-casing the names. The first pair
    /// seen for a name is kept.
    pub fn from_raw<'a, I>(raw: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let mut headers = HashMap::new();
        for (name, value) in raw {
            headers.entry(name.to_ascii_lowercase()).or_insert_with(|| value.clone());
        }
        Self(headers)
    }

    /// Look up a header by name, ignoring case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Insert a header, replacing any value under the same name.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.0.insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The decoded request payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum BodyValue {
    /// A JSON document.
    Json(Value),
    /// URL-encoded form fields.
    Form(HashMap<String, String>),
    /// No body, or a body that could not be decoded.
    #[default]
    Empty,
}

impl BodyValue {
    pub fn is_empty(&self) -> bool {
        match self {
            BodyValue::Json(value) => is_blank(value),
            BodyValue::Form(fields) => fields.is_empty(),
            BodyValue::Empty => true,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            BodyValue::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_form(&self) -> Option<&HashMap<String, String>> {
        match self {
            BodyValue::Form(fields) => Some(fields),
            _ => None,
        }
    }

    /// Read a top-level field regardless of how the body was encoded.
    pub fn get(&self, key: &str) -> Option<Value> {
        match self {
            BodyValue::Json(value) => value.get(key).cloned(),
            BodyValue::Form(fields) => fields.get(key).map(|v| Value::String(v.clone())),
            BodyValue::Empty => None,
        }
    }

    /// Read a top-level field as a string. Numbers and booleans are rendered.
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) => Some(s),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// The body as a JSON value: forms become objects of strings, an empty body
    /// becomes `null`.
    pub fn to_value(&self) -> Value {
        match self {
            BodyValue::Json(value) => value.clone(),
            BodyValue::Form(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect::<Map<String, Value>>(),
            ),
            BodyValue::Empty => Value::Null,
        }
    }
}

impl Serialize for BodyValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn form_body(fields: HashMap<String, String>) -> BodyValue {
    if fields.is_empty() {
        BodyValue::Empty
    } else {
        BodyValue::Form(fields)
    }
}

fn json_body(raw: &[u8]) -> Result<BodyValue, DispatchError> {
    match serde_json::from_slice::<Value>(raw) {
        Ok(Value::Null) => Ok(BodyValue::Empty),
        Ok(value) => Ok(BodyValue::Json(value)),
        Err(e) => Err(DispatchError::MalformedBody(e.to_string())),
    }
}

/// Decide how to read the body from the method and declared content type.
///
/// Rules, first match wins:
/// 1. JSON content type on a body-carrying method: parse JSON, `Empty` if malformed.
/// 2. Form content type: decode the form fields.
/// 3. POST without a content type: decode the form fields.
/// 4. PUT/DELETE/PATCH with a non-empty body: JSON if it yields something
///    non-empty, else form fields if non-empty.
/// 5. Otherwise `Empty`.
pub fn negotiate_body(request: &HttpRequest) -> BodyValue {
    let method = request.method;
    let content_type = request.content_type().unwrap_or("");

    if request.is_json() && method.carries_body() {
        return json_body(&request.body).unwrap_or_else(|err| {
            warn!("{method} {path}: {err}; continuing with an empty body", path = request.path);
            BodyValue::Empty
        });
    }

    if request.is_form() {
        return match method {
            Method::POST => form_body(request.form_fields()),
            m if m.carries_body() => form_body(decode_form(&request.body)),
            _ => BodyValue::Empty,
        };
    }

    if method == Method::POST && content_type.is_empty() {
        return form_body(request.form_fields());
    }

    if method.carries_body() && method != Method::POST && !request.body.is_empty() {
        if let Ok(body) = json_body(&request.body) {
            if !body.is_empty() {
                return body;
            }
        }
        return form_body(decode_form(&request.body));
    }

    BodyValue::Empty
}

/// Everything a handler may need to know about the request.
///
/// Immutable once built; [`RequestContext::with_body`] returns a new context
/// with a substituted body.
#[derive(Debug, Clone)]
pub struct RequestContext {
    method: Method,
    path: String,
    headers: Headers,
    query: HashMap<String, String>,
    body: BodyValue,
}

impl RequestContext {
    pub fn new(
        method: Method,
        path: impl Into<String>,
        headers: Headers,
        query: HashMap<String, String>,
        body: BodyValue,
    ) -> Self {
        Self {
            method,
            path: path.into(),
            headers,
            query,
            body,
        }
    }

    /// Build the context for a parsed request, negotiating the body.
    pub fn from_request(request: &HttpRequest) -> Self {
        let body = negotiate_body(request);
        debug!(
            "{method} {path}: body decoded as {kind}",
            method = request.method,
            path = request.path,
            kind = match &body {
                BodyValue::Json(_) => "json",
                BodyValue::Form(_) => "form",
                BodyValue::Empty => "empty",
            }
        );

        Self::new(
            request.method,
            request.path.clone(),
            Headers::from_raw(&request.headers),
            request.query_params.clone(),
            body,
        )
    }

    /// A copy of this context carrying `body` instead of the negotiated one.
    pub fn with_body(self, body: BodyValue) -> Self {
        Self { body, ..self }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn query(&self) -> &HashMap<String, String> {
        &self.query
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    pub fn body(&self) -> &BodyValue {
        &self.body
    }
}
