//! A small content-management API served by cms-dispatch.
//!
//! Run with `RUST_LOG=debug cargo run --example cms_server`, then try:
//!
//! ```text
//! curl http://127.0.0.1:8080/health
//! curl -H 'Authorization: Bearer editor-token' http://127.0.0.1:8080/me
//! curl -X POST -H 'Content-Type: application/json' -H 'Authorization: Bearer editor-token' \
//!      -d '{"title":"Hello"}' http://127.0.0.1:8080/content-types/1/content
//! curl http://127.0.0.1:8080/content-types/1/content
//! curl -X OPTIONS -i http://127.0.0.1:8080/content-types/1/content
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use cms_dispatch::dispatch::{envelope, ArgumentConvention, Headers, Outcome};
use cms_dispatch::services::{with_transaction, Authenticator, DataAccess, DataError, Principal, RequestAuth, Row};
use cms_dispatch::{
    ArgumentList, BodyValue, Controller, Dispatcher, HandlerDescriptor, HandlerResult, HttpServer, Method,
    RequestContext, ResolverRegistry, Route, ServerConfig, StatusCode,
};
use log::info;
use serde_json::{json, Value};

/// Table-oriented in-memory store. Statements are limited to
/// `SELECT * FROM <table> [WHERE <column> = ?]`.
#[derive(Default)]
struct MemoryStore {
    tables: Mutex<HashMap<String, Vec<Row>>>,
    next_id: AtomicI64,
}

fn matches_filter(row: &Row, filter: &Row) -> bool {
    filter.iter().all(|(k, v)| row.get(k) == Some(v))
}

fn parse_select(sql: &str, params: &[Value]) -> Result<(String, Row), DataError> {
    let words: Vec<&str> = sql.split_whitespace().collect();
    match words.as_slice() {
        ["SELECT", "*", "FROM", table] => Ok((table.to_string(), Row::new())),
        ["SELECT", "*", "FROM", table, "WHERE", column, "=", "?"] => {
            let value = params
                .first()
                .cloned()
                .ok_or_else(|| DataError::Query("missing parameter".to_string()))?;
            let mut filter = Row::new();
            filter.insert(column.to_string(), value);
            Ok((table.to_string(), filter))
        }
        _ => Err(DataError::Query(format!("unsupported statement: {sql}"))),
    }
}

impl MemoryStore {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<Row>>>, DataError> {
        self.tables
            .lock()
            .map_err(|_| DataError::Connection("store poisoned".to_string()))
    }
}

impl DataAccess for MemoryStore {
    fn query(&self, sql: &str, params: &[Value]) -> Result<u64, DataError> {
        Ok(self.fetch_all(sql, params)?.len() as u64)
    }

    fn fetch(&self, sql: &str, params: &[Value]) -> Result<Option<Row>, DataError> {
        Ok(self.fetch_all(sql, params)?.into_iter().next())
    }

    fn fetch_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DataError> {
        let (table, filter) = parse_select(sql, params)?;
        let tables = self.lock()?;
        Ok(tables
            .get(&table)
            .map(|rows| rows.iter().filter(|row| matches_filter(row, &filter)).cloned().collect())
            .unwrap_or_default())
    }

    fn insert(&self, table: &str, row: &Row) -> Result<i64, DataError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut row = row.clone();
        row.insert("id".to_string(), json!(id));
        self.lock()?.entry(table.to_string()).or_default().push(row);
        Ok(id)
    }

    fn update(&self, table: &str, row: &Row, filter: &Row) -> Result<bool, DataError> {
        let mut tables = self.lock()?;
        let mut changed = false;
        for existing in tables.get_mut(table).into_iter().flatten() {
            if matches_filter(existing, filter) {
                existing.extend(row.clone());
                changed = true;
            }
        }
        Ok(changed)
    }

    fn delete(&self, table: &str, filter: &Row) -> Result<bool, DataError> {
        let mut tables = self.lock()?;
        let Some(rows) = tables.get_mut(table) else {
            return Ok(false);
        };
        let before = rows.len();
        rows.retain(|row| !matches_filter(row, filter));
        Ok(rows.len() != before)
    }

    // Single-process demo store: transactions are bookkeeping only.
    fn begin_transaction(&self) -> Result<(), DataError> {
        Ok(())
    }

    fn commit(&self) -> Result<(), DataError> {
        Ok(())
    }

    fn rollback(&self) -> Result<(), DataError> {
        Ok(())
    }
}

/// Fixed bearer tokens.
struct TokenAuth {
    tokens: HashMap<&'static str, Principal>,
}

impl TokenAuth {
    fn new() -> Self {
        let principal = |id, username: &str, role: &str| Principal {
            id,
            username: username.to_string(),
            role: role.to_string(),
        };
        Self {
            tokens: HashMap::from([
                ("admin-token", principal(1, "admin", "admin")),
                ("editor-token", principal(2, "editor", "editor")),
            ]),
        }
    }
}

impl Authenticator for TokenAuth {
    fn authenticate(&self, headers: &Headers) -> Option<Principal> {
        let token = cms_dispatch::services::bearer_token(headers)?;
        self.tokens.get(token).cloned()
    }
}

fn row_from(body: &BodyValue) -> Row {
    match body.to_value() {
        Value::Object(map) => map,
        _ => Row::new(),
    }
}

fn id_filter(type_id: &str, id: Option<&str>) -> Row {
    let mut filter = Row::new();
    filter.insert("type_id".to_string(), json!(type_id));
    if let Some(id) = id {
        if let Ok(id) = id.parse::<i64>() {
            filter.insert("id".to_string(), json!(id));
        }
    }
    filter
}

/// Content entries, resolved by name and constructed per request.
struct ContentController {
    db: Arc<MemoryStore>,
    auth: Arc<TokenAuth>,
}

impl ContentController {
    fn index(&self, args: ArgumentList) -> HandlerResult {
        let type_id = args.require_param(0)?;
        let rows = self.db.fetch_all("SELECT * FROM content WHERE type_id = ?", &[json!(type_id)])?;
        Ok(Outcome::success(json!(rows)))
    }

    fn show(&self, args: ArgumentList) -> HandlerResult {
        let filter = id_filter(args.require_param(0)?, args.param(1));
        let rows = self.db.fetch_all("SELECT * FROM content WHERE type_id = ?", &[filter["type_id"].clone()])?;
        match rows.into_iter().find(|row| row.get("id") == filter.get("id")) {
            Some(row) => Ok(Outcome::success(Value::Object(row))),
            None => Ok(Outcome::fail(StatusCode::NotFound, "Content not found")),
        }
    }

    // POST: [body, typeId]
    fn store(&self, args: ArgumentList) -> HandlerResult {
        let body = args.body(0);
        if body.get_str("title").is_none() {
            return Ok(Outcome::fail(StatusCode::UnprocessableEntity, "title is required"));
        }
        let mut row = row_from(body);
        row.insert("type_id".to_string(), json!(args.require_param(1)?));

        let id = with_transaction(self.db.as_ref(), |db| db.insert("content", &row))?;
        Ok(Outcome::created(envelope::success_with(json!({ "id": id }), "Content created")))
    }

    // PUT: [request, typeId, id, body]
    fn update(&self, args: ArgumentList) -> HandlerResult {
        let request = args.request(0).ok_or("request missing")?;
        let auth = RequestAuth::new(self.auth.as_ref(), request.headers());
        if let Err(denied) = auth.require() {
            return Ok(denied);
        }

        let filter = id_filter(args.require_param(1)?, args.param(2));
        let changed = self.db.update("content", &row_from(args.body(3)), &filter)?;
        if changed {
            Ok(Outcome::ok(envelope::success_message("Content updated")))
        } else {
            Ok(Outcome::fail(StatusCode::NotFound, "Content not found"))
        }
    }

    // DELETE: [body, typeId, id]
    fn destroy(&self, args: ArgumentList) -> HandlerResult {
        let filter = id_filter(args.require_param(1)?, args.param(2));
        if self.db.delete("content", &filter)? {
            Ok(Outcome::ok(envelope::success_message("Content deleted")))
        } else {
            Ok(Outcome::fail(StatusCode::NotFound, "Content not found"))
        }
    }
}

impl Controller for ContentController {
    fn invoke(&self, method: &str, args: ArgumentList) -> Option<HandlerResult> {
        Some(match method {
            "index" => self.index(args),
            "show" => self.show(args),
            "store" => self.store(args),
            "update" => self.update(args),
            "destroy" => self.destroy(args),
            _ => return None,
        })
    }
}

/// Menu items, held by the route as a shared instance.
struct MenuController {
    db: Arc<MemoryStore>,
}

impl Controller for MenuController {
    // Nested item convention: [menuId, itemId, body]
    fn invoke(&self, method: &str, args: ArgumentList) -> Option<HandlerResult> {
        let result = match method {
            "addItem" => (|| -> HandlerResult {
                let mut row = row_from(args.body(2));
                row.insert("menu_id".to_string(), json!(args.require_param(0)?));
                let id = self.db.insert("menu_items", &row)?;
                Ok(Outcome::created(envelope::success(json!({ "id": id }))))
            })(),
            "updateItem" => (|| -> HandlerResult {
                let mut filter = Row::new();
                filter.insert("menu_id".to_string(), json!(args.require_param(0)?));
                filter.insert("id".to_string(), json!(args.require_param(1)?.parse::<i64>()?));
                let changed = self.db.update("menu_items", &row_from(args.body(2)), &filter)?;
                Ok(Outcome::ok(json!({ "success": changed })))
            })(),
            _ => return None,
        };
        Some(result)
    }
}

fn build_dispatcher(db: Arc<MemoryStore>, auth: Arc<TokenAuth>) -> Result<Dispatcher, Box<dyn std::error::Error>> {
    let mut resolver = ResolverRegistry::new();
    {
        let (db, auth) = (db.clone(), auth.clone());
        resolver.register_factory("ContentController", move || {
            Ok(Arc::new(ContentController { db: db.clone(), auth: auth.clone() }) as Arc<dyn Controller>)
        });
    }

    let menus: Arc<dyn Controller> = Arc::new(MenuController { db });
    let content = |method: &str| HandlerDescriptor::type_method("ContentController", method);

    let mut dispatcher = Dispatcher::new().with_resolver(resolver);
    dispatcher
        .get("/health", HandlerDescriptor::callable(|_args: ArgumentList| {
            Ok(Outcome::ok(json!({ "status": "ok" })))
        }))?
        .register(
            Method::GET,
            "/me",
            HandlerDescriptor::callable(move |args: ArgumentList| {
                let request = args.request(0).ok_or("request missing")?;
                match RequestAuth::new(auth.as_ref(), request.headers()).require() {
                    Ok(principal) => Outcome::serialize(StatusCode::Ok, principal),
                    Err(denied) => Ok(denied),
                }
            }),
            ArgumentConvention::RequestWithBody,
        )?
        .get("/content-types/{typeId}/content", content("index"))?
        .get("/content-types/{typeId}/content/{id}", content("show"))?
        .post("/content-types/{typeId}/content", content("store"))?
        .put("/content-types/{typeId}/content/{id}", content("update"))?
        .delete("/content-types/{typeId}/content/{id}", content("destroy"))?
        .register(
            Method::POST,
            "/menus/{menuId}/items",
            HandlerDescriptor::bound(menus.clone(), "addItem"),
            ArgumentConvention::nested_item(),
        )?
        .register(
            Method::PUT,
            "/menus/{menuId}/items/{itemId}",
            HandlerDescriptor::bound(menus, "updateItem"),
            ArgumentConvention::nested_item(),
        )?
        .register(
            Method::POST,
            "/media/upload",
            HandlerDescriptor::callable(|args: ArgumentList| {
                let request = args.request(0).ok_or("request missing")?;
                let name = request.body().get_str("filename").unwrap_or_else(|| "upload.bin".to_string());
                Ok(Outcome::created(envelope::success(json!({
                    "filename": name,
                    "folder": request.query_param("folder"),
                }))))
            }),
            ArgumentConvention::RequestWithBody,
        )?;

    // Settings accept either `{"value": ...}` or a bare scalar body; the
    // handler always sees `{"key": ..., "value": ...}`.
    dispatcher.route(
        Route::new(
            Method::PUT,
            "/settings/{key}",
            HandlerDescriptor::callable(|args: ArgumentList| Ok(Outcome::success(args.body(2).to_value()))),
        )?
        .with_body_rewrite(|ctx: &RequestContext, params: &[String]| {
            let value = ctx.body().get("value").unwrap_or_else(|| ctx.body().to_value());
            BodyValue::Json(json!({ "key": params.first(), "value": value }))
        }),
    );

    dispatcher.not_found(HandlerDescriptor::callable(|args: ArgumentList| {
        let path = args.request(0).map(|r| r.path().to_string()).unwrap_or_default();
        Ok(Outcome::fail(StatusCode::NotFound, format!("No endpoint at {path}")))
    }));

    Ok(dispatcher)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let dispatcher = build_dispatcher(Arc::new(MemoryStore::default()), Arc::new(TokenAuth::new()))?;
    let config = ServerConfig::default();
    info!("Starting CMS API on {addr}", addr = config.addr);

    let server = HttpServer::new(config, dispatcher);
    server.start().await?;

    Ok(())
}
