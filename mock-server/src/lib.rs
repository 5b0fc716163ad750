//! Mock FileMaker Web Publishing Engine.
//!
//! Serves `/fmi/xml/FMPXMLRESULT.xml` over one in-memory table so the client
//! can be exercised end to end. Only database `database` with layout
//! `layout` exists; see [`table::FIELDS`] for its fields.

pub mod render;
pub mod table;

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Form, Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};

use table::{Criterion, Op, SortKey, Table, DATABASE, FIELDS, LAYOUT};

pub const XML_PATH: &str = "/fmi/xml/FMPXMLRESULT.xml";

// FileMaker error codes the mock reports.
const FIELD_MISSING: i32 = 102;
const RECORD_MISSING: i32 = 101;
const LAYOUT_MISSING: i32 = 105;
const INVALID_ACCOUNT: i32 = 212;
const MODID_MISMATCH: i32 = 306;
const CRITERIA_EMPTY: i32 = 400;
const NO_MATCH: i32 = 401;
const FILE_UNOPENABLE: i32 = 802;
const NO_DATABASE: i32 = 955;
const PARAMETER_MISSING: i32 = 958;

#[derive(Clone, Default)]
pub struct AppState {
    table: Arc<RwLock<Table>>,
    auth: Option<Arc<(String, String)>>,
}

pub fn app() -> Router {
    router(AppState::default())
}

/// Like [`app`] but every request must carry these basic-auth credentials.
pub fn app_with_auth(username: &str, password: &str) -> Router {
    router(AppState {
        auth: Some(Arc::new((username.to_string(), password.to_string()))),
        ..Default::default()
    })
}

fn router(state: AppState) -> Router {
    Router::new()
        .route(XML_PATH, get(query_xml).post(form_xml))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    serve(listener, app()).await
}

/// Serve a router built by [`app`] or [`app_with_auth`].
pub async fn serve(listener: TcpListener, app: Router) -> Result<(), std::io::Error> {
    axum::serve(listener, app).await
}

async fn query_xml(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    handle(&state, &headers, params).await
}

async fn form_xml(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(params): Form<Vec<(String, String)>>,
) -> Response {
    handle(&state, &headers, params).await
}

fn xml(body: String) -> Response {
    ([(header::CONTENT_TYPE, "text/xml;charset=UTF-8")], body).into_response()
}

/// `None` when no credentials were sent at all.
fn authorized(state: &AppState, headers: &HeaderMap) -> Option<bool> {
    let Some(expected) = &state.auth else {
        return Some(true);
    };
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Basic ")?;
    let decoded = BASE64.decode(token).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some(user == expected.0 && pass == expected.1)
}

async fn handle(state: &AppState, headers: &HeaderMap, params: Vec<(String, String)>) -> Response {
    match authorized(state, headers) {
        None => return (StatusCode::UNAUTHORIZED, "authorization required").into_response(),
        Some(false) => return xml(render::error(INVALID_ACCOUNT)),
        Some(true) => {}
    }

    let request = match Request::parse(params) {
        Ok(request) => request,
        Err(code) => return xml(render::error(code)),
    };
    info!(action = %request.action, criteria = request.criteria.len(), "mock request");

    let body = match request.run(&mut *state.table.write().await) {
        Ok(body) => body,
        Err(code) => {
            debug!(code, "mock request failed");
            render::error(code)
        }
    };
    xml(body)
}

/// A decoded FMPXMLRESULT request.
#[derive(Debug, Default)]
struct Request {
    action: String,
    criteria: Vec<Criterion>,
    values: Vec<(usize, String)>,
    sort: Vec<(u32, SortKey)>,
    record_id: Option<u64>,
    mod_id: Option<u64>,
    any: bool,
    max: Option<usize>,
    skip: usize,
}

const ACTIONS: &[&str] = &[
    "-new", "-edit", "-delete", "-dup", "-find", "-findall", "-findany", "-view",
];

fn field_index(name: &str) -> Result<usize, i32> {
    FIELDS
        .iter()
        .position(|(n, _, _)| *n == name)
        .ok_or(FIELD_MISSING)
}

impl Request {
    fn parse(params: Vec<(String, String)>) -> Result<Self, i32> {
        let mut request = Request {
            max: Some(50),
            ..Default::default()
        };
        let mut database = None;
        let mut layout = None;
        let mut sort_fields: Vec<(u32, usize)> = Vec::new();
        let mut sort_orders: Vec<(u32, bool)> = Vec::new();

        for (key, value) in params {
            match key.as_str() {
                "-db" => database = Some(value),
                "-lay" => layout = Some(value),
                "-recid" => request.record_id = value.parse().ok(),
                "-modid" => request.mod_id = value.parse().ok(),
                "-lop" => request.any = value == "or",
                "-max" => request.max = value.parse().ok(),
                "-skip" => request.skip = value.parse().unwrap_or(0),
                k if ACTIONS.contains(&k) => request.action = k.to_string(),
                k if k.starts_with("-sortfield.") => {
                    let n = k["-sortfield.".len()..].parse().map_err(|_| PARAMETER_MISSING)?;
                    sort_fields.push((n, field_index(&value)?));
                }
                k if k.starts_with("-sortorder.") => {
                    let n = k["-sortorder.".len()..].parse().map_err(|_| PARAMETER_MISSING)?;
                    sort_orders.push((n, value == "descend"));
                }
                // scripts, response layouts and other modifiers are accepted and ignored
                k if k.starts_with('-') => {}
                k if k.ends_with(".op") => {
                    let name = &k[..k.len() - 3];
                    let field = field_index(name)?;
                    let op = Op::parse(&value).ok_or(PARAMETER_MISSING)?;
                    if let Some(last) = request.criteria.iter_mut().rev().find(|c| c.field == field) {
                        last.op = op;
                    }
                }
                _ => {
                    let field = field_index(&key)?;
                    request.criteria.push(Criterion {
                        field,
                        value: value.clone(),
                        op: Op::Bw,
                    });
                    request.values.push((field, value));
                }
            }
        }

        match database.as_deref() {
            None | Some("") => return Err(NO_DATABASE),
            Some(DATABASE) => {}
            Some(_) => return Err(FILE_UNOPENABLE),
        }
        match layout.as_deref() {
            None => return Err(PARAMETER_MISSING),
            Some(LAYOUT) => {}
            Some(_) => return Err(LAYOUT_MISSING),
        }
        if request.action.is_empty() {
            return Err(PARAMETER_MISSING);
        }

        for (n, field) in sort_fields {
            let descending = sort_orders
                .iter()
                .find(|(m, _)| *m == n)
                .map(|(_, d)| *d)
                .unwrap_or(false);
            request.sort.push((n, SortKey { field, descending }));
        }
        request.sort.sort_by_key(|(n, _)| *n);
        Ok(request)
    }

    fn sort_keys(&self) -> Vec<SortKey> {
        self.sort.iter().map(|(_, key)| key.clone()).collect()
    }

    fn record_id(&self) -> Result<u64, i32> {
        self.record_id.ok_or(PARAMETER_MISSING)
    }

    fn run(&self, table: &mut Table) -> Result<String, i32> {
        match self.action.as_str() {
            "-new" => {
                let id = table.insert(&self.values);
                Ok(self.single(table, id))
            }
            "-edit" => {
                let id = self.record_id()?;
                let current = table.get(id).ok_or(RECORD_MISSING)?;
                if self.mod_id.is_some_and(|m| m != current.mod_id) {
                    return Err(MODID_MISMATCH);
                }
                table.update(id, &self.values).ok_or(RECORD_MISSING)?;
                Ok(self.single(table, id))
            }
            "-delete" => {
                let id = self.record_id()?;
                table.remove(id).ok_or(RECORD_MISSING)?;
                Ok(render::result(table.len(), 0, &[]))
            }
            "-dup" => {
                let id = self.record_id()?;
                let new_id = table.duplicate(id).ok_or(RECORD_MISSING)?;
                Ok(self.single(table, new_id))
            }
            "-view" => Ok(render::result(table.len(), 0, &[])),
            "-findany" => {
                let ids = table.select(&[], false, &[]);
                let id = *ids.first().ok_or(NO_MATCH)?;
                Ok(self.single(table, id))
            }
            "-findall" => Ok(self.page(table, table.select(&[], false, &self.sort_keys()))),
            "-find" => {
                if self.criteria.is_empty() {
                    return Err(CRITERIA_EMPTY);
                }
                let ids = table.select(&self.criteria, self.any, &self.sort_keys());
                if ids.is_empty() {
                    return Err(NO_MATCH);
                }
                Ok(self.page(table, ids))
            }
            _ => Err(PARAMETER_MISSING),
        }
    }

    fn single(&self, table: &Table, id: u64) -> String {
        let rows: Vec<_> = table.get(id).map(|row| (id, row)).into_iter().collect();
        render::result(table.len(), rows.len(), &rows)
    }

    /// Apply `-skip` and `-max` to a found set.
    fn page(&self, table: &Table, ids: Vec<u64>) -> String {
        let found = ids.len();
        let rows: Vec<_> = ids
            .into_iter()
            .skip(self.skip)
            .take(self.max.unwrap_or(usize::MAX))
            .filter_map(|id| table.get(id).map(|row| (id, row)))
            .collect();
        render::result(table.len(), found, &rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn parse_pairs_operator_with_preceding_value() {
        let request = Request::parse(pairs(&[
            ("-db", "database"),
            ("-lay", "layout"),
            ("AGE", "18"),
            ("AGE.op", "gte"),
            ("AGE", "65"),
            ("AGE.op", "lt"),
            ("-find", ""),
        ]))
        .unwrap();
        assert_eq!(request.action, "-find");
        assert_eq!(request.criteria[0].op, Op::Gte);
        assert_eq!(request.criteria[1].op, Op::Lt);
    }

    #[test]
    fn parse_orders_sort_by_precedence() {
        let request = Request::parse(pairs(&[
            ("-db", "database"),
            ("-lay", "layout"),
            ("-sortfield.2", "FIRST"),
            ("-sortorder.2", "descend"),
            ("-sortfield.1", "LAST"),
            ("-sortorder.1", "ascend"),
            ("-findall", ""),
        ]))
        .unwrap();
        let keys = request.sort_keys();
        assert_eq!(keys[0].field, 1);
        assert!(!keys[0].descending);
        assert_eq!(keys[1].field, 0);
        assert!(keys[1].descending);
    }

    #[test]
    fn parse_rejects_unknown_targets() {
        let unknown_db = pairs(&[("-db", "other"), ("-lay", "layout"), ("-findall", "")]);
        assert_eq!(Request::parse(unknown_db).unwrap_err(), FILE_UNOPENABLE);
        let unknown_layout = pairs(&[("-db", "database"), ("-lay", "x"), ("-findall", "")]);
        assert_eq!(Request::parse(unknown_layout).unwrap_err(), LAYOUT_MISSING);
        let unknown_field = pairs(&[("-db", "database"), ("-lay", "layout"), ("MIDDLE", "Q"), ("-find", "")]);
        assert_eq!(Request::parse(unknown_field).unwrap_err(), FIELD_MISSING);
        let no_action = pairs(&[("-db", "database"), ("-lay", "layout")]);
        assert_eq!(Request::parse(no_action).unwrap_err(), PARAMETER_MISSING);
    }
}
