//! Request dispatch (§4.6): maps one `hyper::Request<Incoming>` to a
//! `hyper::Response<Full<Bytes>>` — built-in endpoints, JSON body handling,
//! procedure invocation, and the error-to-status mapping (§7).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request, Response, StatusCode};

use trx_core::{TrxError, Value};
use trx_exec::Interpreter;

use crate::router::{normalize_path, MatchOutcome, RouteTable};

const CORS_METHODS: &str = "GET, POST, PUT, PATCH, DELETE, OPTIONS";

/// The shared, read-only state every worker dispatches requests against
/// (§5: "dispatcher tables... are immutable after startup").
pub struct Dispatcher {
    pub interpreter: Arc<Interpreter>,
    pub routes: Arc<RouteTable>,
}

fn json_response(status: StatusCode, body: Value) -> Response<Full<Bytes>> {
    plain_response(status, "application/json", body.to_json_string())
}

fn plain_response(status: StatusCode, content_type: &str, body: String) -> Response<Full<Bytes>> {
    let len = body.len();
    Response::builder()
        .status(status)
        .header("Content-Type", content_type)
        .header("Content-Length", len.to_string())
        .header("Connection", "close")
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", CORS_METHODS)
        .header("Access-Control-Allow-Headers", "Content-Type")
        .body(Full::new(Bytes::from(body)))
        .expect("well-formed response")
}

fn error_value(err: &TrxError) -> Value {
    let mut map = std::collections::BTreeMap::new();
    map.insert("error".to_string(), Value::String(err.message()));
    Value::Object(map)
}

fn status_for_error(err: &TrxError) -> StatusCode {
    if err.is_explicit_throw() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

fn success_status(method: &Method) -> StatusCode {
    match *method {
        Method::POST => StatusCode::CREATED,
        Method::PUT | Method::PATCH => StatusCode::OK,
        Method::DELETE => StatusCode::NO_CONTENT,
        _ => StatusCode::OK,
    }
}

/// A request body the dispatcher can read to completion — `hyper::body::
/// Incoming` in production, any `http_body_util` body (e.g. `Full<Bytes>`)
/// in tests, so the whole dispatch pipeline is exercisable via
/// `tower::ServiceExt::oneshot` without a real socket.
pub trait RequestBody: hyper::body::Body<Data = Bytes> + Send + 'static {}
impl<B> RequestBody for B where B: hyper::body::Body<Data = Bytes> + Send + 'static {}

/// Dispatches one request (§4.6 steps 1-5). Records metrics around the
/// whole call so in-flight/total/error/duration accounting covers built-in
/// endpoints too, not just procedure invocations.
pub async fn dispatch<B>(dispatcher: Arc<Dispatcher>, req: Request<B>) -> Response<Full<Bytes>>
where
    B: RequestBody,
    B::Error: std::fmt::Display,
{
    let _in_flight = trx_metrics::InFlightGuard::start();
    let start = Instant::now();

    let (response, is_error) = route(dispatcher, req).await;

    let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
    trx_metrics::record_request(is_error, duration_ms);
    response
}

async fn route<B>(dispatcher: Arc<Dispatcher>, req: Request<B>) -> (Response<Full<Bytes>>, bool)
where
    B: RequestBody,
    B::Error: std::fmt::Display,
{
    let method = req.method().clone();

    if method == Method::OPTIONS {
        return (plain_response(StatusCode::NO_CONTENT, "text/plain", String::new()), false);
    }

    let raw_path = req.uri().path().to_string();
    let built_in_path = raw_path.strip_prefix('/').unwrap_or(&raw_path);

    match (method.as_str(), built_in_path) {
        ("GET", "") | ("GET", "index.html") => {
            return (plain_response(StatusCode::OK, "text/html; charset=utf-8", dispatcher.routes.swagger_html.clone()), false);
        }
        ("GET", "swagger.json") => {
            return (plain_response(StatusCode::OK, "application/json", dispatcher.routes.openapi_json.clone()), false);
        }
        ("GET", "procedures") => {
            return (plain_response(StatusCode::OK, "application/json", dispatcher.routes.procedures_json.clone()), false);
        }
        ("GET", "metrics") => {
            return (plain_response(StatusCode::OK, "text/plain; version=0.0.4", trx_metrics::render()), false);
        }
        _ => {}
    }

    let normalized = normalize_path(&raw_path);
    let outcome = dispatcher.routes.match_route(method.as_str(), normalized);
    match outcome {
        MatchOutcome::NoMatch => {
            tracing::debug!(%method, path = %raw_path, "no route matched");
            (json_response(StatusCode::NOT_FOUND, error_value(&TrxError::not_found(format!("no route for {method} {raw_path}")))), true)
        }
        MatchOutcome::WrongMethod => {
            tracing::debug!(%method, path = %raw_path, "path matched but method is not supported");
            (
                json_response(
                    StatusCode::METHOD_NOT_ALLOWED,
                    error_value(&TrxError::not_found(format!("{raw_path} does not support {method}"))),
                ),
                true,
            )
        }
        MatchOutcome::Matched { proc_name, path_params } => {
            tracing::debug!(%method, path = %raw_path, procedure = %proc_name, "route matched");
            invoke_procedure(dispatcher, &method, req, proc_name, path_params).await
        }
    }
}

async fn invoke_procedure<B>(
    dispatcher: Arc<Dispatcher>,
    method: &Method,
    req: Request<B>,
    proc_name: String,
    path_params: HashMap<String, String>,
) -> (Response<Full<Bytes>>, bool)
where
    B: RequestBody,
    B::Error: std::fmt::Display,
{
    let input = match read_json_body(method, req).await {
        Ok(v) => v,
        Err(resp) => return (resp, true),
    };

    match dispatcher.interpreter.invoke_exported(&proc_name, input, path_params).await {
        Ok(output) => (json_response(success_status(method), output), false),
        Err(err) => (json_response(status_for_error(&err), error_value(&err)), true),
    }
}

/// Parses the request body into the procedure's input `Value` (§4.6 step 4):
/// skipped entirely for GET/HEAD/DELETE, a missing/non-JSON `Content-Type`
/// on a method that does carry a body is a 400 (§7: "missing Content-Type
/// for methods that require a body ⇒ 400"), an empty body becomes `{}`, and
/// a non-object top-level JSON value or a parse failure is a 400.
async fn read_json_body<B>(method: &Method, req: Request<B>) -> Result<Value, Response<Full<Bytes>>>
where
    B: RequestBody,
    B::Error: std::fmt::Display,
{
    if matches!(*method, Method::GET | Method::HEAD | Method::DELETE) {
        return Ok(Value::object());
    }

    let content_type_ok = req
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("application/json"));
    if !content_type_ok {
        return Err(json_response(
            StatusCode::BAD_REQUEST,
            error_value(&TrxError::type_error("Content-Type must be application/json")),
        ));
    }

    let bytes = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            return Err(json_response(
                StatusCode::BAD_REQUEST,
                error_value(&TrxError::type_error(format!("failed to read request body: {e}"))),
            ))
        }
    };

    if bytes.is_empty() {
        return Ok(Value::object());
    }

    match Value::from_json_bytes(&bytes) {
        Ok(v) if v.is_object() => Ok(v),
        Ok(_) => Err(json_response(
            StatusCode::BAD_REQUEST,
            error_value(&TrxError::type_error("request body must be a JSON object")),
        )),
        Err(e) => Err(json_response(StatusCode::BAD_REQUEST, error_value(&e))),
    }
}
