//! End-to-end dispatcher tests (§4.6, §4.7, §8): a real `RouteTable` built
//! from a small `Module`, driven through the whole `DispatchService` via
//! `tower::ServiceExt::oneshot` — no socket, same in-process pattern the
//! teacher's own HTTP test harness uses for its `axum::Router`.

use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request, StatusCode};
use tower::ServiceExt;

use trx_core::{
    BinaryOp, Expression, Module, ParamDecl, PathParamDecl, PrimitiveType, ProcedureDecl, Statement, Value,
    VariablePath,
};
use trx_exec::Interpreter;
use trx_http::{Dispatcher, DispatchService, RouteTable};
use trx_sql::MemoryDriver;

fn out_path(field: &str) -> VariablePath {
    VariablePath {
        segments: vec![
            trx_core::PathSegment { name: "output".into(), subscript: None },
            trx_core::PathSegment { name: field.into(), subscript: None },
        ],
    }
}

fn get_user_procedure() -> ProcedureDecl {
    ProcedureDecl {
        name: "get_user".into(),
        path_template: Some("/users/{id}".into()),
        path_parameters: vec![PathParamDecl { name: "id".into(), param_type: PrimitiveType::Integer }],
        http_method: None,
        http_headers: vec![],
        input: None,
        output: Some(ParamDecl { name: "user".into(), type_name: "USER".into() }),
        is_exported: true,
        body: vec![Statement::Assign { path: out_path("id"), value: Expression::Variable(VariablePath::simple("id")) }],
        location: None,
    }
}

fn create_user_procedure() -> ProcedureDecl {
    ProcedureDecl {
        name: "create_user".into(),
        path_template: Some("/users".into()),
        path_parameters: vec![],
        http_method: None,
        http_headers: vec![],
        input: Some(ParamDecl { name: "u".into(), type_name: "USER".into() }),
        output: Some(ParamDecl { name: "user".into(), type_name: "USER".into() }),
        is_exported: true,
        body: vec![Statement::Assign {
            path: VariablePath::simple("output"),
            value: Expression::Variable(VariablePath::simple("u")),
        }],
        location: None,
    }
}

fn boom_procedure() -> ProcedureDecl {
    ProcedureDecl {
        name: "boom".into(),
        path_template: Some("/boom".into()),
        path_parameters: vec![],
        http_method: Some("GET".into()),
        http_headers: vec![],
        input: None,
        output: Some(ParamDecl { name: "never".into(), type_name: "STRING".into() }),
        is_exported: true,
        body: vec![Statement::Throw(Expression::Literal(Value::String("kaboom".into())))],
        location: None,
    }
}

fn update_user_procedure() -> ProcedureDecl {
    ProcedureDecl {
        name: "update_user".into(),
        path_template: Some("/users/{id}".into()),
        path_parameters: vec![PathParamDecl { name: "id".into(), param_type: PrimitiveType::Integer }],
        http_method: Some("PUT".into()),
        http_headers: vec![],
        input: Some(ParamDecl { name: "u".into(), type_name: "USER".into() }),
        output: Some(ParamDecl { name: "user".into(), type_name: "USER".into() }),
        is_exported: true,
        body: vec![Statement::Assign {
            path: VariablePath::simple("output"),
            value: Expression::Variable(VariablePath::simple("u")),
        }],
        location: None,
    }
}

fn delete_user_procedure() -> ProcedureDecl {
    ProcedureDecl {
        name: "delete_user".into(),
        path_template: Some("/users/{id}".into()),
        path_parameters: vec![PathParamDecl { name: "id".into(), param_type: PrimitiveType::Integer }],
        http_method: Some("DELETE".into()),
        http_headers: vec![],
        input: None,
        output: None,
        is_exported: true,
        body: vec![],
        location: None,
    }
}

fn internal_only_procedure() -> ProcedureDecl {
    // Not exported — used to prove unexported procedures never get a route.
    ProcedureDecl {
        name: "internal_only".into(),
        path_template: Some("/internal".into()),
        path_parameters: vec![],
        http_method: None,
        http_headers: vec![],
        input: None,
        output: None,
        is_exported: false,
        body: vec![Statement::Return(Expression::Binary {
            op: BinaryOp::Add,
            left: Box::new(Expression::Literal(Value::Number(1.0))),
            right: Box::new(Expression::Literal(Value::Number(1.0))),
        })],
        location: None,
    }
}

fn demo_module() -> Module {
    Module {
        records: vec![],
        tables: vec![],
        procedures: vec![
            get_user_procedure(),
            create_user_procedure(),
            update_user_procedure(),
            delete_user_procedure(),
            boom_procedure(),
            internal_only_procedure(),
        ],
    }
}

fn test_service() -> DispatchService<Full<Bytes>> {
    let interpreter = Arc::new(Interpreter::new(demo_module(), Arc::new(MemoryDriver::new())));
    let routes = Arc::new(RouteTable::build(interpreter.module(), "test", "0.1", Some("get_user")).unwrap());
    DispatchService::new(Arc::new(Dispatcher { interpreter, routes }))
}

fn empty_request(method: Method, uri: &str) -> Request<Full<Bytes>> {
    Request::builder().method(method).uri(uri).body(Full::new(Bytes::new())).unwrap()
}

fn json_request(method: Method, uri: &str, body: &str) -> Request<Full<Bytes>> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

fn body_without_content_type(method: Method, uri: &str, body: &str) -> Request<Full<Bytes>> {
    Request::builder().method(method).uri(uri).body(Full::new(Bytes::from(body.to_string()))).unwrap()
}

async fn body_string(resp: hyper::Response<Full<Bytes>>) -> (StatusCode, String) {
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test]
async fn path_parameter_is_routed_and_coerced() {
    let resp = test_service().oneshot(empty_request(Method::GET, "/users/42")).await.unwrap();
    let (status, text) = body_string(resp).await;
    assert_eq!(status, StatusCode::OK);
    let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed["id"].as_f64(), Some(42.0));
}

#[tokio::test]
async fn unmatched_path_is_404() {
    let resp = test_service().oneshot(empty_request(Method::GET, "/nope")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn wrong_method_on_a_known_path_is_405() {
    let resp = test_service().oneshot(empty_request(Method::PATCH, "/users/42")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn unexported_procedure_never_gets_a_route() {
    let resp = test_service().oneshot(empty_request(Method::GET, "/internal")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn post_echoes_input_and_reports_created() {
    let resp = test_service()
        .oneshot(json_request(Method::POST, "/users", r#"{"NAME":"Alice"}"#))
        .await
        .unwrap();
    let (status, text) = body_string(resp).await;
    assert_eq!(status, StatusCode::CREATED);
    let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed["NAME"].as_str(), Some("Alice"));
}

#[tokio::test]
async fn missing_content_type_is_400_even_with_a_valid_json_body() {
    let resp = test_service()
        .oneshot(body_without_content_type(Method::POST, "/users", r#"{"NAME":"Alice"}"#))
        .await
        .unwrap();
    let (status, text) = body_string(resp).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(text.contains("Content-Type must be application/json"), "unexpected body: {text}");
}

#[tokio::test]
async fn uncaught_throw_is_400_with_the_fixed_message() {
    let resp = test_service().oneshot(empty_request(Method::GET, "/boom")).await.unwrap();
    let (status, text) = body_string(resp).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(text.contains("Exception thrown by THROW statement"), "unexpected body: {text}");
}

#[tokio::test]
async fn options_preflight_gets_a_cors_no_content_response() {
    let resp = test_service().oneshot(empty_request(Method::OPTIONS, "/users")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_eq!(resp.headers().get("access-control-allow-origin").unwrap(), "*");
}

#[tokio::test]
async fn built_in_endpoints_are_served() {
    let (status, text) = body_string(test_service().oneshot(empty_request(Method::GET, "/procedures")).await.unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(text.contains("get_user"));
    assert!(text.contains("\"default\":\"get_user\""));

    let (status, text) = body_string(test_service().oneshot(empty_request(Method::GET, "/swagger.json")).await.unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(text.contains("\"openapi\""));

    let resp = test_service().oneshot(empty_request(Method::GET, "/")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let (status, text) = body_string(test_service().oneshot(empty_request(Method::GET, "/metrics")).await.unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(text.contains("trx_"));
}

#[tokio::test]
async fn put_reports_ok_and_delete_reports_no_content() {
    // GET -> 200, POST -> 201 (covered above), PUT -> 200, DELETE -> 204 (§4.6).
    let put_resp = test_service()
        .oneshot(json_request(Method::PUT, "/users/9", r#"{"NAME":"Bob"}"#))
        .await
        .unwrap();
    assert_eq!(put_resp.status(), StatusCode::OK);

    let delete_resp = test_service().oneshot(empty_request(Method::DELETE, "/users/9")).await.unwrap();
    assert_eq!(delete_resp.status(), StatusCode::NO_CONTENT);
}
