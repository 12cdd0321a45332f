//! Integration tests for the signed call pipeline against a mock Pagopar API.

use std::sync::Arc;

use httpmock::prelude::*;
use pagopar_client::{
    Application, ApplicationConfig, CallSpec, HttpConfig, PagoparError, Registry, SessionStatus,
    checkout::{self, GetOrder},
    error::RejectionKind,
    signer,
};
use serde_json::{Map, Value, json};

const PRIVATE: &str = "private-key";
const PUBLIC: &str = "public-key";

fn http_for(server: &MockServer) -> HttpConfig {
    HttpConfig { base_url: format!("{}/api/", server.base_url()), allow_insecure_http: true, ..HttpConfig::default() }
}

fn app_for(server: &MockServer) -> Arc<Application> {
    Registry::new()
        .initialize(ApplicationConfig::new("shop").with_credentials(PRIVATE, PUBLIC).with_http(http_for(server)))
        .unwrap()
}

#[tokio::test]
async fn test_post_sends_signed_json_body() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/api/forma-pago/1.1/traer/")
            .header("content-type", "application/json; charset=utf-8")
            .json_body(json!({"token": signer::sign("FORMA-PAGO", PRIVATE), "token_publico": PUBLIC}));
        then.status(200).json_body(json!({
            "respuesta": true,
            "resultado": [{"forma_pago": "9", "monto_minimo": "1000", "porcentaje_comision": "6.82", "titulo": "Tarjetas"}]
        }));
    });

    let app = app_for(&server);
    let methods = checkout::get_payment_methods(&app).await.unwrap();

    mock.assert();
    assert_eq!(methods.len(), 1);
    assert_eq!(methods[0].id, "9");
    assert_eq!(methods[0].min_amount, 1000);
}

#[tokio::test]
async fn test_rejection_keeps_message() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/api/pedidos/1.1/traer");
        then.status(200).json_body(json!({"respuesta": false, "resultado": "X"}));
    });

    let err = checkout::get_order(&app_for(&server), "abc").await.unwrap_err();
    match err {
        PagoparError::Rejected { kind, message } => {
            assert_eq!(message, "X");
            assert_eq!(kind, RejectionKind::Other);
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_rejection_is_classified() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/api/pedidos/1.1/traer");
        then.status(200).json_body(json!({"respuesta": false, "resultado": "Token no corresponde."}));
    });

    let err = checkout::get_order(&app_for(&server), "abc").await.unwrap_err();
    assert_eq!(err.rejection_kind(), Some(RejectionKind::InvalidToken));
}

#[tokio::test]
async fn test_malformed_body_with_error_status_is_transport() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/api/pedidos/1.1/traer");
        then.status(500).body("<html>Internal Server Error</html>");
    });

    let err = checkout::get_order(&app_for(&server), "abc").await.unwrap_err();
    assert!(err.is_transport(), "got {err:?}");
    assert_eq!(err.status().map(|s| s.as_u16()), Some(500));
}

#[tokio::test]
async fn test_malformed_body_with_ok_status_is_protocol() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/api/pedidos/1.1/traer");
        then.status(200).body("not json");
    });

    let err = checkout::get_order(&app_for(&server), "abc").await.unwrap_err();
    assert!(matches!(err, PagoparError::Protocol { ref path, .. } if path == "pedidos/1.1/traer"));
}

#[tokio::test]
async fn test_error_status_with_valid_envelope_is_decoded() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/api/pedidos/1.1/traer");
        then.status(400).json_body(json!({"respuesta": false, "resultado": "No existe el pedido"}));
    });

    let err = checkout::get_order(&app_for(&server), "abc").await.unwrap_err();
    assert_eq!(err.rejection_kind(), Some(RejectionKind::NotFound));
}

#[tokio::test]
async fn test_empty_result_list_is_protocol() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/api/pedidos/1.1/traer");
        then.status(200).json_body(json!({"respuesta": true, "resultado": []}));
    });

    let err = checkout::get_order(&app_for(&server), "abc").await.unwrap_err();
    assert!(matches!(err, PagoparError::Protocol { .. }));
}

#[tokio::test]
async fn test_get_sends_signed_query() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/api/pedidos/1.1/traer")
            .query_param("hash_pedido", "abc")
            .query_param("datos_adicionales", "true")
            .query_param("token", signer::sign("CONSULTA", PRIVATE))
            .query_param("public_key", PUBLIC);
        then.status(200).json_body(json!({"respuesta": true}));
    });

    let mut payload = Map::new();
    payload.insert("hash_pedido".to_owned(), json!("abc"));
    payload.insert("datos_adicionales".to_owned(), json!(true));
    payload.insert("omitted".to_owned(), Value::Null);
    let spec = CallSpec::new(reqwest::Method::GET, "pedidos/1.1/traer", "CONSULTA").with_payload(payload);

    let result: Value = app_for(&server).call(spec).await.unwrap();

    mock.assert();
    assert_eq!(result, Value::Null);
}

#[tokio::test]
async fn test_get_with_nested_payload_fails_before_sending() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.path("/api/pedidos/1.1/traer");
        then.status(200).json_body(json!({"respuesta": true}));
    });

    let mut payload = Map::new();
    payload.insert("filtro".to_owned(), json!({"estado": "pagado"}));
    let spec = CallSpec::new(reqwest::Method::GET, "pedidos/1.1/traer", "CONSULTA").with_payload(payload);

    let err = app_for(&server).call::<Value>(spec).await.unwrap_err();

    assert!(matches!(err, PagoparError::InvalidQuery { ref field } if field == "filtro"));
    assert_eq!(mock.calls(), 0);
}

#[tokio::test]
async fn test_unsupported_method_fails_before_sending() {
    let server = MockServer::start();
    let app = app_for(&server);
    let method = reqwest::Method::from_bytes(b"PURGE").unwrap();

    let err = app.call::<Value>(CallSpec::new(method, "pedidos/1.1/traer", "CONSULTA")).await.unwrap_err();

    assert!(matches!(err, PagoparError::UnsupportedMethod(ref m) if m == "PURGE"));
    assert_eq!(app.session_status(), SessionStatus::NotCreated);
}

#[tokio::test]
async fn test_path_escaping_base_is_rejected() {
    let server = MockServer::start();
    let err = app_for(&server).call::<Value>(CallSpec::post("../admin", "x")).await.unwrap_err();
    assert!(matches!(err, PagoparError::InvalidInput(_)));
}

#[tokio::test]
async fn test_session_is_reused_and_reopened() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/api/forma-pago/1.1/traer/");
        then.status(200).json_body(json!({"respuesta": true, "resultado": []}));
    });
    let app = app_for(&server);

    checkout::get_payment_methods(&app).await.unwrap();
    checkout::get_payment_methods(&app).await.unwrap();
    assert_eq!(app.session_status(), SessionStatus::Open);
    assert_eq!(app.sessions_opened(), 1);

    app.close_session();
    assert_eq!(app.session_status(), SessionStatus::Closed);

    checkout::get_payment_methods(&app).await.unwrap();
    assert_eq!(app.sessions_opened(), 2);
}

#[tokio::test]
async fn test_session_guard_closes_after_calls() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/api/forma-pago/1.1/traer/");
        then.status(200).json_body(json!({"respuesta": true, "resultado": []}));
    });
    let app = app_for(&server);

    {
        let guard = app.acquire().unwrap();
        checkout::get_payment_methods(&guard).await.unwrap();
        assert_eq!(guard.session_status(), SessionStatus::Open);
    }
    assert_eq!(app.session_status(), SessionStatus::Closed);
}

#[tokio::test]
async fn test_registry_send_resolves_default_and_rejects_foreign() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/api/pedidos/1.1/traer");
        then.status(200).json_body(json!({"respuesta": true, "resultado": []}));
    });

    let registry = Registry::new();
    let err = registry.send(None, &GetOrder::new("abc")).await.unwrap_err();
    assert!(matches!(err, PagoparError::NotFound(_)));

    let default = registry
        .initialize(
            ApplicationConfig::new(pagopar_client::config::DEFAULT_APP_NAME)
                .with_credentials(PRIVATE, PUBLIC)
                .with_http(http_for(&server)),
        )
        .unwrap();
    let orders = registry.send(None, &GetOrder::new("abc")).await.unwrap();
    assert!(orders.is_empty());
    assert_eq!(default.sessions_opened(), 1);

    let foreign = app_for(&server);
    let err = registry.send(Some(&foreign), &GetOrder::new("abc")).await.unwrap_err();
    assert!(matches!(err, PagoparError::ForeignInstance(_)));
    assert_eq!(mock.calls(), 1);
}

#[tokio::test]
async fn test_order_token_verification() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/api/pedidos/1.1/traer");
        then.status(200).json_body(json!({
            "respuesta": true,
            "resultado": [{
                "monto": "100000.00", "cancelado": false, "fecha_maxima_pago": "2025-01-31 23:59:00",
                "hash_pedido": "abc", "numero_pedido": 1234, "pagado": true,
                "fecha_pago": "2025-01-30 10:00:00",
                "mensaje_resultado_pago": {"descripcion": "ok", "titulo": "Pagado"},
                "forma_pago_identificador": "9", "forma_pago": "Tarjetas de crédito",
                "token": signer::sign("abc", PRIVATE)
            }]
        }));
    });
    let app = app_for(&server);

    let order = checkout::get_order(&app, "abc").await.unwrap();

    assert!(order.paid);
    assert_eq!(order.order_number, "1234");
    assert!(order.is_authentic(&app));
    assert!(!app.verify_payment_token("other", &order.token));
}

#[tokio::test]
async fn test_closed_application_handle_cannot_send() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/api/forma-pago/1.1/traer/");
        then.status(200).json_body(json!({"respuesta": true, "resultado": []}));
    });

    let registry = Registry::new();
    let stale = registry
        .initialize(ApplicationConfig::new("shop").with_credentials(PRIVATE, PUBLIC).with_http(http_for(&server)))
        .unwrap();
    checkout::get_payment_methods(&stale).await.unwrap();
    registry.close("shop").unwrap();

    let err = checkout::get_payment_methods(&stale).await.unwrap_err();

    assert!(matches!(err, PagoparError::ForeignInstance(ref name) if name == "shop"));
    assert_eq!(stale.session_status(), SessionStatus::Retired);
    assert_eq!(stale.sessions_opened(), 1);
    assert_eq!(mock.calls(), 1);
}
