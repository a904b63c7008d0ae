//! End-to-end tests for the HTTP path of the gateway.

use std::io::Read;
use std::time::Duration;

use axum::http::{header, StatusCode};
use flate2::read::GzDecoder;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use module_gateway::config::GatewayConfig;
use module_gateway::http::response;
use module_gateway::module::{EchoModule, Module};
use module_gateway::routing::ModuleRequestEvent;
use module_gateway::{GatewayRequest, HttpModule, HttpParams, ModuleError, ResponseBuilder, ResponseDraft};

mod common;

/// Answers with a fixed outcome chosen by the request path.
struct Scripted;

impl HttpModule for Scripted {
    fn handle_request(
        &self,
        path: &str,
        _params: &HttpParams,
        _request: &GatewayRequest,
    ) -> Result<Option<ResponseDraft>, ModuleError> {
        match path {
            "/empty" => Ok(None),
            "/fail" => Err("secret database detail".into()),
            "/panic" => panic!("secret panic detail"),
            "/encoded" => Ok(Some(
                ResponseBuilder::ok()
                    .header(header::CONTENT_ENCODING, "identity")
                    .content("as is")
                    .content_type_plain_text()
                    .build()?,
            )),
            "/cors" => Ok(Some(
                ResponseBuilder::ok()
                    .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "https://module.example")
                    .content("own cors")
                    .build()?,
            )),
            "/redirect" => Ok(Some(response::redirect("/echo", false)?)),
            "/missing" => Ok(Some(response::error(StatusCode::NOT_FOUND, Some("no such item")))),
            _ => Ok(Some(ResponseBuilder::ok().content("plain").content_type_plain_text().build()?)),
        }
    }
}

#[tokio::test]
async fn echo_returns_merged_parameters() {
    let gateway = common::start_gateway(GatewayConfig::default()).await;
    gateway.registry.register("echo", Module::dual(EchoModule)).unwrap();

    let res = common::client()
        .get(gateway.url("/echo/hi?x=1"))
        .body("y=2")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["module"], "echo");
    assert_eq!(res.headers()[header::SERVER], env!("CARGO_PKG_NAME"));
    assert!(res.headers().contains_key("x-powered-by"));
    assert!(res.headers().contains_key(header::DATE));
    assert!(res.headers().contains_key("x-request-id"));
    assert!(!res.headers().contains_key(header::CONTENT_ENCODING));

    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body, serde_json::json!({"x": "1", "y": "2"}));

    gateway.stop().await;
}

#[tokio::test]
async fn body_wins_over_query_and_query_is_decoded() {
    let gateway = common::start_gateway(GatewayConfig::default()).await;
    gateway.registry.register("echo", Module::http(EchoModule)).unwrap();

    let res = common::client()
        .post(gateway.url("/ECHO?a=1&b=2&msg=hello+world%21"))
        .body("b=9&c=3&junk")
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(
        body,
        serde_json::json!({"a": "1", "b": "9", "c": "3", "msg": "hello world!"})
    );

    gateway.stop().await;
}

#[tokio::test]
async fn unknown_module_is_not_found() {
    let gateway = common::start_gateway(GatewayConfig::default()).await;

    let res = common::client().get(gateway.url("/ghost")).send().await.unwrap();
    assert_eq!(res.status(), 404);
    assert_eq!(res.headers()[header::CONNECTION], "close");
    assert!(res.text().await.unwrap().starts_with("404 Not Found"));

    gateway.stop().await;
}

#[tokio::test]
async fn gzip_is_negotiated() {
    let gateway = common::start_gateway(GatewayConfig::default()).await;
    gateway.registry.register("echo", Module::http(EchoModule)).unwrap();
    gateway.registry.register("scripted", Module::http(Scripted)).unwrap();
    let client = common::client();

    let res = client
        .get(gateway.url("/echo?k=v"))
        .header(header::ACCEPT_ENCODING, "deflate, GZIP")
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()[header::CONTENT_ENCODING], "gzip");
    assert_eq!(res.headers()[header::VARY], "Accept-Encoding");
    let compressed = res.bytes().await.unwrap();
    let mut plain = String::new();
    GzDecoder::new(&compressed[..]).read_to_string(&mut plain).unwrap();
    assert_eq!(plain, r#"{"k":"v"}"#);

    // An explicit encoding on the draft is left alone
    let res = client
        .get(gateway.url("/scripted/encoded"))
        .header(header::ACCEPT_ENCODING, "gzip")
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()[header::CONTENT_ENCODING], "identity");
    assert_eq!(res.text().await.unwrap(), "as is");

    gateway.stop().await;
}

#[tokio::test]
async fn vetoed_request_is_forbidden() {
    let gateway = common::start_gateway(GatewayConfig::default()).await;
    gateway.registry.register("echo", Module::http(EchoModule)).unwrap();
    gateway.hooks.register(|event: &mut ModuleRequestEvent| {
        if event.remote_addr().ip().is_loopback() && event.module_id() == Some("echo") {
            event.set_cancelled(true);
        }
    });

    let res = common::client().get(gateway.url("/echo")).send().await.unwrap();
    assert_eq!(res.status(), 403);
    assert_eq!(
        res.text().await.unwrap(),
        "403 Forbidden\r\nThe request has been canceled by an event listener"
    );

    gateway.stop().await;
}

#[tokio::test]
async fn handler_outcomes_map_to_statuses() {
    let gateway = common::start_gateway(GatewayConfig::default()).await;
    gateway.registry.register("scripted", Module::http(Scripted)).unwrap();
    let client = common::client();

    let res = client.get(gateway.url("/scripted/empty")).send().await.unwrap();
    assert_eq!(res.status(), 204);

    for path in ["/scripted/fail", "/scripted/panic"] {
        let res = client.get(gateway.url(path)).send().await.unwrap();
        assert_eq!(res.status(), 500);
        let body = res.text().await.unwrap();
        assert_eq!(body, "500 Internal Server Error");
        assert!(!body.contains("secret"));
    }

    let res = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .build()
        .unwrap()
        .get(gateway.url("/scripted/redirect"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 302);
    assert_eq!(res.headers()[header::LOCATION], "/echo");

    let res = client.get(gateway.url("/scripted/missing")).send().await.unwrap();
    assert_eq!(res.status(), 404);
    assert_eq!(res.headers()["module"], "scripted");
    assert_eq!(res.text().await.unwrap(), "404 Not Found\r\nno such item");

    gateway.stop().await;
}

#[tokio::test]
async fn cors_header_added_unless_present() {
    let mut config = GatewayConfig::default();
    config.response.access_control_allow_origin = Some("*".into());
    let gateway = common::start_gateway(config).await;
    gateway.registry.register("scripted", Module::http(Scripted)).unwrap();
    let client = common::client();

    let res = client.get(gateway.url("/scripted/plain")).send().await.unwrap();
    assert_eq!(res.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");

    let res = client.get(gateway.url("/scripted/cors")).send().await.unwrap();
    let origins: Vec<_> = res
        .headers()
        .get_all(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .iter()
        .collect();
    assert_eq!(origins, vec!["https://module.example"]);

    gateway.stop().await;
}

#[tokio::test]
async fn reloaded_settings_apply_to_next_request() {
    let gateway = common::start_gateway(GatewayConfig::default()).await;
    gateway.registry.register("scripted", Module::http(Scripted)).unwrap();
    let client = common::client();

    let mut config = GatewayConfig::default();
    config.response.server_name = "reloaded".into();
    gateway.config_updates.send(config).unwrap();

    let server = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let res = client.get(gateway.url("/scripted")).send().await.unwrap();
            let server = res.headers()[header::SERVER].to_str().unwrap().to_string();
            if server == "reloaded" {
                break server;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(server, "reloaded");

    gateway.stop().await;
}

#[tokio::test]
async fn malformed_request_is_bad_request() {
    let gateway = common::start_gateway(GatewayConfig::default()).await;
    gateway.registry.register("echo", Module::http(EchoModule)).unwrap();

    let mut stream = tokio::net::TcpStream::connect(gateway.addr).await.unwrap();
    stream.write_all(b"NOT A REQUEST\r\n\r\n").await.unwrap();
    let mut reply = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut reply)).await;
    assert!(String::from_utf8_lossy(&reply).starts_with("HTTP/1.1 400"));

    gateway.stop().await;
}

#[tokio::test]
async fn oversized_body_is_bad_request() {
    let mut config = GatewayConfig::default();
    config.listener.max_body_size = 16;
    let gateway = common::start_gateway(config).await;
    gateway.registry.register("echo", Module::http(EchoModule)).unwrap();

    let res = common::client()
        .post(gateway.url("/echo"))
        .body("a=".repeat(64))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);

    gateway.stop().await;
}
