//! REST Client Integration Tests
//!
//! Exercises the API client and list-endpoint refresh sources against a
//! mock HTTP server.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use dashboard_sync::infrastructure::config::ApiSettings;
use dashboard_sync::{ApiClient, ApiError, RefreshError, RefreshSource, Resource, ResourceSource};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Firm {
    id: u32,
    name: String,
    mpid: String,
}

fn client(server: &MockServer) -> ApiClient {
    ApiClient::new(&ApiSettings {
        base_url: format!("{}/", server.uri()),
        request_timeout: Duration::from_secs(5),
    })
    .unwrap()
}

fn firm(id: u32, name: &str, mpid: &str) -> Firm {
    Firm {
        id,
        name: name.to_string(),
        mpid: mpid.to_string(),
    }
}

#[tokio::test]
async fn test_list_decodes_bare_and_wrapped_arrays() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/firms"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 1, "name": "Acme Securities", "mpid": "ACME"}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fees"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;

    let api = client(&server);
    let firms: Vec<Firm> = api.list(Resource::Firms).await.unwrap();
    assert_eq!(firms, vec![firm(1, "Acme Securities", "ACME")]);

    let fees: Vec<serde_json::Value> = api.list(Resource::Fees).await.unwrap();
    assert!(fees.is_empty());
}

#[tokio::test]
async fn test_error_body_messages_are_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/symbols"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "messages": ["symbol already exists", "cusip is invalid"]
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .create::<serde_json::Value, _>(Resource::Symbols, &json!({"symbol": "AAPL"}))
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(422));
    assert_eq!(
        err.messages(),
        vec![
            "symbol already exists".to_string(),
            "cusip is invalid".to_string()
        ]
    );
}

#[tokio::test]
async fn test_undecodable_body_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/firms/7"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = client(&server)
        .get::<Firm>(Resource::Firms, 7)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Decode(_)), "{err:?}");
}

#[tokio::test]
async fn test_update_and_delete_use_item_paths() {
    let server = MockServer::start().await;
    let updated = firm(3, "Beta Capital", "BETA");
    Mock::given(method("PUT"))
        .and(path("/firms/3"))
        .and(body_json(&updated))
        .respond_with(ResponseTemplate::new(200).set_body_json(&updated))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/firms/3"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let api = client(&server);
    let echoed: Firm = api.update(Resource::Firms, 3, &updated).await.unwrap();
    assert_eq!(echoed, updated);
    api.delete(Resource::Firms, 3).await.unwrap();
}

#[tokio::test]
async fn test_resource_source_passes_query_and_maps_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bbo"))
        .and(query_param("symbol", "AAPL"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"symbol": "AAPL", "bid_price": "187.25"}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/bbo"))
        .and(query_param("symbol", "MSFT"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let api = client(&server);

    let aapl = ResourceSource::<serde_json::Value>::new(api.clone(), Resource::Bbo)
        .with_query("symbol", "AAPL");
    let rows = aapl.fetch().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["symbol"], "AAPL");

    let msft = ResourceSource::<serde_json::Value>::new(api, Resource::Bbo)
        .with_query("symbol", "MSFT");
    let err: RefreshError = msft.fetch().await.unwrap_err();
    assert_eq!(err.messages, vec!["503 Service Unavailable".to_string()]);
}

#[tokio::test]
async fn test_unreachable_server_is_a_network_error() {
    // Reserve a port, then free it so connections are refused.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let api = ApiClient::new(&ApiSettings {
        base_url: format!("http://{addr}"),
        request_timeout: Duration::from_secs(5),
    })
    .unwrap();

    let err = api.list::<Firm>(Resource::Firms).await.unwrap_err();
    assert!(matches!(err, ApiError::Network(_)), "{err:?}");
    assert_eq!(err.messages().len(), 1);
}
