//! Payment provider client tests against a mocked provider API.

use std::collections::BTreeMap;
use std::time::Duration;

use assert_matches::assert_matches;
use lovepage_api::{
    errors::ServiceError,
    services::{
        commerce::checkout_service::{CheckoutGateway, CheckoutSessionRequest},
        payments::StripeClient,
        promotions::PromotionLookup,
    },
};
use serde_json::json;
use uuid::Uuid;
use wiremock::{
    matchers::{body_string_contains, header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

const SECRET: &str = "sk_test_lovepage";

fn client(server: &MockServer) -> StripeClient {
    StripeClient::new(server.uri(), SECRET, Duration::from_secs(5)).expect("client")
}

fn session_request(promotion: Option<&str>) -> CheckoutSessionRequest {
    let mut metadata = BTreeMap::new();
    metadata.insert("planId".to_string(), "plan-1".to_string());
    CheckoutSessionRequest {
        plan_id: Uuid::new_v4(),
        product_name: "Forever Page".to_string(),
        currency: "BRL".to_string(),
        unit_amount_cents: 1791,
        promotion_code_id: promotion.map(str::to_string),
        customer_email: Some("ana@example.com".to_string()),
        metadata,
        success_url: "https://lovepage.example/ok".to_string(),
        cancel_url: "https://lovepage.example/cancel".to_string(),
    }
}

#[tokio::test]
async fn finds_active_promotion_by_code() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/promotion_codes"))
        .and(query_param("code", "WELCOME"))
        .and(query_param("active", "true"))
        .and(query_param("limit", "1"))
        .and(header("authorization", format!("Bearer {}", SECRET).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [{ "id": "promo_123", "code": "WELCOME", "active": true }],
            "has_more": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    let promotion = client(&server)
        .find_active_promotion("WELCOME")
        .await
        .unwrap()
        .expect("promotion");

    assert_eq!(promotion.id, "promo_123");
    assert_eq!(promotion.code, "WELCOME");
}

#[tokio::test]
async fn empty_list_means_no_promotion() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/promotion_codes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [],
            "has_more": false
        })))
        .mount(&server)
        .await;

    let promotion = client(&server).find_active_promotion("NOPE").await.unwrap();

    assert!(promotion.is_none());
}

#[tokio::test]
async fn provider_error_status_is_an_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/promotion_codes"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let err = client(&server)
        .find_active_promotion("WELCOME")
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::ExternalApiError(msg) => {
        assert!(msg.contains("500"));
    });
}

#[tokio::test]
async fn slow_provider_is_a_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/promotion_codes"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "data": [] }))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let client = StripeClient::new(server.uri(), SECRET, Duration::from_millis(50)).unwrap();
    let err = client.find_active_promotion("WELCOME").await.unwrap_err();

    assert_matches!(err, ServiceError::ExternalServiceError(_));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn creates_checkout_session_with_form_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/checkout/sessions"))
        .and(header("authorization", format!("Bearer {}", SECRET).as_str()))
        .and(body_string_contains("mode=payment"))
        .and(body_string_contains(
            "line_items%5B0%5D%5Bprice_data%5D%5Bunit_amount%5D=1791",
        ))
        .and(body_string_contains(
            "line_items%5B0%5D%5Bprice_data%5D%5Bcurrency%5D=brl",
        ))
        .and(body_string_contains("metadata%5BplanId%5D=plan-1"))
        .and(body_string_contains(
            "discounts%5B0%5D%5Bpromotion_code%5D=promo_9",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "cs_test_abc",
            "object": "checkout.session",
            "url": "https://checkout.stripe.com/c/pay/cs_test_abc"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = client(&server)
        .create_session(&session_request(Some("promo_9")))
        .await
        .unwrap();

    assert_eq!(session.id, "cs_test_abc");
    assert_eq!(
        session.url.as_deref(),
        Some("https://checkout.stripe.com/c/pay/cs_test_abc")
    );
}

#[tokio::test]
async fn rejected_session_is_an_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/checkout/sessions"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "type": "invalid_request_error", "message": "No such promotion code" }
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .create_session(&session_request(Some("promo_gone")))
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::ExternalApiError(msg) => {
        assert!(msg.contains("No such promotion code"));
    });
}
