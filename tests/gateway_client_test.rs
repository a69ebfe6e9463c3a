use rust_decimal_macros::dec;
use serde_json::json;
use storefront_api::{
    notifications::{EmailSender, HttpEmailSender, CREDENTIALS_SUBJECT},
    payments::{ChargeRequest, ChargeState, GatewayError, PaymentGateway, StripeGateway},
};
use uuid::Uuid;
use wiremock::{
    matchers::{body_partial_json, body_string_contains, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn charge_request(order_id: Uuid) -> ChargeRequest {
    ChargeRequest {
        amount: dec!(26.97),
        currency: "USD".into(),
        order_id,
        customer_id: Uuid::new_v4(),
        receipt_email: Some("jane@example.com".into()),
    }
}

#[tokio::test]
async fn create_charge_posts_minor_units_with_order_metadata() {
    let server = MockServer::start().await;
    let order_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/v1/payment_intents"))
        .and(header("authorization", "Bearer sk_test_123"))
        .and(header("idempotency-key", order_id.to_string().as_str()))
        .and(body_string_contains("amount=2697"))
        .and(body_string_contains("currency=usd"))
        .and(body_string_contains(order_id.to_string().as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pi_123",
            "client_secret": "pi_123_secret_abc",
            "status": "requires_payment_method"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = StripeGateway::new(server.uri(), "sk_test_123").unwrap();
    let charge = gateway
        .create_charge(&charge_request(order_id))
        .await
        .unwrap();

    assert_eq!(charge.charge_id, "pi_123");
    assert_eq!(charge.client_secret, "pi_123_secret_abc");
}

#[tokio::test]
async fn processor_errors_surface_as_api_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/payment_intents"))
        .respond_with(ResponseTemplate::new(402).set_body_json(json!({
            "error": { "type": "card_error", "message": "Your card was declined." }
        })))
        .mount(&server)
        .await;

    let gateway = StripeGateway::new(server.uri(), "sk_test_123").unwrap();
    let err = gateway
        .create_charge(&charge_request(Uuid::new_v4()))
        .await
        .unwrap_err();

    match err {
        GatewayError::Api { status, message } => {
            assert_eq!(status, 402);
            assert_eq!(message, "card_error: Your card was declined.");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn cancel_and_retrieve_report_charge_state() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/payment_intents/pi_9/cancel"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pi_9",
            "status": "canceled"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/payment_intents/pi_9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pi_9",
            "status": "requires_action"
        })))
        .mount(&server)
        .await;

    let gateway = StripeGateway::new(server.uri(), "sk_test_123").unwrap();

    let details = gateway.retrieve_charge("pi_9").await.unwrap();
    assert_eq!(details.charge_id, "pi_9");
    assert_eq!(details.state, ChargeState::RequiresAction);
    assert!(!details.state.is_final());

    let state = gateway.cancel_charge("pi_9").await.unwrap();
    assert_eq!(state, ChargeState::Canceled);
}

#[tokio::test]
async fn retrieves_card_summary() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/payment_methods/pm_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pm_1",
            "card": { "brand": "mastercard", "last4": "4444", "exp_month": 4, "exp_year": 2031 }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/payment_methods/pm_bank"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "pm_bank" })))
        .mount(&server)
        .await;

    let gateway = StripeGateway::new(server.uri(), "sk_test_123").unwrap();
    let card = gateway.retrieve_payment_method("pm_1").await.unwrap();
    assert_eq!(card.brand, "mastercard");
    assert_eq!(card.last4, "4444");
    assert_eq!(card.exp_year, 2031);

    assert!(gateway.retrieve_payment_method("pm_bank").await.is_err());
}

#[tokio::test]
async fn credentials_email_is_posted_to_provider() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/send"))
        .and(header("authorization", "Bearer mail_key"))
        .and(body_partial_json(json!({
            "from": "shop@example.com",
            "to": "guest@example.com",
            "subject": CREDENTIALS_SUBJECT
        })))
        .and(body_string_contains("482913"))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({ "messageId": "m-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let sender = HttpEmailSender::new(
        format!("{}/send", server.uri()),
        Some("mail_key".into()),
        "shop@example.com",
    )
    .unwrap();
    let delivery = sender
        .send_credentials("guest@example.com", "482913")
        .await;

    assert!(delivery.success);
    assert_eq!(delivery.message_id.as_deref(), Some("m-1"));
    assert!(delivery.error.is_none());
}

#[tokio::test]
async fn rejected_email_reports_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("provider down"))
        .mount(&server)
        .await;

    let sender = HttpEmailSender::new(server.uri(), None, "shop@example.com").unwrap();
    let delivery = sender.send_credentials("guest@example.com", "123456").await;

    assert!(!delivery.success);
    assert!(delivery.error.unwrap().contains("500"));
}
