mod common;

use axum::http::{Method, StatusCode};
use common::{response_json, TestApp};
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde_json::json;
use storefront_api::entities::{
    order::{OrderStatus, PaymentStatus},
    purchase_history,
};
use uuid::Uuid;

#[tokio::test]
async fn get_order_by_id_and_number() {
    let app = TestApp::new().await;
    let tee = app
        .seed_product("Lookup Tee", dec!(8.00), dec!(0), "Red", "M", 5)
        .await;
    let data = app.checkout(&tee, 2, "lookup@example.com").await;
    let order_id = data["order_id"].as_str().unwrap().to_string();
    let order_number = data["order_number"].as_str().unwrap().to_string();

    let response = app
        .request(Method::GET, &format!("/api/v1/orders/{order_id}"), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["order"]["order_number"], order_number);
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["items"][0]["line_number"], 1);

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{}", order_number.to_lowercase()),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["order"]["id"], order_id);

    let response = app
        .request(Method::GET, &format!("/api/v1/orders/{}", Uuid::new_v4()), None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_orders_filters_and_paginates() {
    let app = TestApp::new().await;
    let tee = app
        .seed_product("List Tee", dec!(8.00), dec!(0), "Red", "M", 20)
        .await;
    app.checkout(&tee, 1, "alice@example.com").await;
    app.checkout(&tee, 1, "bob@example.com").await;
    let carol = app.checkout(&tee, 1, "carol@example.com").await;

    let response = app
        .request(Method::GET, "/api/v1/orders?page=1&limit=2", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["total"], 3);
    assert_eq!(body["data"]["total_pages"], 2);
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 2);

    let response = app
        .request(Method::GET, "/api/v1/orders?search=BOB@", None)
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["customer_email"], "bob@example.com");

    let carol_id = carol["order_id"].as_str().unwrap();
    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/orders/{carol_id}"),
            Some(json!({ "status": "Cancelled" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(Method::GET, "/api/v1/orders?status=Cancelled", None)
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["id"], carol_id);

    let response = app
        .request(Method::GET, "/api/v1/orders?status=Shipped", None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn completing_twice_records_sale_once() {
    let app = TestApp::new().await;
    let tee = app
        .seed_product("Complete Tee", dec!(8.00), dec!(0), "Red", "M", 5)
        .await;
    let data = app.checkout(&tee, 2, "complete@example.com").await;
    let order_id = Uuid::parse_str(data["order_id"].as_str().unwrap()).unwrap();
    let uri = format!("/api/v1/orders/{order_id}");

    let response = app
        .request(
            Method::PUT,
            &uri,
            Some(json!({ "status": "Completed", "is_delivered": true })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["order"]["status"], "Completed");
    assert_eq!(body["data"]["order"]["is_delivered"], true);

    let response = app
        .request(Method::PUT, &uri, Some(json!({ "status": "Completed" })))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("You cannot update after the order is completed"));

    assert_eq!(app.product(tee.product_id).await.sold_count, 1);
    let history = purchase_history::Entity::find()
        .filter(purchase_history::Column::OrderId.eq(order_id))
        .all(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].product_id, tee.product_id);
    assert_eq!(app.stock(tee.stock_id).await, 3);
}

#[tokio::test]
async fn admin_cancel_restocks_and_cannot_reopen() {
    let app = TestApp::new().await;
    let tee = app
        .seed_product("Admin Tee", dec!(8.00), dec!(0), "Red", "M", 5)
        .await;
    let data = app.checkout(&tee, 4, "admin-cancel@example.com").await;
    let order_id = Uuid::parse_str(data["order_id"].as_str().unwrap()).unwrap();
    let uri = format!("/api/v1/orders/{order_id}");
    assert_eq!(app.stock(tee.stock_id).await, 1);

    let response = app
        .request(Method::PUT, &uri, Some(json!({ "status": "Cancelled" })))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.stock(tee.stock_id).await, 5);

    let response = app
        .request(Method::PUT, &uri, Some(json!({ "status": "Cancelled" })))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.stock(tee.stock_id).await, 5);

    let response = app
        .request(Method::PUT, &uri, Some(json!({ "status": "Processing" })))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.order(order_id).await.status, OrderStatus::Cancelled);
}

#[tokio::test]
async fn admin_can_record_payment_details() {
    let app = TestApp::new().await;
    let tee = app
        .seed_product("Manual Tee", dec!(8.00), dec!(0), "Red", "M", 5)
        .await;
    let data = app.checkout(&tee, 1, "manual@example.com").await;
    let order_id = Uuid::parse_str(data["order_id"].as_str().unwrap()).unwrap();
    let uri = format!("/api/v1/orders/{order_id}");

    let response = app
        .request(
            Method::PUT,
            &uri,
            Some(json!({ "payment_status": "Paid", "transaction_id": "manual-001" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let order = app.order(order_id).await;
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert_eq!(order.transaction_id.as_deref(), Some("manual-001"));
    assert_eq!(order.status, OrderStatus::Processing);

    let response = app.request(Method::PUT, &uri, Some(json!({}))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_reports_database_status() {
    let app = TestApp::new().await;
    let response = app.request(Method::GET, "/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["status"], "up");
    assert_eq!(body["details"]["database"]["status"], "up");
}

#[tokio::test]
async fn openapi_document_lists_order_routes() {
    let app = TestApp::new().await;
    let response = app.request(Method::GET, "/api-docs/openapi.json", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert!(body["paths"]["/api/v1/orders"].is_object());
    assert!(body["paths"]["/api/v1/payments/webhook"].is_object());
}
