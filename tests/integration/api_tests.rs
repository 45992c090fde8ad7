//! API integration tests
//!
//! Run against a live server with migrations applied:
//! `cargo test -- --ignored`. Tokens are minted locally with the server's
//! secret (`JWT_SECRET`, or the default from config/default.toml).

use chrono::{Duration, Utc};
use fbc_library_server::models::user::{Role, UserClaims};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use uuid::Uuid;

const BASE_URL: &str = "http://localhost:8080/api/v1";

fn jwt_secret() -> String {
    std::env::var("JWT_SECRET").unwrap_or_else(|_| "change-this-secret-in-production".to_string())
}

/// Fresh user id so repeated runs do not trip over earlier borrowings
fn fresh_user_id() -> i32 {
    100_000 + (Uuid::new_v4().as_u128() % 1_000_000) as i32
}

fn token_for(user_id: i32, role: Role) -> String {
    let now = Utc::now();
    let claims = UserClaims {
        sub: format!("user{}", user_id),
        user_id,
        role,
        name: Some(format!("Test {}", role)),
        email: Some(format!("user{}@example.edu", user_id)),
        exp: (now + Duration::hours(1)).timestamp(),
        iat: now.timestamp(),
    };
    claims.create_token(&jwt_secret()).expect("Failed to sign token")
}

fn admin_token() -> String {
    token_for(1, Role::Admin)
}

/// Create a physical book and return its id
async fn create_book(client: &Client, copies: i32, price: Option<&str>) -> i64 {
    let isbn = format!("979{:010}", Uuid::new_v4().as_u128() % 10_000_000_000);
    let response = client
        .post(format!("{}/books", BASE_URL))
        .bearer_auth(admin_token())
        .json(&json!({
            "isbn": isbn,
            "title": "Integration Testing in Practice",
            "total_copies": copies,
            "price": price,
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.expect("Failed to parse response");
    body["id"].as_i64().expect("No book id")
}

/// Money fields serialize as decimal strings
fn amount(value: &Value) -> f64 {
    value
        .as_str()
        .and_then(|s| s.parse().ok())
        .expect("Amount is not a decimal string")
}

async fn borrow(client: &Client, token: &str, book_id: i64) -> reqwest::Response {
    client
        .post(format!("{}/books/{}/borrow", BASE_URL, book_id))
        .bearer_auth(token)
        .send()
        .await
        .expect("Failed to send request")
}

async fn return_book(client: &Client, borrowing_id: i64, condition: &str) -> Value {
    let response = client
        .post(format!("{}/borrowings/{}/return", BASE_URL, borrowing_id))
        .bearer_auth(admin_token())
        .json(&json!({ "condition": condition }))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());
    response.json().await.expect("Failed to parse response")
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_health_check() {
    let client = Client::new();

    let response = client
        .get(format!("{}/health", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
#[ignore]
async fn test_requires_token() {
    let client = Client::new();

    let response = client
        .get(format!("{}/books", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore]
async fn test_search_books() {
    let client = Client::new();
    let token = token_for(fresh_user_id(), Role::Student);

    let response = client
        .get(format!("{}/books?available_only=true", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["items"].is_array());
    assert!(body["total"].is_number());
}

#[tokio::test]
#[ignore]
async fn test_student_cannot_create_book() {
    let client = Client::new();
    let token = token_for(fresh_user_id(), Role::Student);

    let response = client
        .post(format!("{}/books", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({ "isbn": "9790000000000", "title": "Nope" }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
#[ignore]
async fn test_last_copy_unavailable_to_second_borrower() {
    let client = Client::new();
    let book_id = create_book(&client, 1, None).await;
    let first = token_for(fresh_user_id(), Role::Student);
    let second = token_for(fresh_user_id(), Role::Student);

    let response = borrow(&client, &first, book_id).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let borrowing: Value = response.json().await.expect("Failed to parse response");

    let response = borrow(&client, &second, book_id).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["code"], 7);

    let outcome = return_book(&client, borrowing["id"].as_i64().unwrap(), "good").await;
    assert_eq!(outcome["book_status"], "available");
    assert_eq!(amount(&outcome["charged_fine"]), 0.0);
}

#[tokio::test]
#[ignore]
async fn test_duplicate_and_limit() {
    let client = Client::new();
    let student = token_for(fresh_user_id(), Role::Student);
    let x = create_book(&client, 3, None).await;
    let y = create_book(&client, 3, None).await;
    let z = create_book(&client, 3, None).await;

    let response = borrow(&client, &student, x).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let on_x: Value = response.json().await.expect("Failed to parse response");

    let response = borrow(&client, &student, x).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["code"], 9);

    assert_eq!(borrow(&client, &student, y).await.status(), StatusCode::CREATED);

    let response = borrow(&client, &student, z).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["code"], 10);

    return_book(&client, on_x["id"].as_i64().unwrap(), "good").await;
    assert_eq!(borrow(&client, &student, z).await.status(), StatusCode::CREATED);
}

async fn get_book(client: &Client, book_id: i64) -> Value {
    client
        .get(format!("{}/books/{}", BASE_URL, book_id))
        .bearer_auth(admin_token())
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse response")
}

#[tokio::test]
#[ignore]
async fn test_concurrent_borrowers_race_for_last_copy() {
    let client = Client::new();
    let book_id = create_book(&client, 1, None).await;
    let first = token_for(fresh_user_id(), Role::Student);
    let second = token_for(fresh_user_id(), Role::Student);

    let (a, b) = tokio::join!(
        borrow(&client, &first, book_id),
        borrow(&client, &second, book_id)
    );
    let statuses = [a.status(), b.status()];

    assert_eq!(
        statuses.iter().filter(|s| **s == StatusCode::CREATED).count(),
        1
    );
    assert!(statuses.contains(&StatusCode::CONFLICT));

    let book = get_book(&client, book_id).await;
    assert_eq!(book["available_copies"], 0);
    assert_eq!(book["status"], "borrowed");
}

#[tokio::test]
#[ignore]
async fn test_concurrent_borrows_respect_limit() {
    let client = Client::new();
    let student = token_for(fresh_user_id(), Role::Student);
    let held = create_book(&client, 2, None).await;
    let x = create_book(&client, 2, None).await;
    let y = create_book(&client, 2, None).await;

    assert_eq!(borrow(&client, &student, held).await.status(), StatusCode::CREATED);

    let (a, b) = tokio::join!(borrow(&client, &student, x), borrow(&client, &student, y));
    let statuses = [a.status(), b.status()];

    assert_eq!(
        statuses.iter().filter(|s| **s == StatusCode::CREATED).count(),
        1
    );
    assert!(statuses.contains(&StatusCode::UNPROCESSABLE_ENTITY));

    let on_x = get_book(&client, x).await["available_copies"].as_i64().unwrap();
    let on_y = get_book(&client, y).await["available_copies"].as_i64().unwrap();
    assert!(on_x >= 0 && on_y >= 0);
    assert_eq!(on_x + on_y, 3);
}

#[tokio::test]
#[ignore]
async fn test_lost_return_issues_fine_and_payment_settles_it() {
    let client = Client::new();
    let user_id = fresh_user_id();
    let student = token_for(user_id, Role::Student);
    let book_id = create_book(&client, 1, Some("200")).await;

    let response = borrow(&client, &student, book_id).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let borrowing: Value = response.json().await.expect("Failed to parse response");

    let outcome = return_book(&client, borrowing["id"].as_i64().unwrap(), "lost").await;
    assert_eq!(outcome["book_status"], "lost");
    assert_eq!(outcome["borrowing"]["status"], "lost");
    let fine = &outcome["fines_issued"][0];
    assert_eq!(amount(&fine["amount"]), 250.0);
    assert_eq!(fine["fine_type"], "lost");

    let response = client
        .post(format!("{}/payments", BASE_URL))
        .bearer_auth(&student)
        .json(&json!({
            "payment_type": "fine",
            "payment_method": "orange_money",
            "fine_id": fine["id"],
            "amount": "1",
            "details": { "phone_number": "+232 76 123456" }
        }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["code"], 12);

    let response = client
        .post(format!("{}/payments", BASE_URL))
        .bearer_auth(&student)
        .json(&json!({
            "payment_type": "fine",
            "payment_method": "orange_money",
            "fine_id": fine["id"],
            "details": { "phone_number": "+232 76 123456" }
        }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::CREATED);
    let payment: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(payment["status"], "pending");
    let payment_id = payment["id"].as_i64().unwrap();

    let complete = |reference: &'static str| {
        client
            .post(format!("{}/payments/{}/complete", BASE_URL, payment_id))
            .bearer_auth(&student)
            .json(&json!({ "gateway_reference": reference }))
            .send()
    };

    let response = complete("GW-first").await.expect("Failed to send request");
    assert!(response.status().is_success());

    let response = complete("GW-second").await.expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["code"], 11);

    let response = client
        .get(format!("{}/fines/mine", BASE_URL))
        .bearer_auth(&student)
        .send()
        .await
        .expect("Failed to send request");
    let mine: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(mine["fines"][0]["status"], "paid");
    assert_eq!(mine["totals"]["pending_count"], 0);
}

#[tokio::test]
#[ignore]
async fn test_lecturer_cannot_pay_subscription() {
    let client = Client::new();
    let lecturer = token_for(fresh_user_id(), Role::Lecturer);

    let response = client
        .post(format!("{}/payments", BASE_URL))
        .bearer_auth(&lecturer)
        .json(&json!({
            "payment_type": "subscription",
            "payment_method": "bank_transfer",
            "details": { "bank_reference": "BT-778" }
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore]
async fn test_dashboard() {
    let client = Client::new();
    let student = token_for(fresh_user_id(), Role::Student);

    let response = client
        .get(format!("{}/dashboard", BASE_URL))
        .bearer_auth(&student)
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["active_borrowings"].is_array());
    assert_eq!(body["subscription"]["required"], true);
    assert_eq!(body["currency"], "Le");
}

#[tokio::test]
#[ignore]
async fn test_stats_requires_reports() {
    let client = Client::new();

    let response = client
        .get(format!("{}/stats", BASE_URL))
        .bearer_auth(token_for(2, Role::Staff))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = client
        .get(format!("{}/stats", BASE_URL))
        .bearer_auth(admin_token())
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["books"]["total_titles"].is_number());
    assert!(body["payments"].is_array());
}
