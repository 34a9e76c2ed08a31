//! Billing ledger integration tests.

mod common;

use common::TestApp;
use labcore_service::models::Role;
use uuid::Uuid;

async fn order_invoice(app: &TestApp) -> (Uuid, serde_json::Value) {
    let patient_id = app.register_patient("Billing Case").await;
    let cbc = app.seed_test("CBC", "Complete Blood Count", "150").await;
    let fbs = app.seed_test("FBS", "Fasting Blood Sugar", "80").await;
    let body = app.create_order(patient_id, &[cbc, fbs]).await;
    let invoice_id: Uuid = body["invoice"]["invoice_id"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();
    (invoice_id, body)
}

#[tokio::test]
async fn full_payment_settles_the_invoice() {
    let Some(app) = TestApp::spawn().await else { return };
    let (invoice_id, _) = order_invoice(&app).await;

    let response = app
        .post(
            &format!("/invoices/{}/payments", invoice_id),
            Role::Receptionist,
            &serde_json::json!({ "amount": "271.40", "mode": "upi", "reference": "UPI-1" }),
        )
        .await;
    assert_eq!(response.status(), 201);
    let body: serde_json::Value = response.json().await.unwrap();

    assert_eq!(body["invoice"]["amount_paid"], serde_json::json!("271.40"));
    assert_eq!(body["invoice"]["amount_due"], serde_json::json!("0.00"));
    assert_eq!(body["invoice"]["status"], "paid");
}

#[tokio::test]
async fn partial_payments_accumulate() {
    let Some(app) = TestApp::spawn().await else { return };
    let (invoice_id, _) = order_invoice(&app).await;

    let response = app
        .post(
            &format!("/invoices/{}/payments", invoice_id),
            Role::Receptionist,
            &serde_json::json!({ "amount": "100", "mode": "cash" }),
        )
        .await;
    assert_eq!(response.status(), 201);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["invoice"]["status"], "partial");
    assert_eq!(body["invoice"]["amount_due"], serde_json::json!("171.40"));

    let response = app
        .post(
            &format!("/invoices/{}/payments", invoice_id),
            Role::Receptionist,
            &serde_json::json!({ "amount": "171.40", "mode": "card" }),
        )
        .await;
    assert_eq!(response.status(), 201);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["invoice"]["status"], "paid");
    assert_eq!(body["invoice"]["amount_paid"], serde_json::json!("271.40"));

    // The ledger holds both immutable rows.
    let detail = app
        .get(&format!("/invoices/{}", invoice_id), Role::Receptionist)
        .await;
    let detail: serde_json::Value = detail.json().await.unwrap();
    assert_eq!(detail["payments"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn overpayment_is_rejected_and_leaves_state_unchanged() {
    let Some(app) = TestApp::spawn().await else { return };
    let (invoice_id, _) = order_invoice(&app).await;

    let response = app
        .post(
            &format!("/invoices/{}/payments", invoice_id),
            Role::Receptionist,
            &serde_json::json!({ "amount": "300", "mode": "cash" }),
        )
        .await;
    assert_eq!(response.status(), 400);

    let detail = app
        .get(&format!("/invoices/{}", invoice_id), Role::Receptionist)
        .await;
    let detail: serde_json::Value = detail.json().await.unwrap();
    assert_eq!(detail["invoice"]["amount_paid"], serde_json::json!("0.00"));
    assert_eq!(detail["invoice"]["amount_due"], serde_json::json!("271.40"));
    assert_eq!(detail["invoice"]["status"], "issued");
    assert_eq!(detail["payments"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn non_positive_amounts_are_rejected() {
    let Some(app) = TestApp::spawn().await else { return };
    let (invoice_id, _) = order_invoice(&app).await;

    for amount in ["0", "-5"] {
        let response = app
            .post(
                &format!("/invoices/{}/payments", invoice_id),
                Role::Receptionist,
                &serde_json::json!({ "amount": amount, "mode": "cash" }),
            )
            .await;
        assert_eq!(response.status(), 400, "amount {} must be rejected", amount);
    }
}

#[tokio::test]
async fn unknown_invoice_returns_not_found() {
    let Some(app) = TestApp::spawn().await else { return };

    let response = app
        .post(
            &format!("/invoices/{}/payments", Uuid::new_v4()),
            Role::Receptionist,
            &serde_json::json!({ "amount": "10", "mode": "cash" }),
        )
        .await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn technician_cannot_record_payments() {
    let Some(app) = TestApp::spawn().await else { return };
    let (invoice_id, _) = order_invoice(&app).await;

    let response = app
        .post(
            &format!("/invoices/{}/payments", invoice_id),
            Role::Technician,
            &serde_json::json!({ "amount": "10", "mode": "cash" }),
        )
        .await;
    assert_eq!(response.status(), 403);
}
