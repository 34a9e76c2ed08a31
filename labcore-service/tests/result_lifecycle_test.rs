//! Result state machine integration tests.

mod common;

use common::TestApp;
use labcore_service::models::Role;
use uuid::Uuid;

async fn order_with_one_result(app: &TestApp) -> (Uuid, Uuid, Uuid) {
    let patient_id = app.register_patient("Result Case").await;
    let test_id = app.seed_test("CBC", "Complete Blood Count", "150").await;
    let body = app.create_order(patient_id, &[test_id]).await;
    let order_id: Uuid = body["order"]["order_id"].as_str().unwrap().parse().unwrap();
    let result_id = app.result_ids(order_id).await[0];
    (order_id, result_id, test_id)
}

#[tokio::test]
async fn submitting_values_moves_pending_to_entered() {
    let Some(app) = TestApp::spawn().await else { return };
    let (_order_id, result_id, test_id) = order_with_one_result(&app).await;
    let parameter_id = app.first_parameter(test_id).await;

    let response = app
        .post(
            &format!("/results/{}/values", result_id),
            Role::Technician,
            &serde_json::json!({
                "values": [{ "parameter_id": parameter_id, "value": "4.8", "numeric_value": "4.8" }]
            }),
        )
        .await;
    assert_eq!(response.status(), 200);
    let result: serde_json::Value = response.json().await.unwrap();
    assert_eq!(result["status"], "entered");
    assert!(result["entered_by"].is_string());

    // Resubmission is idempotent and stays entered.
    let response = app
        .post(
            &format!("/results/{}/values", result_id),
            Role::Technician,
            &serde_json::json!({
                "values": [{ "parameter_id": parameter_id, "value": "4.9", "numeric_value": "4.9" }]
            }),
        )
        .await;
    assert_eq!(response.status(), 200);
    let result: serde_json::Value = response.json().await.unwrap();
    assert_eq!(result["status"], "entered");

    // One value row, holding the latest submission.
    let detail = app
        .get(&format!("/results/{}", result_id), Role::Technician)
        .await;
    let detail: serde_json::Value = detail.json().await.unwrap();
    let values = detail["values"].as_array().unwrap();
    assert_eq!(values.len(), 1);
    assert_eq!(values[0]["value"], "4.9");
}

#[tokio::test]
async fn unknown_parameters_are_silently_ignored() {
    let Some(app) = TestApp::spawn().await else { return };
    let (_order_id, result_id, test_id) = order_with_one_result(&app).await;
    let parameter_id = app.first_parameter(test_id).await;

    let response = app
        .post(
            &format!("/results/{}/values", result_id),
            Role::Technician,
            &serde_json::json!({
                "values": [
                    { "parameter_id": parameter_id, "value": "4.8" },
                    { "parameter_id": Uuid::new_v4(), "value": "ignored" },
                ]
            }),
        )
        .await;
    assert_eq!(response.status(), 200);

    let detail = app
        .get(&format!("/results/{}", result_id), Role::Technician)
        .await;
    let detail: serde_json::Value = detail.json().await.unwrap();
    assert_eq!(detail["values"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn authorising_a_pending_result_fails() {
    let Some(app) = TestApp::spawn().await else { return };
    let (_order_id, result_id, _test_id) = order_with_one_result(&app).await;

    let response = app
        .post(
            &format!("/results/{}/status", result_id),
            Role::Pathologist,
            &serde_json::json!({ "status": "authorised" }),
        )
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn reviewing_a_pending_result_fails() {
    let Some(app) = TestApp::spawn().await else { return };
    let (_order_id, result_id, _test_id) = order_with_one_result(&app).await;

    let response = app
        .post(
            &format!("/results/{}/status", result_id),
            Role::SeniorTech,
            &serde_json::json!({ "status": "reviewed" }),
        )
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn technician_cannot_review_or_authorise() {
    let Some(app) = TestApp::spawn().await else { return };
    let (_order_id, result_id, test_id) = order_with_one_result(&app).await;
    let parameter_id = app.first_parameter(test_id).await;

    app.post(
        &format!("/results/{}/values", result_id),
        Role::Technician,
        &serde_json::json!({
            "values": [{ "parameter_id": parameter_id, "value": "4.8" }]
        }),
    )
    .await;

    for status in ["reviewed", "authorised"] {
        let response = app
            .post(
                &format!("/results/{}/status", result_id),
                Role::Technician,
                &serde_json::json!({ "status": status }),
            )
            .await;
        assert_eq!(response.status(), 403, "technician must not {}", status);
    }
}

#[tokio::test]
async fn full_review_chain_reaches_authorised() {
    let Some(app) = TestApp::spawn().await else { return };
    let (_order_id, result_id, test_id) = order_with_one_result(&app).await;
    let parameter_id = app.first_parameter(test_id).await;

    app.post(
        &format!("/results/{}/values", result_id),
        Role::Technician,
        &serde_json::json!({
            "values": [{ "parameter_id": parameter_id, "value": "4.8" }]
        }),
    )
    .await;

    let response = app
        .post(
            &format!("/results/{}/status", result_id),
            Role::SeniorTech,
            &serde_json::json!({ "status": "reviewed" }),
        )
        .await;
    assert_eq!(response.status(), 200);

    let response = app
        .post(
            &format!("/results/{}/status", result_id),
            Role::Pathologist,
            &serde_json::json!({ "status": "authorised", "notes": "Within normal limits" }),
        )
        .await;
    assert_eq!(response.status(), 200);
    let result: serde_json::Value = response.json().await.unwrap();
    assert_eq!(result["status"], "authorised");
    assert_eq!(result["notes"], "Within normal limits");
    assert!(result["authorised_by"].is_string());
}

#[tokio::test]
async fn reverting_an_entered_result_clears_entry_metadata() {
    let Some(app) = TestApp::spawn().await else { return };
    let (_order_id, result_id, test_id) = order_with_one_result(&app).await;
    let parameter_id = app.first_parameter(test_id).await;

    app.post(
        &format!("/results/{}/values", result_id),
        Role::Technician,
        &serde_json::json!({
            "values": [{ "parameter_id": parameter_id, "value": "4.8" }]
        }),
    )
    .await;

    let response = app
        .post(
            &format!("/results/{}/status", result_id),
            Role::Technician,
            &serde_json::json!({ "status": "pending" }),
        )
        .await;
    assert_eq!(response.status(), 200);
    let result: serde_json::Value = response.json().await.unwrap();
    assert_eq!(result["status"], "pending");
    assert!(result["entered_by"].is_null());
    assert!(result["entered_utc"].is_null());
}

#[tokio::test]
async fn cancelled_items_reject_value_entry() {
    let Some(app) = TestApp::spawn().await else { return };

    let patient_id = app.register_patient("Cancelled Entry").await;
    let test_id = app.seed_test("FER", "Ferritin", "300").await;
    let body = app.create_order(patient_id, &[test_id]).await;
    let order_id: Uuid = body["order"]["order_id"].as_str().unwrap().parse().unwrap();
    let item_id = body["items"][0]["order_item_id"].as_str().unwrap();
    let result_id = app.result_ids(order_id).await[0];
    let parameter_id = app.first_parameter(test_id).await;

    let response = app
        .post(
            &format!("/order-items/{}/cancel", item_id),
            Role::Receptionist,
            &serde_json::json!({ "reason": "specimen lost" }),
        )
        .await;
    assert_eq!(response.status(), 200);

    let response = app
        .post(
            &format!("/results/{}/values", result_id),
            Role::Technician,
            &serde_json::json!({
                "values": [{ "parameter_id": parameter_id, "value": "4.8" }]
            }),
        )
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn authorised_results_block_item_cancellation() {
    let Some(app) = TestApp::spawn().await else { return };

    let patient_id = app.register_patient("Blocked Cancel").await;
    let test_id = app.seed_test("CRP", "C-Reactive Protein", "250").await;
    let body = app.create_order(patient_id, &[test_id]).await;
    let order_id: Uuid = body["order"]["order_id"].as_str().unwrap().parse().unwrap();
    let item_id = body["items"][0]["order_item_id"].as_str().unwrap();
    let result_id = app.result_ids(order_id).await[0];
    let parameter_id = app.first_parameter(test_id).await;

    app.authorise_result(result_id, parameter_id).await;

    let response = app
        .post(
            &format!("/order-items/{}/cancel", item_id),
            Role::Receptionist,
            &serde_json::json!({ "reason": "too late" }),
        )
        .await;
    assert_eq!(response.status(), 400);

    // The result is untouched.
    let detail = app
        .get(&format!("/results/{}", result_id), Role::Pathologist)
        .await;
    let detail: serde_json::Value = detail.json().await.unwrap();
    assert_eq!(detail["result"]["status"], "authorised");
}
