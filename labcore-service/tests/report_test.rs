//! Report generation, versioning, and amendment integration tests.

mod common;

use common::TestApp;
use labcore_service::models::Role;
use uuid::Uuid;

struct ReportFixture {
    order_id: Uuid,
    result_ids: Vec<Uuid>,
}

/// Order with two tests, both results authorised.
async fn authorised_order(app: &TestApp) -> ReportFixture {
    let patient_id = app.register_patient("Report Case").await;
    let cbc = app.seed_test("CBC", "Complete Blood Count", "150").await;
    let fbs = app.seed_test("FBS", "Fasting Blood Sugar", "80").await;
    let body = app.create_order(patient_id, &[cbc, fbs]).await;
    let order_id: Uuid = body["order"]["order_id"].as_str().unwrap().parse().unwrap();

    let result_ids = app.result_ids(order_id).await;
    let parameter_ids = vec![
        app.first_parameter(cbc).await,
        app.first_parameter(fbs).await,
    ];

    for (result_id, parameter_id) in result_ids.iter().zip(&parameter_ids) {
        app.authorise_result(*result_id, *parameter_id).await;
    }

    ReportFixture {
        order_id,
        result_ids,
    }
}

#[tokio::test]
async fn report_generation_requires_all_results_authorised() {
    let Some(app) = TestApp::spawn().await else { return };

    let patient_id = app.register_patient("Unready Report").await;
    let cbc = app.seed_test("CBC", "Complete Blood Count", "150").await;
    let fbs = app.seed_test("FBS", "Fasting Blood Sugar", "80").await;
    let body = app.create_order(patient_id, &[cbc, fbs]).await;
    let order_id: Uuid = body["order"]["order_id"].as_str().unwrap().parse().unwrap();

    // Authorise only the first result.
    let result_ids = app.result_ids(order_id).await;
    app.authorise_result(result_ids[0], app.first_parameter(cbc).await)
        .await;

    let response = app
        .post(
            &format!("/orders/{}/report", order_id),
            Role::Pathologist,
            &serde_json::json!({}),
        )
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn report_version_one_is_created_and_rendered() {
    let Some(app) = TestApp::spawn().await else { return };
    let fixture = authorised_order(&app).await;

    let response = app
        .post(
            &format!("/orders/{}/report", fixture.order_id),
            Role::Pathologist,
            &serde_json::json!({}),
        )
        .await;
    assert_eq!(response.status(), 200);
    let report: serde_json::Value = response.json().await.unwrap();

    assert_eq!(report["version"], 1);
    assert_eq!(report["is_amended"], false);
    assert_eq!(report["render_status"], "rendered");
    assert!(report["pdf_path"].is_string());
    assert!(report["report_code"]
        .as_str()
        .unwrap()
        .starts_with("RPT-ORD-"));
    assert!(report["report_code"].as_str().unwrap().ends_with("-v1"));

    // Repeating the call returns the same row, not a new version.
    let response = app
        .post(
            &format!("/orders/{}/report", fixture.order_id),
            Role::Pathologist,
            &serde_json::json!({}),
        )
        .await;
    let again: serde_json::Value = response.json().await.unwrap();
    assert_eq!(again["report_id"], report["report_id"]);
    assert_eq!(again["version"], 1);
}

#[tokio::test]
async fn report_pdf_is_served() {
    let Some(app) = TestApp::spawn().await else { return };
    let fixture = authorised_order(&app).await;

    let response = app
        .post(
            &format!("/orders/{}/report", fixture.order_id),
            Role::Pathologist,
            &serde_json::json!({}),
        )
        .await;
    let report: serde_json::Value = response.json().await.unwrap();
    let report_id = report["report_id"].as_str().unwrap();

    let response = app
        .get(&format!("/reports/{}/pdf", report_id), Role::Pathologist)
        .await;
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "application/pdf"
    );
    let bytes = response.bytes().await.unwrap();
    assert!(bytes.starts_with(b"%PDF"));
}

#[tokio::test]
async fn amendment_reverts_results_and_opens_the_next_version() {
    let Some(app) = TestApp::spawn().await else { return };
    let fixture = authorised_order(&app).await;

    let response = app
        .post(
            &format!("/orders/{}/report", fixture.order_id),
            Role::Pathologist,
            &serde_json::json!({}),
        )
        .await;
    let v1: serde_json::Value = response.json().await.unwrap();
    let v1_id = v1["report_id"].as_str().unwrap();

    let response = app
        .post(
            &format!("/reports/{}/amend", v1_id),
            Role::Pathologist,
            &serde_json::json!({ "reason": "typo" }),
        )
        .await;
    assert_eq!(response.status(), 201);
    let v2: serde_json::Value = response.json().await.unwrap();

    assert_eq!(v2["version"], 2);
    assert_eq!(v2["is_amended"], true);
    assert_eq!(v2["amendment_reason"], "typo");
    assert!(v2["report_code"].as_str().unwrap().ends_with("-v2"));

    // Both results reverted to reviewed with authorisation cleared.
    for result_id in &fixture.result_ids {
        let detail = app
            .get(&format!("/results/{}", result_id), Role::Pathologist)
            .await;
        let detail: serde_json::Value = detail.json().await.unwrap();
        assert_eq!(detail["result"]["status"], "reviewed");
        assert!(detail["result"]["authorised_by"].is_null());
        assert!(detail["result"]["authorised_utc"].is_null());
    }

    // The prior version's row is untouched.
    let v1_row: (i32, bool, String) = sqlx::query_as(
        "SELECT version, is_amended, render_status FROM reports WHERE report_id = $1",
    )
    .bind(v1_id.parse::<Uuid>().unwrap())
    .fetch_one(app.state.db.pool())
    .await
    .unwrap();
    assert_eq!(v1_row, (1, false, "rendered".to_string()));

    // Regenerating now fails until the results are re-authorised.
    let response = app
        .post(
            &format!("/orders/{}/report", fixture.order_id),
            Role::Pathologist,
            &serde_json::json!({}),
        )
        .await;
    assert_eq!(response.status(), 400);

    // Re-authorise (reviewed -> authorised) and regenerate version 2.
    for result_id in &fixture.result_ids {
        let response = app
            .post(
                &format!("/results/{}/status", result_id),
                Role::Pathologist,
                &serde_json::json!({ "status": "authorised" }),
            )
            .await;
        assert_eq!(response.status(), 200);
    }

    let response = app
        .post(
            &format!("/orders/{}/report", fixture.order_id),
            Role::Pathologist,
            &serde_json::json!({}),
        )
        .await;
    assert_eq!(response.status(), 200);
    let regenerated: serde_json::Value = response.json().await.unwrap();
    assert_eq!(regenerated["version"], 2);
    assert_eq!(regenerated["render_status"], "rendered");
}

#[tokio::test]
async fn amendment_requires_a_pathologist() {
    let Some(app) = TestApp::spawn().await else { return };
    let fixture = authorised_order(&app).await;

    let response = app
        .post(
            &format!("/orders/{}/report", fixture.order_id),
            Role::Pathologist,
            &serde_json::json!({}),
        )
        .await;
    let report: serde_json::Value = response.json().await.unwrap();
    let report_id = report["report_id"].as_str().unwrap();

    let response = app
        .post(
            &format!("/reports/{}/amend", report_id),
            Role::SeniorTech,
            &serde_json::json!({ "reason": "nope" }),
        )
        .await;
    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn share_url_is_issued_for_stored_reports() {
    let Some(app) = TestApp::spawn().await else { return };
    let fixture = authorised_order(&app).await;

    let response = app
        .post(
            &format!("/orders/{}/report", fixture.order_id),
            Role::Pathologist,
            &serde_json::json!({}),
        )
        .await;
    let report: serde_json::Value = response.json().await.unwrap();
    let report_id = report["report_id"].as_str().unwrap();

    let response = app
        .get(
            &format!("/reports/{}/share-url", report_id),
            Role::Pathologist,
        )
        .await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["url"].as_str().unwrap().contains(".pdf"));

    let response = app
        .post(
            &format!("/reports/{}/share", report_id),
            Role::Pathologist,
            &serde_json::json!({ "channel": "email", "shared_with": "patient@example.com" }),
        )
        .await;
    assert_eq!(response.status(), 201);
}

#[tokio::test]
async fn cancelled_items_are_excluded_from_readiness() {
    let Some(app) = TestApp::spawn().await else { return };

    let patient_id = app.register_patient("Partial Report").await;
    let cbc = app.seed_test("CBC", "Complete Blood Count", "150").await;
    let fbs = app.seed_test("FBS", "Fasting Blood Sugar", "80").await;
    let body = app.create_order(patient_id, &[cbc, fbs]).await;
    let order_id: Uuid = body["order"]["order_id"].as_str().unwrap().parse().unwrap();

    // Authorise the first result, cancel the second item.
    let result_ids = app.result_ids(order_id).await;
    app.authorise_result(result_ids[0], app.first_parameter(cbc).await)
        .await;
    let second_item = body["items"][1]["order_item_id"].as_str().unwrap();
    let response = app
        .post(
            &format!("/order-items/{}/cancel", second_item),
            Role::Receptionist,
            &serde_json::json!({ "reason": "sample clotted" }),
        )
        .await;
    assert_eq!(response.status(), 200);

    let response = app
        .post(
            &format!("/orders/{}/report", order_id),
            Role::Pathologist,
            &serde_json::json!({}),
        )
        .await;
    assert_eq!(response.status(), 200);
    let report: serde_json::Value = response.json().await.unwrap();
    assert_eq!(report["version"], 1);
}
