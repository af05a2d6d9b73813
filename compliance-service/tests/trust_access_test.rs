mod common;

use common::{token_from_url, unique_email, TestApp, TestOrg};
use serde_json::{json, Value};
use uuid::Uuid;

async fn submit_request(app: &TestApp, org: &TestOrg, email: &str) -> Value {
    let res = app
        .client
        .post(app.url(&format!("/v1/trust-access/{}/requests", org.friendly_url)))
        .header("user-agent", "trust-access-test")
        .json(&json!({
            "name": "Grace Hopper",
            "email": email,
            "company": "Navy",
            "purpose": "Vendor assessment",
            "requested_duration_days": 14
        }))
        .send()
        .await
        .expect("Failed to submit access request");
    assert_eq!(res.status(), 202);
    res.json().await.expect("Invalid request body")
}

async fn approve(app: &TestApp, org: &TestOrg, request_id: &str) -> reqwest::Response {
    app.client
        .post(app.url(&format!(
            "/v1/trust-access/admin/requests/{}/approve",
            request_id
        )))
        .bearer_auth(&org.owner_token)
        .json(&json!({}))
        .send()
        .await
        .expect("Failed to approve")
}

async fn requests_from(app: &TestApp, org: &TestOrg, email: &str) -> i64 {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM trust_access_requests WHERE org_id = $1 AND LOWER(email) = LOWER($2)",
    )
    .bind(org.id)
    .bind(email)
    .fetch_one(app.db.pool())
    .await
    .unwrap()
}

/// Runs request, approval and signature. Returns (request_id, grant_id, access_token).
async fn granted_access(app: &TestApp, org: &TestOrg, email: &str) -> (Uuid, String, String) {
    let created = submit_request(app, org, email).await;
    let request_id: Uuid = created["request_id"].as_str().unwrap().parse().unwrap();
    assert_eq!(approve(app, org, &request_id.to_string()).await.status(), 200);

    let sign_token = app.pending_sign_token(request_id).await;
    let res = app
        .client
        .post(app.url(&format!("/v1/trust-access/nda/{}/sign", sign_token)))
        .json(&json!({ "name": "Grace Hopper", "email": email.to_uppercase(), "accept": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let signed: Value = res.json().await.unwrap();
    let access_token = token_from_url(signed["access_url"].as_str().unwrap());
    (
        request_id,
        signed["grant_id"].as_str().unwrap().to_string(),
        access_token,
    )
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn unpublished_portal_rejects_requests() {
    let app = TestApp::spawn().await;
    let org = app.create_org("Draft Corp").await;

    let res = app
        .client
        .post(app.url(&format!("/v1/trust-access/{}/requests", org.friendly_url)))
        .json(&json!({ "name": "Ada", "email": unique_email("ada") }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 404);
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn duplicate_request_reports_pending() {
    let app = TestApp::spawn().await;
    let org = app.create_org("Pending Corp").await;
    app.publish_portal(&org).await;
    let email = unique_email("visitor");

    let first = submit_request(&app, &org, &email).await;
    assert_eq!(first["status"], "under_review");

    let second = submit_request(&app, &org, &email).await;
    assert_eq!(second["status"], "already_pending");
    assert_eq!(second["request_id"], first["request_id"]);
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn reviewers_are_notified_of_new_requests() {
    let app = TestApp::spawn().await;
    let org = app.create_org("Notify Corp").await;
    app.publish_portal(&org).await;

    submit_request(&app, &org, &unique_email("visitor")).await;

    let owner_email = format!("owner-{}@example.com", org.owner_user_id.simple());
    let notifications = app.emails_to(&owner_email);
    assert_eq!(notifications.len(), 1);
    assert!(notifications[0].text.contains("/trust-access/requests/"));
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn full_access_flow_grants_token_gated_reads() {
    let app = TestApp::spawn().await;
    let org = app.create_org("Granted Corp").await;
    app.publish_portal(&org).await;
    let email = unique_email("auditor");

    let (request_id, grant_id, access_token) = granted_access(&app, &org, &email).await;

    // The NDA link and access link both went to the requester.
    let sent = app.emails_to(&email);
    assert!(sent.iter().any(|m| m.text.contains("/nda/")));
    assert!(sent.iter().any(|m| m.text.contains(&access_token)));

    let info: Value = app
        .client
        .get(app.url(&format!("/v1/trust-access/access/{}", access_token)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(info["grant_id"], grant_id.as_str());
    assert_eq!(info["status"], "active");
    assert_eq!(info["friendly_url"], org.friendly_url.as_str());

    let detail: Value = app
        .client
        .get(app.url(&format!("/v1/trust-access/admin/requests/{}", request_id)))
        .bearer_auth(&org.owner_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["status"], "approved");
    assert_eq!(detail["nda_agreements"][0]["status"], "signed");
    assert_eq!(detail["grant"]["id"], grant_id.as_str());
    assert!(detail["nda_agreements"][0].get("sign_token").is_none());

    let docs = app
        .client
        .get(app.url(&format!("/v1/trust-access/access/{}/documents", access_token)))
        .send()
        .await
        .unwrap();
    assert_eq!(docs.status(), 200);
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn signing_twice_returns_existing_grant() {
    let app = TestApp::spawn().await;
    let org = app.create_org("Idempotent Corp").await;
    app.publish_portal(&org).await;
    let email = unique_email("signer");

    let created = submit_request(&app, &org, &email).await;
    let request_id: Uuid = created["request_id"].as_str().unwrap().parse().unwrap();
    approve(&app, &org, &request_id.to_string()).await;
    let sign_token = app.pending_sign_token(request_id).await;

    let sign = |token: String| {
        let app = &app;
        let email = email.clone();
        async move {
            app.client
                .post(app.url(&format!("/v1/trust-access/nda/{}/sign", token)))
                .json(&json!({ "name": "Signer", "email": email, "accept": true }))
                .send()
                .await
                .unwrap()
                .json::<Value>()
                .await
                .unwrap()
        }
    };

    let first = sign(sign_token.clone()).await;
    let second = sign(sign_token.clone()).await;
    assert_eq!(first["already_signed"], false);
    assert_eq!(second["already_signed"], true);
    assert_eq!(first["grant_id"], second["grant_id"]);

    let details: Value = app
        .client
        .get(app.url(&format!("/v1/trust-access/nda/{}", sign_token)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(details["status"], "signed");
    assert!(details["portal_url"]
        .as_str()
        .unwrap()
        .ends_with(&org.friendly_url));
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn concurrent_signatures_keep_the_stored_nda() {
    let app = TestApp::spawn().await;
    let org = app.create_org("Race Corp").await;
    app.publish_portal(&org).await;
    let email = unique_email("racer");

    let created = submit_request(&app, &org, &email).await;
    let request_id: Uuid = created["request_id"].as_str().unwrap().parse().unwrap();
    approve(&app, &org, &request_id.to_string()).await;
    let sign_token = app.pending_sign_token(request_id).await;

    let sign = || {
        app.client
            .post(app.url(&format!("/v1/trust-access/nda/{}/sign", sign_token)))
            .json(&json!({ "name": "Racer", "email": email, "accept": true }))
            .send()
    };
    let (a, b) = tokio::join!(sign(), sign());
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.status(), 200);
    assert_eq!(b.status(), 200);
    let a: Value = a.json().await.unwrap();
    let b: Value = b.json().await.unwrap();
    assert_eq!(a["grant_id"], b["grant_id"]);

    let key: String = sqlx::query_scalar(
        "SELECT pdf_signed_key FROM trust_nda_agreements WHERE access_request_id = $1 AND status = 'signed'",
    )
    .bind(request_id)
    .fetch_one(app.db.pool())
    .await
    .unwrap();
    let pdf = app.stored_object(&key).await.expect("signed NDA missing from storage");
    assert!(pdf.starts_with(b"%PDF-"));
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn sign_rejects_mismatched_email() {
    let app = TestApp::spawn().await;
    let org = app.create_org("Mismatch Corp").await;
    app.publish_portal(&org).await;

    let created = submit_request(&app, &org, &unique_email("real")).await;
    let request_id: Uuid = created["request_id"].as_str().unwrap().parse().unwrap();
    approve(&app, &org, &request_id.to_string()).await;
    let sign_token = app.pending_sign_token(request_id).await;

    let res = app
        .client
        .post(app.url(&format!("/v1/trust-access/nda/{}/sign", sign_token)))
        .json(&json!({ "name": "Mallory", "email": unique_email("other"), "accept": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn approving_twice_is_rejected() {
    let app = TestApp::spawn().await;
    let org = app.create_org("Twice Corp").await;
    app.publish_portal(&org).await;

    let created = submit_request(&app, &org, &unique_email("twice")).await;
    let request_id = created["request_id"].as_str().unwrap().to_string();

    assert_eq!(approve(&app, &org, &request_id).await.status(), 200);
    assert_eq!(approve(&app, &org, &request_id).await.status(), 400);
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn denied_request_is_terminal() {
    let app = TestApp::spawn().await;
    let org = app.create_org("Deny Corp").await;
    app.publish_portal(&org).await;

    let created = submit_request(&app, &org, &unique_email("denied")).await;
    let request_id = created["request_id"].as_str().unwrap().to_string();

    let res = app
        .client
        .post(app.url(&format!("/v1/trust-access/admin/requests/{}/deny", request_id)))
        .bearer_auth(&org.owner_token)
        .json(&json!({ "reason": "Not a customer" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let denied: Value = res.json().await.unwrap();
    assert_eq!(denied["status"], "denied");
    assert_eq!(denied["decision_reason"], "Not a customer");

    assert_eq!(approve(&app, &org, &request_id).await.status(), 400);
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn revoking_a_grant_blocks_access_and_voids_nda() {
    let app = TestApp::spawn().await;
    let org = app.create_org("Revoke Corp").await;
    app.publish_portal(&org).await;
    let email = unique_email("revoked");

    let (request_id, grant_id, access_token) = granted_access(&app, &org, &email).await;

    let res = app
        .client
        .post(app.url(&format!("/v1/trust-access/admin/grants/{}/revoke", grant_id)))
        .bearer_auth(&org.owner_token)
        .json(&json!({ "reason": "Contract ended" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let revoked: Value = res.json().await.unwrap();
    assert_eq!(revoked["status"], "revoked");

    let res = app
        .client
        .get(app.url(&format!("/v1/trust-access/access/{}", access_token)))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 403);

    let detail: Value = app
        .client
        .get(app.url(&format!("/v1/trust-access/admin/requests/{}", request_id)))
        .bearer_auth(&org.owner_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["nda_agreements"][0]["status"], "void");

    // A second revoke is a state error.
    let res = app
        .client
        .post(app.url(&format!("/v1/trust-access/admin/grants/{}/revoke", grant_id)))
        .bearer_auth(&org.owner_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn expired_access_token_is_rotated_on_reclaim() {
    let app = TestApp::spawn().await;
    let org = app.create_org("Reclaim Corp").await;
    app.publish_portal(&org).await;
    let email = unique_email("reclaim");

    let (_, grant_id, access_token) = granted_access(&app, &org, &email).await;
    let grant_id: Uuid = grant_id.parse().unwrap();

    sqlx::query(
        "UPDATE trust_access_grants SET access_token_expires_at = NOW() - INTERVAL '1 hour' WHERE id = $1",
    )
    .bind(grant_id)
    .execute(app.db.pool())
    .await
    .unwrap();

    let policy: Value = app
        .client
        .post(app.url("/v1/policies"))
        .bearer_auth(&org.owner_token)
        .json(&json!({
            "name": "Incident Response",
            "content": { "type": "doc", "content": [
                { "type": "paragraph", "content": [{ "type": "text", "text": "Report within 24 hours." }] }
            ]}
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let policy_id = policy["id"].as_str().unwrap().to_string();
    app.client
        .post(app.url(&format!("/v1/policies/{}/publish", policy_id)))
        .bearer_auth(&org.owner_token)
        .send()
        .await
        .unwrap();

    let gated = [
        String::new(),
        "/documents".to_string(),
        format!("/documents/{}/download", Uuid::new_v4()),
        "/resources/soc2_type2/download".to_string(),
        "/policies".to_string(),
        format!("/policies/{}/pdf", policy_id),
    ];
    for suffix in &gated {
        let res = app
            .client
            .get(app.url(&format!("/v1/trust-access/access/{}{}", access_token, suffix)))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 401, "expired token accepted at {:?}", suffix);
    }

    let res = app
        .client
        .post(app.url(&format!("/v1/trust-access/{}/reclaim", org.friendly_url)))
        .json(&json!({ "email": email }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    let rotated: String =
        sqlx::query_scalar("SELECT access_token FROM trust_access_grants WHERE id = $1")
            .bind(grant_id)
            .fetch_one(app.db.pool())
            .await
            .unwrap();
    assert_ne!(rotated, access_token);
    assert!(app.emails_to(&email).iter().any(|m| m.text.contains(&rotated)));
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn re_requesting_with_a_live_grant_short_circuits() {
    let app = TestApp::spawn().await;
    let org = app.create_org("Repeat Corp").await;
    app.publish_portal(&org).await;
    let email = unique_email("repeat");

    let (_, _, access_token) = granted_access(&app, &org, &email).await;
    assert_eq!(requests_from(&app, &org, &email).await, 1);
    let links_before = app
        .emails_to(&email)
        .iter()
        .filter(|m| m.text.contains(&access_token))
        .count();

    let again = submit_request(&app, &org, &email).await;

    assert_eq!(again["status"], "already_approved");
    assert!(again["request_id"].is_null());
    assert_eq!(requests_from(&app, &org, &email).await, 1);
    let links_after = app
        .emails_to(&email)
        .iter()
        .filter(|m| m.text.contains(&access_token))
        .count();
    assert_eq!(links_after, links_before + 1);
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn reclaim_does_not_reveal_unknown_emails() {
    let app = TestApp::spawn().await;
    let org = app.create_org("Quiet Corp").await;
    app.publish_portal(&org).await;
    let stranger = unique_email("stranger");

    let res = app
        .client
        .post(app.url(&format!("/v1/trust-access/{}/reclaim", org.friendly_url)))
        .json(&json!({ "email": stranger }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    assert!(app.emails_to(&stranger).is_empty());
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn unknown_access_token_is_not_found() {
    let app = TestApp::spawn().await;

    let res = app
        .client
        .get(app.url("/v1/trust-access/access/deadbeef"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 404);
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn admin_routes_require_a_session() {
    let app = TestApp::spawn().await;

    let res = app
        .client
        .get(app.url("/v1/trust-access/admin/requests"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 401);
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn nda_preview_is_a_pdf() {
    let app = TestApp::spawn().await;
    let org = app.create_org("Preview Corp").await;
    app.publish_portal(&org).await;

    let created = submit_request(&app, &org, &unique_email("preview")).await;
    let request_id = created["request_id"].as_str().unwrap();

    let res = app
        .client
        .get(app.url(&format!(
            "/v1/trust-access/admin/requests/{}/nda-preview",
            request_id
        )))
        .bearer_auth(&org.owner_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["content-type"], "application/pdf");
    let body = res.bytes().await.unwrap();
    assert!(body.starts_with(b"%PDF-"));
}
