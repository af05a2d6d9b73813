mod common;

use common::{unique_email, TestApp};
use serde_json::{json, Value};
use uuid::Uuid;

#[tokio::test]
#[ignore = "requires Postgres"]
async fn creating_an_org_makes_the_caller_owner() {
    let app = TestApp::spawn().await;
    let org = app.create_org("Owner Corp").await;

    let members: Vec<Value> = app
        .client
        .get(app.url("/v1/members"))
        .bearer_auth(&org.owner_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(members.len(), 1);
    assert_eq!(members[0]["roles"], json!(["owner"]));
    assert_eq!(members[0]["user_id"], org.owner_user_id.to_string());
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn session_for_another_org_is_forbidden() {
    let app = TestApp::spawn().await;
    let org = app.create_org("Private Corp").await;
    let outsider = app.session(Uuid::new_v4(), &unique_email("outsider"), Some(org.id));

    let res = app
        .client
        .get(app.url("/v1/organizations/current"))
        .bearer_auth(&outsider)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 403);
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn invitation_is_accepted_by_the_invited_email_only() {
    let app = TestApp::spawn().await;
    let org = app.create_org("Invite Corp").await;
    let invitee = unique_email("invitee");

    let res = app
        .client
        .post(app.url("/v1/invitations"))
        .bearer_auth(&org.owner_token)
        .json(&json!({ "email": invitee, "roles": ["auditor", "employee"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 201);

    let email = app.emails_to(&invitee).pop().expect("invitation email");
    let token = email
        .text
        .split("token=")
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .expect("token in invitation link")
        .to_string();

    let stranger = app.session(Uuid::new_v4(), &unique_email("stranger"), None);
    let res = app
        .client
        .post(app.url("/v1/invitations/accept"))
        .bearer_auth(&stranger)
        .json(&json!({ "token": token }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 403);

    let invitee_session = app.session(Uuid::new_v4(), &invitee, None);
    let res = app
        .client
        .post(app.url("/v1/invitations/accept"))
        .bearer_auth(&invitee_session)
        .json(&json!({ "token": token }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let member: Value = res.json().await.unwrap();
    assert_eq!(member["org_id"], org.id.to_string());
    assert_eq!(member["roles"], json!(["auditor", "employee"]));

    // Accepting again is no longer valid.
    let res = app
        .client
        .post(app.url("/v1/invitations/accept"))
        .bearer_auth(&invitee_session)
        .json(&json!({ "token": token }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn non_privileged_members_cannot_manage_the_portal() {
    let app = TestApp::spawn().await;
    let org = app.create_org("Roles Corp").await;
    let employee_email = unique_email("employee");

    app.client
        .post(app.url("/v1/invitations"))
        .bearer_auth(&org.owner_token)
        .json(&json!({ "email": employee_email, "roles": ["employee"] }))
        .send()
        .await
        .unwrap();
    let token = app
        .emails_to(&employee_email)
        .pop()
        .and_then(|m| {
            m.text
                .split("token=")
                .nth(1)
                .and_then(|rest| rest.split_whitespace().next())
                .map(str::to_string)
        })
        .unwrap();
    let user_id = Uuid::new_v4();
    app.client
        .post(app.url("/v1/invitations/accept"))
        .bearer_auth(app.session(user_id, &employee_email, None))
        .json(&json!({ "token": token }))
        .send()
        .await
        .unwrap();
    let employee = app.session(user_id, &employee_email, Some(org.id));

    let res = app
        .client
        .put(app.url("/v1/trust-portal/settings"))
        .bearer_auth(&employee)
        .json(&json!({ "status": "published" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 403);

    // Reads stay open to members.
    let res = app
        .client
        .get(app.url("/v1/trust-portal/settings"))
        .bearer_auth(&employee)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn api_key_authenticates_until_revoked() {
    let app = TestApp::spawn().await;
    let org = app.create_org("Keys Corp").await;

    let res = app
        .client
        .post(app.url("/v1/api-keys"))
        .bearer_auth(&org.owner_token)
        .json(&json!({ "name": "CI" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 201);
    let created: Value = res.json().await.unwrap();
    let key = created["key"].as_str().unwrap().to_string();
    assert!(key.starts_with(created["key_prefix"].as_str().unwrap()));

    let listed: Vec<Value> = app
        .client
        .get(app.url("/v1/api-keys"))
        .bearer_auth(&org.owner_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(listed.iter().all(|k| k.get("key_hash").is_none()));

    let res = app
        .client
        .get(app.url("/v1/risks"))
        .header("x-api-key", &key)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    // Keys cannot mint more keys.
    let res = app
        .client
        .post(app.url("/v1/api-keys"))
        .header("x-api-key", &key)
        .json(&json!({ "name": "nested" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 403);

    app.client
        .delete(app.url(&format!("/v1/api-keys/{}", created["id"].as_str().unwrap())))
        .bearer_auth(&org.owner_token)
        .send()
        .await
        .unwrap();

    let res = app
        .client
        .get(app.url("/v1/risks"))
        .header("x-api-key", &key)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn risk_scores_follow_likelihood_and_impact() {
    let app = TestApp::spawn().await;
    let org = app.create_org("Risk Corp").await;

    let res = app
        .client
        .post(app.url("/v1/risks"))
        .bearer_auth(&org.owner_token)
        .json(&json!({
            "title": "Laptop theft",
            "likelihood": 3,
            "impact": 4,
            "residual_likelihood": 1,
            "residual_impact": 4
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 201);
    let risk: Value = res.json().await.unwrap();
    assert_eq!(risk["inherent_score"], 12);
    assert_eq!(risk["residual_score"], 4);

    let invalid = app
        .client
        .post(app.url("/v1/risks"))
        .bearer_auth(&org.owner_token)
        .json(&json!({ "title": "Bad", "likelihood": 9 }))
        .send()
        .await
        .unwrap();
    assert_eq!(invalid.status(), 422);

    let res = app
        .client
        .delete(app.url(&format!("/v1/risks/{}", risk["id"].as_str().unwrap())))
        .bearer_auth(&org.owner_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 204);
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn published_policy_renders_as_pdf() {
    let app = TestApp::spawn().await;
    let org = app.create_org("Policy Corp").await;

    let policy: Value = app
        .client
        .post(app.url("/v1/policies"))
        .bearer_auth(&org.owner_token)
        .json(&json!({
            "name": "Access Control Policy",
            "content": {
                "type": "doc",
                "content": [
                    { "type": "heading", "attrs": { "level": 1 }, "content": [{ "type": "text", "text": "Purpose" }] },
                    { "type": "paragraph", "content": [{ "type": "text", "text": "Least privilege applies." }] }
                ]
            }
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = policy["id"].as_str().unwrap().to_string();
    assert_eq!(policy["status"], "draft");

    let published: Value = app
        .client
        .post(app.url(&format!("/v1/policies/{}/publish", id)))
        .bearer_auth(&org.owner_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(published["status"], "published");

    let res = app
        .client
        .get(app.url(&format!("/v1/policies/{}/pdf", id)))
        .bearer_auth(&org.owner_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert!(res.bytes().await.unwrap().starts_with(b"%PDF-"));

}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn organization_creation_is_audited() {
    let app = TestApp::spawn().await;
    let org = app.create_org("Audit Corp").await;

    let logs: Vec<Value> = app
        .client
        .get(app.url(&format!(
            "/v1/audit-logs?entity_type=organization&entity_id={}",
            org.id
        )))
        .bearer_auth(&org.owner_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["action"], "created");
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn health_reports_database_status() {
    let app = TestApp::spawn().await;

    let res = app.client.get(app.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["checks"]["postgres"], "up");
    assert!(res_has_request_id(&app).await);
}

async fn res_has_request_id(app: &TestApp) -> bool {
    app.client
        .get(app.url("/ready"))
        .send()
        .await
        .map(|r| r.headers().contains_key("x-request-id"))
        .unwrap_or(false)
}
