mod common;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::{TestApp, TestOrg};
use serde_json::{json, Value};

const TINY_PDF: &[u8] = b"%PDF-1.4\n1 0 obj << /Type /Catalog >> endobj\ntrailer << /Root 1 0 R >>\n%%EOF\n";

/// Signed links carry the configured public base; replay them against the test server.
fn local_file_url(app: &TestApp, signed: &str) -> String {
    let start = signed.find("/v1/files/").expect("not a local file link");
    app.url(&signed[start..])
}

async fn upload_soc2(app: &TestApp, org: &TestOrg) -> reqwest::Response {
    app.client
        .post(app.url("/v1/trust-portal/compliance-resources"))
        .bearer_auth(&org.owner_token)
        .json(&json!({
            "framework": "soc2_type2",
            "file_name": "SOC 2 report.pdf",
            "file_type": "application/pdf",
            "file_data": format!("data:application/pdf;base64,{}", STANDARD.encode(TINY_PDF)),
        }))
        .send()
        .await
        .expect("Failed to upload resource")
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn resource_upload_round_trips_through_signed_link() {
    let app = TestApp::spawn().await;
    let org = app.create_org("Resource Corp").await;

    let res = upload_soc2(&app, &org).await;
    assert_eq!(res.status(), 201);
    let resource: Value = res.json().await.unwrap();
    assert_eq!(resource["file_size"], TINY_PDF.len());
    assert!(resource.get("s3_key").is_none());

    let signed: Value = app
        .client
        .get(app.url("/v1/trust-portal/compliance-resources/soc2_type2/url"))
        .bearer_auth(&org.owner_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let link = local_file_url(&app, signed["url"].as_str().unwrap());

    let res = app.client.get(&link).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["content-type"], "application/pdf");
    assert_eq!(res.bytes().await.unwrap().as_ref(), TINY_PDF);

    // Tampering with the signature is rejected.
    let res = app
        .client
        .get(format!("{}0", link))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 403);
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn resource_upload_rejects_non_pdf() {
    let app = TestApp::spawn().await;
    let org = app.create_org("Plaintext Corp").await;

    let res = app
        .client
        .post(app.url("/v1/trust-portal/compliance-resources"))
        .bearer_auth(&org.owner_token)
        .json(&json!({
            "framework": "iso27001",
            "file_name": "notes.txt",
            "file_type": "text/plain",
            "file_data": STANDARD.encode(b"hello"),
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 400);
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn documents_can_be_uploaded_listed_and_deleted() {
    let app = TestApp::spawn().await;
    let org = app.create_org("Docs Corp").await;

    let res = app
        .client
        .post(app.url("/v1/trust-portal/documents"))
        .bearer_auth(&org.owner_token)
        .json(&json!({
            "name": "Pen test summary",
            "description": "2025 external test",
            "file_name": "pentest.pdf",
            "file_type": "application/pdf",
            "file_data": STANDARD.encode(TINY_PDF),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 201);
    let document: Value = res.json().await.unwrap();
    let id = document["id"].as_str().unwrap().to_string();

    let listed: Vec<Value> = app
        .client
        .get(app.url("/v1/trust-portal/documents"))
        .bearer_auth(&org.owner_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);

    let res = app
        .client
        .delete(app.url(&format!("/v1/trust-portal/documents/{}", id)))
        .bearer_auth(&org.owner_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 204);

    let res = app
        .client
        .get(app.url(&format!("/v1/trust-portal/documents/{}/url", id)))
        .bearer_auth(&org.owner_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn links_keep_the_requested_order() {
    let app = TestApp::spawn().await;
    let org = app.create_org("Links Corp").await;

    let mut ids = Vec::new();
    for title in ["Status page", "Security whitepaper"] {
        let link: Value = app
            .client
            .post(app.url("/v1/trust-portal/links"))
            .bearer_auth(&org.owner_token)
            .json(&json!({ "title": title, "url": "https://example.com/security" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        ids.push(link["id"].as_str().unwrap().to_string());
    }
    ids.reverse();

    let reordered: Vec<Value> = app
        .client
        .post(app.url("/v1/trust-portal/links/reorder"))
        .bearer_auth(&org.owner_token)
        .json(&json!({ "ids": ids }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(reordered[0]["title"], "Security whitepaper");
    assert_eq!(reordered[1]["title"], "Status page");
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn public_portal_is_hidden_until_published() {
    let app = TestApp::spawn().await;
    let org = app.create_org("Public Corp").await;
    let public_url = app.url(&format!("/v1/trust-portal/public/{}", org.friendly_url));

    let res = app.client.get(&public_url).send().await.unwrap();
    assert_eq!(res.status(), 404);

    app.client
        .put(app.url("/v1/trust-portal/frameworks/iso27001"))
        .bearer_auth(&org.owner_token)
        .json(&json!({ "enabled": true, "status": "compliant" }))
        .send()
        .await
        .unwrap();
    app.client
        .put(app.url("/v1/trust-portal/overview"))
        .bearer_auth(&org.owner_token)
        .json(&json!({ "title": "Security at Public Corp", "content": "We take it seriously.", "show": true }))
        .send()
        .await
        .unwrap();
    upload_soc2(&app, &org).await;
    app.publish_portal(&org).await;

    let portal: Value = app
        .client
        .get(&public_url)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(portal["organization_name"], "Public Corp");
    assert_eq!(portal["overview"]["title"], "Security at Public Corp");
    assert_eq!(portal["frameworks"][0]["framework"], "iso27001");
    assert_eq!(portal["frameworks"][0]["status"], "compliant");
    assert_eq!(portal["resources"][0]["file_name"], "SOC 2 report.pdf");
    assert!(portal["resources"][0].get("s3_key").is_none());
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn custom_domain_without_vercel_is_unavailable() {
    let app = TestApp::spawn().await;
    let org = app.create_org("Domain Corp").await;

    let invalid = app
        .client
        .put(app.url("/v1/trust-portal/domain"))
        .bearer_auth(&org.owner_token)
        .json(&json!({ "domain": "https://trust.example.com/path" }))
        .send()
        .await
        .unwrap();
    assert_eq!(invalid.status(), 400);

    let res = app
        .client
        .put(app.url("/v1/trust-portal/domain"))
        .bearer_auth(&org.owner_token)
        .json(&json!({ "domain": "trust.example.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 503);
}
