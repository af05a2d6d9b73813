use compliance_service::pdf::{
    watermark, NdaContext, NdaPdfService, NdaReference, PolicyPdfRenderer, RichNode,
};
use lopdf::Document;
use serde_json::json;

fn count(haystack: &[u8], needle: &[u8]) -> usize {
    haystack.windows(needle.len()).filter(|w| *w == needle).count()
}

#[test]
fn shared_policy_export_is_stamped_on_every_page() {
    let paragraphs: Vec<_> = (0..120)
        .map(|i| json!({ "type": "paragraph", "content": [{ "type": "text", "text": format!("Control statement {i}.") }] }))
        .collect();
    let content = json!({ "type": "doc", "content": paragraphs });
    let root = RichNode::from_json(&content).unwrap();

    let pdf = PolicyPdfRenderer::default().render("Acceptable Use", &root).unwrap();
    let stamped = watermark(&pdf, "buyer@client.com", "policy-42").unwrap();

    let pages = Document::load_mem(&stamped).unwrap().get_pages().len();
    assert!(pages >= 2);
    assert_eq!(
        count(&stamped, b"Document ID: policy-42 | buyer@client.com"),
        pages
    );
}

#[test]
fn nda_preview_differs_from_signed_copy() {
    let ctx = NdaContext {
        reference: NdaReference::Agreement("agreement-1".to_string()),
        org_name: "Acme Cloud".to_string(),
        signer_name: "Jo Client".to_string(),
        signer_email: "jo@client.com".to_string(),
        signer_company: Some("Client Ltd".to_string()),
        signed_at: None,
        signer_ip: None,
        grant_days: Some(30),
    };
    let service = NdaPdfService::default();

    let preview = service.preview(&ctx).unwrap();
    let signed = service.generate_signed(&ctx).unwrap();

    assert!(count(&preview, b"PREVIEW") > 0);
    assert_eq!(count(&signed, b"PREVIEW"), 0);
}
