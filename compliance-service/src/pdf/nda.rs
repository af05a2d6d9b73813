use chrono::{DateTime, Utc};
use service_core::error::AppError;

use super::charmap::to_ascii;
use super::fonts::Font;
use super::layout::{BlockStyle, DocumentBuilder, PageLayout, Span};
use super::watermark::watermark;

/// Stored on each agreement so a signed PDF can be traced to its wording.
pub const NDA_TEMPLATE_VERSION: &str = "2024.1";

/// What the document is traced back to. Previews rendered before any
/// agreement exists carry the access request instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NdaReference {
    Agreement(String),
    Request(String),
}

impl NdaReference {
    pub fn label(&self) -> &'static str {
        match self {
            NdaReference::Agreement(_) => "Agreement ID",
            NdaReference::Request(_) => "Request ID",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            NdaReference::Agreement(id) | NdaReference::Request(id) => id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NdaContext {
    pub reference: NdaReference,
    pub org_name: String,
    pub signer_name: String,
    pub signer_email: String,
    pub signer_company: Option<String>,
    pub signed_at: Option<DateTime<Utc>>,
    pub signer_ip: Option<String>,
    pub grant_days: Option<i32>,
}

/// A titled clause of the agreement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NdaSection {
    pub title: String,
    pub body: String,
}

/// Agreement wording with the disclosing party and recipient filled in.
pub fn template_sections(org_name: &str, recipient: &str) -> Vec<NdaSection> {
    let section = |title: &str, body: String| NdaSection {
        title: title.to_string(),
        body,
    };
    vec![
        section(
            "Purpose",
            format!(
                "{org} (the \"Disclosing Party\") is making security and compliance documentation \
                 available to {recipient} (the \"Recipient\") through its trust portal so that the \
                 Recipient can evaluate a current or prospective business relationship (the \"Purpose\")."
            , org = org_name, recipient = recipient),
        ),
        section(
            "Confidential Information",
            "\"Confidential Information\" means all documents, reports, certificates, policies, \
             audit results and other information made available through the trust portal, \
             whether or not marked as confidential, together with any notes, summaries or \
             analyses prepared by the Recipient that contain or reflect such information."
                .to_string(),
        ),
        section(
            "Obligations of the Recipient",
            "The Recipient shall use Confidential Information solely for the Purpose, shall not \
             disclose it to any third party other than its employees and advisers who need to know \
             it for the Purpose and are bound by obligations of confidentiality at least as \
             protective as these, and shall protect it with at least the degree of care it uses \
             for its own confidential information, and in no event less than reasonable care."
                .to_string(),
        ),
        section(
            "Exclusions",
            "These obligations do not apply to information that is or becomes publicly available \
             through no fault of the Recipient, was lawfully known to the Recipient before \
             disclosure, is lawfully received from a third party without restriction, or is \
             independently developed without use of the Confidential Information."
                .to_string(),
        ),
        section(
            "Compelled Disclosure",
            format!(
                "If the Recipient is required by law or court order to disclose Confidential \
                 Information, it shall, where legally permitted, give {org} prompt written notice \
                 and disclose only the portion that is legally required.",
                org = org_name
            ),
        ),
        section(
            "Access and Term",
            "Access to the trust portal is granted for a limited period and may be revoked at any \
             time. The confidentiality obligations in this Agreement survive the end of access for \
             a period of three (3) years."
                .to_string(),
        ),
        section(
            "Return or Destruction",
            format!(
                "Upon request from {org}, or when access ends, the Recipient shall promptly delete \
                 or destroy all copies of Confidential Information in its possession, except as \
                 required to comply with applicable law or bona fide record retention policies.",
                org = org_name
            ),
        ),
        section(
            "No License or Warranty",
            "No license under any intellectual property right is granted by this Agreement. \
             Confidential Information is provided \"as is\" without warranty of any kind."
                .to_string(),
        ),
        section(
            "Remedies",
            "The Recipient acknowledges that unauthorised use or disclosure of Confidential \
             Information may cause irreparable harm, and that the Disclosing Party is entitled to \
             seek injunctive relief in addition to any other remedies available at law."
                .to_string(),
        ),
        section(
            "Electronic Signature",
            "The Recipient agrees that typing its name and accepting this Agreement through the \
             trust portal constitutes a binding electronic signature."
                .to_string(),
        ),
    ]
}

/// Plain-text rendering of the agreement, shown on the signing page.
pub fn template_text(org_name: &str, recipient: &str) -> String {
    template_sections(org_name, recipient)
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {}\n{}", i + 1, s.title, s.body))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Builds NDA documents for trust portal access.
#[derive(Debug, Clone, Copy, Default)]
pub struct NdaPdfService {
    layout: PageLayout,
}

impl NdaPdfService {
    pub fn new(layout: PageLayout) -> Self {
        Self { layout }
    }

    fn compose(&self, ctx: &NdaContext) -> DocumentBuilder {
        let org = to_ascii(&ctx.org_name);
        let signer = to_ascii(&ctx.signer_name);
        let recipient = match &ctx.signer_company {
            Some(company) if !company.trim().is_empty() => {
                format!("{} of {}", signer, to_ascii(company))
            }
            _ => signer.clone(),
        };

        let mut builder = DocumentBuilder::new(self.layout).with_footer(format!(
            "{}: {} (template {})",
            ctx.reference.label(),
            ctx.reference.id(),
            NDA_TEMPLATE_VERSION
        ));

        builder.heading("Non-Disclosure Agreement", 20.0);
        builder.text(
            &format!("Between {} and {}", org, recipient),
            Font::Helvetica,
            11.0,
        );
        if let Some(days) = ctx.grant_days {
            builder.text(
                &format!("Portal access period: {} days from signature", days),
                Font::Helvetica,
                9.0,
            );
        }
        builder.rule();

        for (i, section) in template_sections(&org, &recipient).iter().enumerate() {
            builder.heading(&format!("{}. {}", i + 1, section.title), 12.0);
            builder.paragraph(&[Span::regular(section.body.as_str())], &BlockStyle::default());
        }

        // The signature block always sits on its own final page.
        builder.new_page();
        builder.heading("Signature", 16.0);
        let signed_at = ctx
            .signed_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "Not yet signed".to_string());
        let mut rows = vec![
            ("Signed by", signer),
            ("Email", to_ascii(&ctx.signer_email)),
            ("Date", signed_at),
            (ctx.reference.label(), ctx.reference.id().to_string()),
        ];
        if let Some(ip) = &ctx.signer_ip {
            rows.push(("IP address", ip.clone()));
        }
        for (label, value) in rows {
            builder.paragraph(
                &[Span::bold(format!("{}: ", label)), Span::regular(value)],
                &BlockStyle::sized(11.0),
            );
        }
        builder.space(12.0);
        builder.paragraph(
            &[Span::regular(format!(
                "Accepted electronically on behalf of the Recipient. {} retains a copy of this \
                 agreement.",
                org
            ))],
            &BlockStyle::sized(9.0),
        );
        builder
    }

    /// Unwatermarked agreement, body pages followed by the signature page.
    pub fn generate(&self, ctx: &NdaContext) -> Result<Vec<u8>, AppError> {
        self.compose(ctx).finish()
    }

    /// The archived copy: generated, then stamped with the signer's email.
    pub fn generate_signed(&self, ctx: &NdaContext) -> Result<Vec<u8>, AppError> {
        let pdf = self.generate(ctx)?;
        watermark(&pdf, &ctx.signer_email, ctx.reference.id())
    }

    pub fn preview(&self, ctx: &NdaContext) -> Result<Vec<u8>, AppError> {
        let pdf = self.generate(ctx)?;
        watermark(&pdf, "PREVIEW", ctx.reference.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::Document;

    fn context() -> NdaContext {
        NdaContext {
            reference: NdaReference::Agreement("3f0c9a52".to_string()),
            org_name: "Acme Cloud\u{2122}".to_string(),
            signer_name: "Jo Rivera".to_string(),
            signer_email: "jo@client.com".to_string(),
            signer_company: Some("Client Corp".to_string()),
            signed_at: Some(Utc::now()),
            signer_ip: Some("203.0.113.9".to_string()),
            grant_days: Some(30),
        }
    }

    #[test]
    fn template_interpolates_parties() {
        let text = template_text("Acme", "Jo Rivera");
        assert!(text.starts_with("1. Purpose\nAcme (the \"Disclosing Party\")"));
        assert!(text.contains("available to Jo Rivera"));
        assert_eq!(template_sections("Acme", "Jo").len(), 10);
    }

    #[test]
    fn signature_page_is_last_and_separate() {
        let service = NdaPdfService::default();
        let builder = service.compose(&context());
        let last = builder.page_count() - 1;
        let text = builder.page_text(last);
        assert_eq!(text.first().copied(), Some("Signature"));
        assert!(text.contains(&"jo@client.com"));
        assert!(!builder.page_text(0).contains(&"Signature"));
        assert!(builder.page_text(0).iter().any(|t| t.contains("Acme Cloud(TM)")));
    }

    #[test]
    fn preview_without_agreement_is_labelled_with_the_request() {
        let ctx = NdaContext {
            reference: NdaReference::Request("req-77".to_string()),
            signed_at: None,
            signer_ip: None,
            ..context()
        };
        let builder = NdaPdfService::default().compose(&ctx);
        let text = builder.page_text(builder.page_count() - 1);
        assert!(text.iter().any(|t| t.starts_with("Request ID")));
        assert!(!text.iter().any(|t| t.starts_with("Agreement ID")));
        assert!(text.contains(&"req-77"));
    }

    #[test]
    fn signed_pdf_is_watermarked() {
        let service = NdaPdfService::default();
        let pdf = service.generate_signed(&context()).unwrap();
        let doc = Document::load_mem(&pdf).unwrap();
        assert!(doc.get_pages().len() >= 2);
        let needle = b"Document ID: 3f0c9a52 | jo@client.com";
        let stamps = pdf.windows(needle.len()).filter(|w| w == needle).count();
        assert_eq!(stamps, doc.get_pages().len());
    }
}
