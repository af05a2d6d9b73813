//! Transactional email bodies. Every template yields a subject, a plain-text
//! part and an HTML part; user-supplied values are escaped in the HTML.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailContent {
    pub template: &'static str,
    pub subject: String,
    pub text: String,
    pub html: String,
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn format_date(at: DateTime<Utc>) -> String {
    at.format("%B %-d, %Y at %H:%M UTC").to_string()
}

fn layout(heading: &str, body_html: &str, button: Option<(&str, &str)>, footnote: &str) -> String {
    let button_html = button
        .map(|(label, url)| {
            format!(
                r#"<p style="margin: 24px 0;"><a href="{url}" style="background-color: #111827; color: #ffffff; padding: 12px 20px; text-decoration: none; border-radius: 6px;">{label}</a></p>"#,
                url = escape_html(url),
                label = escape_html(label)
            )
        })
        .unwrap_or_default();
    format!(
        r#"<html>
  <body style="font-family: Arial, sans-serif; color: #111827;">
    <h2>{heading}</h2>
    {body_html}
    {button_html}
    <p style="color: #6b7280; font-size: 12px;">{footnote}</p>
  </body>
</html>"#,
        heading = heading,
        body_html = body_html,
        button_html = button_html,
        footnote = footnote,
    )
}

pub struct AccessRequestDetails<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub company: Option<&'a str>,
    pub job_title: Option<&'a str>,
    pub purpose: Option<&'a str>,
    pub requested_duration_days: Option<i32>,
}

/// Sent to privileged members when someone asks for portal access.
pub fn access_request_notification(org_name: &str, request: &AccessRequestDetails<'_>, review_url: &str) -> EmailContent {
    let mut rows: Vec<(&str, String)> = vec![
        ("Name", request.name.to_string()),
        ("Email", request.email.to_string()),
    ];
    if let Some(company) = request.company {
        rows.push(("Company", company.to_string()));
    }
    if let Some(title) = request.job_title {
        rows.push(("Job title", title.to_string()));
    }
    if let Some(purpose) = request.purpose {
        rows.push(("Purpose", purpose.to_string()));
    }
    if let Some(days) = request.requested_duration_days {
        rows.push(("Requested access", format!("{} days", days)));
    }

    let text_rows: Vec<String> = rows.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
    let html_rows: String = rows
        .iter()
        .map(|(k, v)| format!("<li><strong>{}:</strong> {}</li>", k, escape_html(v)))
        .collect();

    EmailContent {
        template: "access_request_notification",
        subject: format!("New trust portal access request from {}", request.name),
        text: format!(
            "{} has requested access to the {} trust portal.\n\n{}\n\nReview the request: {}",
            request.name,
            org_name,
            text_rows.join("\n"),
            review_url
        ),
        html: layout(
            "New access request",
            &format!(
                "<p>{} has requested access to the {} trust portal.</p><ul>{}</ul>",
                escape_html(request.name),
                escape_html(org_name),
                html_rows
            ),
            Some(("Review request", review_url)),
            "You receive this email because you are an owner or admin of this organization.",
        ),
    }
}

/// Sent to the requester after approval.
pub fn nda_signing(org_name: &str, name: &str, sign_url: &str, expires_at: DateTime<Utc>) -> EmailContent {
    EmailContent {
        template: "nda_signing",
        subject: format!("Sign the NDA to access {} documents", org_name),
        text: format!(
            "Hi {},\n\nYour request to access the {} trust portal was approved. Please review and \
             sign the non-disclosure agreement to continue:\n\n{}\n\nThis link expires on {}.",
            name,
            org_name,
            sign_url,
            format_date(expires_at)
        ),
        html: layout(
            "Your access request was approved",
            &format!(
                "<p>Hi {},</p><p>Your request to access the {} trust portal was approved. Please review and sign the non-disclosure agreement to continue.</p>",
                escape_html(name),
                escape_html(org_name)
            ),
            Some(("Review and sign NDA", sign_url)),
            &format!("This link expires on {}.", format_date(expires_at)),
        ),
    }
}

/// Sent after the NDA is signed.
pub fn access_granted(org_name: &str, name: &str, access_url: &str, grant_expires_at: DateTime<Utc>) -> EmailContent {
    EmailContent {
        template: "access_granted",
        subject: format!("Your access to {} trust documents", org_name),
        text: format!(
            "Hi {},\n\nThanks for signing the NDA. You can now view {} compliance documents:\n\n{}\n\n\
             Your access is valid until {}. If the link expires, request a new one from the trust portal.",
            name,
            org_name,
            access_url,
            format_date(grant_expires_at)
        ),
        html: layout(
            "Access granted",
            &format!(
                "<p>Hi {},</p><p>Thanks for signing the NDA. You can now view {} compliance documents.</p>",
                escape_html(name),
                escape_html(org_name)
            ),
            Some(("Open trust portal", access_url)),
            &format!(
                "Your access is valid until {}. If the link expires, request a new one from the trust portal.",
                format_date(grant_expires_at)
            ),
        ),
    }
}

/// Sent when an existing grantee asks for their link again.
pub fn access_reclaim(org_name: &str, access_url: &str, link_expires_at: DateTime<Utc>) -> EmailContent {
    EmailContent {
        template: "access_reclaim",
        subject: format!("Your {} trust portal access link", org_name),
        text: format!(
            "Here is your link to the {} trust portal:\n\n{}\n\nThe link expires on {}. \
             If you did not ask for this email you can ignore it.",
            org_name,
            access_url,
            format_date(link_expires_at)
        ),
        html: layout(
            "Your access link",
            &format!(
                "<p>Here is your link to the {} trust portal.</p>",
                escape_html(org_name)
            ),
            Some(("Open trust portal", access_url)),
            &format!(
                "The link expires on {}. If you did not ask for this email you can ignore it.",
                format_date(link_expires_at)
            ),
        ),
    }
}

pub fn invitation(
    org_name: &str,
    inviter: Option<&str>,
    roles: &str,
    accept_url: &str,
    expires_at: DateTime<Utc>,
) -> EmailContent {
    let who = inviter.unwrap_or("A team member");
    EmailContent {
        template: "invitation",
        subject: format!("You have been invited to join {}", org_name),
        text: format!(
            "{} invited you to join {} as {}.\n\nAccept the invitation: {}\n\nThis invitation expires on {}.",
            who,
            org_name,
            roles,
            accept_url,
            format_date(expires_at)
        ),
        html: layout(
            &format!("Join {}", escape_html(org_name)),
            &format!(
                "<p>{} invited you to join {} as <strong>{}</strong>.</p>",
                escape_html(who),
                escape_html(org_name),
                escape_html(roles)
            ),
            Some(("Accept invitation", accept_url)),
            &format!("This invitation expires on {}.", format_date(expires_at)),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 7, 14, 30, 0).unwrap()
    }

    #[test]
    fn escapes_user_input_in_html_only() {
        let request = AccessRequestDetails {
            name: "<script>alert(1)</script>",
            email: "x@example.com",
            company: Some("Tom & Jerry"),
            job_title: None,
            purpose: None,
            requested_duration_days: Some(14),
        };
        let email = access_request_notification("Acme", &request, "https://app/review");
        assert!(!email.html.contains("<script>"));
        assert!(email.html.contains("&lt;script&gt;"));
        assert!(email.html.contains("Tom &amp; Jerry"));
        assert!(email.text.contains("Company: Tom & Jerry"));
        assert!(email.text.contains("Requested access: 14 days"));
        assert!(!email.text.contains("Job title"));
    }

    #[test]
    fn nda_email_carries_link_and_expiry() {
        let email = nda_signing("Acme", "Jo", "https://trust/nda/abc", at());
        assert_eq!(email.template, "nda_signing");
        assert!(email.text.contains("https://trust/nda/abc"));
        assert!(email.text.contains("March 7, 2025 at 14:30 UTC"));
        assert!(email.html.contains(r#"href="https://trust/nda/abc""#));
    }

    #[test]
    fn invitation_defaults_inviter() {
        let email = invitation("Acme", None, "admin", "https://app/accept", at());
        assert!(email.text.starts_with("A team member invited you to join Acme as admin."));
        assert_eq!(email.subject, "You have been invited to join Acme");
    }
}
