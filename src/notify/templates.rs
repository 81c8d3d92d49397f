//! Subject, HTML and plaintext for each email type.

use serde::{Deserialize, Deserializer, Serialize};

use super::email_type::{EmailType, Recipient};
use crate::config::EmailSettings;
use crate::error::ValidationError;

/// Data the templates draw from. Field names follow the JSON clients send.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmailPayload {
    #[serde(alias = "email")]
    pub user_email: Option<String>,
    pub user_name: Option<String>,
    /// Accepts a JSON array or a string holding one (older clients).
    #[serde(deserialize_with = "reasons_list")]
    pub cancellation_reasons: Vec<String>,
    pub specific_issues: Option<String>,
    pub additional_feedback: Option<String>,
    pub discount_amount: Option<u32>,
    pub discount_duration: Option<u32>,
    pub education_type: Option<String>,
    pub calendly_url: Option<String>,
}

fn reasons_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        Text(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(Raw::List(list)) => list,
        Some(Raw::Text(text)) => match serde_json::from_str::<Vec<String>>(&text) {
            Ok(list) => list,
            Err(_) if text.trim().is_empty() => Vec::new(),
            Err(_) => vec![text],
        },
    })
}

/// A fully rendered message, ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub email_type: EmailType,
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

/// Render `email_type` for `payload`. Fails only when the user address is missing.
pub fn render(
    email_type: EmailType,
    payload: &EmailPayload,
    settings: &EmailSettings,
) -> Result<RenderedEmail, ValidationError> {
    let user_email = payload
        .user_email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| ValidationError::new("userEmail", "userEmail is required"))?;

    let ctx = Context {
        payload,
        settings,
        user_email,
        name: escape_html(
            payload
                .user_name
                .as_deref()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or("there"),
        ),
        product: escape_html(&settings.product_name),
    };

    let (subject, html, text) = match email_type {
        EmailType::CancellationConfirmation => cancellation_confirmation(&ctx),
        EmailType::CancellationNotification => cancellation_notification(&ctx),
        EmailType::RetentionConfirmation => retention_confirmation(&ctx),
        EmailType::RetentionAcceptance => retention_acceptance(&ctx),
        EmailType::ReviewOptimizationFollowup => review_optimization_followup(&ctx),
        EmailType::PoorExperienceFollowup => poor_experience_followup(&ctx),
        EmailType::RetailSyndicationFollowup => retail_syndication_followup(&ctx),
        EmailType::TechnicalIssuesFollowup => technical_issues_followup(&ctx),
    };

    let to = match email_type.recipient() {
        Recipient::User => user_email.to_string(),
        Recipient::Operations => settings.ops_address.clone(),
    };
    let text_body = text.unwrap_or_else(|| strip_html(&html));

    Ok(RenderedEmail {
        email_type,
        to,
        subject,
        html_body: html,
        text_body,
    })
}

struct Context<'a> {
    payload: &'a EmailPayload,
    settings: &'a EmailSettings,
    user_email: &'a str,
    /// Escaped greeting name.
    name: String,
    /// Escaped product name.
    product: String,
}

impl Context<'_> {
    fn discount(&self) -> (u32, u32) {
        (
            self.payload
                .discount_amount
                .unwrap_or(self.settings.discount_percent),
            self.payload
                .discount_duration
                .unwrap_or(self.settings.discount_months),
        )
    }

    fn reasons(&self) -> String {
        if self.payload.cancellation_reasons.is_empty() {
            "Not specified".to_string()
        } else {
            self.payload.cancellation_reasons.join(", ")
        }
    }

    /// Optional free-text sections for internal notices, as (html, text).
    fn details(&self, issues_heading: &str, feedback_heading: &str) -> (String, String) {
        let mut html = String::new();
        let mut text = String::new();
        for (heading, value) in [
            (issues_heading, &self.payload.specific_issues),
            (feedback_heading, &self.payload.additional_feedback),
        ] {
            if let Some(v) = value.as_deref().filter(|v| !v.trim().is_empty()) {
                html.push_str(&format!("<h3>{heading}</h3><p>{}</p>", escape_html(v)));
                text.push_str(&format!("{heading}:\n{v}\n\n"));
            }
        }
        (html, text)
    }

    fn calendly(&self, default: &str) -> String {
        self.payload
            .calendly_url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| default.to_string())
    }

    fn signature(&self) -> String {
        format!(
            "<p>Best regards,<br><strong>The {} Team</strong></p><p>Reply to this email for support assistance</p>",
            self.product
        )
    }
}

type Parts = (String, String, Option<String>);

fn layout(title: &str, body: &str) -> String {
    format!(
        "<div style=\"font-family: -apple-system, Segoe UI, sans-serif; max-width: 600px; margin: 0 auto; color: #1f2937;\">\
         <h1 style=\"font-size: 26px; font-weight: 600;\">{title}</h1>{body}</div>"
    )
}

fn cancellation_confirmation(ctx: &Context<'_>) -> Parts {
    let product = &ctx.product;
    let body = format!(
        "<p>Hi {name},</p>\
         <p>We've processed your cancellation request. Your {product} account has been cancelled and will not renew.</p>\
         <p>We're sorry to see you go and appreciate the time you spent with us.</p>\
         <p><strong>Important:</strong> You can still access your account data until your current billing period ends.</p>\
         <p>Thank you for being a {product} customer.</p>{sig}",
        name = ctx.name,
        sig = ctx.signature(),
    );
    let text = format!(
        "Account Cancelled\n\nHi {name},\n\nWe've processed your cancellation request. Your {product} account has been cancelled and will not renew.\n\n\
         We're sorry to see you go and appreciate the time you spent with us.\n\n\
         Important: You can still access your account data until your current billing period ends.\n\n\
         Thank you for being a {product} customer.\n\nBest regards,\nThe {product} Team",
        name = ctx.payload.user_name.as_deref().unwrap_or("there"),
        product = ctx.settings.product_name,
    );
    (
        format!("Your {} account has been cancelled", ctx.settings.product_name),
        layout("Account Cancelled", &body),
        Some(text),
    )
}

fn cancellation_notification(ctx: &Context<'_>) -> Parts {
    let (details_html, details_text) = ctx.details("Specific Issues", "Additional Feedback");
    let body = format!(
        "<h3>Customer Information</h3>\
         <p><strong>Email:</strong> {email}</p>\
         <p><strong>Cancellation Reasons:</strong> {reasons}</p>\
         {details_html}\
         <p><strong>Action Required:</strong> Follow up with the customer to understand their concerns and explore retention options.</p>\
         <p>Generated automatically by the {product} cancellation flow.</p>",
        email = escape_html(ctx.user_email),
        reasons = escape_html(&ctx.reasons()),
        product = ctx.product,
    );
    let text = format!(
        "New Cancellation\n\nCustomer Information:\nEmail: {email}\nCancellation Reasons: {reasons}\n\n{details_text}\
         Action Required: Follow up with the customer to understand their concerns and explore retention options.",
        email = ctx.user_email,
        reasons = ctx.reasons(),
    );
    (
        format!("🚨 New Cancellation: {}", ctx.user_email),
        layout("🚨 New Cancellation", &body),
        Some(text),
    )
}

fn retention_confirmation(ctx: &Context<'_>) -> Parts {
    let (percent, months) = ctx.discount();
    let body = format!(
        "<p style=\"font-size: 20px;\"><strong>{percent}% discount applied</strong></p>\
         <p>Your {percent}% discount is now active for the next {months} months.</p>\
         <p>Hi {name},</p>\
         <p>We're thrilled that you've decided to stay with {product}.</p>\
         <p><strong>What's next:</strong> our success team will reach out within 24 hours to help you get the most out of your account.</p>{sig}",
        name = ctx.name,
        product = ctx.product,
        sig = ctx.signature(),
    );
    (
        "🎉 Welcome back! Your discount is now active".to_string(),
        layout("🎉 Welcome Back!", &body),
        None,
    )
}

fn retention_acceptance(ctx: &Context<'_>) -> Parts {
    let (percent, months) = ctx.discount();
    let (details_html, details_text) = ctx.details("Specific Issues Resolved", "Customer Feedback");
    let body = format!(
        "<p><strong>Customer accepted the {percent}% discount offer for {months} months.</strong></p>\
         <h3>Customer Information</h3>\
         <p><strong>Email:</strong> {email}</p>\
         <p><strong>Original Cancellation Reasons:</strong> {reasons}</p>\
         {details_html}\
         <p><strong>Action Required:</strong> Apply the {percent}% discount to their account for {months} months.</p>",
        email = escape_html(ctx.user_email),
        reasons = escape_html(&ctx.reasons()),
    );
    let text = format!(
        "Retention Success\n\nCustomer accepted the {percent}% discount offer for {months} months.\n\n\
         Customer Information:\nEmail: {email}\nOriginal Cancellation Reasons: {reasons}\n\n{details_text}\
         Action Required: Apply the {percent}% discount to their account for {months} months.",
        email = ctx.user_email,
        reasons = ctx.reasons(),
    );
    (
        format!("🎉 Retention Success: {}", ctx.user_email),
        layout("🎉 Retention Success!", &body),
        Some(text),
    )
}

fn call_to_action(url: &str, label: &str) -> String {
    format!(
        "<p style=\"text-align: center; margin: 32px 0;\"><a href=\"{}\" style=\"background: #1e40af; color: #fff; padding: 14px 28px; border-radius: 8px; text-decoration: none; font-weight: 600;\">{label}</a></p>",
        escape_html(url)
    )
}

fn bullet_list(items: &[&str]) -> String {
    let lis: String = items.iter().map(|i| format!("<li>{i}</li>")).collect();
    format!("<ul>{lis}</ul>")
}

fn review_optimization_followup(ctx: &Context<'_>) -> Parts {
    let url = ctx.calendly(&ctx.settings.review_calendly_url);
    let body = format!(
        "<p>Hi {name},</p>\
         <p>You mentioned you're not getting enough reviews. That's one of the most common challenges we see, and there are proven ways to fix it.</p>\
         <p>Let's set up a quick 15-minute call to look at your review collection setup together.</p>\
         <h3>What we'll cover:</h3>{list}{cta}\
         <p><strong>No obligation:</strong> the consultation is free.</p>{sig}",
        name = ctx.name,
        list = bullet_list(&[
            "Review request timing",
            "Multi-channel review collection",
            "Automated follow-up sequences",
            "Industry-specific best practices",
        ]),
        cta = call_to_action(&url, "📅 Schedule Your Free Consultation"),
        sig = ctx.signature(),
    );
    (
        "🚀 Let's boost your review collection - Free consultation".to_string(),
        layout("🚀 Review Optimization", &body),
        None,
    )
}

fn poor_experience_followup(ctx: &Context<'_>) -> Parts {
    let url = ctx.calendly(&ctx.settings.experience_calendly_url);
    let body = format!(
        "<p>Hi {name},</p>\
         <p>We're sorry your experience with {product} fell short. We'd like to understand what went wrong and put it right.</p>\
         <h3>What we'll do:</h3>{list}{cta}\
         <p>Thank you for giving us the chance to make this right.</p>{sig}",
        name = ctx.name,
        product = ctx.product,
        list = bullet_list(&[
            "Listen to your concerns",
            "Find the root cause of each issue",
            "Agree on a plan to resolve them",
        ]),
        cta = call_to_action(&url, "📞 Schedule Experience Review"),
        sig = ctx.signature(),
    );
    (
        "We want to make this right - Let's talk".to_string(),
        layout("We Want to Make This Right", &body),
        None,
    )
}

fn retail_syndication_followup(ctx: &Context<'_>) -> Parts {
    let body = format!(
        "<p>Hi {name},</p>\
         <p>You're looking for retail syndication. Here's what our integration team can help you set up:</p>{list}\
         <p>Reply to this email and we'll schedule the implementation with you.</p>{sig}",
        name = ctx.name,
        list = bullet_list(&[
            "Multi-channel review collection setup",
            "Retail partner integration guides",
            "Best practices for retail review management",
        ]),
        sig = ctx.signature(),
    );
    (
        "Retail Syndication Features - Implementation Guide".to_string(),
        layout("Retail Syndication Implementation", &body),
        None,
    )
}

fn technical_issues_followup(ctx: &Context<'_>) -> Parts {
    let reported = ctx
        .payload
        .specific_issues
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(|s| format!("<p><strong>What you reported:</strong> {}</p>", escape_html(s)))
        .unwrap_or_default();
    let body = format!(
        "<p>Hi {name},</p>\
         <p>Sorry you've run into technical issues with {product}. Our technical team has your report and will work with you until it's resolved.</p>\
         {reported}{list}{sig}",
        name = ctx.name,
        product = ctx.product,
        list = bullet_list(&[
            "Troubleshooting guides for common issues",
            "Direct contact with our technical team",
            "Escalation for complex problems",
        ]),
        sig = ctx.signature(),
    );
    (
        "Technical Support - Issue Resolution Guide".to_string(),
        layout("Technical Support Information", &body),
        None,
    )
}

/// Escape text for inclusion in HTML element content or attribute values.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Plaintext rendering of an HTML body: block ends become line breaks, tags go,
/// entities are decoded and blank runs collapse.
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    let mut tag = String::new();
    for ch in html.chars() {
        match ch {
            '<' => {
                in_tag = true;
                tag.clear();
            }
            '>' if in_tag => {
                in_tag = false;
                let name = tag
                    .trim_start_matches('/')
                    .split(|c: char| c.is_whitespace() || c == '/')
                    .next()
                    .unwrap_or("")
                    .to_ascii_lowercase();
                if matches!(name.as_str(), "br" | "p" | "div" | "h1" | "h2" | "h3" | "li" | "ul")
                    && !result.is_empty()
                    && !result.ends_with('\n')
                {
                    result.push('\n');
                }
                if name == "li" && !tag.starts_with('/') {
                    result.push_str("• ");
                }
            }
            _ if in_tag => tag.push(ch),
            _ => result.push(ch),
        }
    }

    let decoded = result
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");

    let mut lines: Vec<String> = Vec::new();
    for line in decoded.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() && lines.last().is_none_or(|l| l.is_empty()) {
            continue;
        }
        lines.push(line);
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}
