//! Per-recipient personalization: merge fields, tracked links, open pixel
//! and the unsubscribe footer

use mailwarden_common::signing::LinkSigner;
use mailwarden_common::types::SendId;
use mailwarden_common::{Config, Result};
use mailwarden_storage::{EmailCampaign, EmailContact, Variant};
use regex::{Captures, Regex};
use serde_json::Value;
use url::form_urlencoded::byte_serialize;

/// Rendered content for one recipient
#[derive(Debug, Clone)]
pub struct PersonalizedContent {
    pub subject: String,
    pub html: String,
    pub text: Option<String>,
    pub unsubscribe_url: String,
}

/// Renders campaign content for each recipient
pub struct Personalizer {
    public_url: String,
    signer: LinkSigner,
    track_opens: bool,
    track_clicks: bool,
    merge_field: Regex,
    href: Regex,
    body_close: Regex,
}

impl Personalizer {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            public_url: config.tracking.public_url.trim_end_matches('/').to_string(),
            signer: LinkSigner::new(&config.tracking.signing_secret)?,
            track_opens: config.tracking.track_opens,
            track_clicks: config.tracking.track_clicks,
            merge_field: Regex::new(r"\{\{\s*([^{}]*?)\s*\}\}").expect("static merge-field pattern"),
            href: Regex::new(r#"(?i)(href\s*=\s*)(["'])(https?://[^"']+)(["'])"#)
                .expect("static href pattern"),
            body_close: Regex::new(r"(?i)</body\s*>").expect("static body pattern"),
        })
    }

    /// Signed unsubscribe link for a contact
    pub fn unsubscribe_url(&self, contact: &EmailContact) -> String {
        format!(
            "{}/unsubscribe?cid={}&lid={}&sig={}",
            self.public_url,
            contact.id,
            contact.list_id,
            self.signer.sign_unsubscribe(contact.id, contact.list_id)
        )
    }

    pub fn render(
        &self,
        campaign: &EmailCampaign,
        contact: &EmailContact,
        send_id: SendId,
        variant: Option<Variant>,
    ) -> PersonalizedContent {
        let unsubscribe_url = self.unsubscribe_url(contact);

        let subject = self.merge(campaign.subject_for(variant), contact, &unsubscribe_url, false);
        let mut html = self.merge(&campaign.html_content, contact, &unsubscribe_url, true);
        let mut text = campaign
            .text_content
            .as_deref()
            .map(|t| self.merge(t, contact, &unsubscribe_url, false));

        if self.track_clicks {
            html = self.wrap_links(&html, send_id, &unsubscribe_url);
        }

        // Unsubscribe URL contains '&', which merges into HTML as "&amp;"
        if !html.contains(&escape_html(&unsubscribe_url)) && !html.contains(&unsubscribe_url) {
            html = self.insert_before_body_close(
                &html,
                &format!(
                    "<p style=\"font-size:12px;color:#888888;text-align:center\">\
                     You received this email because you subscribed to our list. \
                     <a href=\"{}\">Unsubscribe</a></p>",
                    escape_html(&unsubscribe_url)
                ),
            );
        }
        if let Some(t) = text.as_mut() {
            if !t.contains(&unsubscribe_url) {
                t.push_str(&format!("\n\n---\nUnsubscribe: {}\n", unsubscribe_url));
            }
        }

        if self.track_opens {
            html = self.insert_before_body_close(
                &html,
                &format!(
                    "<img src=\"{}/t/open/{}\" width=\"1\" height=\"1\" alt=\"\" style=\"display:none\" />",
                    self.public_url, send_id
                ),
            );
        }

        PersonalizedContent {
            subject,
            html,
            text,
            unsubscribe_url,
        }
    }

    /// Replace merge fields; unknown fields become empty
    fn merge(&self, template: &str, contact: &EmailContact, unsubscribe_url: &str, html: bool) -> String {
        self.merge_field
            .replace_all(template, |caps: &Captures| {
                let value = field_value(&caps[1], contact, unsubscribe_url);
                if html {
                    escape_html(&value)
                } else {
                    value
                }
            })
            .into_owned()
    }

    fn wrap_links(&self, html: &str, send_id: SendId, unsubscribe_url: &str) -> String {
        self.href
            .replace_all(html, |caps: &Captures| {
                let target = caps[3].replace("&amp;", "&");
                if target == unsubscribe_url || target.starts_with(&format!("{}/", self.public_url)) {
                    return caps[0].to_string();
                }
                let encoded: String = byte_serialize(target.as_bytes()).collect();
                format!(
                    "{}{}{}/t/click/{}?url={}{}",
                    &caps[1], &caps[2], self.public_url, send_id, encoded, &caps[4]
                )
            })
            .into_owned()
    }

    fn insert_before_body_close(&self, html: &str, fragment: &str) -> String {
        match self.body_close.find_iter(html).last() {
            Some(close) => {
                let mut out = String::with_capacity(html.len() + fragment.len());
                out.push_str(&html[..close.start()]);
                out.push_str(fragment);
                out.push_str(&html[close.start()..]);
                out
            }
            None => format!("{}{}", html, fragment),
        }
    }
}

fn field_value(name: &str, contact: &EmailContact, unsubscribe_url: &str) -> String {
    match name {
        "email" => contact.email.clone(),
        "first_name" => contact.first_name.clone().unwrap_or_default(),
        "last_name" => contact.last_name.clone().unwrap_or_default(),
        "name" => contact.full_name().unwrap_or_default(),
        "unsubscribe_url" => unsubscribe_url.to_string(),
        other => match other.strip_prefix("attributes.") {
            Some(key) => match contact.attributes.get(key) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => String::new(),
                Some(value) => value.to_string(),
            },
            None => String::new(),
        },
    }
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
