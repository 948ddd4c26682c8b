//! Webhook payload parsing, structural validation, and sanitization.
//!
//! Both providers post JSON with their own field spellings; parsing
//! normalizes them into one [`InboundEvent`]. Validation is structural
//! (required event type, typed ids, plausible email) and sanitizing (control
//! characters stripped, string lengths capped, only http/https URLs kept).

use chrono::{DateTime, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};

use atlas_core::{AtlasError, AtlasResult};

const MAX_REPLY_TEXT_CHARS: usize = 10_000;
const MAX_FIELD_CHARS: usize = 512;
const MAX_EMAIL_CHARS: usize = 320;

/// The event types the intake dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookKind {
    Sent,
    Opened,
    Clicked,
    Replied,
    Bounced,
    Unsubscribed,
    CategoryChanged,
}

impl WebhookKind {
    /// Normalize both providers' event-type spellings.
    pub fn parse(event_type: &str) -> Option<Self> {
        match event_type.to_ascii_lowercase().as_str() {
            "email_sent" | "sent" | "message_sent" => Some(WebhookKind::Sent),
            "email_open" | "email_opened" | "opened" | "open" => Some(WebhookKind::Opened),
            "email_click" | "email_clicked" | "clicked" | "click" | "link_clicked" => {
                Some(WebhookKind::Clicked)
            }
            "email_reply" | "email_replied" | "replied" | "reply" => Some(WebhookKind::Replied),
            "email_bounce" | "email_bounced" | "bounced" | "bounce" => Some(WebhookKind::Bounced),
            "unsubscribe" | "unsubscribed" => Some(WebhookKind::Unsubscribed),
            "lead_category_updated" | "category_changed" | "category_updated" => {
                Some(WebhookKind::CategoryChanged)
            }
            _ => None,
        }
    }
}

/// A validated, sanitized webhook event.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub kind: WebhookKind,
    pub event_type: String,
    /// Provider-supplied id, or a digest of the raw body when absent.
    pub event_id: String,
    /// The provider's external campaign id.
    pub campaign_platform_id: String,
    pub email: String,
    pub step_number: u32,
    pub occurred_at: DateTime<Utc>,
    pub reply_text: Option<String>,
    pub lead_category: Option<String>,
    pub link_url: Option<String>,
    pub bounce_type: Option<String>,
    pub bounce_reason: Option<String>,
}

/// Parse and validate a raw webhook body.
///
/// Returns the normalized event together with the parsed payload (persisted
/// verbatim in the raw event log).
pub fn parse_event(raw_body: &[u8]) -> AtlasResult<(InboundEvent, Value)> {
    let payload: Value = serde_json::from_slice(raw_body)
        .map_err(|e| AtlasError::Validation(format!("malformed JSON: {e}")))?;

    let event_type = string_of(&payload, &["event_type", "eventType", "type"])
        .ok_or_else(|| AtlasError::Validation("missing event_type".to_string()))?;
    let kind = WebhookKind::parse(&event_type)
        .ok_or_else(|| AtlasError::Validation(format!("unsupported event_type '{event_type}'")))?;

    let campaign_platform_id = id_of(
        &payload,
        &["campaign_id", "campaignId", "sequence_id", "sequenceId"],
    )
    .ok_or_else(|| AtlasError::Validation("missing or non-numeric campaign_id".to_string()))?;

    let email = string_of(&payload, &["email", "lead_email", "contact_email"])
        .map(|e| sanitize_text(&e, MAX_EMAIL_CHARS).to_lowercase())
        .ok_or_else(|| AtlasError::Validation("missing email".to_string()))?;
    if !is_plausible_email(&email) {
        return Err(AtlasError::Validation(format!("implausible email '{email}'")));
    }

    let event_id = string_of(&payload, &["event_id", "eventId", "id"])
        .map(|id| sanitize_text(&id, MAX_FIELD_CHARS))
        .unwrap_or_else(|| synthesize_event_id(raw_body));

    let step_number = number_of(
        &payload,
        &["step_number", "stepNumber", "step", "sequence_step"],
    )
    .unwrap_or(1) as u32;

    let occurred_at = string_of(&payload, &["timestamp", "occurred_at", "event_time"])
        .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    let event = InboundEvent {
        kind,
        event_type,
        event_id,
        campaign_platform_id,
        email,
        step_number,
        occurred_at,
        reply_text: string_of(&payload, &["reply_text", "reply_body", "text_body"])
            .map(|t| sanitize_text(&t, MAX_REPLY_TEXT_CHARS)),
        lead_category: string_of(&payload, &["lead_category", "category", "label"])
            .map(|c| sanitize_text(&c, MAX_FIELD_CHARS)),
        link_url: string_of(&payload, &["link_url", "url", "clicked_url"])
            .and_then(|u| sanitize_url(&u)),
        bounce_type: string_of(&payload, &["bounce_type", "bounceType"])
            .map(|b| sanitize_text(&b, MAX_FIELD_CHARS)),
        bounce_reason: string_of(&payload, &["bounce_reason", "bounceReason", "reason"])
            .map(|b| sanitize_text(&b, MAX_FIELD_CHARS)),
    };
    Ok((event, payload))
}

/// Deterministic event id for providers that omit one: replays of an
/// identical body still dedupe.
fn synthesize_event_id(raw_body: &[u8]) -> String {
    let digest = Sha256::digest(raw_body);
    format!("synth-{}", hex::encode(digest))
}

fn string_of(payload: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        payload.get(key).and_then(|v| {
            v.as_str()
                .map(str::to_string)
                .filter(|s| !s.is_empty())
                .or_else(|| v.as_u64().map(|n| n.to_string()))
        })
    })
}

/// Ids must be strings or plain numbers; other JSON types are rejected by
/// returning None.
fn id_of(payload: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match payload.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn number_of(payload: &Value, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|key| payload.get(key).and_then(Value::as_u64))
}

/// Strip control characters and cap the length.
fn sanitize_text(input: &str, max_chars: usize) -> String {
    input
        .chars()
        .filter(|c| !c.is_control() || *c == '\n')
        .take(max_chars)
        .collect()
}

/// Keep only http/https URLs.
fn sanitize_url(input: &str) -> Option<String> {
    let sanitized = sanitize_text(input, 2_048);
    let parsed = url::Url::parse(&sanitized).ok()?;
    matches!(parsed.scheme(), "http" | "https").then_some(sanitized)
}

fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}
