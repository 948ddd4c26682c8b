//! Mapping from provider reply labels to the canonical
//! (category, sentiment) pair.

use crate::types::{ReplyCategory, ReplySentiment};

/// Map a provider-supplied reply label to the canonical pair.
///
/// Exact (case-insensitive) matches against the fixed table win; unknown
/// labels fall back to a substring scan, and anything still unmatched maps to
/// `(Neutral, Neutral)`.
pub fn map_reply_category(label: &str) -> (ReplyCategory, ReplySentiment) {
    let normalized = label.trim().to_lowercase();

    // "Meeting Request", "Meeting Booked", "Meeting Scheduled", ...
    if normalized.starts_with("meeting") {
        return (ReplyCategory::MeetingRequest, ReplySentiment::Positive);
    }

    match normalized.as_str() {
        "interested" | "positive" => (ReplyCategory::Interested, ReplySentiment::Positive),
        "not interested" => (ReplyCategory::NotInterested, ReplySentiment::Negative),
        "out of office" | "out-of-office" | "ooo" => {
            (ReplyCategory::OutOfOffice, ReplySentiment::Neutral)
        }
        // "Wrong Person" is a referral with neutral sentiment, while the
        // literal "Referral" label carries positive sentiment in the upstream
        // table. Both entries are preserved as-is.
        "wrong person" => (ReplyCategory::Referral, ReplySentiment::Neutral),
        "referral" => (ReplyCategory::Referral, ReplySentiment::Positive),
        "unsubscribed" | "do not contact" => {
            (ReplyCategory::Unsubscribe, ReplySentiment::Negative)
        }
        "neutral" | "question" | "not now" | "bad timing" | "auto reply" | "auto-reply" => {
            (ReplyCategory::Neutral, ReplySentiment::Neutral)
        }
        _ => infer_from_substring(&normalized),
    }
}

/// Case-insensitive substring inference for labels outside the fixed table.
fn infer_from_substring(normalized: &str) -> (ReplyCategory, ReplySentiment) {
    if normalized.contains("not interested") {
        (ReplyCategory::NotInterested, ReplySentiment::Negative)
    } else if normalized.contains("interested") {
        (ReplyCategory::Interested, ReplySentiment::Positive)
    } else if normalized.contains("meeting") {
        (ReplyCategory::MeetingRequest, ReplySentiment::Positive)
    } else if normalized.contains("out of office") || normalized.contains("ooo") {
        (ReplyCategory::OutOfOffice, ReplySentiment::Neutral)
    } else if normalized.contains("unsubscribe") || normalized.contains("do not contact") {
        (ReplyCategory::Unsubscribe, ReplySentiment::Negative)
    } else if normalized.contains("wrong person") {
        (ReplyCategory::Referral, ReplySentiment::Neutral)
    } else if normalized.contains("referral") {
        (ReplyCategory::Referral, ReplySentiment::Positive)
    } else {
        (ReplyCategory::Neutral, ReplySentiment::Neutral)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_table_totality() {
        let table = [
            "Interested",
            "Meeting Request",
            "Meeting Booked",
            "Positive",
            "Not Interested",
            "Out of Office",
            "OOO",
            "Wrong Person",
            "Unsubscribed",
            "Do Not Contact",
            "Neutral",
            "Question",
            "Not Now",
            "Bad Timing",
            "Referral",
            "Auto Reply",
        ];
        for label in table {
            // Every table entry maps to a concrete pair; no panics, no gaps.
            let (_category, _sentiment) = map_reply_category(label);
        }
    }

    #[test]
    fn test_positive_labels() {
        assert_eq!(
            map_reply_category("Interested"),
            (ReplyCategory::Interested, ReplySentiment::Positive)
        );
        assert_eq!(
            map_reply_category("Meeting Booked"),
            (ReplyCategory::MeetingRequest, ReplySentiment::Positive)
        );
        assert_eq!(
            map_reply_category("Referral"),
            (ReplyCategory::Referral, ReplySentiment::Positive)
        );
    }

    #[test]
    fn test_wrong_person_is_neutral_referral() {
        assert_eq!(
            map_reply_category("Wrong Person"),
            (ReplyCategory::Referral, ReplySentiment::Neutral)
        );
    }

    #[test]
    fn test_negative_labels() {
        assert_eq!(
            map_reply_category("Not Interested"),
            (ReplyCategory::NotInterested, ReplySentiment::Negative)
        );
        assert_eq!(
            map_reply_category("Do Not Contact"),
            (ReplyCategory::Unsubscribe, ReplySentiment::Negative)
        );
    }

    #[test]
    fn test_substring_fallback() {
        assert_eq!(
            map_reply_category("Lead seems interested, follow up"),
            (ReplyCategory::Interested, ReplySentiment::Positive)
        );
        assert_eq!(
            map_reply_category("definitely NOT INTERESTED"),
            (ReplyCategory::NotInterested, ReplySentiment::Negative)
        );
        assert_eq!(
            map_reply_category("please unsubscribe me"),
            (ReplyCategory::Unsubscribe, ReplySentiment::Negative)
        );
    }

    #[test]
    fn test_unknown_maps_to_neutral() {
        assert_eq!(
            map_reply_category("garbled ???"),
            (ReplyCategory::Neutral, ReplySentiment::Neutral)
        );
        assert_eq!(
            map_reply_category(""),
            (ReplyCategory::Neutral, ReplySentiment::Neutral)
        );
    }
}
