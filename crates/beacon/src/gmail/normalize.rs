//! Gmail API response normalization
//!
//! Converts Gmail API responses to Beacon domain models and pulls the
//! plain-text body out of the MIME part tree.

use base64::prelude::*;

use super::api::{GmailMessage, MessagePart};
use crate::models::{FullMessage, MessageId};

const PLAIN_TEXT: &str = "text/plain";

/// Normalize a Gmail API message to a FullMessage
pub fn normalize_message(gmail_msg: GmailMessage) -> FullMessage {
    let subject = gmail_msg
        .payload
        .as_ref()
        .and_then(|p| extract_header(p, "Subject"))
        .unwrap_or_default();

    FullMessage {
        id: MessageId::new(gmail_msg.id),
        label_ids: gmail_msg.label_ids.unwrap_or_default(),
        subject,
        snippet: gmail_msg.snippet,
        payload: gmail_msg.payload,
    }
}

/// Extract a header value by name
fn extract_header(part: &MessagePart, name: &str) -> Option<String> {
    part.headers.as_ref()?.iter().find_map(|h| {
        if h.name.eq_ignore_ascii_case(name) {
            Some(h.value.clone())
        } else {
            None
        }
    })
}

/// Find and decode the first text/plain part of a part tree
///
/// Pre-order depth-first: a node is checked before its children, and
/// children in order. The first text/plain node with inline data that
/// decodes wins; nothing after it is visited.
pub fn extract_plain_text(part: &MessagePart) -> Option<String> {
    if part.mime_type.as_deref() == Some(PLAIN_TEXT)
        && let Some(body) = &part.body
        && let Some(data) = &body.data
        && let Some(text) = decode_base64_body(data)
    {
        return Some(text);
    }

    part.parts.as_ref()?.iter().find_map(extract_plain_text)
}

/// Decode base64 data
///
/// Gmail uses URL-safe base64 but padding can vary, and Pub/Sub uses the
/// standard alphabet, so we try multiple decoders.
pub fn decode_base64(data: &str) -> Option<Vec<u8>> {
    use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE};

    let decoders: &[&base64::engine::GeneralPurpose] =
        &[&BASE64_URL_SAFE_NO_PAD, &URL_SAFE, &STANDARD, &STANDARD_NO_PAD];

    decoders.iter().find_map(|decoder| decoder.decode(data).ok())
}

/// Decode a base64-encoded body to text
///
/// Bytes that are not UTF-8 (e.g. a Latin-1 body) become replacement
/// characters; the ASCII around them stays searchable.
fn decode_base64_body(data: &str) -> Option<String> {
    decode_base64(data).map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gmail::api::{Header, MessageBody};

    fn leaf(mime_type: &str, text: &str) -> MessagePart {
        MessagePart {
            mime_type: Some(mime_type.to_string()),
            body: Some(MessageBody {
                size: Some(text.len() as u32),
                data: Some(BASE64_URL_SAFE_NO_PAD.encode(text)),
            }),
            ..Default::default()
        }
    }

    fn multipart(mime_type: &str, parts: Vec<MessagePart>) -> MessagePart {
        MessagePart {
            mime_type: Some(mime_type.to_string()),
            body: Some(MessageBody {
                size: Some(0),
                data: None,
            }),
            parts: Some(parts),
            ..Default::default()
        }
    }

    #[test]
    fn test_single_part_message() {
        let root = leaf("text/plain", "hello");
        assert_eq!(extract_plain_text(&root), Some("hello".to_string()));
    }

    #[test]
    fn test_alternative_inside_mixed() {
        let root = multipart(
            "multipart/mixed",
            vec![
                multipart(
                    "multipart/alternative",
                    vec![leaf("text/html", "<p>html</p>"), leaf("text/plain", "plain")],
                ),
                leaf("application/pdf", "%PDF"),
            ],
        );
        assert_eq!(extract_plain_text(&root), Some("plain".to_string()));
    }

    #[test]
    fn test_deeply_nested_plain_text() {
        let root = multipart(
            "multipart/mixed",
            vec![multipart(
                "multipart/related",
                vec![multipart(
                    "multipart/alternative",
                    vec![leaf("text/html", "<b>x</b>"), leaf("text/plain", "deep")],
                )],
            )],
        );
        assert_eq!(extract_plain_text(&root), Some("deep".to_string()));
    }

    #[test]
    fn test_first_match_in_pre_order_wins() {
        // The nested text/plain under the first child precedes the later sibling
        let root = multipart(
            "multipart/mixed",
            vec![
                multipart("multipart/alternative", vec![leaf("text/plain", "first")]),
                leaf("text/plain", "second"),
            ],
        );
        assert_eq!(extract_plain_text(&root), Some("first".to_string()));
    }

    #[test]
    fn test_mime_type_must_match_exactly() {
        let root = multipart(
            "multipart/mixed",
            vec![leaf("text/plain-ish", "nope"), leaf("text/html", "nope")],
        );
        assert_eq!(extract_plain_text(&root), None);
    }

    #[test]
    fn test_plain_part_without_inline_data_is_skipped() {
        let attachment = MessagePart {
            mime_type: Some("text/plain".to_string()),
            body: Some(MessageBody {
                size: Some(10),
                data: None,
            }),
            ..Default::default()
        };
        let root = multipart("multipart/mixed", vec![attachment, leaf("text/plain", "inline")]);
        assert_eq!(extract_plain_text(&root), Some("inline".to_string()));
    }

    #[test]
    fn test_normalize_message_subject() {
        let mut payload = leaf("text/plain", "body");
        payload.headers = Some(vec![Header {
            name: "subject".to_string(),
            value: "Deliverability check".to_string(),
        }]);
        let message = normalize_message(GmailMessage {
            id: "m1".to_string(),
            label_ids: Some(vec!["INBOX".to_string()]),
            snippet: "body".to_string(),
            payload: Some(payload),
        });

        assert_eq!(message.id.as_str(), "m1");
        assert_eq!(message.subject, "Deliverability check");
        assert_eq!(message.label_ids, vec!["INBOX".to_string()]);
    }

    #[test]
    fn test_decode_base64_body() {
        // "Hello, World!" in base64url
        let encoded = "SGVsbG8sIFdvcmxkIQ";
        assert_eq!(decode_base64_body(encoded), Some("Hello, World!".to_string()));
        // Standard alphabet with padding
        assert_eq!(decode_base64_body("SGk/Pz8="), Some("Hi???".to_string()));
    }

    #[test]
    fn test_non_utf8_body_keeps_ascii_text() {
        // "café spam-test-..." encoded as Latin-1
        let mut bytes = b"caf".to_vec();
        bytes.push(0xE9);
        bytes.extend_from_slice(b" spam-test-1a2b3c4d-1a2b-1a2b-1a2b-1a2b3c4d5e6f");
        let part = MessagePart {
            mime_type: Some("text/plain".to_string()),
            body: Some(MessageBody {
                size: Some(bytes.len() as u32),
                data: Some(BASE64_URL_SAFE_NO_PAD.encode(&bytes)),
            }),
            ..Default::default()
        };

        let text = extract_plain_text(&part).unwrap();
        assert!(text.starts_with("caf\u{FFFD} "));
        assert!(text.ends_with("spam-test-1a2b3c4d-1a2b-1a2b-1a2b-1a2b3c4d5e6f"));
    }
}
