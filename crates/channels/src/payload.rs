//! Graph Send API message bodies built from typed actions.

use messenger_core::rule::{ActionKind, Button, ButtonKind, Card, CardFormat};
use serde_json::{json, Value};

use crate::addressing::{MessagingType, RecipientDescriptor};

/// A message ready to hand to a [`crate::PlatformSender`]: the `message`
/// object plus how it may be delivered.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub messaging_type: MessagingType,
    pub message: Value,
}

impl OutboundMessage {
    /// Full request body for `POST /{page-id}/messages`.
    pub fn request_body(&self, recipient: &RecipientDescriptor) -> Value {
        let mut body = json!({
            "recipient": recipient.to_json(),
            "messaging_type": self.messaging_type.as_str(),
            "message": self.message,
        });
        if let Some(tag) = self.messaging_type.tag() {
            body["tag"] = Value::String(tag.as_str().to_string());
        }
        body
    }
}

/// Builds `message` objects. Jump buttons get the configured postback
/// prefix so the inbound side can recognise them.
#[derive(Debug, Clone)]
pub struct PayloadBuilder {
    jump_prefix: String,
}

impl Default for PayloadBuilder {
    fn default() -> Self {
        Self::new("JUMP_TO_RULE:")
    }
}

impl PayloadBuilder {
    pub fn new(jump_prefix: impl Into<String>) -> Self {
        Self {
            jump_prefix: jump_prefix.into(),
        }
    }

    pub fn build(&self, action: &ActionKind, messaging_type: MessagingType) -> OutboundMessage {
        OutboundMessage {
            messaging_type,
            message: self.message(action),
        }
    }

    pub fn message(&self, action: &ActionKind) -> Value {
        match action {
            ActionKind::Text { text, buttons } if buttons.is_empty() => json!({ "text": text }),
            ActionKind::Text { text, buttons } => json!({
                "attachment": {
                    "type": "template",
                    "payload": {
                        "template_type": "button",
                        "text": text,
                        "buttons": self.buttons(buttons),
                    }
                }
            }),
            ActionKind::Card(card) => self.card(card),
            ActionKind::Audio { url } => media("audio", url),
            ActionKind::Image { url } => media("image", url),
        }
    }

    fn card(&self, card: &Card) -> Value {
        // Portrait is not a Graph aspect ratio; portrait cards ship the
        // cropped rendition as a square.
        let (ratio, image) = match card.format {
            CardFormat::Landscape => ("horizontal", card.image_url.as_str()),
            CardFormat::Square | CardFormat::Portrait => (
                "square",
                card.cropped_image_url.as_deref().unwrap_or(&card.image_url),
            ),
        };
        let mut element = json!({
            "title": card.title,
            "image_url": image,
        });
        if let Some(subtitle) = &card.subtitle {
            element["subtitle"] = Value::String(subtitle.clone());
        }
        if !card.buttons.is_empty() {
            element["buttons"] = self.buttons(&card.buttons);
        }
        json!({
            "attachment": {
                "type": "template",
                "payload": {
                    "template_type": "generic",
                    "image_aspect_ratio": ratio,
                    "elements": [element],
                }
            }
        })
    }

    fn buttons(&self, buttons: &[Button]) -> Value {
        Value::Array(
            buttons
                .iter()
                .map(|b| match b.kind {
                    ButtonKind::OpenUrl => json!({
                        "type": "web_url",
                        "url": b.value,
                        "title": b.label,
                    }),
                    ButtonKind::Reply => json!({
                        "type": "postback",
                        "title": b.label,
                        "payload": b.value,
                    }),
                    ButtonKind::JumpToFlow => json!({
                        "type": "postback",
                        "title": b.label,
                        "payload": format!("{}{}", self.jump_prefix, b.value),
                    }),
                })
                .collect(),
        )
    }
}

fn media(kind: &str, url: &str) -> Value {
    json!({
        "attachment": {
            "type": kind,
            "payload": { "url": url, "is_reusable": true }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use messenger_core::types::MessageTag;

    fn button(kind: ButtonKind, value: &str) -> Button {
        Button {
            label: "Go".into(),
            kind,
            value: value.into(),
        }
    }

    fn card(format: CardFormat, cropped: Option<&str>) -> Card {
        Card {
            image_url: "https://cdn/full.jpg".into(),
            title: "Menu".into(),
            subtitle: Some("Today".into()),
            buttons: vec![],
            format,
            cropped_image_url: cropped.map(str::to_string),
        }
    }

    #[test]
    fn test_plain_text() {
        let msg = PayloadBuilder::default().message(&ActionKind::Text {
            text: "hello".into(),
            buttons: vec![],
        });
        assert_eq!(msg, json!({"text": "hello"}));
    }

    #[test]
    fn test_text_with_buttons_becomes_button_template() {
        let msg = PayloadBuilder::default().message(&ActionKind::Text {
            text: "pick".into(),
            buttons: vec![
                button(ButtonKind::Reply, "YES"),
                button(ButtonKind::OpenUrl, "https://shop"),
                button(ButtonKind::JumpToFlow, "rule-7"),
            ],
        });
        let payload = &msg["attachment"]["payload"];
        assert_eq!(payload["template_type"], "button");
        assert_eq!(payload["buttons"][0]["payload"], "YES");
        assert_eq!(payload["buttons"][1]["type"], "web_url");
        assert_eq!(payload["buttons"][2]["payload"], "JUMP_TO_RULE:rule-7");
    }

    #[test]
    fn test_card_aspect_ratios() {
        let builder = PayloadBuilder::default();
        let landscape = builder.message(&ActionKind::Card(card(CardFormat::Landscape, Some("https://cdn/crop.jpg"))));
        let payload = &landscape["attachment"]["payload"];
        assert_eq!(payload["template_type"], "generic");
        assert_eq!(payload["image_aspect_ratio"], "horizontal");
        assert_eq!(payload["elements"][0]["image_url"], "https://cdn/full.jpg");
        assert!(payload["elements"][0].get("buttons").is_none());

        let portrait = builder.message(&ActionKind::Card(card(CardFormat::Portrait, Some("https://cdn/crop.jpg"))));
        assert_eq!(portrait["attachment"]["payload"]["image_aspect_ratio"], "square");
        assert_eq!(portrait["attachment"]["payload"]["elements"][0]["image_url"], "https://cdn/crop.jpg");

        let uncropped = builder.message(&ActionKind::Card(card(CardFormat::Portrait, None)));
        assert_eq!(uncropped["attachment"]["payload"]["elements"][0]["image_url"], "https://cdn/full.jpg");
    }

    #[test]
    fn test_media_is_reusable() {
        let msg = PayloadBuilder::default().message(&ActionKind::Audio {
            url: "https://cdn/a.mp3".into(),
        });
        assert_eq!(msg["attachment"]["type"], "audio");
        assert_eq!(msg["attachment"]["payload"]["is_reusable"], true);
    }

    #[test]
    fn test_request_body_tagging_and_comment_addressing() {
        let builder = PayloadBuilder::default();
        let action = ActionKind::Text {
            text: "update".into(),
            buttons: vec![],
        };
        let tagged = builder
            .build(&action, MessagingType::MessageTag(MessageTag::AccountUpdate))
            .request_body(&RecipientDescriptor::DirectUser("u1".into()));
        assert_eq!(tagged["messaging_type"], "MESSAGE_TAG");
        assert_eq!(tagged["tag"], "ACCOUNT_UPDATE");
        assert_eq!(tagged["recipient"]["id"], "u1");

        let reply = builder
            .build(&action, MessagingType::Response)
            .request_body(&RecipientDescriptor::ReplyToComment("c1".into()));
        assert_eq!(reply["messaging_type"], "RESPONSE");
        assert!(reply.get("tag").is_none());
        assert_eq!(reply["recipient"]["comment_id"], "c1");
    }
}
