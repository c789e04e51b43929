use crate::error::{Error, Result};
use crate::model::IncomingMessage;

/// Decodes raw feed items into incoming messages.
///
/// Feeds interleave messages with control items (deletion notices, limit
/// notices, keep-alives); anything that does not carry a message id and user
/// is rejected and left for the caller to log and drop.
#[derive(Debug, Clone, Default)]
pub struct ItemParser;

impl ItemParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, raw: &str) -> Result<IncomingMessage> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::ItemParse("empty item".to_string()));
        }

        serde_json::from_str(trimmed).map_err(|e| Error::ItemParse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_message() {
        let parser = ItemParser::new();
        let incoming = parser
            .parse(r#"{"id": 1, "text": "hello", "user": {"id": 2, "screen_name": "a"}}"#)
            .unwrap();
        assert_eq!(incoming.id, 1);
        assert_eq!(incoming.user.id, 2);
        assert!(incoming.retweeted_status.is_none());
    }

    #[test]
    fn test_parse_retweet_with_embedded_original() {
        let parser = ItemParser::new();
        let raw = r#"{
            "id": 708168747324825601,
            "text": "RT @author: the original",
            "created_at": "Fri Mar 11 09:56:36 +0000 2016",
            "user": {"id": 3318421381, "screen_name": "reposter"},
            "retweeted_status": {
                "id": 708112223344556677,
                "text": "the original",
                "user": {"id": 42, "screen_name": "author"}
            }
        }"#;
        let incoming = parser.parse(raw).unwrap();
        assert_eq!(incoming.id, 708168747324825601);
        assert_eq!(incoming.user.id, 3318421381);
        assert_eq!(incoming.retweeted_status.as_ref().unwrap().id, 708112223344556677);
        assert!(incoming.created_at.is_some());
    }

    #[test]
    fn test_parse_rejects_empty_item() {
        let parser = ItemParser::new();
        assert!(matches!(parser.parse("  \n"), Err(Error::ItemParse(_))));
    }

    #[test]
    fn test_parse_rejects_control_item() {
        let parser = ItemParser::new();
        let raw = r#"{"delete": {"status": {"id": 1234}}}"#;
        assert!(matches!(parser.parse(raw), Err(Error::ItemParse(_))));
    }

    #[test]
    fn test_parse_rejects_malformed_json() {
        let parser = ItemParser::new();
        assert!(matches!(parser.parse("{not json"), Err(Error::ItemParse(_))));
    }
}
