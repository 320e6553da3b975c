//! Message frame parsing.
//!
//! One inbound text message is one frame: `<target>:<payload>`. The first
//! `:` separates the target peer from the payload; the payload is carried
//! verbatim and may contain further delimiters.

use thiserror::Error;

/// Separator between target and payload.
pub const DELIMITER: char = ':';

/// Reasons a frame cannot be routed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame has no ':' delimiter")]
    MissingDelimiter,

    #[error("frame has an empty target")]
    EmptyTarget,
}

/// A parsed routing instruction borrowing from the inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub target: &'a str,
    pub payload: &'a str,
}

impl<'a> Frame<'a> {
    pub fn parse(message: &'a str) -> Result<Self, FrameError> {
        let (target, payload) = message
            .split_once(DELIMITER)
            .ok_or(FrameError::MissingDelimiter)?;
        if target.is_empty() {
            return Err(FrameError::EmptyTarget);
        }
        Ok(Self { target, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_first_delimiter() {
        let frame = Frame::parse("alice:hello").unwrap();
        assert_eq!(frame.target, "alice");
        assert_eq!(frame.payload, "hello");
    }

    #[test]
    fn payload_keeps_later_delimiters() {
        let frame = Frame::parse("alice:hi:there").unwrap();
        assert_eq!(frame.target, "alice");
        assert_eq!(frame.payload, "hi:there");
    }

    #[test]
    fn missing_delimiter_is_malformed() {
        assert_eq!(Frame::parse("noDelimiter"), Err(FrameError::MissingDelimiter));
        assert_eq!(Frame::parse(""), Err(FrameError::MissingDelimiter));
    }

    #[test]
    fn empty_target_is_malformed() {
        assert_eq!(Frame::parse(":payload"), Err(FrameError::EmptyTarget));
        assert_eq!(Frame::parse(":"), Err(FrameError::EmptyTarget));
    }

    #[test]
    fn empty_payload_is_allowed() {
        let frame = Frame::parse("bob:").unwrap();
        assert_eq!(frame.target, "bob");
        assert_eq!(frame.payload, "");
    }

    #[test]
    fn multibyte_text_is_preserved() {
        let frame = Frame::parse("zoë:héllo: wörld").unwrap();
        assert_eq!(frame.target, "zoë");
        assert_eq!(frame.payload, "héllo: wörld");
    }
}
