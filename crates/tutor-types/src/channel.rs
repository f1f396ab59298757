//! Conversation channel naming.
//!
//! A conversation is identified by its two user ids sorted ascending and
//! joined with `-`. The same string is the database query key and, with the
//! `private-conversation-` prefix, the pub/sub channel name. Publisher and
//! subscriber must agree on it byte for byte.

use thiserror::Error;

pub const CHANNEL_DELIMITER: char = '-';
pub const CONVERSATION_CHANNEL_PREFIX: &str = "private-conversation-";

/// Order-independent conversation id, e.g. `compute_channel_id(9, 5) == "5-9"`.
pub fn compute_channel_id(a: i64, b: i64) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{}{}{}", lo, CHANNEL_DELIMITER, hi)
}

/// Full channel name used for subscriptions.
pub fn channel_name(a: i64, b: i64) -> String {
    format!("{}{}", CONVERSATION_CHANNEL_PREFIX, compute_channel_id(a, b))
}

/// Parse a channel id (`"5-9"`). Only the canonical form is accepted:
/// plain decimal ids, the smaller one first, no self-pairs.
pub fn parse_channel_id(id: &str) -> Option<(i64, i64)> {
    let (lo, hi) = id.split_once(CHANNEL_DELIMITER)?;
    let lo = parse_id(lo)?;
    let hi = parse_id(hi)?;
    (lo < hi).then_some((lo, hi))
}

/// Parse a channel name (`"private-conversation-5-9"`).
pub fn parse_channel_name(name: &str) -> Option<(i64, i64)> {
    parse_channel_id(name.strip_prefix(CONVERSATION_CHANNEL_PREFIX)?)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelAccessError {
    #[error("malformed channel name")]
    Malformed,
    #[error("not a participant of this conversation")]
    NotParticipant,
}

/// Subscription check: `user_id` must be one of the two parties encoded in
/// `name`. Returns the parsed pair.
pub fn authorize(name: &str, user_id: i64) -> Result<(i64, i64), ChannelAccessError> {
    let (a, b) = parse_channel_name(name).ok_or(ChannelAccessError::Malformed)?;
    if a == user_id || b == user_id {
        Ok((a, b))
    } else {
        Err(ChannelAccessError::NotParticipant)
    }
}

fn parse_id(s: &str) -> Option<i64> {
    // Reject signs, whitespace and leading zeros so each pair has one spelling
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if s.len() > 1 && s.starts_with('0') {
        return None;
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_id_is_order_independent() {
        for (a, b) in [(5, 9), (1, 1000), (42, 7), (123_456_789, 2)] {
            assert_eq!(compute_channel_id(a, b), compute_channel_id(b, a));
        }
        assert_eq!(compute_channel_id(9, 5), "5-9");
    }

    #[test]
    fn sorts_numerically_not_lexically() {
        assert_eq!(compute_channel_id(10, 9), "9-10");
    }

    #[test]
    fn channel_name_roundtrips() {
        let name = channel_name(9, 5);
        assert_eq!(name, "private-conversation-5-9");
        assert_eq!(parse_channel_name(&name), Some((5, 9)));
    }

    #[test]
    fn rejects_non_canonical_names() {
        assert_eq!(parse_channel_name("private-conversation-9-5"), None);
        assert_eq!(parse_channel_name("private-conversation-5-5"), None);
        assert_eq!(parse_channel_name("private-conversation-05-9"), None);
        assert_eq!(parse_channel_name("private-conversation--5-9"), None);
        assert_eq!(parse_channel_name("private-conversation-5-9-1"), None);
        assert_eq!(parse_channel_name("presence-conversation-5-9"), None);
        assert_eq!(parse_channel_name("private-conversation-5"), None);
    }

    #[test]
    fn only_parties_are_authorized() {
        assert_eq!(authorize("private-conversation-5-9", 5), Ok((5, 9)));
        assert_eq!(authorize("private-conversation-5-9", 9), Ok((5, 9)));
        assert_eq!(
            authorize("private-conversation-5-9", 7),
            Err(ChannelAccessError::NotParticipant)
        );
        assert_eq!(authorize("garbage", 5), Err(ChannelAccessError::Malformed));
    }
}
