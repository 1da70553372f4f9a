//! Normalization for the two vote channels: emoji reactions on the review message and text
//! replies to it. Both end in the same `cast_vote` call on the service.

use serde::Serialize;

use super::domain::VoteDecision;
use super::votes::{VoteError, VoteReceipt};

const APPROVE_EMOJI: &[&str] = &["✅", "👍", "☑", "✔", "🟢"];
const DENY_EMOJI: &[&str] = &["❌", "👎", "⛔", "✖", "🔴"];

const APPROVE_WORDS: &[&str] = &["approve", "approved", "accept", "yes", "y", "+1", "lgtm"];
const DENY_WORDS: &[&str] = &["deny", "denied", "reject", "no", "n", "-1"];

/// Maps a reaction to a vote. Variation selectors and skin-tone modifiers are ignored.
pub fn parse_reaction(emoji: &str) -> Option<VoteDecision> {
    let base: String = emoji
        .trim()
        .chars()
        .filter(|c| !is_emoji_modifier(*c))
        .collect();

    if APPROVE_EMOJI.contains(&base.as_str()) {
        Some(VoteDecision::Approve)
    } else if DENY_EMOJI.contains(&base.as_str()) {
        Some(VoteDecision::Deny)
    } else {
        None
    }
}

/// Maps a reply to a vote from its first word, e.g. "Approve, great answers".
pub fn parse_reply(text: &str) -> Option<VoteDecision> {
    let first = text.split_whitespace().next()?;
    let word = first
        .trim_end_matches(|c: char| matches!(c, '.' | ',' | '!' | '?' | ':' | ';'))
        .to_lowercase();

    if APPROVE_WORDS.contains(&word.as_str()) {
        Some(VoteDecision::Approve)
    } else if DENY_WORDS.contains(&word.as_str()) {
        Some(VoteDecision::Deny)
    } else {
        parse_reaction(first)
    }
}

fn is_emoji_modifier(c: char) -> bool {
    matches!(c, '\u{fe0e}' | '\u{fe0f}' | '\u{1f3fb}'..='\u{1f3ff}')
}

/// What happened to a reaction or reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "detail")]
pub enum IngressOutcome {
    Counted(VoteReceipt),
    Ignored(IgnoreReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    UnrecognizedInput,
    UnlinkedMessage,
    AlreadyDecided,
    DuplicateVote,
    NotAuthorized,
}

impl IgnoreReason {
    /// `None` for errors that must reach the caller.
    pub(crate) fn from_vote_error(err: &VoteError) -> Option<Self> {
        match err {
            VoteError::NotFound(_) => None,
            VoteError::AlreadyDecided { .. } => Some(Self::AlreadyDecided),
            VoteError::DuplicateVote { .. } => Some(Self::DuplicateVote),
            VoteError::NotAuthorized { .. } => Some(Self::NotAuthorized),
        }
    }
}
