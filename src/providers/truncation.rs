//! Deterministic truncation check.
//!
//! A response is truncated when it reached the token limit AND its text
//! does not end on terminal punctuation. "Reached the limit" means any of:
//!
//! - the backend reported finish reason `length`
//! - the backend reported `completion_tokens >= max_tokens`
//! - no token count was reported and `ceil(chars / 4) >= max_tokens`
//!
//! A response that hits the limit but happens to end a sentence is kept:
//! the answer is complete even if the budget was spent exactly.

use crate::types::{FinishReason, ProviderFailure, ProviderResponse};

/// Characters accepted as the end of a complete answer.
const TERMINAL: &[char] = &[
    '.', '!', '?', '…', '"', '\'', ')', ']', '”', '’', '。', '！', '？',
];

/// Whether the trimmed text ends on terminal punctuation.
pub fn ends_cleanly(text: &str) -> bool {
    text.trim_end()
        .chars()
        .next_back()
        .is_some_and(|c| TERMINAL.contains(&c))
}

/// Rough token count used when the backend reports none.
pub fn estimate_tokens(text: &str) -> u32 {
    let chars = text.chars().count();
    u32::try_from(chars.div_ceil(4)).unwrap_or(u32::MAX)
}

/// Whether the response used up its token budget.
pub fn hit_token_limit(response: &ProviderResponse, max_tokens: u32) -> bool {
    if response.finish_reason == FinishReason::Length {
        return true;
    }
    match response.usage {
        Some(usage) => usage.completion_tokens >= max_tokens,
        None => estimate_tokens(&response.text) >= max_tokens,
    }
}

pub fn is_truncated(response: &ProviderResponse, max_tokens: u32) -> bool {
    hit_token_limit(response, max_tokens) && !ends_cleanly(&response.text)
}

/// Pass the response through, or classify it as `Truncated`.
pub fn check(
    response: ProviderResponse,
    max_tokens: u32,
) -> std::result::Result<ProviderResponse, ProviderFailure> {
    if is_truncated(&response, max_tokens) {
        let tail: String = {
            let chars: Vec<char> = response.text.trim_end().chars().collect();
            chars[chars.len().saturating_sub(24)..].iter().collect()
        };
        return Err(ProviderFailure::truncated(format!(
            "response reached max_tokens={max_tokens} and ends mid-sentence (\"…{tail}\")"
        )));
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_punctuation() {
        assert!(ends_cleanly("Done."));
        assert!(ends_cleanly("Really?  \n"));
        assert!(ends_cleanly("He said \"yes.\""));
        assert!(ends_cleanly("(see above)"));
        assert!(ends_cleanly("完了。"));
        assert!(!ends_cleanly("and then the"));
        assert!(!ends_cleanly("item one,"));
        assert!(!ends_cleanly(""));
    }

    #[test]
    fn estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn exact_limit_without_punctuation_is_truncated() {
        let response = ProviderResponse::new("the compressor relay is").completion_tokens(5);
        assert!(is_truncated(&response, 5));
        let failure = check(response, 5).unwrap_err();
        assert_eq!(failure.kind, crate::types::FailureKind::Truncated);
    }

    #[test]
    fn exact_limit_with_punctuation_is_kept() {
        let response = ProviderResponse::new("Check the breaker.").completion_tokens(5);
        assert!(!is_truncated(&response, 5));
    }

    #[test]
    fn under_limit_is_never_truncated() {
        let response = ProviderResponse::new("and then").completion_tokens(2);
        assert!(!is_truncated(&response, 5));
    }

    #[test]
    fn finish_reason_length_counts_as_limit() {
        let response = ProviderResponse::new("and then").finish_reason(FinishReason::Length);
        assert!(is_truncated(&response, 1000));
    }

    #[test]
    fn estimate_used_without_usage() {
        // 20 chars -> 5 tokens
        let response = ProviderResponse::new("abcd abcd abcd abcd ");
        assert!(is_truncated(&response, 5));
        assert!(!is_truncated(&response, 6));
    }
}
