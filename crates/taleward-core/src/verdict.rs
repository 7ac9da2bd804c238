//! Yes/no verdict parsing for free-text model replies.
//!
//! Judge and compare models answer in prose. A reply is read as a verdict if
//! it opens with a verdict token or mentions one as a separate word later on;
//! anything else falls back to the caller's default.

/// Default verdict for a judge call whose reply is unreadable (let it pass).
pub const JUDGE_DEFAULT: bool = true;

/// Default verdict for a compare call whose reply is unreadable (keep the original).
pub const COMPARE_DEFAULT: bool = false;

/// Parse a free-text model reply as a boolean verdict.
///
/// The reply is trimmed and uppercased, then:
/// - starts with `YES`/`PASS`, or contains ` YES` ⇒ `true`
/// - starts with `NO`/`FAIL`, or contains ` NO` ⇒ `false`
/// - otherwise ⇒ `default`
///
/// Affirmative checks run first, so `"YES ... NO"` is `true`.
pub fn parse_verdict(reply: &str, default: bool) -> bool {
    let normalized = reply.trim().to_uppercase();

    if normalized.starts_with("YES") || normalized.starts_with("PASS") || normalized.contains(" YES")
    {
        return true;
    }

    if normalized.starts_with("NO") || normalized.starts_with("FAIL") || normalized.contains(" NO")
    {
        return false;
    }

    default
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_leading_tokens() {
        assert!(parse_verdict("YES", false));
        assert!(parse_verdict("  yes, looks fine", false));
        assert!(parse_verdict("PASS", false));
        assert!(!parse_verdict("NO", true));
        assert!(!parse_verdict("no.", true));
        assert!(!parse_verdict("Fail: too easy", true));
    }

    #[test]
    fn test_embedded_tokens() {
        assert!(parse_verdict("The answer is YES", false));
        assert!(!parse_verdict("I would say no", true));
    }

    #[test]
    fn test_default_on_ambiguity() {
        assert!(parse_verdict("maybe", JUDGE_DEFAULT));
        assert!(!parse_verdict("maybe", COMPARE_DEFAULT));
        assert!(parse_verdict("", true));
        assert!(!parse_verdict("", false));
    }

    #[test]
    fn test_affirmative_wins() {
        assert!(parse_verdict("YES but also NO", false));
    }

    #[test]
    fn test_substring_quirk_is_preserved() {
        // " NO" also matches words such as "NOT" and "NOTHING"
        assert!(!parse_verdict("There is NOTHING wrong", true));
    }

    proptest! {
        #[test]
        fn prop_commentary_after_verdict_is_tolerated(tail in "[a-z ,.]{0,40}") {
            let input = format!("YES{}", tail);
            prop_assert!(parse_verdict(&input, false));
            let input = format!("pass{}", tail);
            prop_assert!(parse_verdict(&input, false));
        }

        #[test]
        fn prop_tokenless_reply_returns_default(text in "[ac-eg-mq-xz ]{0,40}", default in any::<bool>()) {
            // no Y, N, P or F, so no verdict token can form
            prop_assert_eq!(parse_verdict(&text, default), default);
        }
    }
}
