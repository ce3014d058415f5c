//! Paywall detection heuristic.
//!
//! Short pages are usually an interstitial, so a single signal phrase is
//! enough. Long pages must show at least two distinct signals near the
//! top; a single "subscribe" deep in a footer is not a paywall.

const SIGNAL_PHRASES: &[&str] = &[
    "subscribe to continue",
    "subscribe to read",
    "subscription required",
    "sign in to read",
    "sign in to continue",
    "log in to continue",
    "create a free account",
    "register to continue",
    "this article is for subscribers",
    "subscribers only",
    "already a subscriber",
    "to continue reading",
    "unlock this article",
    "premium content",
    "free articles left",
];

const SHORT_CONTENT_CHARS: usize = 500;
const SCAN_WINDOW_CHARS: usize = 2_000;

pub fn looks_paywalled(content: &str) -> bool {
    if content.is_empty() {
        return false;
    }
    let lower = content.to_lowercase();

    if lower.chars().count() < SHORT_CONTENT_CHARS {
        return SIGNAL_PHRASES.iter().any(|p| lower.contains(p));
    }

    let head: String = lower.chars().take(SCAN_WINDOW_CHARS).collect();
    SIGNAL_PHRASES.iter().filter(|p| head.contains(*p)).count() >= 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_content_is_not_paywalled() {
        assert!(!looks_paywalled(""));
    }

    #[test]
    fn test_short_content_single_signal_triggers() {
        assert!(looks_paywalled("Subscribe to continue reading this story."));
    }

    #[test]
    fn test_short_content_without_signal_passes() {
        assert!(!looks_paywalled("A brief page about gardening."));
    }

    #[test]
    fn test_long_content_single_signal_passes() {
        let mut content = "subscribe to continue ".to_string();
        content.push_str(&"ordinary article text ".repeat(100));
        assert!(!looks_paywalled(&content));
    }

    #[test]
    fn test_long_content_two_signals_in_window_triggers() {
        let mut content =
            "Sign in to read the full story. Already a subscriber? Log in here. ".to_string();
        content.push_str(&"ordinary article text ".repeat(100));
        assert!(looks_paywalled(&content));
    }

    #[test]
    fn test_long_content_signals_outside_window_pass() {
        let mut content = "ordinary article text ".repeat(150);
        content.push_str("subscribe to continue. sign in to read.");
        assert!(!looks_paywalled(&content));
    }
}
