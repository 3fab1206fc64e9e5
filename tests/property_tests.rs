//! Property-based tests using proptest
//!
//! Mathematical invariants of the core modules:
//! - `normalize` is idempotent and non-expanding
//! - `TokenEstimator::estimate` is monotonic non-decreasing
//! - needle fixtures place the payload exactly once at the requested offset
//! - `evaluate` is insensitive to payload casing

use proptest::prelude::*;

use sondear::corpus::normalize;
use sondear::estimate::TokenEstimator;
use sondear::needle::{self, NEEDLE_DELIMITER};

proptest! {
    /// normalize(normalize(x)) == normalize(x) for arbitrary input
    #[test]
    fn prop_normalize_idempotent(raw in any::<String>()) {
        let once = normalize(&raw);
        let twice = normalize(&once);
        prop_assert_eq!(once, twice);
    }

    /// normalize never grows its input
    #[test]
    fn prop_normalize_non_expanding(raw in any::<String>()) {
        prop_assert!(normalize(&raw).len() <= raw.len());
    }

    /// Idempotence holds with sentinel markers embedded anywhere
    #[test]
    fn prop_normalize_idempotent_with_sentinels(
        before in ".{0,40}",
        body in ".{0,80}",
        after in ".{0,40}",
    ) {
        let raw = format!(
            "{before}*** START OF THE EBOOK ***\n{body}\n*** END OF THE EBOOK ***{after}"
        );
        let once = normalize(&raw);
        prop_assert_eq!(normalize(&once), once.clone());
        prop_assert!(once.len() <= raw.len());
    }

    /// Appending text never decreases the estimate
    #[test]
    fn prop_estimate_monotonic(base in any::<String>(), extension in any::<String>()) {
        let est = TokenEstimator::new();
        let extended = format!("{base}{extension}");
        prop_assert!(est.estimate(&base) <= est.estimate(&extended));
    }

    /// Fixture places the payload exactly once at floor(len * fraction)
    #[test]
    fn prop_build_places_payload_once(
        haystack in "[a-z ]{0,500}",
        fraction in 0.0f64..=1.0f64,
    ) {
        let phrase = "The secret code is: RAINBOW-UNICORN-42";
        let case = needle::build(&haystack, phrase, fraction).expect("valid fraction");

        let expected = (haystack.len() as f64 * fraction).floor() as usize;
        prop_assert_eq!(case.offset(), expected);
        prop_assert_eq!(case.fixture().matches("RAINBOW-UNICORN-42").count(), 1);
        prop_assert_eq!(
            case.fixture().len(),
            haystack.len() + phrase.len() + 2 * NEEDLE_DELIMITER.len()
        );
        // The needle survives insertion as one contiguous block
        prop_assert!(case.fixture().contains(phrase));
    }

    /// evaluate accepts the payload in any casing, embedded anywhere
    #[test]
    fn prop_evaluate_case_insensitive(
        prefix in "[a-z .]{0,60}",
        suffix in "[a-z .]{0,60}",
        uppercase in any::<bool>(),
    ) {
        let phrase = "The secret code is: RAINBOW-UNICORN-42";
        let payload = if uppercase {
            "RAINBOW-UNICORN-42".to_string()
        } else {
            "rainbow-unicorn-42".to_string()
        };
        let response = format!("{prefix}{payload}{suffix}");
        prop_assert!(needle::evaluate(&response, phrase));
    }

    /// evaluate rejects responses without the payload
    #[test]
    fn prop_evaluate_rejects_payload_free_text(response in "[a-z .]{0,120}") {
        let phrase = "The secret code is: RAINBOW-UNICORN-42";
        prop_assert!(!needle::evaluate(&response, phrase));
    }
}

#[test]
fn test_normalize_gutenberg_shape_idempotent() {
    let raw = "header matter\n*** START OF THE PROJECT GUTENBERG EBOOK X ***\n\
        Call me Ishmael.\n*** END OF THE PROJECT GUTENBERG EBOOK X ***\nfooter";
    let once = normalize(raw);
    assert_eq!(once, "Call me Ishmael.");
    assert_eq!(normalize(&once), once);
}
