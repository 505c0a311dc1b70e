//! Quote locator cascade and critique enrichment

mod common;

use common::{offset_of, SAMPLE_CHAPTER};
use folio_core::config::LocatorSettings;
use folio_core::locator::{ExternalAnalysis, FindingCategory, Severity};
use folio_core::{enrich_analysis_with_positions, extract_clickable_issues, find_quote_range, QuoteLocator, TextRange};
use proptest::prelude::*;

#[test]
fn test_exact_match() {
    assert_eq!(
        find_quote_range("Say Hello world now", "Hello world"),
        Some(TextRange::new(4, 15))
    );
}

#[test]
fn test_empty_inputs() {
    assert_eq!(find_quote_range("", "anything"), None);
    assert_eq!(find_quote_range(SAMPLE_CHAPTER, ""), None);
    assert_eq!(find_quote_range(SAMPLE_CHAPTER, "   \n\t"), None);
}

#[test]
fn test_trimmed_quote() {
    let start = offset_of("Half now,");
    assert_eq!(
        find_quote_range(SAMPLE_CHAPTER, "  Half now,\n"),
        Some(TextRange::new(start, start + "Half now,".len()))
    );
}

#[test]
fn test_doubled_whitespace_locates_single_spaced_text() {
    let target = "Tobin studied the horizon.";
    let start = offset_of(target);
    assert_eq!(
        find_quote_range(SAMPLE_CHAPTER, "Tobin  studied   the\nhorizon."),
        Some(TextRange::new(start, start + target.len()))
    );
}

#[test]
fn test_truncated_tail_matches_on_prefix() {
    let start = offset_of("The lighthouse had been dark");
    let range = find_quote_range(
        SAMPLE_CHAPTER,
        "The lighthouse had been dark for a decade, and nobody dared sail there",
    )
    .unwrap();
    assert_eq!(range.start, start);
}

#[test]
fn test_approximate_match_with_typos() {
    let start = offset_of("the harbormaster");
    let range = find_quote_range(SAMPLE_CHAPTER, "teh harbormaster").unwrap();
    assert!(range.start + 2 >= start && range.start <= start + 2, "{range:?}");
    assert!(range.end <= start + "the harbormaster".len() + 2);
}

#[test]
fn test_absent_random_string_returns_none() {
    assert_eq!(
        find_quote_range(SAMPLE_CHAPTER, "qzxv wplk mnrt yhgf bcdz kjhl xwqp vbnmzz"),
        None
    );
}

#[test]
fn test_pattern_ceiling_falls_through_to_none() {
    let locator = QuoteLocator::with_settings(LocatorSettings {
        max_pattern_chars: 8,
        ..LocatorSettings::default()
    });
    // exact steps still work
    assert!(locator.find(SAMPLE_CHAPTER, "harbormaster's shed").is_some());
    // approximate steps refuse the pattern instead of failing loudly
    assert_eq!(locator.find(SAMPLE_CHAPTER, "teh harbormaster"), None);
}

fn critique() -> ExternalAnalysis {
    serde_json::from_str(
        r#"{
            "summary": "A tense crossing.",
            "plot": [
                {"issue": "The key is found too easily", "quote": "She finally found the silver key", "severity": "high"},
                {"issue": "Invented quote", "quote": "Zeppelins bombarded quixotic jazz clubs"}
            ],
            "prose": [
                {"issue": "Passive construction", "quote": "The letter was  written by her mother", "suggestion": "Her mother wrote the letter"}
            ],
            "dialogue": [
                {"issue": "No quote given"}
            ]
        }"#,
    )
    .expect("valid critique json")
}

#[test]
fn test_enrichment_keeps_unlocatable_findings() {
    let analysis = critique();
    let enriched = enrich_analysis_with_positions(&analysis, SAMPLE_CHAPTER);

    assert_eq!(enriched.plot.len(), 2);
    assert_eq!(enriched.plot[0].start_index, Some(offset_of("She finally found")));
    assert!(enriched.plot[0].end_index.is_some());
    assert_eq!(enriched.plot[1].start_index, None);
    assert_eq!(enriched.plot[1].issue, "Invented quote");
    assert_eq!(enriched.prose[0].start_index, Some(offset_of("The letter was written")));
    assert_eq!(enriched.dialogue[0].start_index, None);

    // the input is untouched
    assert!(analysis.plot[0].start_index.is_none());
}

#[test]
fn test_clickable_issues_are_flattened_and_tagged() {
    let issues = extract_clickable_issues(&critique(), SAMPLE_CHAPTER);
    assert_eq!(issues.len(), 2);

    assert_eq!(issues[0].category, FindingCategory::Plot);
    assert_eq!(issues[0].severity, Severity::High);
    assert_eq!(
        &SAMPLE_CHAPTER[issues[0].range.start..issues[0].range.end],
        "She finally found the silver key"
    );

    assert_eq!(issues[1].category, FindingCategory::Prose);
    assert_eq!(issues[1].severity, Severity::Medium);
    assert_eq!(issues[1].suggestion.as_deref(), Some("Her mother wrote the letter"));
}

proptest! {
    #[test]
    fn prop_locator_never_panics_and_stays_in_bounds(text in "\\PC{0,200}", quote in "\\PC{0,40}") {
        if let Some(range) = find_quote_range(&text, &quote) {
            prop_assert!(range.start < range.end);
            prop_assert!(range.end <= text.len());
            prop_assert!(text.is_char_boundary(range.start));
            prop_assert!(text.is_char_boundary(range.end));
        }
    }

    #[test]
    fn prop_present_substring_is_found(text in "[a-z ]{30,120}", start in 0usize..20, len in 5usize..10) {
        let quote = &text[start..start + len];
        prop_assume!(!quote.trim().is_empty());
        let range = find_quote_range(&text, quote);
        prop_assert!(range.is_some());
    }
}
