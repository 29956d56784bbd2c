// Filename resolution through the public API, including custom override
// patterns and the pattern validator

use mdc_core::identifier::validator;
use mdc_core::settings::ParserSettings;
use mdc_core::{normalize, IdentifierParser};
use test_case::test_case;

fn parser_with(patterns: &str, prefixes: &str) -> IdentifierParser {
    IdentifierParser::new(&ParserSettings {
        custom_number_patterns: patterns.to_string(),
        uncensored_prefixes: prefixes.to_string(),
    })
}

#[test_case("SNIS-829.mp4", "SNIS-829")]
#[test_case("FC2-PPV-1234567.mp4", "FC2-1234567")]
#[test_case("ssni984.mp4", "SSNI-984")]
#[test_case("/mnt/media/new/IPX-456-C.mkv", "IPX-456")]
#[test_case("HEYZO-1234.mp4", "HEYZO-1234")]
#[test_case("123456.mp4", "123456")]
fn test_resolves(filename: &str, expected: &str) {
    assert_eq!(
        IdentifierParser::default().resolve(filename).as_deref(),
        Some(expected)
    );
}

#[test]
fn test_unparsable_names_resolve_to_none() {
    let parser = IdentifierParser::default();
    for name in ["", ".mp4", "--.mkv", "/library/.nfo"] {
        assert_eq!(parser.resolve(name), None, "{name:?} should be unparsable");
    }
}

#[test]
fn test_custom_pattern_overrides_builtin_rules() {
    let parser = parser_with(r"(?i)studio-(\d{4})", "");
    assert_eq!(
        parser.resolve("studio-2021 SNIS-829.mp4").as_deref(),
        Some("2021")
    );
}

#[test]
fn test_custom_pattern_last_match_wins() {
    let parser = parser_with(r"([A-Z]{3}-\d{3})", "");
    assert_eq!(
        parser.resolve("ABC-111 ABC-222 ABC-333.mp4").as_deref(),
        Some("ABC-333")
    );
}

#[test]
fn test_configured_uncensored_prefixes() {
    let parser = parser_with("", "xyz, qq");
    let id = parser.identify("XYZ-100.mp4").unwrap();
    assert!(id.is_uncensored());
    assert!(!parser.is_uncensored("S2M-040"));
}

#[test]
fn test_normalize_is_stable_on_resolved_ids() {
    let parser = IdentifierParser::default();
    for name in ["snis-829.mp4", "fc2_ppv_1234567.mp4", "abcd1234.mp4"] {
        let id = parser.resolve(name).unwrap();
        assert_eq!(normalize(&id), id);
    }
}

#[test]
fn test_validator_agrees_with_parser() {
    let pattern = r"([A-Z]{3}-\d{3})";
    let filename = "ABC-111 ABC-222.mp4";
    let dry_run = validator::test_pattern(pattern, filename);
    assert!(dry_run.is_success());

    let parser = parser_with(pattern, "");
    assert_eq!(dry_run.extracted, parser.resolve(filename));
}

#[test]
fn test_builtin_examples_match_their_patterns() {
    for builtin in validator::builtin_patterns() {
        let example = builtin.example.split(", ").next().unwrap();
        let result = validator::test_pattern(builtin.pattern, example);
        assert!(
            result.is_success(),
            "{} does not match its example {example}",
            builtin.name
        );
    }
}

#[test]
fn test_validate_patterns_reports_first_failure() {
    let err = validator::validate_patterns(r"ok-\d+ (first [second").unwrap_err();
    assert!(err.to_string().contains("(first"));
}
