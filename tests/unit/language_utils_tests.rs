/*!
 * Tests for language utility functions
 */

use panelglot::language_utils::{get_language_name, language_codes_match, primary_subtag, validate_language_tag};

#[test]
fn test_validateLanguageTag_withCommonTargets_shouldAccept() {
    for tag in ["en", "fr", "ja", "ko", "zh-CN", "zh-TW", "pt-BR", "spa", "fre"] {
        assert!(validate_language_tag(tag).is_ok(), "{} should be valid", tag);
    }
}

#[test]
fn test_validateLanguageTag_withMalformedTags_shouldReject() {
    for tag in ["", "-", "zh-", "q!", "123"] {
        assert!(validate_language_tag(tag).is_err(), "{} should be invalid", tag);
    }
}

#[test]
fn test_primarySubtag_shouldLowercaseAndStripRegion() {
    assert_eq!(primary_subtag("ZH-cn"), "zh");
    assert_eq!(primary_subtag(" pt_BR "), "pt");
    assert_eq!(primary_subtag("en"), "en");
}

#[test]
fn test_languageCodesMatch_withDifferentForms_shouldMatch() {
    assert!(language_codes_match("en", "eng"));
    assert!(language_codes_match("ger", "de"));
    assert!(!language_codes_match("en", "fr"));
    assert!(!language_codes_match("en", "not-a-language"));
}

#[test]
fn test_getLanguageName_withUnknownTag_shouldFail() {
    assert_eq!(get_language_name("fr").unwrap(), "French");
    assert!(get_language_name("zz").is_err());
}
