use eventscope::normalize::{normalize_text, sanitize_speech, NO_INFO_TEXT};

#[test]
fn lowercases_and_collapses_whitespace() {
    assert_eq!(normalize_text("Front   Door\tOPEN"), "front door open");
}

#[test]
fn strips_disallowed_characters() {
    assert_eq!(normalize_text("Motion: detected! (zone-3)"), "motion detected zone3");
}

#[test]
fn keeps_spanish_diacritics() {
    assert_eq!(normalize_text("Visión nocturna activada"), "visión nocturna activada");
}

#[test]
fn empty_input_yields_empty_string() {
    assert_eq!(normalize_text(""), "");
    assert_eq!(normalize_text("   \t\n  "), "");
    assert_eq!(normalize_text("!!! ... ---"), "");
}

#[test]
fn stripped_punctuation_never_leaves_double_spaces() {
    // Stripping " - " must not leave two adjacent spaces behind.
    let out = normalize_text("door - open");
    assert_eq!(out, "door open");
    for input in ["a - b", "x .. y", "one, two,  three", "a\n- b\t- c"] {
        let out = normalize_text(input);
        assert!(!out.contains("  "), "double space in {out:?}");
        assert!(!out.starts_with(' ') && !out.ends_with(' '));
    }
}

#[test]
fn output_contains_only_permitted_characters() {
    let inputs = [
        "Hello, World! <b>bold</b> & 100%",
        "Sensor#7 @ 14:05 — ¡alerta!",
        "tab\tand\nnewline",
    ];
    for input in inputs {
        let out = normalize_text(input);
        for c in out.chars() {
            let permitted = c.is_alphanumeric() || c == '_' || c == ' ';
            assert!(permitted, "character {c:?} leaked into {out:?}");
        }
    }
}

#[test]
fn sanitize_strips_markup_artifacts() {
    let input = "**Alert** at <front door> & \"garage\"";
    assert_eq!(sanitize_speech(input), "Alert at front door  and  garage");
}

#[test]
fn sanitize_flattens_lists_and_newlines() {
    let input = "Summary:\n- first\n- second\nend";
    let out = sanitize_speech(input);
    assert!(!out.contains('\n'));
    assert!(out.contains("first"));
    assert!(out.contains("second"));
}

#[test]
fn sanitize_empty_returns_fixed_fallback() {
    assert_eq!(sanitize_speech(""), NO_INFO_TEXT);
    assert_eq!(sanitize_speech("\"\""), NO_INFO_TEXT);
}
