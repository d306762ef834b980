use once_cell::sync::Lazy;
use regex::Regex;

static RE_DISALLOWED: Lazy<Regex> = Lazy::new(|| {
    // Word characters, the Spanish diacritics the event feed carries, and spaces.
    // Everything else (punctuation, symbols, markup) is dropped before comparison.
    Regex::new(r"[^\wáéíóúñ ]").unwrap()
});

static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

static RE_BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.*?)\*\*").unwrap());
static RE_ITALIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*(.*?)\*").unwrap());
static RE_NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n+").unwrap());

pub const NO_INFO_TEXT: &str = "No information available.";

/// Canonicalize free text for similarity comparison.
///
/// Lower-cases, strips characters outside the permitted set, collapses
/// whitespace runs to a single space and trims. Empty input yields an empty
/// string, never an error. Disallowed characters are stripped before
/// whitespace is collapsed, so removed punctuation cannot leave a double
/// space behind.
pub fn normalize_text(input: &str) -> String {
    let lower = input.to_lowercase();
    let stripped = RE_DISALLOWED.replace_all(&lower, "");
    let collapsed = RE_WS.replace_all(&stripped, " ");
    collapsed.trim().to_string()
}

/// Strip markup artifacts from model output before caching.
///
/// Downstream consumers are speech-rendering clients that read the text
/// aloud verbatim: bold/italic markers, angle brackets, ampersands, quotes,
/// list bullets and newlines all have to go.
pub fn sanitize_speech(text: &str) -> String {
    if text.is_empty() {
        return NO_INFO_TEXT.to_string();
    }
    let s = RE_BOLD.replace_all(text, "$1");
    let s = RE_ITALIC.replace_all(&s, "$1");
    let s = s
        .replace('<', "")
        .replace('>', "")
        .replace('&', " and ")
        .replace('"', "")
        .replace('\'', "")
        .replace("\n- ", ". ")
        .replace("\n* ", ". ")
        .replace("\n1. ", ". ");
    let s = RE_NEWLINES.replace_all(&s, " ");
    let out = s.trim().to_string();
    if out.is_empty() {
        NO_INFO_TEXT.to_string()
    } else {
        out
    }
}
