//! Reduce the raw contents of a lob file to the operative bill text.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    // Legislative Counsel's digest ends at the enacting clause.
    static ref ENACTING_CLAUSE: Regex = Regex::new(
        r"(?i)the\s+people\s+of\s+the\s+state\s+(?:of\s+california\s+)?do\s+enact\s+as\s+follows\s*:"
    )
    .expect("valid regex");
    static ref CAML_TAG: Regex = Regex::new(r"(?is)</?caml[^>]*>").expect("valid regex");
    static ref INSERTED: Regex = Regex::new(r"(?is)<em(?:\s[^>]*)?>(.*?)</em>").expect("valid regex");
    static ref DELETED: Regex = Regex::new(r"(?is)<strike(?:\s[^>]*)?>.*?</strike>").expect("valid regex");
    static ref PARAGRAPH: Regex = Regex::new(r"(?is)<p(?:\s[^>]*)?>(.*?)</p>").expect("valid regex");
    static ref EN_SPACE: Regex = Regex::new(r#"(?i)<span\s+class=["']?EnSpace["']?\s*/>"#).expect("valid regex");
    static ref ANY_TAG: Regex = Regex::new(r"(?s)</?[A-Za-z!?][^>]*>").expect("valid regex");
    static ref ENTITY: Regex = Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[A-Za-z]+);").expect("valid regex");
}

/// Strip the digest preamble, markup, entities and control characters.
///
/// Deleted (`<strike>`) text is dropped with its content; inserted (`<em>`) and
/// paragraph text keeps its content and gains a surrounding space so words on
/// either side of a tag do not run together.
pub fn normalize(raw: &str) -> String {
    let body = strip_preamble(raw);
    let text = strip_markup(body);
    let text = decode_entities(&text);
    text.nfkc()
        .map(|c| if c < ' ' { ' ' } else { c })
        .collect()
}

/// Everything after the enacting clause, or the whole text when it is absent.
pub fn strip_preamble(raw: &str) -> &str {
    match ENACTING_CLAUSE.find(raw) {
        Some(m) => &raw[m.end()..],
        None => raw,
    }
}

fn strip_markup(text: &str) -> String {
    let text = CAML_TAG.replace_all(text, "");
    let text = INSERTED.replace_all(&text, " $1 ");
    let text = DELETED.replace_all(&text, "");
    let text = PARAGRAPH.replace_all(&text, " $1 ");
    let text = EN_SPACE.replace_all(&text, "");
    ANY_TAG.replace_all(&text, " ").into_owned()
}

fn decode_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |caps: &Captures| {
            let name = &caps[1];
            decode_entity(name).map_or_else(|| caps[0].to_string(), |c| c.to_string())
        })
        .into_owned()
}

fn decode_entity(name: &str) -> Option<char> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse().ok()?,
        };
        return char::from_u32(code);
    }
    match name.to_ascii_lowercase().as_str() {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        "sect" => Some('§'),
        "mdash" => Some('—'),
        "ndash" => Some('–'),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_through_enacting_clause() {
        let raw = "DIGEST stuff. The people of the State of California do enact as follows:\nSECTION 1.";
        assert_eq!(normalize(raw), " SECTION 1.");
    }

    #[test]
    fn enacting_clause_without_state_name() {
        let raw = "preamble THE PEOPLE OF THE STATE DO ENACT AS FOLLOWS: body";
        assert_eq!(normalize(raw), " body");
    }

    #[test]
    fn missing_clause_passes_text_through() {
        assert_eq!(normalize("no clause here"), "no clause here");
    }

    #[test]
    fn deleted_text_is_dropped_and_inserted_text_spaced() {
        let out = normalize("keep<strike>old words</strike><em>new</em>text");
        assert_eq!(out, "keep new text");
        assert!(!out.contains("old"));
    }

    #[test]
    fn deletion_may_span_lines() {
        let out = normalize("a <strike>gone\r\nstill gone</strike> b");
        assert_eq!(out, "a  b");
    }

    #[test]
    fn caml_paragraph_and_enspace_markup_removed() {
        let raw = r#"<caml:Content><p>Sec.<span class="EnSpace"/>2.</p><p>Next</p></caml:Content>"#;
        let tokens = crate::tokenizer::tokenize(&normalize(raw));
        assert_eq!(tokens, vec!["Sec", "2", "Next"]);
    }

    #[test]
    fn residual_tags_become_spaces() {
        assert_eq!(normalize("one<br/>two"), "one two");
    }

    #[test]
    fn entities_decode_and_nbsp_folds() {
        assert_eq!(normalize("A&amp;B&nbsp;C&#167;&unknown;"), "A&B C§&unknown;");
    }

    #[test]
    fn control_characters_become_spaces() {
        assert_eq!(normalize("a\tb\r\nc"), "a b  c");
    }
}
