//! Speech markup for one utterance.
//!
//! Every word is followed by a numbered `<mark>` so the engine can report
//! per-word timepoints, and punctuation listed in the pause map attaches a
//! `<break>` to the word before it. The final token never carries a break;
//! inter-speaker silence is the timeline's job.

use std::collections::BTreeMap;
use std::fmt::Write as _;

const SSML_NAMESPACE: &str = "http://www.w3.org/2001/10/synthesis";

/// Build the markup document for `text`.
///
/// Returns an empty string for empty or whitespace-only text, which callers
/// treat as "skip this utterance".
pub fn build_markup(
    text: &str,
    language: &str,
    mark_prefix: &str,
    pauses: &BTreeMap<char, u32>,
) -> String {
    if text.trim().is_empty() {
        return String::new();
    }

    let tokens = tokenize(text, pauses);
    let last = tokens.len().saturating_sub(1);
    let mut pieces: Vec<String> = Vec::with_capacity(tokens.len());
    let mut word_index = 0usize;

    for (i, token) in tokens.iter().enumerate() {
        match pause_for(token, pauses) {
            Some(ms) => {
                let mut piece = escape(token);
                if i != last {
                    let _ = write!(piece, "<break time=\"{ms}ms\"/>");
                }
                match pieces.last_mut() {
                    Some(prev) => prev.push_str(&piece),
                    None => pieces.push(piece),
                }
            }
            None => {
                pieces.push(format!(
                    "{}<mark name=\"{}\"/>",
                    escape(token),
                    escape(&mark_name(mark_prefix, word_index))
                ));
                word_index += 1;
            }
        }
    }

    format!(
        "<speak version=\"1.1\" xmlns=\"{SSML_NAMESPACE}\" xml:lang=\"{}\">{}</speak>",
        escape(language),
        pieces.join(" ")
    )
}

/// Name of the word mark at `index`.
pub fn mark_name(prefix: &str, index: usize) -> String {
    format!("{prefix}_{index}")
}

/// Remove every tag and unescape entities, leaving the spoken text.
pub fn strip_markup(markup: &str) -> String {
    let mut text = String::with_capacity(markup.len());
    let mut in_tag = false;
    for ch in markup.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => text.push(ch),
            _ => {}
        }
    }
    unescape(text.trim())
}

/// Split on whitespace after isolating every pause-mapped character.
fn tokenize(text: &str, pauses: &BTreeMap<char, u32>) -> Vec<String> {
    let mut spaced = String::with_capacity(text.len() + 16);
    for ch in text.chars() {
        if pauses.contains_key(&ch) {
            spaced.push(' ');
            spaced.push(ch);
            spaced.push(' ');
        } else {
            spaced.push(ch);
        }
    }
    spaced.split_whitespace().map(str::to_string).collect()
}

fn pause_for(token: &str, pauses: &BTreeMap<char, u32>) -> Option<u32> {
    let mut chars = token.chars();
    match (chars.next(), chars.next()) {
        (Some(ch), None) => pauses.get(&ch).copied(),
        _ => None,
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::{build_markup, strip_markup};
    use std::collections::BTreeMap;

    fn pauses() -> BTreeMap<char, u32> {
        BTreeMap::from([(',', 300), ('.', 600), ('?', 600), ('!', 600)])
    }

    fn mark_indices(markup: &str, prefix: &str) -> Vec<usize> {
        let needle = format!("<mark name=\"{prefix}_");
        markup
            .match_indices(&needle)
            .map(|(pos, _)| {
                let rest = &markup[pos + needle.len()..];
                let end = rest.find('"').expect("closing quote");
                rest[..end].parse().expect("numeric index")
            })
            .collect()
    }

    fn normalize(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn empty_and_blank_text_yield_empty_markup() {
        assert_eq!(build_markup("", "ko-KR", "p", &pauses()), "");
        assert_eq!(build_markup("  \n\t ", "ko-KR", "p", &pauses()), "");
    }

    #[test]
    fn marks_each_word_and_pauses_after_punctuation() {
        let markup = build_markup("Hello, world.", "en-US", "intro_01_native", &pauses());
        assert_eq!(
            markup,
            "<speak version=\"1.1\" xmlns=\"http://www.w3.org/2001/10/synthesis\" xml:lang=\"en-US\">\
             Hello<mark name=\"intro_01_native_0\"/>,<break time=\"300ms\"/> \
             world<mark name=\"intro_01_native_1\"/>.</speak>"
        );
    }

    #[test]
    fn final_punctuation_gets_no_pause() {
        let markup = build_markup("Really?!", "en-US", "p", &pauses());
        assert!(markup.contains("Really<mark name=\"p_0\"/>?<break time=\"600ms\"/>!</speak>"));
        assert_eq!(markup.matches("<break").count(), 1);
    }

    #[test]
    fn unmapped_punctuation_stays_inside_the_word() {
        let markup = build_markup("don't stop;", "en-US", "p", &pauses());
        assert!(markup.contains("don&apos;t<mark name=\"p_0\"/>"));
        assert!(markup.contains("stop;<mark name=\"p_1\"/>"));
    }

    #[test]
    fn reserved_characters_are_escaped() {
        let markup = build_markup("A & B <C>", "en-US", "p", &pauses());
        assert!(markup.contains("&amp;<mark"));
        assert!(markup.contains("&lt;C&gt;<mark"));
        assert!(!markup.contains("<C>"));
    }

    #[test]
    fn leading_punctuation_is_kept_without_a_mark() {
        let markup = build_markup(", then", "en-US", "p", &pauses());
        assert_eq!(mark_indices(&markup, "p"), vec![0]);
        assert_eq!(strip_markup(&markup), ", then");
    }

    #[test]
    fn mark_indices_are_strictly_increasing_and_unique() {
        let maps = [
            pauses(),
            BTreeMap::new(),
            BTreeMap::from([('、', 200), ('。', 500)]),
        ];
        let texts = [
            "Hi",
            "One, two, three. Four!",
            "안녕하세요, 만나서 반갑습니다.",
            "你好、世界。再见",
            "a , , b ... c?",
        ];
        for map in &maps {
            for text in texts {
                let markup = build_markup(text, "xx", "scene", map);
                let indices = mark_indices(&markup, "scene");
                assert!(!indices.is_empty(), "{text:?} produced no marks");
                let expected: Vec<usize> = (0..indices.len()).collect();
                assert_eq!(indices, expected, "{text:?}");
            }
        }
    }

    #[test]
    fn stripping_markup_recovers_the_text() {
        let texts = [
            "Hello, world.",
            "Is it you? Yes! It is.",
            "Tom & Jerry say \"hi\".",
            "  spaced   out , text. ",
        ];
        for text in texts {
            let markup = build_markup(text, "en-US", "p", &pauses());
            let expected = normalize(text).replace(" ,", ",");
            assert_eq!(strip_markup(&markup), expected, "{text:?}");
        }
    }
}
