use crate::models::Intent;

/// Checked in order; the first intent with a matching term wins.
const ROUTES: &[(Intent, &[&str])] = &[
    (
        Intent::FixError,
        &["fix", "error", "exception", "crash", "broken", "bug", "fails"],
    ),
    (
        Intent::Debug,
        &["debug", "breakpoint", "step through", "trace", "inspect"],
    ),
    (
        Intent::SetupSoftware,
        &["install", "set up", "setup", "configure", "download"],
    ),
    (
        Intent::WriteCode,
        &["write", "implement", "create function", "code", "script", "refactor"],
    ),
];

/// Lower-cased words padded with single spaces, so terms match whole words
/// and multi-word terms match across arbitrary whitespace or punctuation.
fn word_stream(text: &str) -> String {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect();
    format!(" {} ", words.join(" "))
}

pub fn route_by_keywords(text: &str) -> Intent {
    let stream = word_stream(text);
    ROUTES
        .iter()
        .find(|(_, terms)| {
            terms
                .iter()
                .any(|term| stream.contains(&format!(" {term} ")))
        })
        .map(|(intent, _)| *intent)
        .unwrap_or(Intent::General)
}

/// Reads an intent name out of a free-form classifier reply.
pub fn parse_intent_reply(reply: &str) -> Option<Intent> {
    let stream = word_stream(&reply.replace('_', " "));
    Intent::ALL.into_iter().find(|intent| {
        let name = intent.as_str().replace('_', " ");
        stream.contains(&format!(" {name} "))
    })
}
