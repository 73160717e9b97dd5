use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use regex::Regex;

use crate::error::{CoreError, CoreResult};
use crate::model::Topic;

fn compile(pattern: &str) -> CoreResult<Regex> {
    Regex::new(pattern)
        .map_err(|err| CoreError::config(format!("failed to compile topics pattern: {err}")))
}

fn field_regex(name: &str) -> CoreResult<Regex> {
    compile(&format!(r"(?s)<{name}>(.*?)</{name}>"))
}

/// Reads a Touché-style `topics.xml`.
pub fn load_topics(path: &Path) -> CoreResult<Vec<Topic>> {
    let raw = fs::read_to_string(path).map_err(|err| match err.kind() {
        ErrorKind::NotFound => CoreError::not_found("topics file", path.display().to_string()),
        _ => CoreError::parse(path.display().to_string(), 0, err.to_string()),
    })?;
    parse_topics(&path.display().to_string(), &raw)
}

/// Extracts `<topic>` elements with `<number>`, `<title>` and the optional
/// `<description>` and `<narrative>`. Topics keep file order; whitespace runs
/// inside text fields collapse to single spaces.
pub fn parse_topics(source_name: &str, raw: &str) -> CoreResult<Vec<Topic>> {
    let topic_block = compile(r"(?s)<topic>(.*?)</topic>")?;
    let number_field = field_regex("number")?;
    let title_field = field_regex("title")?;
    let description_field = field_regex("description")?;
    let narrative_field = field_regex("narrative")?;

    let mut topics = Vec::new();
    let mut seen = BTreeSet::<u32>::new();
    for block in topic_block.captures_iter(raw) {
        let Some(body) = block.get(1) else {
            continue;
        };
        let line = line_of(raw, body.start());
        let body = body.as_str();

        let id_text = capture_text(&number_field, body)
            .ok_or_else(|| CoreError::parse(source_name, line, "topic without <number>"))?;
        let id = id_text
            .parse::<u32>()
            .ok()
            .filter(|id| *id >= 1)
            .ok_or_else(|| {
                CoreError::parse(source_name, line, format!("invalid topic number '{id_text}'"))
            })?;
        if !seen.insert(id) {
            return Err(CoreError::parse(
                source_name,
                line,
                format!("duplicate topic number {id}"),
            ));
        }

        let title = capture_text(&title_field, body)
            .filter(|title| !title.is_empty())
            .ok_or_else(|| {
                CoreError::parse(source_name, line, format!("topic {id} has no title"))
            })?;

        topics.push(Topic {
            id,
            title,
            description: capture_text(&description_field, body).unwrap_or_default(),
            narrative: capture_text(&narrative_field, body).unwrap_or_default(),
        });
    }

    Ok(topics)
}

fn capture_text(regex: &Regex, body: &str) -> Option<String> {
    let captured = regex.captures(body)?.get(1)?.as_str();
    Some(unescape(&collapse_whitespace(captured)))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<&str>>().join(" ")
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn line_of(raw: &str, offset: usize) -> usize {
    raw[..offset].matches('\n').count() + 1
}
