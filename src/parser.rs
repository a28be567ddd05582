use std::collections::HashMap;
use std::io::BufRead;

use crate::error::Error;
use crate::model::Entry;

/// Parse dotenv entries from UTF-8 text.
///
/// Lines that do not look like `KEY=VALUE` are skipped, as are assignments
/// whose value is empty (`KEY=` or `KEY=""`). When a key repeats, the last
/// assignment wins and keeps the position of the first one.
pub fn parse_str(input: &str) -> Vec<Entry> {
    let mut entries = Vec::new();
    let mut by_key = HashMap::<String, usize>::new();

    for (idx, line) in input.split('\n').enumerate() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let Some((key, value)) = parse_line(line) else {
            continue;
        };

        let entry = Entry {
            key: key.to_owned(),
            value,
            line: u32::try_from(idx + 1).unwrap_or(u32::MAX),
        };

        if let Some(existing_idx) = by_key.get(&entry.key).copied() {
            entries[existing_idx] = entry;
        } else {
            by_key.insert(entry.key.clone(), entries.len());
            entries.push(entry);
        }
    }

    entries
}

/// Parse dotenv entries from UTF-8 bytes.
pub fn parse_bytes(input: &[u8]) -> Result<Vec<Entry>, Error> {
    let text = std::str::from_utf8(input)?;
    Ok(parse_str(text))
}

/// Parse dotenv entries from a buffered reader.
pub fn parse_reader<R: BufRead>(mut reader: R) -> Result<Vec<Entry>, Error> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    parse_bytes(&buf)
}

fn parse_line(line: &str) -> Option<(&str, String)> {
    let working = line.trim_start_matches(is_space);

    let key_len = working
        .find(|ch: char| !is_valid_key_char(ch))
        .unwrap_or(working.len());
    if key_len == 0 {
        return None;
    }

    let (key, rest) = working.split_at(key_len);
    let value = rest
        .trim_start_matches(is_space)
        .strip_prefix('=')?
        .trim_start_matches(is_space);

    let value = match strip_matching_quotes(value) {
        Some(inner) => inner,
        None => value.trim_matches(' '),
    };
    if value.is_empty() {
        return None;
    }
    Some((key, value.to_owned()))
}

/// Remove one layer of matching `"` or `'` quotes, leaving anything else as is.
pub(crate) fn trim_quotes(value: &str) -> &str {
    strip_matching_quotes(value).unwrap_or(value)
}

fn strip_matching_quotes(value: &str) -> Option<&str> {
    let bytes = value.as_bytes();
    if bytes.len() < 2 {
        return None;
    }

    let first = bytes[0];
    let last = bytes[bytes.len() - 1];
    if first == last && (first == b'"' || first == b'\'') {
        return Some(&value[1..value.len() - 1]);
    }
    None
}

fn is_space(ch: char) -> bool {
    ch.is_ascii_whitespace()
}

fn is_valid_key_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '.' || ch == '-'
}
