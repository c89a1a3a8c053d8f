//! State line parsing
//!
//! A state line looks like
//! `[12:00:01] utility.c:44> TEST_STATE:button_up,t=19:59,m=New,p=0`:
//! anything, then the marker, then the tag, then comma-separated fields.

use std::collections::HashMap;

use thiserror::Error;

use super::event::StateEvent;

/// Why a line carrying the marker could not become an event
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("state line has an empty event tag")]
    EmptyTag,

    #[error("invalid event tag '{0}': only letters, digits and '_' are allowed")]
    InvalidTag(String),
}

/// Parse one log line
///
/// Returns `Ok(None)` for lines without the marker. Field tokens lacking `=`
/// are skipped; only a bad tag rejects the whole line.
pub fn parse_line(line: &str, marker: &str) -> Result<Option<StateEvent>, ParseError> {
    let Some(start) = line.find(marker) else {
        return Ok(None);
    };
    let body = line[start + marker.len()..].trim_end();

    let (tag, rest) = match body.split_once(',') {
        Some((tag, rest)) => (tag, Some(rest)),
        None => (body, None),
    };

    if tag.is_empty() {
        return Err(ParseError::EmptyTag);
    }
    if !tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ParseError::InvalidTag(tag.to_string()));
    }

    let mut fields = HashMap::new();
    for token in rest.into_iter().flat_map(|r| r.split(',')) {
        match token.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                fields.insert(key.trim().to_string(), value.trim().to_string());
            }
            _ => {
                tracing::trace!(token, "Ignoring state field without key=value shape");
            }
        }
    }

    Ok(Some(StateEvent::new(tag, fields)))
}
