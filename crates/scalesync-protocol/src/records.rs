//! Records received from the scale.
//!
//! Each framed record decodes to exactly one [`Record`] variant. Control
//! tokens are matched exactly; everything starting with `TITLES` goes through
//! the titles parser.

use serde::{Deserialize, Serialize};

use crate::codec::{
    TERMINATOR, TITLES_HEADER, TOKEN_CONN_QUERY, TOKEN_EXIT, TOKEN_READY, TOKEN_SUCCESS,
};
use crate::error::{ProtocolError, ProtocolResult};
use crate::types::RecipeStub;

/// Separator between fields of a titles listing.
pub const FIELD_SEPARATOR: char = '_';

/// Layout of the titles listing sent by the scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TitleListFormat {
    /// `TITLES_<count>_<t1>_..._<tn>_#`; the count must match.
    #[default]
    Counted,
    /// `TITLES_<t1>_..._<tn>_#`, as emitted by older scale firmware.
    Bare,
}

/// Parsed record from the scale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// The scale asks whether the host is there (`CONN?`).
    ConnQuery,

    /// The scale is ready for recipe records (`READY`).
    Ready,

    /// The scale finished an add or delete (`SUCCESS`).
    Success,

    /// The scale left edit mode (`EXIT`).
    Exit,

    /// The scale's recipe list.
    Titles(Vec<RecipeStub>),

    /// Unknown/unrecognized record.
    Unknown(String),
}

impl Record {
    /// Parse one framed record.
    ///
    /// A record that looks like a titles listing but does not parse is an error;
    /// anything else unrecognized comes back as [`Record::Unknown`].
    pub fn parse(text: &str, format: TitleListFormat) -> ProtocolResult<Record> {
        let text = text.trim();

        match text {
            TOKEN_CONN_QUERY => return Ok(Record::ConnQuery),
            TOKEN_READY => return Ok(Record::Ready),
            TOKEN_SUCCESS => return Ok(Record::Success),
            TOKEN_EXIT => return Ok(Record::Exit),
            _ => {}
        }

        if text.starts_with(TITLES_HEADER) {
            return parse_titles(text, format).map(Record::Titles);
        }

        Ok(Record::Unknown(text.to_string()))
    }

    /// Encode the record as the scale sends it.
    pub fn encode(&self, format: TitleListFormat) -> String {
        match self {
            Record::ConnQuery => TOKEN_CONN_QUERY.to_string(),
            Record::Ready => TOKEN_READY.to_string(),
            Record::Success => TOKEN_SUCCESS.to_string(),
            Record::Exit => TOKEN_EXIT.to_string(),
            Record::Titles(stubs) => encode_titles(stubs, format),
            Record::Unknown(text) => text.clone(),
        }
    }

    /// Short name of the record kind, for logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Record::ConnQuery => "CONN?",
            Record::Ready => "READY",
            Record::Success => "SUCCESS",
            Record::Exit => "EXIT",
            Record::Titles(_) => "TITLES",
            Record::Unknown(_) => "unknown",
        }
    }
}

/// Parse a titles listing into stubs, keeping the scale's order.
pub fn parse_titles(record: &str, format: TitleListFormat) -> ProtocolResult<Vec<RecipeStub>> {
    let malformed = |why: &str| ProtocolError::MalformedRecord(format!("{}: {:?}", why, record));

    let body = record
        .trim()
        .strip_prefix(TITLES_HEADER)
        .ok_or_else(|| malformed("missing TITLES header"))?;
    let body = body
        .strip_suffix(TERMINATOR as char)
        .ok_or_else(|| malformed("missing '#' terminator"))?;
    let body = body
        .strip_prefix(FIELD_SEPARATOR)
        .ok_or_else(|| malformed("missing separator after header"))?;

    // Every field is followed by a separator, so the rest splits into
    // complete fields plus an empty tail.
    let mut fields: Vec<&str> = body.split(FIELD_SEPARATOR).collect();
    if fields.pop() != Some("") {
        return Err(malformed("last field not followed by separator"));
    }

    let titles = match format {
        TitleListFormat::Counted => {
            if fields.is_empty() {
                return Err(malformed("missing count"));
            }
            let count_field = fields.remove(0);
            let count: usize = count_field
                .parse()
                .map_err(|_| malformed("count is not a number"))?;
            if count != fields.len() {
                return Err(ProtocolError::MalformedRecord(format!(
                    "count says {} titles, found {}: {:?}",
                    count,
                    fields.len(),
                    record
                )));
            }
            fields
        }
        TitleListFormat::Bare => fields,
    };

    if titles.iter().any(|t| t.is_empty()) {
        return Err(malformed("empty title"));
    }

    Ok(titles.into_iter().map(RecipeStub::new).collect())
}

/// Encode stubs as a titles listing.
pub fn encode_titles(stubs: &[RecipeStub], format: TitleListFormat) -> String {
    let mut out = String::from(TITLES_HEADER);
    out.push(FIELD_SEPARATOR);
    if format == TitleListFormat::Counted {
        out.push_str(&stubs.len().to_string());
        out.push(FIELD_SEPARATOR);
    }
    for stub in stubs {
        out.push_str(&stub.title);
        out.push(FIELD_SEPARATOR);
    }
    out.push(TERMINATOR as char);
    out
}
