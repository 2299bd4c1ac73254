//! Commands that can be sent from the host to the scale.
//!
//! Commands fall into two groups:
//! - Session commands: the `CONN` probe, `ADD`, `DELETE_<n>`
//! - Recipe records streamed after the scale answers `READY`:
//!   `TITLE_<title>/`, `INST_<body>/` / `WEIGHT_<weight>_<body>/`, and `#`
//!
//! Header and step records end with [`RECORD_SUFFIX`]; the scale cuts each
//! field at the first `/`.

use crate::codec::encode_line;
use crate::error::{ProtocolError, ProtocolResult};
use crate::types::{Recipe, Step};

/// Prefix of the recipe header record.
pub const TITLE_PREFIX: &str = "TITLE_";
/// Prefix of an unweighted step record.
pub const INST_PREFIX: &str = "INST_";
/// Prefix of a weighted step record.
pub const WEIGHT_PREFIX: &str = "WEIGHT_";
/// Prefix of the delete command.
pub const DELETE_PREFIX: &str = "DELETE_";
/// Suffix closing a recipe header or step record.
pub const RECORD_SUFFIX: char = '/';

/// Commands that can be sent to the scale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    // ========== Session Commands ==========
    /// Probe whether the scale is addressable (`CONN`).
    Probe,

    /// Ask the scale to prepare for a new recipe (`ADD`).
    Add,

    /// Delete the recipe at a 0-based position in the scale's list.
    /// Sent 1-based on the wire.
    Delete {
        /// 0-based index of the recipe.
        index: usize,
    },

    // ========== Recipe Records ==========
    /// Recipe header (`TITLE_<title>`).
    Title {
        /// Recipe title.
        title: String,
    },

    /// One recipe step.
    Step(Step),

    /// End of the recipe records (`#`).
    Terminator,
}

impl Command {
    /// Get the record text for this command as sent (without line terminator).
    pub fn to_command_string(&self) -> String {
        match self {
            Command::Probe => "CONN".to_string(),
            Command::Add => "ADD".to_string(),
            Command::Delete { index } => encode_delete(*index),
            Command::Title { title } => format!("{}{}{}", TITLE_PREFIX, title, RECORD_SUFFIX),
            Command::Step(step) => format!("{}{}", encode_step(step), RECORD_SUFFIX),
            Command::Terminator => "#".to_string(),
        }
    }

    /// Encode the command for transmission, including the `\n` terminator.
    pub fn encode(&self) -> Vec<u8> {
        encode_line(&self.to_command_string())
    }

    /// Parse a host command line (used on the scale side).
    ///
    /// The record suffix on header and step records is optional.
    pub fn parse(line: &str) -> ProtocolResult<Command> {
        let line = line.trim_end_matches(['\r', '\n']);

        match line {
            "CONN" => return Ok(Command::Probe),
            "ADD" => return Ok(Command::Add),
            "#" => return Ok(Command::Terminator),
            _ => {}
        }

        if let Some(number) = line.strip_prefix(DELETE_PREFIX) {
            let position: usize = number
                .parse()
                .map_err(|_| ProtocolError::UnknownCommand(line.to_string()))?;
            if position == 0 {
                return Err(ProtocolError::UnknownCommand(line.to_string()));
            }
            return Ok(Command::Delete { index: position - 1 });
        }

        let record = line.strip_suffix(RECORD_SUFFIX).unwrap_or(line);

        if let Some(title) = record.strip_prefix(TITLE_PREFIX) {
            return Ok(Command::Title {
                title: title.to_string(),
            });
        }

        if record.starts_with(INST_PREFIX) || record.starts_with(WEIGHT_PREFIX) {
            return decode_step(record).map(Command::Step);
        }

        Err(ProtocolError::UnknownCommand(line.to_string()))
    }

    /// Check if this command is part of a recipe record stream.
    pub fn is_recipe_record(&self) -> bool {
        matches!(self, Command::Title { .. } | Command::Step(_) | Command::Terminator)
    }
}

/// Encode a step record: `INST_<body>` or `WEIGHT_<weight>_<body>`.
pub fn encode_step(step: &Step) -> String {
    match step.weight {
        Some(ref weight) => format!("{}{}_{}", WEIGHT_PREFIX, weight, step.body),
        None => format!("{}{}", INST_PREFIX, step.body),
    }
}

/// Decode a step record produced by [`encode_step`].
pub fn decode_step(record: &str) -> ProtocolResult<Step> {
    if let Some(body) = record.strip_prefix(INST_PREFIX) {
        return Ok(Step::instruction(body));
    }

    if let Some(rest) = record.strip_prefix(WEIGHT_PREFIX) {
        // Weight is digits only, so the first '_' ends it; the body may contain '_'.
        let (weight, body) = rest.split_once('_').ok_or_else(|| {
            ProtocolError::MalformedRecord(format!("weighted step without body: {}", record))
        })?;
        if weight.is_empty() || !weight.chars().all(|c| c.is_ascii_digit()) {
            return Err(ProtocolError::MalformedRecord(format!(
                "invalid weight {:?} in: {}",
                weight, record
            )));
        }
        return Ok(Step::weighted(body, weight));
    }

    Err(ProtocolError::MalformedRecord(format!("not a step record: {}", record)))
}

/// Encode the recipe header record: `TITLE_<title>`.
pub fn encode_recipe_header(recipe: &Recipe) -> String {
    format!("{}{}", TITLE_PREFIX, recipe.title)
}

/// Encode the delete command for a 0-based index; the scale counts from 1.
pub fn encode_delete(index: usize) -> String {
    format!("{}{}", DELETE_PREFIX, index + 1)
}

/// The ordered record sequence that transfers `recipe` to the scale:
/// header, one record per step, then the terminator.
pub fn recipe_transfer(recipe: &Recipe) -> Vec<Command> {
    let mut records = Vec::with_capacity(recipe.steps.len() + 2);
    records.push(Command::Title {
        title: recipe.title.clone(),
    });
    records.extend(recipe.steps.iter().cloned().map(Command::Step));
    records.push(Command::Terminator);
    records
}
