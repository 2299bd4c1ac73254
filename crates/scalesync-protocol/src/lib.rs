//! Smart Scale Recipe Sync Protocol
//!
//! This crate provides types and utilities for exchanging recipes with the smart
//! kitchen scale over its serial link. The scale speaks a small line-based text
//! protocol with mixed framing: short control tokens that may arrive without any
//! terminator, and data blocks terminated with `#`.
//!
//! # Protocol Overview
//!
//! - **Commands** (host → scale): one record per line, terminated with `\n`;
//!   recipe header and step records end with `/` before the newline
//! - **Control tokens** (scale → host): `CONN?`, `READY`, `SUCCESS`, `EXIT`
//! - **Titles listing** (scale → host): `TITLES_<n>_<title>_..._#`
//!
//! # Recipe Transfer
//!
//! Adding a recipe is a multi-message exchange:
//!
//! ```text
//! host   CONN            -> probe
//! scale  CONN?           <- device is addressable
//! host   ADD             -> start add
//! scale  READY           <- device ready for records
//! host   TITLE_Soup/     -> header
//! host   WEIGHT_500_Water/ -> one record per step
//! host   #               -> terminator
//! scale  SUCCESS         <- stored
//! ```
//!
//! # Example
//!
//! ```rust
//! use scalesync_protocol::{Command, Record, RecordFramer, TitleListFormat};
//!
//! let mut framer = RecordFramer::new();
//! let records = framer.feed(b"CONN?TITLES_1_So");
//! assert_eq!(records, vec!["CONN?".to_string()]);
//!
//! let records = framer.feed(b"up_#");
//! let record = Record::parse(&records[0], TitleListFormat::Counted).unwrap();
//! assert!(matches!(record, Record::Titles(ref stubs) if stubs[0].title == "Soup"));
//!
//! assert_eq!(Command::Delete { index: 0 }.to_command_string(), "DELETE_1");
//! ```

mod codec;
mod commands;
mod error;
mod records;
mod types;

pub use codec::*;
pub use commands::*;
pub use error::*;
pub use records::*;
pub use types::*;
