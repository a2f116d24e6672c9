//! Fortune booth: a year-end party fortune teller.
//!
//! Looks a participant up in a spreadsheet workbook by employee id or name,
//! composes a prompt from the participant's profile and the company
//! context, and asks a language model for a short, funny fortune.
//!
//! Pipeline: [`source::cache::WorkbookCache`] → [`roster::resolver`] →
//! [`oracle::composer`] → [`oracle::invoker`], driven by
//! [`oracle::FortuneService`] and presented through [`presentation::Booth`].
//!
//! See `DESIGN.md` for the architecture notes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod credentials;
pub mod logging;
pub mod retry;

pub mod providers;
pub mod roster;
pub mod source;

pub mod oracle;
pub mod presentation;
