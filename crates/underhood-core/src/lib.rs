//! Browsing and cross-reference gateway over a code search backend.
//!
//! Requests name files with [`ticket::Ticket`]s. The gateway turns them into
//! backend queries ([`translate`]), runs them against an
//! [`underhood_index::Searcher`], and reshapes the matches into lazily
//! expanded file trees ([`filetree`]) or deduplicated, grouped
//! cross-references ([`xref`], [`decl`], [`snippet`]). [`service`] exposes
//! all of it over HTTP.

pub mod cli;
pub mod decl;
pub mod filetree;
pub mod limits;
pub mod service;
pub mod snippet;
pub mod telemetry;
pub mod ticket;
pub mod translate;
pub mod xref;
