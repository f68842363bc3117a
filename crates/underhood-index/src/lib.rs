//! In-memory code search backend.
//!
//! The gateway only talks to the [`Searcher`] trait. [`DirectorySearcher`]
//! is the bundled implementation: it loads every repository below an index
//! directory into memory and answers [`query`] expressions against it.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

pub mod query;
mod shard;

pub use query::{CaseMode, Pattern, Q, QueryError};
pub use shard::{DirectorySearcher, Document, IndexConfig, RepoShard};

/// Knobs for a single search call. Zero caps mean "unbounded" until
/// [`SearchOptions::set_defaults`] fills them in.
#[derive(Clone, Debug, Default)]
pub struct SearchOptions {
    /// Only count candidate documents; no content is scanned and no files are returned.
    pub estimate_doc_count: bool,
    /// Return the full content of every matching file.
    pub whole: bool,
    pub shard_max_match_count: usize,
    pub total_max_match_count: usize,
    /// Stop after this many matching files.
    pub max_doc_display_count: usize,
    pub max_wall_time: Option<Duration>,
}

impl SearchOptions {
    pub fn with_wall_time(max_wall_time: Duration) -> Self {
        Self {
            max_wall_time: Some(max_wall_time),
            ..Self::default()
        }
    }

    pub fn set_defaults(&mut self) {
        if self.shard_max_match_count == 0 {
            self.shard_max_match_count = 100_000;
        }
        if self.total_max_match_count == 0 {
            self.total_max_match_count = 10 * self.shard_max_match_count;
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SearchResult {
    pub files: Vec<FileMatch>,
    pub stats: Stats,
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    /// Documents in repositories admitted by the query's repository and file atoms.
    pub shard_files_considered: usize,
    /// Documents whose content was scanned.
    pub files_considered: usize,
    pub file_count: usize,
    pub match_count: usize,
    pub shards_skipped: usize,
    pub timed_out: bool,
    /// A match or display cap cut the scan short.
    pub truncated: bool,
    pub duration_ms: u64,
}

/// One matching file.
#[derive(Clone, Debug)]
pub struct FileMatch {
    pub repository: String,
    pub file_name: String,
    pub branches: Vec<String>,
    pub content: Option<Vec<u8>>,
    /// SHA-256 of the file content.
    pub checksum: Vec<u8>,
    pub line_matches: Vec<LineMatch>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineMatch {
    /// The line without its terminating newline.
    pub line: Vec<u8>,
    pub line_start: usize,
    pub line_end: usize,
    /// 1-based.
    pub line_number: usize,
    pub fragments: Vec<LineFragmentMatch>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineFragmentMatch {
    /// Byte offset within the line.
    pub line_offset: usize,
    /// Byte offset within the file.
    pub offset: usize,
    pub match_length: usize,
}

#[derive(Clone, Debug, Default)]
pub struct RepoList {
    pub repos: Vec<RepoListEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepoListEntry {
    pub name: String,
    pub url: String,
    pub branches: Vec<String>,
    pub documents: usize,
}

/// A code search backend.
#[async_trait]
pub trait Searcher: Send + Sync {
    async fn search(&self, query: &Q, options: &SearchOptions) -> Result<SearchResult>;

    /// Repositories admitted by the repository atoms of `query`.
    async fn list(&self, query: &Q) -> Result<RepoList>;
}
