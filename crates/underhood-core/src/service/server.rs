use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use serde::Serialize;
use underhood_index::query::{self, Q};
use underhood_index::{
    DirectorySearcher, IndexConfig, SearchOptions, SearchResult, Searcher, Stats,
};

use crate::cli::{LogRotation, ServeArgs};
use crate::decl::Classifier;
use crate::filetree::{self, FileTree};
use crate::limits;
use crate::snippet::{self, Snippet};
use crate::telemetry;
use crate::ticket::{RepoRef, Ticket};
use crate::translate::{self, BackendQuery, Casing, SearchMode};
use crate::xref::{self, XREF_MAX_FILES, XrefResult};

use super::error::ApiError;
use super::http;

/// Results per page of `/search` when `num` is absent.
pub const DEFAULT_NUM_RESULTS: usize = 50;

/// Configuration applied when launching the gateway.
#[derive(Clone, Debug)]
pub struct ServeConfig {
    pub listen: SocketAddr,
    pub index_dir: PathBuf,
    pub max_wall_time: Duration,
    pub log_dir: Option<PathBuf>,
    pub log_rotation: LogRotation,
}

impl ServeConfig {
    /// Build a runtime configuration from the CLI arguments.
    pub fn try_from_args(args: ServeArgs) -> Result<Self> {
        if args.max_wall_time_secs == 0 {
            bail!("--max-wall-time-secs must be positive");
        }
        let index_dir = args.index.canonicalize().with_context(|| {
            format!("failed to resolve index directory: {}", args.index.display())
        })?;
        if !index_dir.is_dir() {
            bail!("index path is not a directory: {}", index_dir.display());
        }

        Ok(Self {
            listen: args.listen,
            index_dir,
            max_wall_time: Duration::from_secs(args.max_wall_time_secs),
            log_dir: args.log_dir,
            log_rotation: args.log_rotation,
        })
    }
}

/// Loads the index and serves HTTP until a shutdown signal is received.
pub struct UnderhoodServer {
    config: ServeConfig,
}

impl UnderhoodServer {
    pub fn new(config: ServeConfig) -> Self {
        Self { config }
    }

    pub async fn run(self) -> Result<()> {
        let gateway = Gateway::open(&self.config.index_dir, self.config.max_wall_time).await?;
        tracing::info!(
            listen = %self.config.listen,
            index = %self.config.index_dir.display(),
            "serving"
        );
        http::serve(self.config.listen, Arc::new(gateway)).await
    }
}

/// A cross-reference request after parameter parsing.
#[derive(Clone, Debug, Default)]
pub struct XrefRequest {
    pub selection: String,
    pub reference: Ticket,
    pub casing: Casing,
    pub mode: SearchMode,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub file_matches: Vec<SearchFile>,
    pub stats: Stats,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFile {
    pub ticket: String,
    pub repository: String,
    pub file_name: String,
    pub snippets: Vec<Snippet>,
}

/// Request handling shared by the HTTP routes and the one-shot commands.
#[derive(Clone)]
pub struct Gateway {
    searcher: Arc<dyn Searcher>,
    classifier: Arc<Classifier>,
    max_wall_time: Duration,
}

impl Gateway {
    pub fn new(searcher: Arc<dyn Searcher>, max_wall_time: Duration) -> Self {
        Self {
            searcher,
            classifier: Arc::new(Classifier::default()),
            max_wall_time,
        }
    }

    pub async fn open(index_dir: &Path, max_wall_time: Duration) -> Result<Self> {
        let searcher = DirectorySearcher::open(IndexConfig::new(index_dir)).await?;
        Ok(Self::new(Arc::new(searcher), max_wall_time))
    }

    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    fn options(&self) -> SearchOptions {
        let mut options = SearchOptions::with_wall_time(self.max_wall_time);
        options.set_defaults();
        options
    }

    /// Run `q` and drop results from repositories that only matched as a substring.
    pub async fn execute(
        &self,
        query: &BackendQuery,
        q: &Q,
        options: &SearchOptions,
    ) -> Result<SearchResult, ApiError> {
        let start = Instant::now();
        let mut result = self.searcher.search(q, options).await?;
        let returned = result.files.len();
        query.retain_exact(&mut result.files);
        telemetry::record_backend_files(result.files.len());

        if result.stats.timed_out {
            tracing::warn!(query = %query.text, "search hit the wall-time budget");
        }
        tracing::debug!(
            query = %query.text,
            returned,
            kept = result.files.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "backend search"
        );
        Ok(result)
    }

    async fn estimate(&self, q: &Q) -> Result<usize, ApiError> {
        let options = SearchOptions {
            estimate_doc_count: true,
            ..SearchOptions::with_wall_time(self.max_wall_time)
        };
        let result = self.searcher.search(q, &options).await?;
        Ok(result.stats.shard_files_considered)
    }

    /// Reads `repository@branch` as a branch only when the backend lists that
    /// branch for that repository. Otherwise `@` is part of the name.
    pub async fn resolve_repository<'a>(&self, ticket: &'a Ticket) -> Result<RepoRef<'a>, ApiError> {
        let split = ticket.repository_ref();
        let Some(branch) = split.branch else {
            return Ok(split);
        };
        let q = translate::repository_list_query(split.name).parse()?;
        let list = self.searcher.list(&q).await?;
        let listed = list
            .repos
            .iter()
            .any(|repo| repo.name == split.name && repo.branches.iter().any(|b| b == branch));
        if listed {
            Ok(split)
        } else {
            Ok(RepoRef::whole(&ticket.repository))
        }
    }

    /// One level of the tree under `top`.
    pub async fn file_tree(&self, top: &Ticket) -> Result<FileTree, ApiError> {
        if top.repository.is_empty() {
            let q = translate::directory_query(top, RepoRef::whole("")).parse()?;
            let list = self.searcher.list(&q).await?;
            return Ok(FileTree::root(filetree::repository_nodes(&list.repos)));
        }
        let repo = self.resolve_repository(top).await?;
        let query = translate::directory_query(top, repo);
        let q = query.parse()?;
        let result = self.execute(&query, &q, &self.options()).await?;
        Ok(FileTree::root(filetree::directory_children(top, &result.files)))
    }

    /// Raw content of the file named by a complete ticket.
    pub async fn source(&self, ticket: &Ticket) -> Result<Vec<u8>, ApiError> {
        if !ticket.is_complete() {
            return Err(ApiError::IncompleteTicket(ticket.to_string()));
        }
        let repo = self.resolve_repository(ticket).await?;
        let query = translate::source_query(ticket, repo);
        let q = query.parse()?;
        let mut options = self.options();
        options.whole = query.whole;
        let result = self.execute(&query, &q, &options).await?;
        result
            .files
            .into_iter()
            .next()
            .and_then(|file| file.content)
            .ok_or_else(|| ApiError::NotFound(format!("no file matched query `{}`", query.text)))
    }

    pub async fn search_xref(&self, request: &XrefRequest) -> Result<XrefResult, ApiError> {
        let query = translate::xref_query(&request.selection, request.mode, request.casing);
        let q = query.parse()?;
        if q.is_repo_only() {
            return Err(ApiError::RepoOnlyQuery);
        }
        let estimated = self.estimate(&q).await?;
        let options = limits::sized_options(XREF_MAX_FILES, estimated, self.max_wall_time);
        let result = self.execute(&query, &q, &options).await?;

        let xref = xref::assemble(&result.files, &request.reference, &self.classifier);
        tracing::debug!(
            query = %query.text,
            files = xref.ref_counts.files,
            groups = xref.refs.len(),
            declaration_lines = xref.declaration_counts.lines,
            declaration_groups = xref.declarations.len(),
            "xref assembled"
        );
        Ok(xref)
    }

    /// Free-form query, up to `num` files.
    pub async fn search(&self, text: &str, num: usize) -> Result<SearchResponse, ApiError> {
        let q = query::parse(text)?;
        if q.is_repo_only() {
            return Err(ApiError::RepoOnlyQuery);
        }
        let query = BackendQuery::unscoped(text);
        let estimated = self.estimate(&q).await?;
        let options = limits::sized_options(num, estimated, self.max_wall_time);
        let result = self.execute(&query, &q, &options).await?;

        let file_matches = result
            .files
            .iter()
            .map(|file| SearchFile {
                ticket: Ticket::new(file.repository.as_str(), file.file_name.as_str()).to_string(),
                repository: file.repository.clone(),
                file_name: file.file_name.clone(),
                snippets: snippet::file_snippets(file),
            })
            .collect();
        Ok(SearchResponse {
            file_matches,
            stats: result.stats,
        })
    }
}
