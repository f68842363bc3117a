use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use ignore::WalkBuilder;
use regex::bytes::{Regex, RegexBuilder};
use sha2::{Digest, Sha256};
use tokio::task;

use crate::query::{Pattern, Q};
use crate::{
    FileMatch, LineFragmentMatch, LineMatch, RepoList, RepoListEntry, SearchOptions, SearchResult,
    Searcher,
};

const DEFAULT_MAX_FILE_SIZE: u64 = 2 << 20;

#[derive(Clone, Debug)]
pub struct IndexConfig {
    /// Every immediate subdirectory is loaded as one repository.
    pub index_dir: PathBuf,
    /// Files larger than this many bytes are skipped.
    pub max_file_size: u64,
}

impl IndexConfig {
    pub fn new(index_dir: impl Into<PathBuf>) -> Self {
        Self {
            index_dir: index_dir.into(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Document {
    /// Slash-separated path relative to the repository root.
    pub path: String,
    pub content: Vec<u8>,
    pub checksum: Vec<u8>,
}

impl Document {
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        let content = content.into();
        let checksum = Sha256::digest(&content).to_vec();
        Self {
            path: path.into(),
            content,
            checksum,
        }
    }
}

/// All documents of one repository.
#[derive(Clone, Debug)]
pub struct RepoShard {
    pub name: String,
    pub url: String,
    pub branches: Vec<String>,
    pub documents: Vec<Document>,
}

impl RepoShard {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: String::new(),
            branches: Vec::new(),
            documents: Vec::new(),
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branches.push(branch.into());
        self
    }

    pub fn with_document(mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.documents.push(Document::new(path, content));
        self
    }
}

/// Searcher over repositories held in memory.
#[derive(Clone)]
pub struct DirectorySearcher {
    shards: Arc<Vec<RepoShard>>,
}

impl DirectorySearcher {
    /// Load every repository below `config.index_dir`.
    pub async fn open(config: IndexConfig) -> Result<Self> {
        let shards = task::spawn_blocking(move || load_shards(&config))
            .await
            .context("index load task cancelled")??;
        let documents: usize = shards.iter().map(|shard| shard.documents.len()).sum();
        tracing::info!(repositories = shards.len(), documents, "index loaded");
        Ok(Self::from_shards(shards))
    }

    pub fn from_shards(shards: Vec<RepoShard>) -> Self {
        Self {
            shards: Arc::new(shards),
        }
    }

    pub fn repository_count(&self) -> usize {
        self.shards.len()
    }
}

#[async_trait]
impl Searcher for DirectorySearcher {
    async fn search(&self, query: &Q, options: &SearchOptions) -> Result<SearchResult> {
        let matcher = Matcher::compile(query)?;
        let shards = self.shards.clone();
        let options = options.clone();
        let cancel = CancelOnDrop::default();
        let cancelled = cancel.flag.clone();

        let result = task::spawn_blocking(move || scan(&shards, &matcher, &options, &cancelled))
            .await
            .context("search task cancelled")?;
        drop(cancel);
        Ok(result)
    }

    async fn list(&self, query: &Q) -> Result<RepoList> {
        let matcher = Matcher::compile(query)?;
        let repos = self
            .shards
            .iter()
            .filter(|shard| matcher.eval(Depth::Repository, shard, None, &mut Vec::new()))
            .map(|shard| RepoListEntry {
                name: shard.name.clone(),
                url: shard.url.clone(),
                branches: shard.branches.clone(),
                documents: shard.documents.len(),
            })
            .collect();
        Ok(RepoList { repos })
    }
}

/// Raises the cancellation flag when the owning search future is dropped.
#[derive(Default)]
struct CancelOnDrop {
    flag: Arc<AtomicBool>,
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.flag.store(true, Ordering::Relaxed);
    }
}

/// How much of a document an evaluation may look at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Depth {
    Repository,
    Names,
    Content,
}

enum Matcher {
    And(Vec<Matcher>),
    Or(Vec<Matcher>),
    Not(Box<Matcher>),
    Repo(String),
    Branch(String),
    File(Regex),
    Content(Regex),
    Const(bool),
}

impl Matcher {
    fn compile(q: &Q) -> Result<Self> {
        Ok(match q {
            Q::And(children) => Matcher::And(children.iter().map(Self::compile).collect::<Result<_>>()?),
            Q::Or(children) => Matcher::Or(children.iter().map(Self::compile).collect::<Result<_>>()?),
            Q::Not(inner) => Matcher::Not(Box::new(Self::compile(inner)?)),
            Q::Repo(name) => Matcher::Repo(name.clone()),
            Q::Branch(name) => Matcher::Branch(name.clone()),
            Q::File(pattern) => Matcher::File(build_regex(pattern)?),
            Q::Content(pattern) => Matcher::Content(build_regex(pattern)?),
            Q::Const(value) => Matcher::Const(*value),
        })
    }

    /// The deepest level any atom in this subtree needs.
    fn depth(&self) -> Depth {
        match self {
            Matcher::And(children) | Matcher::Or(children) => children
                .iter()
                .map(Matcher::depth)
                .max()
                .unwrap_or(Depth::Repository),
            Matcher::Not(inner) => inner.depth(),
            Matcher::Repo(_) | Matcher::Branch(_) | Matcher::Const(_) => Depth::Repository,
            Matcher::File(_) => Depth::Names,
            Matcher::Content(_) => Depth::Content,
        }
    }

    /// Atoms deeper than `depth` count as satisfied. Content hits are appended to `hits`.
    fn eval(
        &self,
        depth: Depth,
        shard: &RepoShard,
        doc: Option<&Document>,
        hits: &mut Vec<(usize, usize)>,
    ) -> bool {
        match self {
            Matcher::And(children) => {
                let mark = hits.len();
                for child in children {
                    if !child.eval(depth, shard, doc, hits) {
                        hits.truncate(mark);
                        return false;
                    }
                }
                true
            }
            Matcher::Or(children) => {
                let mut any = false;
                for child in children {
                    any |= child.eval(depth, shard, doc, hits);
                }
                any
            }
            Matcher::Not(inner) => {
                if inner.depth() > depth {
                    return true;
                }
                !inner.eval(depth, shard, doc, &mut Vec::new())
            }
            Matcher::Repo(name) => shard.name.contains(name.as_str()),
            Matcher::Branch(name) => shard.branches.iter().any(|b| b.contains(name.as_str())),
            Matcher::File(re) => match doc {
                Some(doc) if depth >= Depth::Names => re.is_match(doc.path.as_bytes()),
                _ => true,
            },
            Matcher::Content(re) => match doc {
                Some(doc) if depth >= Depth::Content => {
                    let before = hits.len();
                    hits.extend(
                        re.find_iter(&doc.content)
                            .filter(|m| m.start() < m.end())
                            .map(|m| (m.start(), m.end())),
                    );
                    hits.len() > before
                }
                _ => true,
            },
            Matcher::Const(value) => *value,
        }
    }
}

fn build_regex(pattern: &Pattern) -> Result<Regex> {
    RegexBuilder::new(&pattern.regex)
        .case_insensitive(!pattern.case_sensitive)
        .build()
        .with_context(|| format!("failed to compile pattern `{}`", pattern.regex))
}

fn scan(
    shards: &[RepoShard],
    matcher: &Matcher,
    options: &SearchOptions,
    cancelled: &AtomicBool,
) -> SearchResult {
    let start = Instant::now();
    let mut result = SearchResult::default();
    let mut total_matches = 0usize;

    'shards: for shard in shards {
        if !matcher.eval(Depth::Repository, shard, None, &mut Vec::new()) {
            result.stats.shards_skipped += 1;
            continue;
        }

        let mut shard_matches = 0usize;
        for doc in &shard.documents {
            if cancelled.load(Ordering::Relaxed) {
                break 'shards;
            }
            if options
                .max_wall_time
                .is_some_and(|limit| start.elapsed() >= limit)
            {
                result.stats.timed_out = true;
                break 'shards;
            }
            if !matcher.eval(Depth::Names, shard, Some(doc), &mut Vec::new()) {
                continue;
            }
            result.stats.shard_files_considered += 1;
            if options.estimate_doc_count {
                continue;
            }

            result.stats.files_considered += 1;
            let mut hits = Vec::new();
            if !matcher.eval(Depth::Content, shard, Some(doc), &mut hits) {
                continue;
            }

            let line_matches = line_matches(&doc.content, hits);
            let matches: usize = line_matches.iter().map(|l| l.fragments.len()).sum();
            shard_matches += matches;
            total_matches += matches;

            result.files.push(FileMatch {
                repository: shard.name.clone(),
                file_name: doc.path.clone(),
                branches: shard.branches.clone(),
                content: options.whole.then(|| doc.content.clone()),
                checksum: doc.checksum.clone(),
                line_matches,
            });

            let display_full = options.max_doc_display_count > 0
                && result.files.len() >= options.max_doc_display_count;
            let total_full =
                options.total_max_match_count > 0 && total_matches >= options.total_max_match_count;
            if display_full || total_full {
                result.stats.truncated = true;
                break 'shards;
            }
            if options.shard_max_match_count > 0 && shard_matches >= options.shard_max_match_count {
                result.stats.truncated = true;
                break;
            }
        }
    }

    result.stats.file_count = result.files.len();
    result.stats.match_count = total_matches;
    result.stats.duration_ms = start.elapsed().as_millis() as u64;
    result
}

/// Group byte ranges into per-line matches. Overlapping ranges keep the earlier one.
fn line_matches(content: &[u8], mut hits: Vec<(usize, usize)>) -> Vec<LineMatch> {
    hits.sort_unstable();
    hits.dedup();

    let mut lines: Vec<LineMatch> = Vec::new();
    let mut last_end = 0usize;
    let mut counted_upto = 0usize;
    let mut line_number = 1usize;

    for (start, end) in hits {
        if start < last_end {
            continue;
        }
        last_end = end;

        let line_start = content[..start]
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |p| p + 1);
        let line_end = content[start..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(content.len(), |p| start + p);

        line_number += content[counted_upto..line_start]
            .iter()
            .filter(|&&b| b == b'\n')
            .count();
        counted_upto = line_start;

        let fragment = LineFragmentMatch {
            line_offset: start - line_start,
            offset: start,
            match_length: end.min(line_end) - start,
        };
        match lines.last_mut() {
            Some(last) if last.line_start == line_start => last.fragments.push(fragment),
            _ => lines.push(LineMatch {
                line: content[line_start..line_end].to_vec(),
                line_start,
                line_end,
                line_number,
                fragments: vec![fragment],
            }),
        }
    }
    lines
}

fn load_shards(config: &IndexConfig) -> Result<Vec<RepoShard>> {
    let entries = fs::read_dir(&config.index_dir).with_context(|| {
        format!(
            "failed to read index directory {}",
            config.index_dir.display()
        )
    })?;

    let mut roots: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    roots.sort();

    let mut shards = Vec::new();
    for root in roots {
        let Some(name) = root.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        // Tickets split on the first colon, so such a repository could never be addressed.
        if name.contains(':') {
            tracing::warn!(repository = %name, "skipping repository with a colon in its name");
            continue;
        }
        shards.push(load_repository(&root, name, config.max_file_size));
    }
    Ok(shards)
}

fn load_repository(root: &Path, name: String, max_file_size: u64) -> RepoShard {
    let mut walker = WalkBuilder::new(root);
    walker
        .hidden(false)
        .follow_links(false)
        .standard_filters(true)
        .require_git(false)
        .filter_entry(|entry| entry.file_name() != ".git");

    let mut documents = Vec::new();
    for result in walker.build() {
        let entry = match result {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(error = %err, repository = %name, "failed to read entry during indexing");
                continue;
            }
        };
        if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }
        let path = entry.path();
        if entry
            .metadata()
            .map(|meta| meta.len() > max_file_size)
            .unwrap_or(false)
        {
            tracing::debug!(path = %path.display(), "skipping oversized file");
            continue;
        }
        let content = match fs::read(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!(error = %err, path = %path.display(), "failed to read file");
                continue;
            }
        };
        if content.contains(&0) {
            continue;
        }
        let Some(relative) = relative_path(root, path) else {
            continue;
        };
        documents.push(Document::new(relative, content));
    }
    documents.sort_by(|a, b| a.path.cmp(&b.path));

    RepoShard {
        name,
        url: root.display().to_string(),
        branches: head_branch(root).into_iter().collect(),
        documents,
    }
}

fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
    Some(parts?.join("/"))
}

fn head_branch(root: &Path) -> Option<String> {
    let head = fs::read_to_string(root.join(".git").join("HEAD")).ok()?;
    head.trim()
        .strip_prefix("ref: refs/heads/")
        .map(str::to_string)
}
