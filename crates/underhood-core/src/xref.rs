//! Cross-reference results: deduplication, relevance ordering and grouping.
//!
//! Per-file sites go through three steps, in this order:
//!
//! 1. files with the same content checksum are marked as duplicates of the
//!    first one seen ([`mark_duplicate_files`]);
//! 2. the flat list is stably sorted so that sites in the requesting
//!    ticket's repository, and then at its path, come first
//!    ([`sort_by_relevance`]);
//! 3. sites whose matched lines are byte-identical share one [`SiteGroup`]
//!    ([`group_by_snippets`]).
//!
//! Sorting before grouping means the most relevant member of a group decides
//! the group's position.

use std::collections::HashMap;

use serde::Serialize;
use underhood_index::FileMatch;

use crate::decl::Classifier;
use crate::snippet::{self, Snippet};
use crate::ticket::Ticket;

/// Upper bound on files requested from the backend per xref query.
pub const XREF_MAX_FILES: usize = 500;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayedFile {
    pub ticket: String,
    pub display_name: String,
}

impl DisplayedFile {
    pub fn new(repository: &str, path: &str) -> Self {
        Self {
            ticket: Ticket::new(repository, path).to_string(),
            display_name: format!("{repository}/{path}"),
        }
    }
}

/// One file's matched lines.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileSite {
    #[serde(rename = "sContainingFile")]
    pub containing_file: DisplayedFile,
    #[serde(rename = "sDupOfFile")]
    pub dup_of: Option<DisplayedFile>,
    #[serde(rename = "sSnippets")]
    pub snippets: Vec<Snippet>,
    #[serde(skip)]
    pub repository: String,
    #[serde(skip)]
    pub path: String,
    #[serde(skip)]
    pub file_checksum: Vec<u8>,
    #[serde(skip)]
    snippets_hash: blake3::Hash,
    #[serde(skip)]
    raw_lines: Vec<Vec<u8>>,
}

impl FileSite {
    /// `lines` pairs each raw matched line with its snippet.
    pub fn new(
        repository: impl Into<String>,
        path: impl Into<String>,
        file_checksum: Vec<u8>,
        lines: Vec<(Vec<u8>, Snippet)>,
    ) -> Self {
        let repository = repository.into();
        let path = path.into();
        let mut hasher = blake3::Hasher::new();
        for (raw, _) in &lines {
            hasher.update(raw);
        }
        let (raw_lines, snippets): (Vec<Vec<u8>>, Vec<Snippet>) = lines.into_iter().unzip();
        Self {
            containing_file: DisplayedFile::new(&repository, &path),
            dup_of: None,
            snippets,
            repository,
            path,
            file_checksum,
            snippets_hash: hasher.finalize(),
            raw_lines,
        }
    }

    pub fn from_file_match(file: &FileMatch) -> Self {
        let lines = file
            .line_matches
            .iter()
            .map(|line| (line.line.clone(), snippet::snippet(line)))
            .collect();
        Self::new(
            file.repository.as_str(),
            file.file_name.as_str(),
            file.checksum.clone(),
            lines,
        )
    }

    pub fn snippets_hash(&self) -> &blake3::Hash {
        &self.snippets_hash
    }

    pub fn matched_lines(&self) -> impl Iterator<Item = (&[u8], &Snippet)> {
        self.raw_lines
            .iter()
            .map(Vec::as_slice)
            .zip(self.snippets.iter())
    }

    /// A copy of this site holding only its `index`th matched line.
    pub fn single_line(&self, index: usize) -> Option<FileSite> {
        let raw = self.raw_lines.get(index)?;
        let snippet = self.snippets.get(index)?;
        Some(FileSite::new(
            self.repository.as_str(),
            self.path.as_str(),
            self.file_checksum.clone(),
            vec![(raw.clone(), snippet.clone())],
        ))
    }
}

/// Sites with identical matched lines.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SiteGroup {
    #[serde(rename = "sFileSites")]
    pub file_sites: Vec<FileSite>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RefCounts {
    #[serde(rename = "rcLines")]
    pub lines: usize,
    #[serde(rename = "rcFiles")]
    pub files: usize,
    #[serde(rename = "rcDupFiles")]
    pub dup_files: usize,
    #[serde(rename = "rcDupMatches")]
    pub dup_matches: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GroupedSites {
    pub groups: Vec<SiteGroup>,
    pub counts: RefCounts,
}

/// Dedup, order and group `sites` relative to the `reference` ticket.
pub fn group_sites(sites: Vec<FileSite>, reference: &Ticket) -> GroupedSites {
    let mut counts = RefCounts::default();
    let mut sites = mark_duplicate_files(sites, &mut counts);
    sort_by_relevance(&mut sites, reference);
    let groups = group_by_snippets(sites, &mut counts);
    GroupedSites { groups, counts }
}

pub fn mark_duplicate_files(mut sites: Vec<FileSite>, counts: &mut RefCounts) -> Vec<FileSite> {
    let mut canonical: HashMap<Vec<u8>, DisplayedFile> = HashMap::new();
    for site in &mut sites {
        counts.files += 1;
        counts.lines += site.snippets.len();
        match canonical.get(&site.file_checksum) {
            // Single-line declaration sites of one file share its checksum.
            Some(original) if *original == site.containing_file => site.dup_of = None,
            Some(original) => {
                site.dup_of = Some(original.clone());
                counts.dup_files += 1;
            }
            None => {
                site.dup_of = None;
                canonical.insert(site.file_checksum.clone(), site.containing_file.clone());
            }
        }
    }
    sites
}

/// Stable: same repository and path, then same repository, then the rest.
pub fn sort_by_relevance(sites: &mut [FileSite], reference: &Ticket) {
    let branch_free = reference.repository_ref().name;
    sites.sort_by_key(|site| {
        if site.repository != reference.repository && site.repository != branch_free {
            2u8
        } else if site.path != reference.path {
            1
        } else {
            0
        }
    });
}

pub fn group_by_snippets(sites: Vec<FileSite>, counts: &mut RefCounts) -> Vec<SiteGroup> {
    let mut index: HashMap<blake3::Hash, usize> = HashMap::new();
    let mut groups: Vec<SiteGroup> = Vec::new();
    for site in sites {
        match index.get(&site.snippets_hash) {
            Some(&position) => {
                counts.dup_matches += 1;
                groups[position].file_sites.push(site);
            }
            None => {
                index.insert(site.snippets_hash, groups.len());
                groups.push(SiteGroup {
                    file_sites: vec![site],
                });
            }
        }
    }
    groups
}

/// Body of `/api/search-xref`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct XrefResult {
    pub refs: Vec<SiteGroup>,
    pub ref_counts: RefCounts,
    pub calls: Vec<SiteGroup>,
    pub call_count: usize,
    pub definitions: Vec<SiteGroup>,
    pub declarations: Vec<SiteGroup>,
    #[serde(skip)]
    pub declaration_counts: RefCounts,
}

/// Build the xref response for the files a backend query returned.
pub fn assemble(files: &[FileMatch], reference: &Ticket, classifier: &Classifier) -> XrefResult {
    let sites: Vec<FileSite> = files.iter().map(FileSite::from_file_match).collect();
    let declarations = classifier.declaration_sites(&sites);

    let refs = group_sites(sites, reference);
    let declarations = group_sites(declarations, reference);
    XrefResult {
        refs: refs.groups,
        ref_counts: refs.counts,
        declarations: declarations.groups,
        declaration_counts: declarations.counts,
        ..XrefResult::default()
    }
}
