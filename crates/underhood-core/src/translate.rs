//! Builds backend queries from tickets and selections.
//!
//! The backend's `r:` atom is a substring match, so a query for repository
//! `zoekt` also returns files from `zoekt-fork`. Every repository-scoped
//! query therefore carries the exact repository name in
//! [`BackendQuery::repository`], and [`BackendQuery::retain_exact`] must run
//! over its results. `Gateway::execute` does that for every search.

use underhood_index::query::{self, Q, QueryError};
use underhood_index::FileMatch;

use crate::ticket::{RepoRef, Ticket};

/// How a cross-reference selection is turned into a content atom.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SearchMode {
    /// Literal phrase.
    #[default]
    Lax,
    /// Literal phrase between word boundaries.
    Boundary,
    /// The selection is a query expression of its own.
    Raw,
}

impl SearchMode {
    /// Unknown values fall back to the default.
    pub fn parse_or_default(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.eq_ignore_ascii_case("lax") => SearchMode::Lax,
            Some(v) if v.eq_ignore_ascii_case("boundary") => SearchMode::Boundary,
            Some(v) if v.eq_ignore_ascii_case("raw") => SearchMode::Raw,
            _ => SearchMode::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Casing {
    Yes,
    No,
    #[default]
    Auto,
}

impl Casing {
    /// Unknown values fall back to the default.
    pub fn parse_or_default(value: Option<&str>) -> Self {
        match value {
            Some("yes") => Casing::Yes,
            Some("no") => Casing::No,
            _ => Casing::Auto,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Casing::Yes => "yes",
            Casing::No => "no",
            Casing::Auto => "auto",
        }
    }
}

/// Backslash-escape query metacharacters so the backend reads `text` literally.
pub fn escape_literal_query(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        if c.is_whitespace()
            || matches!(
                c,
                ':' | '('
                    | ')'
                    | '['
                    | ']'
                    | '\\'
                    | '.'
                    | '*'
                    | '?'
                    | '^'
                    | '$'
                    | '+'
                    | '{'
                    | '}'
                    | ','
                    | '|'
                    | '"'
                    | '-'
            )
        {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// A query string plus the exact repository its results must come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendQuery {
    pub text: String,
    pub repository: Option<String>,
    pub whole: bool,
}

impl BackendQuery {
    pub fn unscoped(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            repository: None,
            whole: false,
        }
    }

    fn scoped(repo: RepoRef<'_>, rest: &str) -> Self {
        let mut text = format!("r:{}", escape_literal_query(repo.name));
        if let Some(branch) = repo.branch {
            text.push_str(" b:");
            text.push_str(&escape_literal_query(branch));
        }
        text.push(' ');
        text.push_str(rest);
        Self {
            text,
            repository: Some(repo.name.to_string()),
            whole: false,
        }
    }

    pub fn parse(&self) -> Result<Q, QueryError> {
        query::parse(&self.text)
    }

    /// Drop files whose repository merely contains the requested name.
    pub fn retain_exact(&self, files: &mut Vec<FileMatch>) {
        if let Some(repository) = &self.repository {
            files.retain(|file| file.repository == *repository);
        }
    }
}

/// Every file below `top` in `repo`; directories are derived from the paths.
/// Path atoms are case sensitive so that `README` and `readme` stay apart.
pub fn directory_query(top: &Ticket, repo: RepoRef<'_>) -> BackendQuery {
    if top.repository.is_empty() {
        return BackendQuery::unscoped("r:");
    }
    if top.path.is_empty() {
        BackendQuery::scoped(repo, "f:^.*$")
    } else {
        BackendQuery::scoped(
            repo,
            &format!("f:^{}/.*$ case:yes", escape_literal_query(&top.path)),
        )
    }
}

/// Exactly the file named by `ticket` in `repo`, with its content.
pub fn source_query(ticket: &Ticket, repo: RepoRef<'_>) -> BackendQuery {
    let mut query = BackendQuery::scoped(
        repo,
        &format!("f:^{}$ case:yes", escape_literal_query(&ticket.path)),
    );
    query.whole = true;
    query
}

/// Literal modes use an explicit `c:` field so a selection such as `or`
/// stays a pattern.
pub fn xref_query(selection: &str, mode: SearchMode, casing: Casing) -> BackendQuery {
    let pattern = match mode {
        SearchMode::Lax => format!("c:{}", escape_literal_query(selection)),
        SearchMode::Boundary => format!(r"c:\b{}\b", escape_literal_query(selection)),
        SearchMode::Raw => selection.to_string(),
    };
    BackendQuery::unscoped(format!("{pattern} case:{}", casing.as_str()))
}

/// Lists the repositories whose name contains `name`.
pub fn repository_list_query(name: &str) -> BackendQuery {
    BackendQuery::unscoped(format!("r:{}", escape_literal_query(name)))
}
