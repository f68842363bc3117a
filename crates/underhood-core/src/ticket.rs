//! `repository:path` addressing used by every API endpoint.
//!
//! Colons are not escaped: a ticket splits on its first colon, so a path may
//! contain colons but a repository name may not. The index loader refuses
//! repositories whose name contains one.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Ticket {
    pub repository: String,
    pub path: String,
}

impl Ticket {
    pub fn new(repository: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            path: path.into(),
        }
    }

    /// Never fails; missing parts come back empty.
    pub fn parse(text: &str) -> Self {
        match text.split_once(':') {
            Some((repository, path)) => Self::new(repository, path),
            None => Self::new(text, ""),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.repository.is_empty() && !self.path.is_empty()
    }

    /// Repository name plus the branch of a `repository@branch` component.
    /// Only a syntactic split: `Gateway` keeps the `@` in the name unless the
    /// backend lists that branch for that repository.
    pub fn repository_ref(&self) -> RepoRef<'_> {
        match self.repository.rsplit_once('@') {
            Some((name, branch)) if !name.is_empty() && !branch.is_empty() => RepoRef {
                name,
                branch: Some(branch),
            },
            _ => RepoRef {
                name: &self.repository,
                branch: None,
            },
        }
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.path)
    }
}

impl FromStr for Ticket {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RepoRef<'a> {
    pub name: &'a str,
    pub branch: Option<&'a str>,
}

impl<'a> RepoRef<'a> {
    /// The whole component as the repository name, `@` included.
    pub fn whole(name: &'a str) -> Self {
        Self { name, branch: None }
    }
}
