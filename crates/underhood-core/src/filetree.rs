//! Lazily expanded file tree for the browsing UI.
//!
//! Each response holds one level below the requested node. Child nodes come
//! back with unknown children; the client asks again when one is expanded.

use std::collections::HashSet;

use serde::{Serialize, Serializer};
use underhood_index::{FileMatch, RepoListEntry};

use crate::ticket::Ticket;

const ROOT_URI: &str = "toplevel";
const ROOT_DISPLAY: &str = "wontshow";

/// `Unknown` serializes as `null`, meaning "not fetched yet".
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Children {
    Unknown,
    Known(Vec<FileTree>),
}

impl Serialize for Children {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Children::Unknown => serializer.serialize_none(),
            Children::Known(children) => children.serialize(serializer),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileTree {
    /// Ticket of the node, `repository:path`, or the bare repository for top-level nodes.
    pub kythe_uri: String,
    pub display: String,
    pub only_generated: bool,
    pub is_file: bool,
    pub children: Children,
}

impl FileTree {
    /// The invisible root wrapping one level of nodes.
    pub fn root(children: Vec<FileTree>) -> Self {
        Self {
            kythe_uri: ROOT_URI.to_string(),
            display: ROOT_DISPLAY.to_string(),
            only_generated: false,
            is_file: false,
            children: Children::Known(children),
        }
    }

    fn unexpanded(kythe_uri: String, display: String, is_file: bool) -> Self {
        Self {
            kythe_uri,
            display,
            only_generated: false,
            is_file,
            children: Children::Unknown,
        }
    }

    pub fn children(&self) -> &[FileTree] {
        match &self.children {
            Children::Known(children) => children,
            Children::Unknown => &[],
        }
    }
}

/// One node per repository, or per `repository@branch` when it has branches.
pub fn repository_nodes(repos: &[RepoListEntry]) -> Vec<FileTree> {
    let mut nodes = Vec::with_capacity(repos.len());
    for repo in repos {
        if repo.branches.is_empty() {
            nodes.push(FileTree::unexpanded(
                repo.name.clone(),
                repo.name.clone(),
                false,
            ));
            continue;
        }
        for branch in &repo.branches {
            let name = format!("{}@{}", repo.name, branch);
            nodes.push(FileTree::unexpanded(name.clone(), name, false));
        }
    }
    sort_nodes(&mut nodes);
    nodes
}

/// The direct children of `top`, derived from the paths of every file below it.
pub fn directory_children(top: &Ticket, files: &[FileMatch]) -> Vec<FileTree> {
    let prefix = if top.path.is_empty() {
        String::new()
    } else {
        format!("{}/", top.path)
    };

    let mut seen = HashSet::new();
    let mut nodes = Vec::new();
    for file in files {
        let relative = file
            .file_name
            .strip_prefix(prefix.as_str())
            .unwrap_or(&file.file_name);
        let (name, is_file) = match relative.split_once('/') {
            Some((dir, _)) => (dir, false),
            None => (relative, true),
        };
        if name.is_empty() || !seen.insert(name) {
            continue;
        }
        nodes.push(FileTree::unexpanded(
            format!("{}:{}{}", top.repository, prefix, name),
            name.to_string(),
            is_file,
        ));
    }

    sort_nodes(&mut nodes);
    nodes
}

/// Directories first, then by display name.
fn sort_nodes(nodes: &mut [FileTree]) {
    nodes.sort_by(|a, b| {
        a.is_file
            .cmp(&b.is_file)
            .then_with(|| a.display.cmp(&b.display))
    });
}
