use serde_json::json;
use underhood::filetree::{self, Children, FileTree};
use underhood::ticket::Ticket;
use underhood_index::{FileMatch, RepoListEntry};

fn files(repository: &str, names: &[&str]) -> Vec<FileMatch> {
    names
        .iter()
        .map(|name| FileMatch {
            repository: repository.to_string(),
            file_name: name.to_string(),
            branches: Vec::new(),
            content: None,
            checksum: Vec::new(),
            line_matches: Vec::new(),
        })
        .collect()
}

fn displays(nodes: &[FileTree]) -> Vec<&str> {
    nodes.iter().map(|node| node.display.as_str()).collect()
}

#[test]
fn directories_sort_before_files() {
    let top = Ticket::parse("repo:");
    let nodes = filetree::directory_children(&top, &files("repo", &["b.txt", "a/x.rs", "c/d/e.rs"]));

    assert_eq!(displays(&nodes), vec!["a", "c", "b.txt"]);
    assert_eq!(
        nodes.iter().map(|n| n.is_file).collect::<Vec<_>>(),
        vec![false, false, true]
    );
    assert_eq!(nodes[0].kythe_uri, "repo:a");
    assert_eq!(nodes[2].kythe_uri, "repo:b.txt");
}

#[test]
fn children_are_relative_to_the_requested_directory() {
    let top = Ticket::parse("repo:dir");
    let nodes = filetree::directory_children(&top, &files("repo", &["dir/a.txt", "dir/b.txt"]));

    assert_eq!(displays(&nodes), vec!["a.txt", "b.txt"]);
    assert!(nodes.iter().all(|node| node.is_file));
    assert_eq!(nodes[0].kythe_uri, "repo:dir/a.txt");
    assert!(nodes.iter().all(|node| node.children == Children::Unknown));
}

#[test]
fn nested_files_yield_one_directory_node() {
    let top = Ticket::parse("repo:src");
    let nodes = filetree::directory_children(
        &top,
        &files(
            "repo",
            &["src/lib.rs", "src/service/http.rs", "src/service/mod.rs", "src/service/deep/x.rs"],
        ),
    );

    assert_eq!(displays(&nodes), vec!["service", "lib.rs"]);
    assert_eq!(nodes[0].kythe_uri, "repo:src/service");
    assert!(!nodes[0].is_file);
}

#[test]
fn branch_qualified_tickets_keep_their_branch_in_child_ids() {
    let top = Ticket::parse("repo@main:");
    let nodes = filetree::directory_children(&top, &files("repo", &["README.md"]));
    assert_eq!(nodes[0].kythe_uri, "repo@main:README.md");
}

#[test]
fn repositories_become_top_level_nodes() {
    let repos = vec![
        RepoListEntry {
            name: "plain".to_string(),
            url: String::new(),
            branches: Vec::new(),
            documents: 3,
        },
        RepoListEntry {
            name: "zoekt".to_string(),
            url: String::new(),
            branches: vec!["main".to_string(), "v1".to_string()],
            documents: 10,
        },
    ];
    let nodes = filetree::repository_nodes(&repos);
    assert_eq!(displays(&nodes), vec!["plain", "zoekt@main", "zoekt@v1"]);
    assert_eq!(nodes[1].kythe_uri, "zoekt@main");
    assert!(nodes.iter().all(|node| !node.is_file));
}

#[test]
fn root_serializes_with_lazy_children() {
    let top = Ticket::parse("repo:");
    let root = FileTree::root(filetree::directory_children(&top, &files("repo", &["main.go"])));

    let value = serde_json::to_value(&root).expect("tree should serialize");
    assert_eq!(
        value,
        json!({
            "kytheUri": "toplevel",
            "display": "wontshow",
            "onlyGenerated": false,
            "isFile": false,
            "children": [{
                "kytheUri": "repo:main.go",
                "display": "main.go",
                "onlyGenerated": false,
                "isFile": true,
                "children": null
            }]
        })
    );
}
