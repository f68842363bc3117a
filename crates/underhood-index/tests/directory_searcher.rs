use std::fs;
use std::time::Duration;

use tempfile::tempdir;
use underhood_index::query;
use underhood_index::{DirectorySearcher, IndexConfig, RepoShard, SearchOptions, Searcher};

fn corpus() -> DirectorySearcher {
    DirectorySearcher::from_shards(vec![
        RepoShard::new("zoekt")
            .with_branch("main")
            .with_document("cmd/main.go", "package main\n\nfunc main() {\n\tneedle()\n}\n")
            .with_document("README.md", "zoekt is fast\n"),
        RepoShard::new("zoekt-fork")
            .with_document("cmd/main.go", "package main\n\nfunc main() {\n\tneedle()\n}\n")
            .with_document("notes.txt", "Needle needle NEEDLE\n"),
        RepoShard::new("other").with_document("lib.rs", "fn needle() {}\n"),
    ])
}

fn options() -> SearchOptions {
    let mut options = SearchOptions::default();
    options.set_defaults();
    options
}

#[tokio::test]
async fn repository_filter_is_a_substring_match() {
    let searcher = corpus();
    let q = query::parse("r:zoekt f:^.*$").expect("query should parse");
    let result = searcher.search(&q, &options()).await.expect("search should succeed");

    let repos: Vec<&str> = result.files.iter().map(|f| f.repository.as_str()).collect();
    assert_eq!(repos, vec!["zoekt", "zoekt", "zoekt-fork", "zoekt-fork"]);
    assert!(result.files.iter().all(|f| f.line_matches.is_empty()));
    assert_eq!(result.stats.shards_skipped, 1);
}

#[tokio::test]
async fn content_matches_carry_line_and_byte_positions() {
    let searcher = DirectorySearcher::from_shards(vec![RepoShard::new("repo").with_document(
        "main.rs",
        "fn main() {\n    let needle = 1;\n}\n",
    )]);
    let q = query::parse("needle").expect("query should parse");
    let result = searcher.search(&q, &options()).await.expect("search should succeed");

    assert_eq!(result.files.len(), 1);
    let lines = &result.files[0].line_matches;
    assert_eq!(lines.len(), 1);
    let line = &lines[0];
    assert_eq!(line.line_number, 2);
    assert_eq!(line.line, b"    let needle = 1;".to_vec());
    assert_eq!(line.line_start, 12);
    assert_eq!(line.line_end, 31);
    assert_eq!(line.fragments.len(), 1);
    assert_eq!(line.fragments[0].line_offset, 8);
    assert_eq!(line.fragments[0].offset, 20);
    assert_eq!(line.fragments[0].match_length, 6);
}

#[tokio::test]
async fn several_fragments_on_one_line_share_a_line_match() {
    let searcher = corpus();
    let q = query::parse("r:fork f:notes needle").expect("query should parse");
    let result = searcher.search(&q, &options()).await.expect("search should succeed");

    assert_eq!(result.files.len(), 1);
    let lines = &result.files[0].line_matches;
    assert_eq!(lines.len(), 1);
    let offsets: Vec<usize> = lines[0].fragments.iter().map(|f| f.line_offset).collect();
    assert_eq!(offsets, vec![0, 7, 14]);

    let sensitive = query::parse("r:fork f:notes Needle").expect("query should parse");
    let result = searcher
        .search(&sensitive, &options())
        .await
        .expect("search should succeed");
    assert_eq!(result.files[0].line_matches[0].fragments.len(), 1);
}

#[tokio::test]
async fn identical_content_has_identical_checksums() {
    let searcher = corpus();
    let q = query::parse("f:main\\.go").expect("query should parse");
    let result = searcher.search(&q, &options()).await.expect("search should succeed");

    assert_eq!(result.files.len(), 2);
    assert_eq!(result.files[0].checksum, result.files[1].checksum);
    assert_eq!(result.files[0].checksum.len(), 32);
}

#[tokio::test]
async fn whole_returns_content() {
    let searcher = corpus();
    let q = query::parse("r:other f:^lib\\.rs$").expect("query should parse");

    let result = searcher.search(&q, &options()).await.expect("search should succeed");
    assert!(result.files[0].content.is_none());

    let mut whole = options();
    whole.whole = true;
    let result = searcher.search(&q, &whole).await.expect("search should succeed");
    assert_eq!(result.files[0].content.as_deref(), Some(&b"fn needle() {}\n"[..]));
}

#[tokio::test]
async fn estimate_counts_candidates_without_scanning() {
    let searcher = corpus();
    let q = query::parse("r:zoekt needle").expect("query should parse");
    let estimate = SearchOptions {
        estimate_doc_count: true,
        ..SearchOptions::default()
    };
    let result = searcher.search(&q, &estimate).await.expect("search should succeed");

    assert!(result.files.is_empty());
    assert_eq!(result.stats.shard_files_considered, 4);
    assert_eq!(result.stats.files_considered, 0);
}

#[tokio::test]
async fn display_cap_truncates() {
    let searcher = corpus();
    let q = query::parse("needle").expect("query should parse");
    let mut capped = options();
    capped.max_doc_display_count = 2;
    let result = searcher.search(&q, &capped).await.expect("search should succeed");

    assert_eq!(result.files.len(), 2);
    assert!(result.stats.truncated);
}

#[tokio::test]
async fn shard_match_cap_stops_at_the_first_file_of_each_shard() {
    let searcher = corpus();
    let q = query::parse("needle").expect("query should parse");
    let uncapped = searcher.search(&q, &options()).await.expect("search should succeed");
    assert_eq!(uncapped.files.len(), 4);
    assert!(!uncapped.stats.truncated);

    let mut capped = options();
    capped.shard_max_match_count = 1;
    let result = searcher.search(&q, &capped).await.expect("search should succeed");

    let found: Vec<(&str, &str)> = result
        .files
        .iter()
        .map(|f| (f.repository.as_str(), f.file_name.as_str()))
        .collect();
    assert_eq!(
        found,
        vec![("zoekt", "cmd/main.go"), ("zoekt-fork", "cmd/main.go"), ("other", "lib.rs")]
    );
    assert!(result.stats.truncated);
}

#[tokio::test]
async fn exhausted_wall_time_returns_no_files() {
    let searcher = corpus();
    let q = query::parse("needle").expect("query should parse");
    let mut options = options();
    options.max_wall_time = Some(Duration::ZERO);
    let result = searcher.search(&q, &options).await.expect("search should succeed");

    assert!(result.stats.timed_out);
    assert!(result.files.is_empty());
    assert_eq!(result.stats.file_count, 0);
}

#[tokio::test]
async fn negated_content_excludes_files() {
    let searcher = corpus();
    let q = query::parse("r:zoekt f:.* -needle").expect("query should parse");
    let result = searcher.search(&q, &options()).await.expect("search should succeed");

    let names: Vec<&str> = result.files.iter().map(|f| f.file_name.as_str()).collect();
    assert_eq!(names, vec!["README.md"]);
}

#[tokio::test]
async fn list_reports_repositories_and_branches() {
    let searcher = corpus();
    let all = searcher
        .list(&query::parse("r:").expect("query should parse"))
        .await
        .expect("list should succeed");
    assert_eq!(all.repos.len(), 3);
    assert_eq!(all.repos[0].branches, vec!["main".to_string()]);
    assert_eq!(all.repos[0].documents, 2);

    let forks = searcher
        .list(&query::parse("r:fork").expect("query should parse"))
        .await
        .expect("list should succeed");
    let names: Vec<&str> = forks.repos.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["zoekt-fork"]);
}

#[tokio::test]
async fn open_loads_repositories_from_disk() {
    let temp = tempdir().expect("failed to create tempdir");
    let repo = temp.path().join("alpha");
    fs::create_dir_all(repo.join("src")).expect("mkdir");
    fs::create_dir_all(repo.join(".git")).expect("mkdir");
    fs::write(repo.join(".git/HEAD"), "ref: refs/heads/trunk\n").expect("write");
    fs::write(repo.join("src/lib.rs"), "pub fn alpha() {}\n").expect("write");
    fs::write(repo.join("blob.bin"), [0u8, 1, 2, 3]).expect("write");
    fs::write(repo.join(".gitignore"), "target/\n").expect("write");
    fs::create_dir_all(repo.join("target")).expect("mkdir");
    fs::write(repo.join("target/out.rs"), "pub fn alpha() {}\n").expect("write");
    fs::create_dir_all(temp.path().join("bad:name")).expect("mkdir");
    fs::write(temp.path().join("bad:name/x.txt"), "alpha\n").expect("write");

    let searcher = DirectorySearcher::open(IndexConfig::new(temp.path()))
        .await
        .expect("index should load");
    assert_eq!(searcher.repository_count(), 1);

    let list = searcher
        .list(&query::parse("r:").expect("query should parse"))
        .await
        .expect("list should succeed");
    assert_eq!(list.repos[0].name, "alpha");
    assert_eq!(list.repos[0].branches, vec!["trunk".to_string()]);

    let q = query::parse("alpha").expect("query should parse");
    let result = searcher.search(&q, &options()).await.expect("search should succeed");
    let names: Vec<&str> = result.files.iter().map(|f| f.file_name.as_str()).collect();
    assert_eq!(names, vec!["src/lib.rs"]);
}
