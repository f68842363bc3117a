//! Match caps sized from a count-only estimate.

use std::time::Duration;

use underhood_index::SearchOptions;

/// Above this many candidate documents the match caps shrink.
pub const LARGE_CORPUS_DOCS: usize = 10_000;

/// Options for a search that should produce about `num` files, given the
/// `estimated_docs` reported by a preceding count-only query.
pub fn sized_options(num: usize, estimated_docs: usize, max_wall_time: Duration) -> SearchOptions {
    let mut options = SearchOptions::with_wall_time(max_wall_time);
    if estimated_docs > LARGE_CORPUS_DOCS {
        // 10k docs, 50 num -> max match = 250 + 250 / 10
        options.shard_max_match_count = num * 5 + (5 * num) / (estimated_docs / 1000);
    } else {
        let n = estimated_docs + num * 100;
        options.shard_max_match_count = n;
        options.total_max_match_count = n;
    }
    options.max_doc_display_count = num;
    options.set_defaults();
    options
}
