//! Benchmark fixtures for SmartSync.

use rand::Rng;
use serde_json::{json, Value};
use smartsync_engine::QueryResponse;

/// Base of the generated modification dates (2023-11-14T22:13:20Z).
pub const BASE_TIME_STAMP: i64 = 1_700_000_000_000;

/// Generates `count` server records of type `Account` with random
/// modification dates.
pub fn accounts(count: usize) -> Vec<Value> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|i| {
            let offset = rng.gen_range(0..86_400);
            json!({
                "attributes": {"type": "Account"},
                "Id": format!("001{i:012}"),
                "Name": format!("Account {i}"),
                "Industry": "Technology",
                "LastModifiedDate": format!("2023-11-15T{:02}:{:02}:{:02}.000+0000",
                    offset / 3600, offset / 60 % 60, offset % 60),
            })
        })
        .collect()
}

/// Splits records into query pages chained by `nextRecordsUrl`.
///
/// Returns the first page and the `(cursor, page)` pairs that follow it.
pub fn paged(records: Vec<Value>, page_size: usize) -> (QueryResponse, Vec<(String, QueryResponse)>) {
    let total = records.len() as i64;
    let mut chunks: Vec<Vec<Value>> = records
        .chunks(page_size.max(1))
        .map(<[Value]>::to_vec)
        .collect();
    if chunks.is_empty() {
        chunks.push(Vec::new());
    }
    let last = chunks.len() - 1;
    let mut pages: Vec<QueryResponse> = chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            if i == last {
                QueryResponse {
                    total_size: total,
                    records: chunk,
                    next_records_url: None,
                }
            } else {
                QueryResponse::page(total, chunk, format!("/query/next-{}", i + 1))
            }
        })
        .collect();
    let first = pages.remove(0);
    let rest = pages
        .into_iter()
        .enumerate()
        .map(|(i, page)| (format!("/query/next-{}", i + 1), page))
        .collect();
    (first, rest)
}
