//! Incremental re-sync filter and timestamp format.

use chrono::{DateTime, Utc};

use crate::mutator::QueryClause;
use crate::tokens::{keyword_at, scan};

/// `strftime` format of timestamps in queries and record payloads:
/// millisecond precision with a numeric UTC offset.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%z";

/// Formats epoch milliseconds, e.g. `2024-03-01T10:15:30.250+0000`.
pub fn format_timestamp(millis: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp_millis(millis).map(|dt| dt.format(TIMESTAMP_FORMAT).to_string())
}

/// Parses a timestamp as returned by the remote service into epoch
/// milliseconds.
///
/// Accepts the numeric-offset form (`+0000`) and RFC 3339 (`Z`, `+00:00`).
pub fn parse_timestamp(text: &str) -> Option<i64> {
    let text = text.trim();
    DateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f%z")
        .or_else(|_| DateTime::parse_from_rfc3339(text))
        .ok()
        .map(|dt| dt.timestamp_millis())
}

/// Restricts `query` to records modified strictly after `max_time_stamp`.
///
/// The predicate `<mod_date_field> > <timestamp>` is appended to the
/// top-level `where` clause with `and`, or inserted as a new `where` right
/// after the `from` clause. A `max_time_stamp <= 0` returns the query
/// unchanged, as does a query with no top-level `from`.
///
/// The rewrite is textual: the rest of the query is preserved byte for byte.
///
/// # Example
///
/// ```
/// use smartsync_query::add_filter_for_resync;
///
/// let query = add_filter_for_resync(
///     "select Id from Account order by Name",
///     "LastModifiedDate",
///     1_700_000_000_000,
/// );
/// assert_eq!(
///     query,
///     "select Id from Account where LastModifiedDate > 2023-11-14T22:13:20.000+0000 order by Name"
/// );
/// ```
pub fn add_filter_for_resync(query: &str, mod_date_field: &str, max_time_stamp: i64) -> String {
    if max_time_stamp <= 0 {
        return query.to_string();
    }
    let Some(timestamp) = format_timestamp(max_time_stamp) else {
        return query.to_string();
    };
    let predicate = format!("{mod_date_field} > {timestamp}");

    let tokens = scan(query);
    let mut where_at = None;
    let mut from_at = None;
    let mut i = 0;
    while i < tokens.len() {
        match keyword_at(&tokens, i) {
            Some((QueryClause::Where, _)) if where_at.is_none() => where_at = Some(i),
            Some((QueryClause::From, _)) if from_at.is_none() => from_at = Some(i),
            _ => {}
        }
        i += 1;
    }

    if let Some(where_index) = where_at {
        // End of the where body: the last token before the next top-level keyword.
        let mut end = tokens[where_index].end;
        let mut j = where_index + 1;
        while j < tokens.len() && keyword_at(&tokens, j).is_none() {
            end = tokens[j].end;
            j += 1;
        }
        return format!("{} and {predicate}{}", &query[..end], &query[end..]);
    }

    if let Some(from_index) = from_at {
        let end = tokens
            .get(from_index + 1)
            .map_or(tokens[from_index].end, |object| object.end);
        return format!("{} where {predicate}{}", &query[..end], &query[end..]);
    }

    query.to_string()
}
