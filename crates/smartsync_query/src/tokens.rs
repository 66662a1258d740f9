//! Whitespace tokenizer with parenthesis depth tracking.

use crate::mutator::QueryClause;

/// A whitespace-delimited token of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Token<'a> {
    /// Token text.
    pub text: &'a str,
    /// Byte offset of the first character.
    pub start: usize,
    /// Byte offset one past the last character.
    pub end: usize,
    /// True when the token sits entirely at parenthesis depth zero.
    pub top_level: bool,
}

/// Splits a query on whitespace and annotates each token with its depth.
///
/// Depth changes are evaluated per token: every `(` in the token opens a
/// level and every `)` closes one, so `('a','b')` and `count(Id)` leave the
/// depth unchanged while `(select` opens a sub-query and `Id)` closes it.
/// Depth never goes below zero.
pub(crate) fn scan(query: &str) -> Vec<Token<'_>> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, c) in query.char_indices() {
        if c.is_whitespace() {
            if let Some(s) = start.take() {
                spans.push((s, i));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        spans.push((s, query.len()));
    }

    let mut depth = 0usize;
    spans
        .into_iter()
        .map(|(start, end)| {
            let text = &query[start..end];
            let opens = text.matches('(').count();
            let closes = text.matches(')').count();
            let before = depth;
            depth = (depth + opens).saturating_sub(closes);
            Token {
                text,
                start,
                end,
                top_level: before == 0 && depth == 0,
            }
        })
        .collect()
}

/// Returns the clause keyword starting at `tokens[index]`, if any, together
/// with the number of tokens the keyword spans (`order by` spans two).
pub(crate) fn keyword_at(tokens: &[Token<'_>], index: usize) -> Option<(QueryClause, usize)> {
    let token = tokens.get(index)?;
    if !token.top_level {
        return None;
    }
    let word = token.text.to_ascii_lowercase();
    let followed_by_by = || {
        tokens
            .get(index + 1)
            .is_some_and(|next| next.top_level && next.text.eq_ignore_ascii_case("by"))
    };

    match word.as_str() {
        "select" => Some((QueryClause::Select, 1)),
        "from" => Some((QueryClause::From, 1)),
        "where" => Some((QueryClause::Where, 1)),
        "having" => Some((QueryClause::Having, 1)),
        "limit" => Some((QueryClause::Limit, 1)),
        "offset" => Some((QueryClause::Offset, 1)),
        "group_by" => Some((QueryClause::GroupBy, 1)),
        "order_by" => Some((QueryClause::OrderBy, 1)),
        "group" if followed_by_by() => Some((QueryClause::GroupBy, 2)),
        "order" if followed_by_by() => Some((QueryClause::OrderBy, 2)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_offsets() {
        let tokens = scan("  select Id\tfrom  Account ");
        let texts: Vec<_> = tokens.iter().map(|t| t.text).collect();
        assert_eq!(texts, ["select", "Id", "from", "Account"]);
        assert_eq!(tokens[0].start, 2);
        assert_eq!(tokens[3].end, 25);
    }

    #[test]
    fn depth_tracking() {
        let tokens = scan("select Id, (select Id from Contacts) from Account where Id in ('a','b')");
        let flags: Vec<_> = tokens.iter().map(|t| (t.text, t.top_level)).collect();
        assert_eq!(
            flags,
            [
                ("select", true),
                ("Id,", true),
                ("(select", false),
                ("Id", false),
                ("from", false),
                ("Contacts)", false),
                ("from", true),
                ("Account", true),
                ("where", true),
                ("Id", true),
                ("in", true),
                ("('a','b')", true),
            ]
        );
    }

    #[test]
    fn aggregate_tokens_keep_depth() {
        let tokens = scan("select count(Id) from Account");
        assert!(tokens.iter().all(|t| t.top_level));
    }

    #[test]
    fn unbalanced_close_does_not_underflow() {
        let tokens = scan("select Id) from Account");
        assert!(tokens.iter().all(|t| t.top_level));
    }

    #[test]
    fn two_word_keywords() {
        let tokens = scan("select Id from Account ORDER  By Name");
        assert_eq!(keyword_at(&tokens, 4), Some((QueryClause::OrderBy, 2)));
        assert_eq!(keyword_at(&tokens, 5), None);

        let tokens = scan("select Id from Account group_by Name");
        assert_eq!(keyword_at(&tokens, 4), Some((QueryClause::GroupBy, 1)));

        let tokens = scan("select order from Account");
        assert_eq!(keyword_at(&tokens, 1), None);
    }
}
