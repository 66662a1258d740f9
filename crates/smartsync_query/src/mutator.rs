//! Subquery-aware query rewriting.
//!
//! `QueryMutator` splits a query into its top-level clauses without a full
//! grammar parser. Tokens are whitespace-delimited and a parenthesis depth
//! counter decides which keywords are top-level, so the `from` and `where`
//! of a relationship sub-select stay inside the clause that contains them.

use crate::builder::QueryBuilder;
use crate::error::{QueryError, QueryResult};
use crate::tokens::{keyword_at, scan};

/// A top-level clause of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueryClause {
    /// `select` list.
    Select,
    /// `from` clause.
    From,
    /// `where` clause.
    Where,
    /// `group by` clause.
    GroupBy,
    /// `having` clause.
    Having,
    /// `order by` clause.
    OrderBy,
    /// `limit` clause.
    Limit,
    /// `offset` clause.
    Offset,
}

impl QueryClause {
    /// All clauses in emission order.
    pub const ALL: [QueryClause; 8] = [
        QueryClause::Select,
        QueryClause::From,
        QueryClause::Where,
        QueryClause::GroupBy,
        QueryClause::Having,
        QueryClause::OrderBy,
        QueryClause::Limit,
        QueryClause::Offset,
    ];

    const fn index(self) -> usize {
        self as usize
    }
}

type ClauseSlots = [Option<String>; 8];

/// Parses a query into top-level clauses and rewrites them.
///
/// # Example
///
/// ```
/// use smartsync_query::QueryMutator;
///
/// let mut mutator = QueryMutator::new(
///     "select Name, (select Id from Contacts where Email != null) from Account",
/// );
/// assert!(!mutator.is_selecting_field("Email"));
///
/// mutator.add_select_fields("Id").add_where_predicates("Name like 'A%'");
/// let query = mutator.as_builder().unwrap().build().unwrap();
/// assert_eq!(
///     query,
///     "select Id, Name, (select Id from Contacts where Email != null) \
///      from Account where Name like 'A%'"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryMutator {
    original: String,
    /// Full clause bodies, sub-query text included.
    clauses: ClauseSlots,
    /// Clause bodies with text at depth > 0 left out.
    top_level: ClauseSlots,
}

impl QueryMutator {
    /// Parses the given query.
    pub fn new(query: impl Into<String>) -> Self {
        let original = query.into();
        let mut clauses = ClauseSlots::default();
        let mut top_level = ClauseSlots::default();

        let tokens = scan(&original);
        let mut current: Option<QueryClause> = None;
        let mut i = 0;
        while i < tokens.len() {
            if let Some((clause, width)) = keyword_at(&tokens, i) {
                clauses[clause.index()].get_or_insert_with(String::new);
                top_level[clause.index()].get_or_insert_with(String::new);
                current = Some(clause);
                i += width;
                continue;
            }

            let token = &tokens[i];
            if let Some(clause) = current {
                append_token(&mut clauses[clause.index()], token.text);
                if token.top_level {
                    append_token(&mut top_level[clause.index()], token.text);
                }
            }
            i += 1;
        }

        Self {
            original,
            clauses,
            top_level,
        }
    }

    /// Returns the query this mutator was created from.
    pub fn original(&self) -> &str {
        &self.original
    }

    /// Returns the body of a clause, or `None` if the query has no such
    /// top-level clause.
    pub fn clause(&self, clause: QueryClause) -> Option<&str> {
        self.clauses[clause.index()].as_deref()
    }

    /// Replaces the select list.
    pub fn replace_select_fields(&mut self, fields: &str) -> &mut Self {
        self.set_clause(QueryClause::Select, fields.trim().to_string());
        self
    }

    /// Prepends fields to the select list.
    pub fn add_select_fields(&mut self, fields: &str) -> &mut Self {
        let fields = fields.trim();
        let body = match self.clause(QueryClause::Select).filter(|s| !s.is_empty()) {
            Some(existing) => format!("{fields}, {existing}"),
            None => fields.to_string(),
        };
        self.set_clause(QueryClause::Select, body);
        self
    }

    /// ANDs predicates with the existing `where` clause, or sets it if the
    /// query has none. The existing clause is parenthesized so an `or` in it
    /// keeps its meaning.
    pub fn add_where_predicates(&mut self, predicates: &str) -> &mut Self {
        let predicates = predicates.trim();
        let body = match self.clause(QueryClause::Where).filter(|s| !s.is_empty()) {
            Some(existing) => format!("({existing}) and {predicates}"),
            None => predicates.to_string(),
        };
        self.set_clause(QueryClause::Where, body);
        self
    }

    /// Replaces the `order by` clause. An empty string removes it.
    pub fn replace_order_by(&mut self, order_by: &str) -> &mut Self {
        let order_by = order_by.trim();
        if order_by.is_empty() {
            self.clauses[QueryClause::OrderBy.index()] = None;
            self.top_level[QueryClause::OrderBy.index()] = None;
        } else {
            self.set_clause(QueryClause::OrderBy, order_by.to_string());
        }
        self
    }

    /// Returns true if the query has a non-empty `order by` clause.
    pub fn has_order_by(&self) -> bool {
        self.clause(QueryClause::OrderBy)
            .is_some_and(|order_by| !order_by.is_empty())
    }

    /// Returns true if the query orders by exactly `fields`, ignoring
    /// whitespace and case.
    pub fn is_ordering_by(&self, fields: &str) -> bool {
        self.clause(QueryClause::OrderBy)
            .is_some_and(|order_by| squash(order_by).eq_ignore_ascii_case(&squash(fields)))
    }

    /// Returns true if the top-level select list contains `field`.
    ///
    /// Fields selected only inside a sub-query do not count.
    pub fn is_selecting_field(&self, field: &str) -> bool {
        let field = field.trim();
        self.top_level[QueryClause::Select.index()]
            .as_deref()
            .is_some_and(|select| {
                select
                    .split(',')
                    .map(str::trim)
                    .any(|selected| selected.eq_ignore_ascii_case(field))
            })
    }

    /// Returns a builder populated with the current clauses.
    ///
    /// Fails if the `limit` or `offset` clause is not an integer.
    pub fn as_builder(&self) -> QueryResult<QueryBuilder> {
        let mut builder = QueryBuilder::new();

        if let Some(select) = self.clause(QueryClause::Select) {
            builder = builder.fields_str(select);
        }
        if let Some(from) = self.clause(QueryClause::From) {
            builder = builder.from(from);
        }
        if let Some(predicate) = self.clause(QueryClause::Where) {
            builder = builder.where_clause(predicate);
        }
        if let Some(group_by) = self.clause(QueryClause::GroupBy) {
            builder = builder.group_by(group_by);
        }
        if let Some(having) = self.clause(QueryClause::Having) {
            builder = builder.having(having);
        }
        if let Some(order_by) = self.clause(QueryClause::OrderBy) {
            builder = builder.order_by(order_by);
        }
        if let Some(limit) = self.clause(QueryClause::Limit) {
            let value = limit.trim().parse::<i64>().map_err(|_| QueryError::InvalidLimit {
                text: limit.to_string(),
            })?;
            builder = builder.limit(value);
        }
        if let Some(offset) = self.clause(QueryClause::Offset) {
            let value = offset
                .trim()
                .parse::<i64>()
                .map_err(|_| QueryError::InvalidOffset {
                    text: offset.to_string(),
                })?;
            builder = builder.offset(value);
        }

        Ok(builder)
    }

    fn set_clause(&mut self, clause: QueryClause, body: String) {
        self.top_level[clause.index()] = Some(top_level_text(&body));
        self.clauses[clause.index()] = Some(body);
    }
}

fn append_token(slot: &mut Option<String>, token: &str) {
    let body = slot.get_or_insert_with(String::new);
    if !body.is_empty() {
        body.push(' ');
    }
    body.push_str(token);
}

fn top_level_text(body: &str) -> String {
    scan(body)
        .iter()
        .filter(|t| t.top_level)
        .map(|t| t.text)
        .collect::<Vec<_>>()
        .join(" ")
}

fn squash(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const NESTED: &str = "select Id, Name, (select Id, LastName from Contacts where LastName != null) \
                          from Account where Name like 'A%' order by Name limit 20 offset 40";

    #[test]
    fn extracts_top_level_clauses() {
        let mutator = QueryMutator::new(NESTED);
        assert_eq!(
            mutator.clause(QueryClause::Select),
            Some("Id, Name, (select Id, LastName from Contacts where LastName != null)")
        );
        assert_eq!(mutator.clause(QueryClause::From), Some("Account"));
        assert_eq!(mutator.clause(QueryClause::Where), Some("Name like 'A%'"));
        assert_eq!(mutator.clause(QueryClause::OrderBy), Some("Name"));
        assert_eq!(mutator.clause(QueryClause::Limit), Some("20"));
        assert_eq!(mutator.clause(QueryClause::Offset), Some("40"));
        assert_eq!(mutator.clause(QueryClause::GroupBy), None);
        assert_eq!(mutator.clause(QueryClause::Having), None);
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let mutator = QueryMutator::new("SELECT Id FROM Account WHERE Name = 'x' GROUP BY Id");
        assert_eq!(mutator.clause(QueryClause::From), Some("Account"));
        assert_eq!(mutator.clause(QueryClause::Where), Some("Name = 'x'"));
        assert_eq!(mutator.clause(QueryClause::GroupBy), Some("Id"));
    }

    #[test]
    fn selecting_field_ignores_subquery() {
        let mutator = QueryMutator::new(NESTED);
        assert!(mutator.is_selecting_field("Id"));
        assert!(mutator.is_selecting_field("name"));
        assert!(!mutator.is_selecting_field("LastName"));
    }

    #[test]
    fn inner_where_is_not_top_level() {
        let mutator = QueryMutator::new(
            "select Id, (select Id from Contacts where Email != null) from Account",
        );
        assert_eq!(mutator.clause(QueryClause::Where), None);
        assert_eq!(mutator.clause(QueryClause::From), Some("Account"));
    }

    #[test]
    fn replace_and_add_select_fields() {
        let mut mutator = QueryMutator::new("select Name from Account");
        mutator.add_select_fields("Id, LastModifiedDate");
        assert_eq!(
            mutator.clause(QueryClause::Select),
            Some("Id, LastModifiedDate, Name")
        );
        assert!(mutator.is_selecting_field("LastModifiedDate"));

        mutator.replace_select_fields("Id");
        assert_eq!(mutator.clause(QueryClause::Select), Some("Id"));
        assert!(!mutator.is_selecting_field("Name"));
    }

    #[test]
    fn added_subquery_is_not_top_level() {
        let mut mutator = QueryMutator::new("select Name from Account");
        mutator.add_select_fields("(select Email from Contacts)");
        assert!(!mutator.is_selecting_field("Email"));
        assert!(mutator.is_selecting_field("Name"));
    }

    #[test]
    fn add_where_predicates() {
        let mut mutator = QueryMutator::new("select Id from Account");
        mutator.add_where_predicates("Name = 'a'");
        assert_eq!(mutator.clause(QueryClause::Where), Some("Name = 'a'"));

        mutator.add_where_predicates("Type = 'b'");
        assert_eq!(
            mutator.clause(QueryClause::Where),
            Some("(Name = 'a') and Type = 'b'")
        );
    }

    #[test]
    fn order_by_operations() {
        let mut mutator = QueryMutator::new("select Id from Account order by Name ,  Id");
        assert!(mutator.has_order_by());
        assert!(mutator.is_ordering_by("Name,Id"));
        assert!(mutator.is_ordering_by(" name , id "));
        assert!(!mutator.is_ordering_by("Name"));

        mutator.replace_order_by("LastModifiedDate");
        assert!(mutator.is_ordering_by("LastModifiedDate"));

        mutator.replace_order_by("");
        assert!(!mutator.has_order_by());
        assert_eq!(
            mutator.as_builder().unwrap().build().as_deref(),
            Some("select Id from Account")
        );
    }

    #[test]
    fn as_builder_round_trip() {
        let mutator = QueryMutator::new(NESTED);
        let rebuilt = mutator.as_builder().unwrap().build().unwrap();
        assert_eq!(rebuilt, NESTED.split_whitespace().collect::<Vec<_>>().join(" "));
    }

    #[test]
    fn as_builder_rejects_bad_limit() {
        let mutator = QueryMutator::new("select Id from Account limit ten");
        assert_eq!(
            mutator.as_builder(),
            Err(QueryError::InvalidLimit { text: "ten".into() })
        );

        let mutator = QueryMutator::new("select Id from Account offset");
        assert!(matches!(
            mutator.as_builder(),
            Err(QueryError::InvalidOffset { .. })
        ));
    }

    #[test]
    fn original_is_kept() {
        let mutator = QueryMutator::new(NESTED);
        assert_eq!(mutator.original(), NESTED);
    }
}
