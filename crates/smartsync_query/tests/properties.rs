//! Property tests for query building and rewriting.

use proptest::prelude::*;
use smartsync_query::{
    add_filter_for_resync, format_timestamp, QueryBuilder, QueryClause, QueryMutator,
};

const RESERVED: [&str; 13] = [
    "select", "from", "where", "having", "limit", "offset", "order", "group", "by", "order_by",
    "group_by", "and", "or",
];

/// Strategy for identifiers that never collide with clause keywords.
fn identifier() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z][a-zA-Z0-9_]{0,8}")
        .expect("Invalid regex")
        .prop_filter("identifier must not be a keyword", |s| {
            !RESERVED.iter().any(|k| s.eq_ignore_ascii_case(k))
        })
}

fn field_list() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(identifier(), 1..5)
}

fn predicate() -> impl Strategy<Value = String> {
    (identifier(), identifier()).prop_map(|(field, value)| format!("{field} = '{value}'"))
}

#[derive(Debug, Clone)]
struct Clauses {
    fields: Vec<String>,
    from: String,
    where_clause: Option<String>,
    group_by: Option<String>,
    order_by: Option<String>,
    limit: i64,
    offset: i64,
}

fn clauses() -> impl Strategy<Value = Clauses> {
    (
        field_list(),
        identifier(),
        prop::option::of(predicate()),
        prop::option::of(identifier()),
        prop::option::of(identifier()),
        0i64..500,
        0i64..500,
    )
        .prop_map(
            |(fields, from, where_clause, group_by, order_by, limit, offset)| Clauses {
                fields,
                from,
                where_clause,
                group_by,
                order_by,
                limit,
                offset,
            },
        )
}

fn build(c: &Clauses) -> String {
    let mut builder = QueryBuilder::with_fields(&c.fields)
        .from(c.from.clone())
        .limit(c.limit)
        .offset(c.offset);
    if let Some(w) = &c.where_clause {
        builder = builder.where_clause(w.clone());
    }
    if let Some(g) = &c.group_by {
        builder = builder.group_by(g.clone());
    }
    if let Some(o) = &c.order_by {
        builder = builder.order_by(o.clone());
    }
    builder.build().expect("fields and from are set")
}

proptest! {
    #[test]
    fn mutator_round_trip(c in clauses()) {
        let query = build(&c);
        let mutator = QueryMutator::new(query.clone());

        prop_assert_eq!(mutator.clause(QueryClause::From), Some(c.from.as_str()));
        prop_assert_eq!(mutator.clause(QueryClause::Where), c.where_clause.as_deref());
        prop_assert_eq!(mutator.clause(QueryClause::GroupBy), c.group_by.as_deref());
        prop_assert_eq!(mutator.clause(QueryClause::OrderBy), c.order_by.as_deref());

        let rebuilt = mutator.as_builder().unwrap().build().unwrap();
        prop_assert_eq!(rebuilt, query);
    }

    #[test]
    fn resync_appends_to_where(
        c in clauses(),
        extra in predicate(),
        ts in 1i64..4_000_000_000_000,
    ) {
        let mut c = c;
        c.where_clause = Some(extra.clone());
        let query = build(&c);

        let rewritten = add_filter_for_resync(&query, "LastModifiedDate", ts);
        let expected = format!("{extra} and LastModifiedDate > {}", format_timestamp(ts).unwrap());
        let mutator = QueryMutator::new(rewritten);
        prop_assert_eq!(mutator.clause(QueryClause::Where), Some(expected.as_str()));
        prop_assert_eq!(mutator.clause(QueryClause::From), Some(c.from.as_str()));
    }

    #[test]
    fn resync_inserts_where_after_from(c in clauses(), ts in 1i64..4_000_000_000_000) {
        let mut c = c;
        c.where_clause = None;
        let query = build(&c);

        let rewritten = add_filter_for_resync(&query, "LastModifiedDate", ts);
        let expected_prefix = format!(
            "select {} from {} where LastModifiedDate > {}",
            c.fields.join(", "),
            c.from,
            format_timestamp(ts).unwrap()
        );
        prop_assert!(rewritten.starts_with(&expected_prefix));

        let mutator = QueryMutator::new(rewritten);
        prop_assert_eq!(mutator.clause(QueryClause::OrderBy), c.order_by.as_deref());
    }

    #[test]
    fn resync_zero_is_identity(c in clauses()) {
        let query = build(&c);
        prop_assert_eq!(add_filter_for_resync(&query, "LastModifiedDate", 0), query);
    }

    #[test]
    fn subquery_where_stays_nested(
        outer in field_list(),
        inner in field_list(),
        relationship in identifier(),
        from in identifier(),
        inner_where in predicate(),
    ) {
        let sub_select = format!(
            "(select {} from {relationship} where {inner_where})",
            inner.join(", ")
        );
        let query = QueryBuilder::with_fields(outer.iter().cloned().chain([sub_select]))
            .from(from.clone())
            .build()
            .unwrap();

        let mutator = QueryMutator::new(query);
        prop_assert_eq!(mutator.clause(QueryClause::Where), None);
        prop_assert_eq!(mutator.clause(QueryClause::From), Some(from.as_str()));
        for field in &outer {
            prop_assert!(mutator.is_selecting_field(field));
        }
        for field in inner.iter().filter(|f| !outer.iter().any(|o| o.eq_ignore_ascii_case(f))) {
            prop_assert!(!mutator.is_selecting_field(field));
        }
    }
}
