//! Query builder.

/// Builds a query from structured clauses.
///
/// The emitted clause order is always
/// `select, from, where, group by, having, order by, limit, offset`,
/// whatever order the setters were called in.
///
/// # Example
///
/// ```
/// use smartsync_query::QueryBuilder;
///
/// let query = QueryBuilder::with_fields(["Id", "Name"])
///     .from("Account")
///     .where_clause("Name like 'A%'")
///     .limit(10)
///     .build();
///
/// assert_eq!(
///     query.as_deref(),
///     Some("select Id, Name from Account where Name like 'A%' limit 10")
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryBuilder {
    fields: Option<String>,
    from: Option<String>,
    where_clause: Option<String>,
    group_by: Option<String>,
    having: Option<String>,
    order_by: Option<String>,
    limit: i64,
    offset: i64,
}

impl QueryBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder selecting the given fields.
    #[must_use]
    pub fn with_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new().fields(fields)
    }

    /// Creates a builder from an already joined select list.
    #[must_use]
    pub fn with_fields_str(fields: impl Into<String>) -> Self {
        Self::new().fields_str(fields)
    }

    /// Sets the select list, joining the fields with `", "`.
    #[must_use]
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = fields
            .into_iter()
            .map(|f| f.as_ref().trim().to_string())
            .filter(|f| !f.is_empty())
            .collect::<Vec<_>>()
            .join(", ");
        self.fields = Some(joined);
        self
    }

    /// Sets the select list verbatim.
    #[must_use]
    pub fn fields_str(mut self, fields: impl Into<String>) -> Self {
        self.fields = Some(fields.into());
        self
    }

    /// Sets the `from` clause.
    #[must_use]
    pub fn from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    /// Sets the `where` clause.
    #[must_use]
    pub fn where_clause(mut self, predicate: impl Into<String>) -> Self {
        self.where_clause = Some(predicate.into());
        self
    }

    /// Sets the `group by` clause.
    #[must_use]
    pub fn group_by(mut self, group_by: impl Into<String>) -> Self {
        self.group_by = Some(group_by.into());
        self
    }

    /// Sets the `having` clause.
    #[must_use]
    pub fn having(mut self, having: impl Into<String>) -> Self {
        self.having = Some(having.into());
        self
    }

    /// Sets the `order by` clause.
    #[must_use]
    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    /// Sets the `limit` clause. Values `<= 0` are omitted from the query.
    #[must_use]
    pub const fn limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the `offset` clause. Values `<= 0` are omitted from the query.
    #[must_use]
    pub const fn offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    /// Builds the query.
    ///
    /// Returns `None` if the select list or the `from` clause is missing or
    /// blank.
    pub fn build(&self) -> Option<String> {
        let fields = non_blank(&self.fields)?;
        let from = non_blank(&self.from)?;

        let mut query = format!("select {fields} from {from}");

        if let Some(predicate) = non_blank(&self.where_clause) {
            query.push_str(" where ");
            query.push_str(predicate);
        }
        if let Some(group_by) = non_blank(&self.group_by) {
            query.push_str(" group by ");
            query.push_str(group_by);
        }
        if let Some(having) = non_blank(&self.having) {
            query.push_str(" having ");
            query.push_str(having);
        }
        if let Some(order_by) = non_blank(&self.order_by) {
            query.push_str(" order by ");
            query.push_str(order_by);
        }
        if self.limit > 0 {
            query.push_str(&format!(" limit {}", self.limit));
        }
        if self.offset > 0 {
            query.push_str(&format!(" offset {}", self.offset));
        }

        Some(query)
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
