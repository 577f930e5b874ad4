//! Filter predicates, ordering and pagination
//!
//! Everything here is pure: a [`Predicate`] is built from optional filter
//! values and rendered to a SQL `WHERE` fragment plus bind values for a given
//! placeholder dialect. Listing and purging share the same predicate, so a
//! delete removes exactly the rows a list with the same filters shows.

use crate::error::RecordError;

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Bind placeholder dialect of a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// `?` (SQLite)
    Question,
    /// `$1`, `$2`, ... (PostgreSQL)
    Dollar,
}

impl Placeholder {
    /// Render the placeholder for the 1-based bind position `n`
    pub fn render(self, n: usize) -> String {
        match self {
            Placeholder::Question => "?".to_string(),
            Placeholder::Dollar => format!("${}", n),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clause {
    /// `column = value`
    Equals { column: &'static str, value: String },
    /// `column LIKE %value%`, matched literally
    Contains { column: &'static str, value: String },
    /// `id <= anchor`, pins a listing to the rows that existed when it started
    IdAtMost(i64),
}

/// Conjunction of clauses. No clauses means every row matches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Predicate {
    clauses: Vec<Clause>,
}

impl Predicate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Constrain `column` to equal `value`. Absent or empty values add nothing.
    pub fn eq(mut self, column: &'static str, value: Option<&str>) -> Self {
        if let Some(value) = present(value) {
            self.clauses.push(Clause::Equals {
                column,
                value: value.to_string(),
            });
        }
        self
    }

    /// Constrain `column` to contain `value`. Absent or empty values add nothing.
    pub fn contains(mut self, column: &'static str, value: Option<&str>) -> Self {
        if let Some(value) = present(value) {
            self.clauses.push(Clause::Contains {
                column,
                value: value.to_string(),
            });
        }
        self
    }

    /// Exclude rows created after the row with id `anchor`
    pub fn id_at_most(mut self, anchor: i64) -> Self {
        self.clauses.push(Clause::IdAtMost(anchor));
        self
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Render as ` WHERE ...` (or an empty string) and the values to bind, in order.
    ///
    /// Column names come from code, never from input; text values only ever
    /// travel as bind parameters.
    pub fn to_sql(&self, placeholder: Placeholder) -> (String, Vec<String>) {
        if self.clauses.is_empty() {
            return (String::new(), Vec::new());
        }

        let mut parts = Vec::with_capacity(self.clauses.len());
        let mut binds = Vec::with_capacity(self.clauses.len());

        for clause in &self.clauses {
            let n = binds.len() + 1;
            match clause {
                Clause::Equals { column, value } => {
                    parts.push(format!("{} = {}", column, placeholder.render(n)));
                    binds.push(value.clone());
                }
                Clause::Contains { column, value } => {
                    parts.push(format!(
                        "{} LIKE {} ESCAPE '\\'",
                        column,
                        placeholder.render(n)
                    ));
                    binds.push(format!("%{}%", escape_like(value)));
                }
                Clause::IdAtMost(anchor) => {
                    parts.push(format!("id <= {}", anchor));
                }
            }
        }

        (format!(" WHERE {}", parts.join(" AND ")), binds)
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Escape LIKE wildcards so user text matches literally
fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Ordering on the record id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    Asc,
    #[default]
    Desc,
}

impl Order {
    /// Exactly `"asc"` selects ascending; anything else, including nothing, is descending.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("asc") => Order::Asc,
            _ => Order::Desc,
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        }
    }
}

/// 1-based page window
///
/// Offset paging in descending order shifts when rows are inserted between
/// two fetches. A listing returns the newest matching id as its anchor;
/// passing it back with the following pages keeps them on the same snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: i64,
    pub size: i64,
    pub anchor: Option<i64>,
}

impl Page {
    pub fn new(number: i64, size: i64) -> Self {
        Self {
            number,
            size,
            anchor: None,
        }
    }

    pub fn anchored(self, anchor: i64) -> Self {
        Self {
            anchor: Some(anchor),
            ..self
        }
    }

    /// Parse raw query values. A missing, unparsable or non-positive page
    /// number is rejected; a bad page size falls back to the default.
    pub fn parse(number: Option<&str>, size: Option<&str>) -> Result<Self, RecordError> {
        let raw = number.unwrap_or("").trim();
        let number: i64 = raw
            .parse()
            .map_err(|_| RecordError::InvalidPage(raw.to_string()))?;
        if number < 1 {
            return Err(RecordError::InvalidPage(raw.to_string()));
        }

        Ok(Self::new(number, effective_page_size(size)))
    }

    /// Attach an anchor from a raw query value. Empty means none.
    pub fn with_anchor(self, raw: Option<&str>) -> Result<Self, RecordError> {
        match raw.map(str::trim).filter(|s| !s.is_empty()) {
            None => Ok(self),
            Some(s) => s
                .parse::<i64>()
                .map(|anchor| self.anchored(anchor))
                .map_err(|_| RecordError::InvalidAnchor(s.to_string())),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.number - 1).saturating_mul(self.size)
    }

    pub fn limit(&self) -> i64 {
        self.size
    }
}

/// Page size in `(0, MAX_PAGE_SIZE)` is used as given; anything else is the default.
pub fn effective_page_size(raw: Option<&str>) -> i64 {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|n| *n > 0 && *n < MAX_PAGE_SIZE)
        .unwrap_or(DEFAULT_PAGE_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_and_empty_values_add_no_clause() {
        let predicate = Predicate::new()
            .eq("flag", None)
            .eq("method", Some(""))
            .contains("uri", None);

        assert!(predicate.is_empty());
        assert_eq!(predicate.to_sql(Placeholder::Question), (String::new(), vec![]));
    }

    #[test]
    fn test_clauses_render_in_order_per_dialect() {
        let predicate = Predicate::new()
            .eq("flag", Some("abc123"))
            .contains("uri", Some("/x"))
            .eq("remote_ip", Some("10.0.0.1"));

        let (sqlite, binds) = predicate.to_sql(Placeholder::Question);
        assert_eq!(
            sqlite,
            " WHERE flag = ? AND uri LIKE ? ESCAPE '\\' AND remote_ip = ?"
        );
        assert_eq!(binds, vec!["abc123", "%/x%", "10.0.0.1"]);

        let (pg, _) = predicate.to_sql(Placeholder::Dollar);
        assert_eq!(
            pg,
            " WHERE flag = $1 AND uri LIKE $2 ESCAPE '\\' AND remote_ip = $3"
        );
    }

    #[test]
    fn test_contains_escapes_wildcards() {
        let predicate = Predicate::new().contains("uri", Some("50%_off\\"));
        let (_, binds) = predicate.to_sql(Placeholder::Question);
        assert_eq!(binds, vec!["%50\\%\\_off\\\\%"]);
    }

    #[test]
    fn test_injection_text_stays_a_bind_value() {
        let predicate = Predicate::new().eq("flag", Some("x' OR '1'='1"));
        let (sql, binds) = predicate.to_sql(Placeholder::Dollar);
        assert_eq!(sql, " WHERE flag = $1");
        assert_eq!(binds, vec!["x' OR '1'='1"]);
    }

    #[test]
    fn test_anchor_renders_inline() {
        let predicate = Predicate::new().eq("method", Some("GET")).id_at_most(42);
        let (sql, binds) = predicate.to_sql(Placeholder::Dollar);
        assert_eq!(sql, " WHERE method = $1 AND id <= 42");
        assert_eq!(binds, vec!["GET"]);
    }

    #[test]
    fn test_order_defaults_to_desc() {
        assert_eq!(Order::parse(None), Order::Desc);
        assert_eq!(Order::parse(Some("")), Order::Desc);
        assert_eq!(Order::parse(Some("random")), Order::Desc);
        assert_eq!(Order::parse(Some("asc")), Order::Asc);
        assert_eq!(Order::parse(Some("ASC")), Order::Desc);
    }

    #[test]
    fn test_page_size_bounds() {
        assert_eq!(effective_page_size(None), DEFAULT_PAGE_SIZE);
        assert_eq!(effective_page_size(Some("")), DEFAULT_PAGE_SIZE);
        assert_eq!(effective_page_size(Some("abc")), DEFAULT_PAGE_SIZE);
        assert_eq!(effective_page_size(Some("0")), DEFAULT_PAGE_SIZE);
        assert_eq!(effective_page_size(Some("-5")), DEFAULT_PAGE_SIZE);
        assert_eq!(effective_page_size(Some("100")), DEFAULT_PAGE_SIZE);
        assert_eq!(effective_page_size(Some("250")), DEFAULT_PAGE_SIZE);

        for n in 1..MAX_PAGE_SIZE {
            assert_eq!(effective_page_size(Some(&n.to_string())), n);
        }
    }

    #[test]
    fn test_page_parsing() {
        let page = Page::parse(Some("3"), Some("20")).unwrap();
        assert_eq!(page.offset(), 40);
        assert_eq!(page.limit(), 20);

        assert!(matches!(Page::parse(None, None), Err(RecordError::InvalidPage(_))));
        assert!(matches!(Page::parse(Some("one"), None), Err(RecordError::InvalidPage(_))));
        assert!(matches!(Page::parse(Some("0"), None), Err(RecordError::InvalidPage(_))));
        assert_eq!(Page::parse(Some("1"), Some("500")).unwrap().size, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_anchor_parsing() {
        let page = Page::new(2, 10);
        assert_eq!(page.with_anchor(None).unwrap().anchor, None);
        assert_eq!(page.with_anchor(Some("")).unwrap().anchor, None);
        assert_eq!(page.with_anchor(Some("17")).unwrap().anchor, Some(17));
        assert!(matches!(
            page.with_anchor(Some("latest")),
            Err(RecordError::InvalidAnchor(_))
        ));
    }
}
