//! Filter predicates and SQL rendering for the subjects listing.
//!
//! Predicates are accumulated in a [`FilterBuilder`] and folded with AND only
//! when at least one is present, so "no filters" renders as no WHERE clause
//! rather than a clause that matches nothing. Search terms are bound as
//! parameters; only column names and placeholders are ever spliced into SQL.

/// Escape character used in every rendered `ILIKE ... ESCAPE` clause
pub const LIKE_ESCAPE: char = '\\';

const FROM_SUBJECTS_JOIN_DEPARTMENTS: &str =
    "FROM subjects LEFT JOIN departments ON subjects.department_id = departments.id";

/// Projection used by the page query; the store maps these positions back
/// into a subject with a nested department.
pub const SUBJECT_WITH_DEPARTMENT_COLUMNS: &str = "subjects.id, subjects.department_id, subjects.name, subjects.code, \
     subjects.description, subjects.created_at, subjects.updated_at, \
     departments.id, departments.code, departments.name, departments.description, \
     departments.created_at, departments.updated_at";

/// Columns a listing filter may match against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    SubjectName,
    SubjectCode,
    DepartmentName,
}

impl Column {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Column::SubjectName => "subjects.name",
            Column::SubjectCode => "subjects.code",
            Column::DepartmentName => "departments.name",
        }
    }
}

/// Escape LIKE wildcards so the term matches itself literally.
///
/// The escape character is handled first; escaping it after `%`/`_` would
/// double the backslashes just inserted.
pub fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if c == LIKE_ESCAPE || c == '%' || c == '_' {
            out.push(LIKE_ESCAPE);
        }
        out.push(c);
    }
    out
}

/// `%term%` with the term escaped
pub fn contains_pattern(term: &str) -> String {
    format!("%{}%", escape_like(term))
}

/// Boolean condition over the joined subjects/departments view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Case-insensitive pattern match
    ILike { column: Column, pattern: String },
    Or(Vec<Predicate>),
    And(Vec<Predicate>),
}

impl Predicate {
    /// Case-insensitive "contains" match of `term` on `column`
    pub fn contains(column: Column, term: &str) -> Self {
        Predicate::ILike {
            column,
            pattern: contains_pattern(term),
        }
    }

    /// Render as SQL, appending bound values to `params` and referencing them
    /// by their 1-based position.
    pub fn to_sql(&self, params: &mut Vec<String>) -> String {
        match self {
            Predicate::ILike { column, pattern } => {
                params.push(pattern.clone());
                format!("{} ILIKE ${} ESCAPE '{}'", column.as_sql(), params.len(), LIKE_ESCAPE)
            }
            Predicate::Or(terms) => Self::join(terms, " OR ", params),
            Predicate::And(terms) => Self::join(terms, " AND ", params),
        }
    }

    fn join(terms: &[Predicate], separator: &str, params: &mut Vec<String>) -> String {
        let rendered: Vec<String> = terms.iter().map(|t| t.to_sql(params)).collect();
        format!("({})", rendered.join(separator))
    }
}

/// Accumulates predicates that all have to hold
#[derive(Debug, Default)]
pub struct FilterBuilder {
    predicates: Vec<Predicate>,
}

impl FilterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, predicate: Predicate) -> &mut Self {
        self.predicates.push(predicate);
        self
    }

    /// `None` when nothing was pushed, the lone predicate when one was,
    /// otherwise their conjunction.
    pub fn build(mut self) -> Option<Predicate> {
        match self.predicates.len() {
            0 => None,
            1 => self.predicates.pop(),
            _ => Some(Predicate::And(self.predicates)),
        }
    }
}

/// SQL text plus its positional parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<String>,
}

/// Validated search/department filter for the subjects listing
#[derive(Debug, Clone, Default)]
pub struct SubjectFilter {
    search: Option<String>,
    department: Option<String>,
    predicate: Option<Predicate>,
}

impl SubjectFilter {
    pub fn new(search: Option<&str>, department: Option<&str>) -> Self {
        let search = non_blank(search);
        let department = non_blank(department);

        let mut builder = FilterBuilder::new();
        if let Some(term) = &search {
            builder.push(Predicate::Or(vec![
                Predicate::contains(Column::SubjectName, term),
                Predicate::contains(Column::SubjectCode, term),
            ]));
        }
        if let Some(term) = &department {
            builder.push(Predicate::contains(Column::DepartmentName, term));
        }

        Self {
            search,
            department,
            predicate: builder.build(),
        }
    }

    pub fn search(&self) -> Option<&str> {
        self.search.as_deref()
    }

    pub fn department(&self) -> Option<&str> {
        self.department.as_deref()
    }

    fn where_clause(&self, params: &mut Vec<String>) -> String {
        match &self.predicate {
            Some(p) => format!(" WHERE {}", p.to_sql(params)),
            None => String::new(),
        }
    }

    /// Total number of matching rows
    pub fn count_statement(&self) -> Statement {
        let mut params = Vec::new();
        let where_clause = self.where_clause(&mut params);
        Statement {
            sql: format!("SELECT COUNT(*) {}{}", FROM_SUBJECTS_JOIN_DEPARTMENTS, where_clause),
            params,
        }
    }

    /// One page of matching rows, newest first. LIMIT and OFFSET are the last
    /// two placeholders and are bound by the caller after `params`.
    pub fn page_statement(&self) -> Statement {
        let mut params = Vec::new();
        let where_clause = self.where_clause(&mut params);
        let limit_idx = params.len() + 1;
        Statement {
            sql: format!(
                "SELECT {} {}{} ORDER BY subjects.created_at DESC, subjects.id DESC LIMIT ${} OFFSET ${}",
                SUBJECT_WITH_DEPARTMENT_COLUMNS,
                FROM_SUBJECTS_JOIN_DEPARTMENTS,
                where_clause,
                limit_idx,
                limit_idx + 1
            ),
            params,
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
