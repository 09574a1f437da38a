//! SQL text builders shared by the ordering manager and the catalog.
//!
//! Statements are rendered as literal SQL with quoted values, the same way on
//! Postgres and SQLite, so one code path serves production and the test harness.
//! Identifiers only ever come from `'static` descriptors, never from requests.

/// A single payload value destined for one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnValue {
    Text(String),
    Int(i64),
    Bool(bool),
    Null,
}

impl ColumnValue {
    pub fn to_sql_literal(&self) -> String {
        match self {
            ColumnValue::Text(value) => quote(value),
            ColumnValue::Int(value) => value.to_string(),
            ColumnValue::Bool(true) => "TRUE".to_string(),
            ColumnValue::Bool(false) => "FALSE".to_string(),
            ColumnValue::Null => "NULL".to_string(),
        }
    }
}

impl From<String> for ColumnValue {
    fn from(value: String) -> Self {
        ColumnValue::Text(value)
    }
}

impl From<&str> for ColumnValue {
    fn from(value: &str) -> Self {
        ColumnValue::Text(value.to_string())
    }
}

impl From<i64> for ColumnValue {
    fn from(value: i64) -> Self {
        ColumnValue::Int(value)
    }
}

impl From<bool> for ColumnValue {
    fn from(value: bool) -> Self {
        ColumnValue::Bool(value)
    }
}

impl<T> From<Option<T>> for ColumnValue
where
    T: Into<ColumnValue>,
{
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(ColumnValue::Null)
    }
}

/// Ordered `(column, value)` pairs for inserts and partial updates.
pub type Columns = Vec<(&'static str, ColumnValue)>;

/// Name of the first text column whose value contains a NUL byte.
///
/// Neither backend accepts NUL inside a SQL text literal.
pub fn first_nul_column<'a>(columns: &[(&'a str, ColumnValue)]) -> Option<&'a str> {
    columns.iter().find_map(|(name, value)| match value {
        ColumnValue::Text(text) if text.contains('\0') => Some(*name),
        _ => None,
    })
}

pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// `INSERT ... RETURNING <id_column> AS id`. Both backends support `RETURNING`.
pub fn insert_returning_id(table: &str, id_column: &str, columns: &[(&str, ColumnValue)]) -> String {
    let names = columns
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ");
    let values = columns
        .iter()
        .map(|(_, value)| value.to_sql_literal())
        .collect::<Vec<_>>()
        .join(", ");

    format!("INSERT INTO {table} ({names}) VALUES ({values}) RETURNING {id_column} AS id")
}

/// `UPDATE ... SET ... WHERE <id_column> = id`, or `None` for an empty patch.
pub fn update_by_id(
    table: &str,
    id_column: &str,
    id: i64,
    columns: &[(&str, ColumnValue)],
) -> Option<String> {
    if columns.is_empty() {
        return None;
    }

    let assignments = columns
        .iter()
        .map(|(name, value)| format!("{name} = {}", value.to_sql_literal()))
        .collect::<Vec<_>>()
        .join(", ");

    Some(format!(
        "UPDATE {table} SET {assignments} WHERE {id_column} = {id}"
    ))
}

pub fn delete_by_id(table: &str, id_column: &str, id: i64) -> String {
    format!("DELETE FROM {table} WHERE {id_column} = {id}")
}

pub fn count_by_id(table: &str, id_column: &str, id: i64) -> String {
    format!("SELECT COUNT(*) AS count FROM {table} WHERE {id_column} = {id}")
}
