use diesel::pg::{Pg, PgConnection};
use diesel::prelude::*;
use diesel::result::Error as DieselError;
use diesel::sql_query;
use diesel::sql_types::BigInt;
use diesel::sqlite::{Sqlite, SqliteConnection};

/// Row types loadable through [`CourseDb::load_rows`] on every supported backend.
pub trait DbRow: QueryableByName<Pg> + QueryableByName<Sqlite> + 'static {}

impl<T> DbRow for T where T: QueryableByName<Pg> + QueryableByName<Sqlite> + 'static {}

/// Minimal connection surface used by ordering and catalog operations.
///
/// Implemented for Postgres (production) and SQLite (tests) so the same SQL
/// paths are exercised by both.
pub trait CourseDb {
    fn execute_sql(&mut self, sql: &str) -> Result<usize, DieselError>;
    fn load_rows<R: DbRow>(&mut self, sql: &str) -> Result<Vec<R>, DieselError>;
    /// Runs `f` inside one transaction; any `Err` rolls the whole scope back.
    fn in_transaction<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: From<DieselError>;
}

impl CourseDb for PgConnection {
    fn execute_sql(&mut self, sql: &str) -> Result<usize, DieselError> {
        sql_query(sql).execute(self)
    }

    fn load_rows<R: DbRow>(&mut self, sql: &str) -> Result<Vec<R>, DieselError> {
        sql_query(sql).load::<R>(self)
    }

    fn in_transaction<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: From<DieselError>,
    {
        self.transaction(f)
    }
}

impl CourseDb for SqliteConnection {
    fn execute_sql(&mut self, sql: &str) -> Result<usize, DieselError> {
        sql_query(sql).execute(self)
    }

    fn load_rows<R: DbRow>(&mut self, sql: &str) -> Result<Vec<R>, DieselError> {
        sql_query(sql).load::<R>(self)
    }

    fn in_transaction<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: From<DieselError>,
    {
        self.transaction(f)
    }
}

#[doc(hidden)]
#[derive(Debug, QueryableByName)]
#[diesel(check_for_backend(diesel::pg::Pg, diesel::sqlite::Sqlite))]
pub struct IdRow {
    #[diesel(sql_type = BigInt)]
    pub id: i64,
}

#[doc(hidden)]
#[derive(Debug, QueryableByName)]
#[diesel(check_for_backend(diesel::pg::Pg, diesel::sqlite::Sqlite))]
pub struct CountRow {
    #[diesel(sql_type = BigInt)]
    pub count: i64,
}

/// Returns the single id produced by an `INSERT ... RETURNING ... AS id`.
pub(crate) fn insert_returning<C: CourseDb>(conn: &mut C, sql: &str) -> Result<i64, DieselError> {
    conn.load_rows::<IdRow>(sql)?
        .pop()
        .map(|row| row.id)
        .ok_or(DieselError::NotFound)
}

pub(crate) fn count<C: CourseDb>(conn: &mut C, sql: &str) -> Result<i64, DieselError> {
    Ok(conn
        .load_rows::<CountRow>(sql)?
        .pop()
        .map(|row| row.count)
        .unwrap_or(0))
}
