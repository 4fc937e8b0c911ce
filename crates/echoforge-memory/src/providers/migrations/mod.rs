//! Durable provider database migrations
//!
//! SQL migrations are embedded as strings and executed when the provider opens.

use rusqlite::Connection;

/// Schema version written by this crate
pub const SCHEMA_VERSION: i64 = 1;

/// Memory entries table SQL (001)
pub const MEMORY_ENTRIES_SQL: &str = include_str!("001_memory_entries.sql");

/// Run all migrations and return the schema version found in the database.
pub fn run_migrations(conn: &Connection) -> rusqlite::Result<i64> {
    conn.execute_batch(MEMORY_ENTRIES_SQL)?;
    conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_repeatable() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(run_migrations(&conn).unwrap(), SCHEMA_VERSION);
        assert_eq!(run_migrations(&conn).unwrap(), SCHEMA_VERSION);

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }
}
