pub mod schema;

use color_eyre::{eyre::eyre, Result};
use rusqlite::Connection;
use std::path::Path;

/// Database connection wrapper for the day store
pub struct Database {
  conn: Connection,
}

impl Database {
  /// Open or create the database at `path`
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create database directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open database at {}: {}", path.display(), e))?;

    let db = Self { conn };
    db.run_migrations()?;

    Ok(db)
  }

  /// Open a private in-memory database
  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;

    let db = Self { conn };
    db.run_migrations()?;

    Ok(db)
  }

  /// Create the schema on a fresh database and refuse unknown versions
  fn run_migrations(&self) -> Result<()> {
    let version = self.user_version()?;
    if version != 0 && version != schema::SCHEMA_VERSION {
      return Err(eyre!(
        "Unsupported database schema version {} (expected {})",
        version,
        schema::SCHEMA_VERSION
      ));
    }

    self
      .conn
      .execute_batch(schema::SCHEMA)
      .map_err(|e| eyre!("Failed to run migrations: {}", e))?;
    Ok(())
  }

  fn user_version(&self) -> Result<i32> {
    self
      .conn
      .query_row("PRAGMA user_version", [], |row| row.get(0))
      .map_err(|e| eyre!("Failed to read schema version: {}", e))
  }

  /// Get a reference to the connection
  pub fn conn(&self) -> &Connection {
    &self.conn
  }

  /// Get a mutable reference to the connection, needed to open transactions
  pub fn conn_mut(&mut self) -> &mut Connection {
    &mut self.conn
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_fresh_database_gets_current_version() {
    let db = Database::open_in_memory().unwrap();
    assert_eq!(db.user_version().unwrap(), schema::SCHEMA_VERSION);
  }

  #[test]
  fn test_reopen_keeps_data() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("days.db");

    {
      let db = Database::open(&path).unwrap();
      db.conn()
        .execute("INSERT INTO joke_pages (id) VALUES (1)", [])
        .unwrap();
    }

    let db = Database::open(&path).unwrap();
    let count: i64 = db
      .conn()
      .query_row("SELECT COUNT(*) FROM joke_pages", [], |row| row.get(0))
      .unwrap();
    assert_eq!(count, 1);
  }

  #[test]
  fn test_newer_schema_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("days.db");
    {
      let conn = Connection::open(&path).unwrap();
      conn.execute_batch("PRAGMA user_version = 2;").unwrap();
    }

    assert!(Database::open(&path).is_err());
  }

  #[test]
  fn test_page_zero_is_rejected() {
    let db = Database::open_in_memory().unwrap();
    let result = db
      .conn()
      .execute("INSERT INTO joke_pages (id) VALUES (0)", []);
    assert!(result.is_err());
  }
}
