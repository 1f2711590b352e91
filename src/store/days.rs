//! SQLite-backed storage for days, jokes and joke pages.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension, Row, Transaction};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::db::Database;
use crate::jokes::types::{Day, DayWithJoke, Joke, JokePage, JokePageWithJokes};

const DAY_WITH_JOKE_COLUMNS: &str = "d.date, d.joke_id, d.viewed, j.joke, j.page";

/// Durable store for the day sequence.
///
/// Every write goes through [`DayStore::transaction`], so commits are
/// serialized by the connection lock and either apply fully or not at all.
pub struct DayStore {
  db: Mutex<Database>,
}

impl DayStore {
  /// Open or create the store at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    Ok(Self {
      db: Mutex::new(Database::open(path)?),
    })
  }

  /// Open a private in-memory store.
  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    Ok(Self {
      db: Mutex::new(Database::open_in_memory()?),
    })
  }

  fn lock(&self) -> Result<MutexGuard<'_, Database>> {
    self.db.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  /// Run `f` inside one SQLite transaction.
  ///
  /// The transaction commits only if `f` returns `Ok`; any error rolls back
  /// everything written through the handle.
  pub fn transaction<T, F>(&self, f: F) -> Result<T>
  where
    F: FnOnce(&StoreTransaction<'_>) -> Result<T>,
  {
    let mut db = self.lock()?;
    let tx = db
      .conn_mut()
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    let writer = StoreTransaction { tx };
    let value = f(&writer)?;

    writer
      .tx
      .commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(value)
  }

  /// Get a page and the jokes currently assigned to it.
  #[cfg_attr(not(test), allow(dead_code))]
  pub fn page_by_id(&self, id: u32) -> Result<Option<JokePageWithJokes>> {
    let db = self.lock()?;
    let exists = db
      .conn()
      .query_row("SELECT id FROM joke_pages WHERE id = ?", params![id], |row| {
        row.get::<_, u32>(0)
      })
      .optional()
      .map_err(|e| eyre!("Failed to query page {}: {}", id, e))?;

    match exists {
      Some(id) => Ok(Some(JokePageWithJokes {
        page: JokePage { id },
        jokes: Self::jokes_for_page(&db, id)?,
      })),
      None => Ok(None),
    }
  }

  /// Get the page with the highest id.
  pub fn last_page(&self) -> Result<Option<JokePageWithJokes>> {
    let db = self.lock()?;
    let last = db
      .conn()
      .query_row(
        "SELECT id FROM joke_pages ORDER BY id DESC LIMIT 1",
        [],
        |row| row.get::<_, u32>(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to query last page: {}", e))?;

    match last {
      Some(id) => Ok(Some(JokePageWithJokes {
        page: JokePage { id },
        jokes: Self::jokes_for_page(&db, id)?,
      })),
      None => Ok(None),
    }
  }

  fn jokes_for_page(db: &Database, id: u32) -> Result<Vec<Joke>> {
    let mut stmt = db
      .conn()
      .prepare("SELECT id, joke, page FROM jokes WHERE page = ? ORDER BY joke, id")
      .map_err(|e| eyre!("Failed to prepare joke query: {}", e))?;

    let jokes = stmt
      .query_map(params![id], |row| {
        Ok(Joke {
          id: row.get(0)?,
          text: row.get(1)?,
          page: row.get(2)?,
        })
      })
      .map_err(|e| eyre!("Failed to query jokes for page {}: {}", id, e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read jokes for page {}: {}", id, e))?;

    Ok(jokes)
  }

  /// Most recent days first.
  pub fn most_recent_days(&self, limit: usize) -> Result<Vec<DayWithJoke>> {
    self.query_days(
      &format!(
        "SELECT {DAY_WITH_JOKE_COLUMNS} FROM days d
         INNER JOIN jokes j ON j.id = d.joke_id
         ORDER BY d.date DESC
         LIMIT ?"
      ),
      params![limit as i64],
    )
  }

  /// Days in ascending order, starting at `date` (inclusive).
  pub fn days_from(&self, date: &str, limit: usize) -> Result<Vec<DayWithJoke>> {
    self.query_days(
      &format!(
        "SELECT {DAY_WITH_JOKE_COLUMNS} FROM days d
         INNER JOIN jokes j ON j.id = d.joke_id
         WHERE d.date >= ?
         ORDER BY d.date ASC
         LIMIT ?"
      ),
      params![date, limit as i64],
    )
  }

  /// One page of the ascending day list, for display.
  pub fn days_page(&self, offset: usize, limit: usize) -> Result<Vec<DayWithJoke>> {
    self.query_days(
      &format!(
        "SELECT {DAY_WITH_JOKE_COLUMNS} FROM days d
         INNER JOIN jokes j ON j.id = d.joke_id
         ORDER BY d.date ASC
         LIMIT ? OFFSET ?"
      ),
      params![limit as i64, offset as i64],
    )
  }

  pub fn day(&self, date: &str) -> Result<Option<DayWithJoke>> {
    let mut days = self.query_days(
      &format!(
        "SELECT {DAY_WITH_JOKE_COLUMNS} FROM days d
         INNER JOIN jokes j ON j.id = d.joke_id
         WHERE d.date = ?"
      ),
      params![date],
    )?;
    Ok(days.pop())
  }

  fn query_days(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<DayWithJoke>> {
    let db = self.lock()?;
    let mut stmt = db
      .conn()
      .prepare(sql)
      .map_err(|e| eyre!("Failed to prepare day query: {}", e))?;

    let days = stmt
      .query_map(params, row_to_day_with_joke)
      .map_err(|e| eyre!("Failed to query days: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read days: {}", e))?;

    Ok(days)
  }

  pub fn first_day(&self) -> Result<Option<Day>> {
    self.edge_day("ASC")
  }

  pub fn last_day(&self) -> Result<Option<Day>> {
    self.edge_day("DESC")
  }

  fn edge_day(&self, order: &str) -> Result<Option<Day>> {
    let db = self.lock()?;
    db.conn()
      .query_row(
        &format!("SELECT date, joke_id, viewed FROM days ORDER BY date {order} LIMIT 1"),
        [],
        |row| {
          Ok(Day {
            date: row.get(0)?,
            joke_id: row.get(1)?,
            viewed: row.get(2)?,
          })
        },
      )
      .optional()
      .map_err(|e| eyre!("Failed to query day bounds: {}", e))
  }

  pub fn count_days(&self) -> Result<usize> {
    self.count("days")
  }

  pub fn count_pages(&self) -> Result<usize> {
    self.count("joke_pages")
  }

  fn count(&self, table: &str) -> Result<usize> {
    let db = self.lock()?;
    let count: i64 = db
      .conn()
      .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
        row.get(0)
      })
      .map_err(|e| eyre!("Failed to count {}: {}", table, e))?;
    Ok(count as usize)
  }

  /// Flag a day as viewed. Returns false when no such day is stored.
  pub fn mark_viewed(&self, date: &str) -> Result<bool> {
    let db = self.lock()?;
    let changed = db
      .conn()
      .execute("UPDATE days SET viewed = 1 WHERE date = ?", params![date])
      .map_err(|e| eyre!("Failed to mark {} viewed: {}", date, e))?;
    Ok(changed > 0)
  }
}

/// Write handle valid for the duration of one [`DayStore::transaction`].
pub struct StoreTransaction<'a> {
  tx: Transaction<'a>,
}

impl StoreTransaction<'_> {
  /// Insert jokes, replacing text and page of any that already exist.
  pub fn upsert_jokes(&self, jokes: &[Joke]) -> Result<()> {
    let mut stmt = self
      .tx
      .prepare_cached(
        "INSERT INTO jokes (id, joke, page) VALUES (?1, ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET
             joke = excluded.joke,
             page = excluded.page",
      )
      .map_err(|e| eyre!("Failed to prepare joke upsert: {}", e))?;

    for joke in jokes {
      stmt
        .execute(params![joke.id, joke.text, joke.page])
        .map_err(|e| eyre!("Failed to store joke {}: {}", joke.id, e))?;
    }
    Ok(())
  }

  /// Insert pages that are not stored yet. Returns how many were new.
  pub fn insert_pages_if_absent(&self, pages: &[JokePage]) -> Result<usize> {
    let mut stmt = self
      .tx
      .prepare_cached("INSERT OR IGNORE INTO joke_pages (id) VALUES (?)")
      .map_err(|e| eyre!("Failed to prepare page insert: {}", e))?;

    let mut inserted = 0;
    for page in pages {
      inserted += stmt
        .execute(params![page.id])
        .map_err(|e| eyre!("Failed to store page {}: {}", page.id, e))?;
    }
    Ok(inserted)
  }

  /// Insert days whose date is not taken yet. Returns how many were new.
  pub fn insert_days_if_absent(&self, days: &[Day]) -> Result<usize> {
    let mut stmt = self
      .tx
      .prepare_cached("INSERT OR IGNORE INTO days (date, joke_id, viewed) VALUES (?1, ?2, ?3)")
      .map_err(|e| eyre!("Failed to prepare day insert: {}", e))?;

    let mut inserted = 0;
    for day in days {
      inserted += stmt
        .execute(params![day.date, day.joke_id, day.viewed])
        .map_err(|e| eyre!("Failed to store day {}: {}", day.date, e))?;
    }
    Ok(inserted)
  }
}

fn row_to_day_with_joke(row: &Row) -> rusqlite::Result<DayWithJoke> {
  let joke_id: String = row.get(1)?;
  Ok(DayWithJoke {
    day: Day {
      date: row.get(0)?,
      joke_id: joke_id.clone(),
      viewed: row.get(2)?,
    },
    joke: Joke {
      id: joke_id,
      text: row.get(3)?,
      page: row.get(4)?,
    },
  })
}
