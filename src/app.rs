use crate::config::Config;
use crate::jokes::types::DayWithJoke;
use crate::jokes::JokeClient;
use crate::paging::{DayCalendar, DayFeed, MediatorResult, PaginationMediator};
use crate::store::progress::{TOTAL_JOKES, TOTAL_PAGES};
use crate::store::{DayStore, ProgressCache};
use clap::Subcommand;
use color_eyre::{eyre::eyre, Report, Result};
use futures::StreamExt;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info_span};

const DATABASE_FILE: &str = "days.db";
const PREFERENCES_FILE: &str = "preferences.json";

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
  /// Show the joke for today, loading it first if needed
  Today,
  /// Load more days after the last stored day
  Next {
    /// Number of pages to load
    #[arg(short, long, default_value_t = 1)]
    pages: u32,
  },
  /// Load more days before the first stored day
  Prev {
    /// Number of pages to load
    #[arg(short, long, default_value_t = 1)]
    pages: u32,
  },
  /// Print stored days in date order, loading more when they run out
  List {
    /// First date to print (YYYY-MM-DD)
    #[arg(short, long)]
    from: Option<String>,
    /// Number of days to print (default: one page)
    #[arg(short, long)]
    limit: Option<usize>,
  },
  /// Mark a day as viewed
  Seen {
    /// Date of the day (YYYY-MM-DD)
    date: String,
  },
  /// Fetch a random joke without storing it
  Random,
  /// Show sync progress and the stored day range
  Status,
}

/// Everything a command needs, wired up once per process
pub struct App {
  config: Config,
  data_dir: PathBuf,
  store: Arc<DayStore>,
  progress: Arc<ProgressCache>,
  calendar: DayCalendar,
  mediator: Arc<PaginationMediator<JokeClient>>,
  feed: DayFeed<JokeClient>,
}

impl App {
  pub fn new(config: Config) -> Result<Self> {
    let data_dir = config.data_dir()?;
    let client = JokeClient::new(&config.api)?;
    let store = Arc::new(DayStore::open(&data_dir.join(DATABASE_FILE))?);
    let progress = Arc::new(ProgressCache::open(&data_dir.join(PREFERENCES_FILE))?);
    let calendar = DayCalendar::new(config.paging.epoch);

    let mediator = Arc::new(PaginationMediator::new(
      client,
      Arc::clone(&store),
      Arc::clone(&progress),
      calendar,
      info_span!("pagination"),
    ));
    let feed = DayFeed::new(
      Arc::clone(&store),
      Arc::clone(&mediator),
      calendar,
      config.paging.page_size,
    );

    Ok(Self {
      config,
      data_dir,
      store,
      progress,
      calendar,
      mediator,
      feed,
    })
  }

  pub async fn run(&self, command: Command, out: &mut impl Write) -> Result<()> {
    debug!(?command, "running command");
    match command {
      Command::Today => self.today(out).await,
      Command::Next { pages } => self.next(pages, out).await,
      Command::Prev { pages } => self.prev(pages, out).await,
      Command::List { from, limit } => self.list(from, limit, out).await,
      Command::Seen { date } => self.seen(&date, out),
      Command::Random => self.random(out).await,
      Command::Status => self.status(out),
    }
  }

  /// Let background work started by the command finish.
  pub async fn shutdown(&self) {
    self.feed.wait_for_background().await;
  }

  async fn today(&self, out: &mut impl Write) -> Result<()> {
    match self.feed.today(self.config.time_zone).await? {
      Some(day) => print_day(out, &day)?,
      None => writeln!(out, "No joke is available for today yet.")?,
    }
    Ok(())
  }

  async fn next(&self, pages: u32, out: &mut impl Write) -> Result<()> {
    for _ in 0..pages {
      if let MediatorResult::Error(e) = self.feed.append().await? {
        return Err(Report::new(e).wrap_err("Could not load more days"));
      }
    }
    self.print_range(out)
  }

  async fn prev(&self, pages: u32, out: &mut impl Write) -> Result<()> {
    for _ in 0..pages {
      match self.feed.prepend().await? {
        MediatorResult::Success {
          end_of_pagination_reached: true,
        } => {
          writeln!(out, "No earlier days to load.")?;
          break;
        }
        MediatorResult::Success { .. } => {}
        MediatorResult::Error(e) => {
          return Err(Report::new(e).wrap_err("Could not load earlier days"));
        }
      }
    }
    self.print_range(out)
  }

  async fn list(&self, from: Option<String>, limit: Option<usize>, out: &mut impl Write) -> Result<()> {
    if let Some(date) = &from {
      self.calendar.offset_for_date(date)?;
    }

    let mut remaining = limit.unwrap_or(self.feed.page_size() as usize);
    let mut pages = Box::pin(self.feed.pages(from));
    while remaining > 0 {
      let Some(page) = pages.next().await else {
        break;
      };
      for day in page?.iter().take(remaining) {
        print_day(out, day)?;
        remaining -= 1;
      }
    }
    Ok(())
  }

  fn seen(&self, date: &str, out: &mut impl Write) -> Result<()> {
    self.calendar.offset_for_date(date)?;
    if !self.store.mark_viewed(date)? {
      return Err(eyre!("No joke is stored for {}", date));
    }
    writeln!(out, "Marked {} as viewed.", date)?;
    Ok(())
  }

  async fn random(&self, out: &mut impl Write) -> Result<()> {
    let joke = self
      .mediator
      .random_joke()
      .await
      .map_err(|e| Report::new(e).wrap_err("Could not fetch a random joke"))?;
    writeln!(out, "{}", joke.joke)?;
    Ok(())
  }

  fn status(&self, out: &mut impl Write) -> Result<()> {
    writeln!(out, "Data directory:     {}", self.data_dir.display())?;
    writeln!(out, "Remote pages known: {}", self.progress.get(TOTAL_PAGES))?;
    writeln!(out, "Remote jokes known: {}", self.progress.get(TOTAL_JOKES))?;
    writeln!(out, "Pages stored:       {}", self.store.count_pages()?)?;
    self.print_range(out)
  }

  fn print_range(&self, out: &mut impl Write) -> Result<()> {
    let count = self.store.count_days()?;
    match (self.store.first_day()?, self.store.last_day()?) {
      (Some(first), Some(last)) => writeln!(
        out,
        "Days stored:        {} ({} to {})",
        count, first.date, last.date
      )?,
      _ => writeln!(out, "Days stored:        0")?,
    }
    Ok(())
  }
}

fn print_day(out: &mut impl Write, day: &DayWithJoke) -> Result<()> {
  let mark = if day.day.viewed { "x" } else { " " };
  writeln!(out, "{} [{}] {}", day.day.date, mark, day.joke.text)?;
  Ok(())
}
