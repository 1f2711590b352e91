/// A joke as stored locally
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Joke {
  pub id: String,
  pub text: String,
  /// Last remote page the joke was seen on
  pub page: u32,
}

/// A remote page that has been fetched at least once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JokePage {
  pub id: u32,
}

/// One calendar day and the joke assigned to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Day {
  pub date: String, // "YYYY-MM-DD"
  pub joke_id: String,
  pub viewed: bool,
}

impl Day {
  pub fn new(date: String, joke_id: String) -> Self {
    Self {
      date,
      joke_id,
      viewed: false,
    }
  }
}

/// A day joined to its joke
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayWithJoke {
  pub day: Day,
  pub joke: Joke,
}

/// A page joined to every joke currently assigned to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JokePageWithJokes {
  pub page: JokePage,
  pub jokes: Vec<Joke>,
}
