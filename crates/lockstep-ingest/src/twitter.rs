//! Twitter JSON parsers, v1.1 and v2.
//!
//! v1.1 input is one tweet object per line (as collected from the
//! streaming or REST APIs); v2 input is one response page per line, with
//! referenced tweets and an `includes.users` expansion. A line whose
//! object carries a `data` array is treated as a v2 page, anything else as
//! a v1.1 tweet.
//!
//! Timestamps are derived from the snowflake id — `(id >> 22)` gives
//! milliseconds on the platform's epoch, and the corpus only needs a
//! consistent origin, not an absolute one.

use std::collections::HashMap;
use std::io::BufRead;

use lockstep_core::NormalizedMessage;
use serde::Deserialize;

use crate::{ParseOutcome, Result};

pub fn parse_twitter_json<R: BufRead>(reader: R) -> Result<ParseOutcome> {
  let mut outcome = ParseOutcome::default();

  for (i, line) in reader.lines().enumerate() {
    let line_no = i + 1;
    let line = line?;
    if line.trim().is_empty() {
      continue;
    }

    let value: serde_json::Value = match serde_json::from_str(&line) {
      Ok(v) => v,
      Err(e) => {
        outcome.skip(line_no, format!("invalid json: {e}"));
        continue;
      }
    };

    if value.get("data").is_some_and(serde_json::Value::is_array) {
      parse_v2_page(value, line_no, &mut outcome);
    } else {
      parse_v1_tweet(value, line_no, &mut outcome);
    }
  }

  Ok(outcome)
}

/// Milliseconds-precision seconds from a snowflake id.
fn snowflake_seconds(id: u64) -> f64 {
  (id >> 22) as f64 / 1000.0
}

// ─── v1.1 ────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct V1Tweet {
  id:                       u64,
  id_str:                   String,
  user:                     V1User,
  #[serde(default)]
  text:                     Option<String>,
  #[serde(default)]
  full_text:                Option<String>,
  #[serde(default)]
  extended_tweet:           Option<V1Extended>,
  #[serde(default)]
  retweeted_status:         Option<Box<V1Tweet>>,
  #[serde(default)]
  in_reply_to_status_id_str: Option<String>,
  #[serde(default)]
  entities:                 Option<Entities>,
}

#[derive(Deserialize)]
struct V1User {
  id_str:      String,
  screen_name: String,
}

#[derive(Deserialize)]
struct V1Extended {
  #[serde(default)]
  full_text: Option<String>,
  #[serde(default)]
  entities:  Option<Entities>,
}

#[derive(Deserialize, Default)]
struct Entities {
  #[serde(default)]
  urls: Vec<UrlEntity>,
}

#[derive(Deserialize)]
struct UrlEntity {
  #[serde(default)]
  expanded_url: Option<String>,
}

impl V1Tweet {
  /// The display text: the extended (untruncated) form when present.
  fn text(&self) -> String {
    self
      .full_text
      .clone()
      .or_else(|| {
        self.extended_tweet.as_ref().and_then(|e| e.full_text.clone())
      })
      .or_else(|| self.text.clone())
      .unwrap_or_default()
  }

  /// Expanded URLs, preferring the extended entities. Retweets carry the
  /// original's entities, so callers skip this for them.
  fn urls(&self) -> Vec<String> {
    let entities = self
      .extended_tweet
      .as_ref()
      .and_then(|e| e.entities.as_ref())
      .or(self.entities.as_ref());
    entities
      .map(|e| {
        e.urls.iter().filter_map(|u| u.expanded_url.clone()).collect()
      })
      .unwrap_or_default()
  }
}

fn parse_v1_tweet(
  value: serde_json::Value,
  line_no: usize,
  outcome: &mut ParseOutcome,
) {
  let tweet: V1Tweet = match serde_json::from_value(value) {
    Ok(t) => t,
    Err(e) => {
      outcome.skip(line_no, format!("not a v1.1 tweet: {e}"));
      return;
    }
  };

  let repost_id = tweet.retweeted_status.as_ref().map(|r| r.id_str.clone());
  // URLs shared in reposts are not candidate links.
  let urls = if repost_id.is_some() { vec![] } else { tweet.urls() };

  outcome.rows.push(NormalizedMessage {
    message_id: tweet.id_str.clone(),
    user_id:    tweet.user.id_str.clone(),
    username:   tweet.user.screen_name.clone(),
    repost_id,
    reply_id:   tweet.in_reply_to_status_id_str.clone(),
    message:    tweet.text(),
    timestamp:  snowflake_seconds(tweet.id),
    urls,
  });
}

// ─── v2 ──────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct V2Page {
  #[serde(default)]
  data:     Vec<V2Tweet>,
  #[serde(default)]
  includes: Option<V2Includes>,
}

#[derive(Deserialize, Default)]
struct V2Includes {
  #[serde(default)]
  users: Vec<V2User>,
}

#[derive(Deserialize)]
struct V2User {
  id:       String,
  username: String,
}

#[derive(Deserialize)]
struct V2Tweet {
  id:                String,
  #[serde(default)]
  author_id:         Option<String>,
  /// Present in flattened captures where the author is inlined.
  #[serde(default)]
  author:            Option<V2User>,
  #[serde(default)]
  text:              String,
  #[serde(default)]
  referenced_tweets: Vec<V2Reference>,
  #[serde(default)]
  entities:          Option<Entities>,
}

#[derive(Deserialize)]
struct V2Reference {
  #[serde(rename = "type")]
  kind: String,
  id:   String,
}

fn parse_v2_page(
  value: serde_json::Value,
  line_no: usize,
  outcome: &mut ParseOutcome,
) {
  let page: V2Page = match serde_json::from_value(value) {
    Ok(p) => p,
    Err(e) => {
      outcome.skip(line_no, format!("not a v2 page: {e}"));
      return;
    }
  };

  let usernames: HashMap<&str, &str> = page
    .includes
    .as_ref()
    .map(|inc| {
      inc
        .users
        .iter()
        .map(|u| (u.id.as_str(), u.username.as_str()))
        .collect()
    })
    .unwrap_or_default();

  for tweet in &page.data {
    let user_id = match tweet
      .author_id
      .clone()
      .or_else(|| tweet.author.as_ref().map(|a| a.id.clone()))
    {
      Some(id) => id,
      None => {
        outcome
          .skip(line_no, format!("tweet {} has no author id", tweet.id));
        continue;
      }
    };

    let snowflake: u64 = match tweet.id.parse() {
      Ok(id) => id,
      Err(_) => {
        outcome
          .skip(line_no, format!("tweet id {:?} is not numeric", tweet.id));
        continue;
      }
    };

    let username = usernames
      .get(user_id.as_str())
      .map(|&u| u.to_owned())
      .or_else(|| tweet.author.as_ref().map(|a| a.username.clone()))
      .unwrap_or_else(|| user_id.clone());

    let mut repost_id = None;
    let mut reply_id = None;
    for reference in &tweet.referenced_tweets {
      match reference.kind.as_str() {
        "retweeted" => repost_id = Some(reference.id.clone()),
        "replied_to" => reply_id = Some(reference.id.clone()),
        _ => {}
      }
    }

    let urls = if repost_id.is_some() {
      vec![]
    } else {
      tweet
        .entities
        .as_ref()
        .map(|e| {
          e.urls.iter().filter_map(|u| u.expanded_url.clone()).collect()
        })
        .unwrap_or_default()
    };

    outcome.rows.push(NormalizedMessage {
      message_id: tweet.id.clone(),
      user_id,
      username,
      repost_id,
      reply_id,
      message: tweet.text.clone(),
      timestamp: snowflake_seconds(snowflake),
      urls,
    });
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
