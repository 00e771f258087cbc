use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Datelike,
  Days,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  TimeDelta,
  TimeZone,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

use crate::task::Task;

const TIMEZONE_CONFIG_FILE: &str =
  "nudge-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "NUDGE_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "NUDGE_TIME_CONFIG";

/// Days-remaining stand-in for daily
/// tasks, which have no deadline.
pub const DAILY_DAYS_SENTINEL: i64 =
  999;

/// Deadlines this many days out (or
/// fewer) are urgent and get an
/// hour-level countdown.
pub const URGENT_WITHIN_DAYS: i64 = 1;

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

/// Picks the zone that defines "local
/// day": the configured value, then
/// `NUDGE_TIMEZONE`, then
/// `nudge-time.toml`, then UTC.
#[tracing::instrument]
pub fn resolve_timezone(
  configured: Option<&str>
) -> Tz {
  if let Some(raw) = configured
    && let Some(tz) =
      parse_timezone(raw, "config")
  {
    return tz;
  }

  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) = parse_timezone(
      &raw,
      TIMEZONE_ENV_VAR
    )
  {
    return tz;
  }

  if let Some(path) =
    timezone_config_path()
    && let Some(tz) =
      load_timezone_from_file(&path)
  {
    return tz;
  }

  tracing::warn!(
    "no timezone configured; local \
     days follow UTC"
  );
  chrono_tz::UTC
}

fn timezone_config_path()
-> Option<PathBuf> {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  std::env::current_dir().ok().map(
    |dir| {
      dir.join(TIMEZONE_CONFIG_FILE)
    }
  )
}

fn load_timezone_from_file(
  path: &Path
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "timezone config file not found"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  let parsed = match toml::from_str::<
    TimezoneConfig
  >(&raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed parsing timezone config file"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    });
  let Some(timezone) = timezone else {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::info!(
        source,
        timezone = %trimmed,
        "configured local timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

#[must_use]
pub fn default_due_time() -> NaiveTime {
  NaiveTime::from_hms_opt(23, 59, 0)
    .unwrap_or(NaiveTime::MIN)
}

/// Calendar day of `ts` in the zone
/// `now` lives in.
#[must_use]
pub fn local_day<Z: TimeZone>(
  ts: DateTime<Utc>,
  now: &DateTime<Z>
) -> NaiveDate {
  ts.with_timezone(&now.timezone())
    .date_naive()
}

/// Whole local days from today until
/// `deadline`; negative once overdue.
#[must_use]
pub fn days_until<Z: TimeZone>(
  deadline: NaiveDate,
  now: &DateTime<Z>
) -> i64 {
  deadline
    .signed_duration_since(
      now.date_naive()
    )
    .num_days()
}

/// Days left for `task`, with
/// [`DAILY_DAYS_SENTINEL`] standing in
/// for daily tasks.
#[must_use]
pub fn days_remaining<Z: TimeZone>(
  task: &Task,
  now: &DateTime<Z>
) -> i64 {
  task
    .deadline_date()
    .map(|ddl| days_until(ddl, now))
    .unwrap_or(DAILY_DAYS_SENTINEL)
}

/// `ddl` at `time` (23:59 when unset),
/// as a local wall-clock instant.
#[must_use]
pub fn deadline_instant(
  task: &Task
) -> Option<NaiveDateTime> {
  task.deadline_date().map(|ddl| {
    ddl.and_time(
      task
        .time
        .unwrap_or_else(
          default_due_time
        )
    )
  })
}

#[must_use]
pub fn format_countdown<Z: TimeZone>(
  task: &Task,
  now: &DateTime<Z>
) -> String {
  if task.is_everyday {
    return "daily".to_string();
  }

  let days = days_remaining(task, now);
  if days < 0 {
    let n = days.unsigned_abs();
    return format!(
      "overdue by {n} {}",
      if n == 1 { "day" } else { "days" }
    );
  }

  if days <= URGENT_WITHIN_DAYS {
    let Some(deadline) =
      deadline_instant(task)
    else {
      return "overdue".to_string();
    };
    let left = deadline
      .signed_duration_since(
        now.naive_local()
      );
    if left <= TimeDelta::zero() {
      return "overdue".to_string();
    }
    let label = if days == 0 {
      "due today"
    } else {
      "due tomorrow"
    };
    return format!(
      "{label} ({}h {}m left)",
      left.num_hours(),
      left.num_minutes() % 60
    );
  }

  format!("due in {days} days")
}

/// Parses a deadline date given on the
/// command line.
#[tracing::instrument(skip(now), fields(input = input))]
pub fn parse_date_expr<Z: TimeZone>(
  input: &str,
  now: &DateTime<Z>
) -> anyhow::Result<NaiveDate> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();
  let today = now.date_naive();

  match lower.as_str() {
    | "today" => return Ok(today),
    | "tomorrow" | "tmr" => {
      return today
        .checked_add_days(Days::new(1))
        .ok_or_else(|| {
          anyhow!(
            "date out of range: \
             tomorrow"
          )
        });
    }
    | _ => {}
  }

  if let Some(target_weekday) =
    parse_weekday_name(&lower)
  {
    return Ok(next_weekday_date(
      today,
      target_weekday
    ));
  }

  if let Some(target_month) =
    parse_month_name(&lower)
  {
    let mut year = today.year();
    if target_month <= today.month() {
      year = year.saturating_add(1);
    }
    return NaiveDate::from_ymd_opt(
      year,
      target_month,
      1
    )
    .ok_or_else(|| {
      anyhow!(
        "invalid month/year \
         candidate"
      )
    });
  }

  let rel_re = Regex::new(
    r"^\+(?P<num>\d+)(?P<unit>[dw])$"
  )
  .map_err(|e| {
    anyhow!(
      "internal regex compile \
       failure: {e}"
    )
  })?;

  if let Some(caps) =
    rel_re.captures(&lower)
  {
    let num: u64 = caps
      .name("num")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!(
          "missing relative amount"
        )
      })?
      .parse()
      .context(
        "invalid relative number"
      )?;
    let days = match caps
      .name("unit")
      .map(|m| m.as_str())
    {
      | Some("w") => num.saturating_mul(7),
      | _ => num
    };
    return today
      .checked_add_days(Days::new(days))
      .ok_or_else(|| {
        anyhow!(
          "date out of range: {input}"
        )
      });
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token, "%Y-%m-%d"
    )
  {
    return Ok(date);
  }

  Err(anyhow!(
    "unrecognized date expression: \
     {input}"
  ))
  .with_context(|| {
    "supported formats: \
     today/tomorrow, weekday names \
     (e.g. monday), month names (e.g. \
     march), +Nd/+Nw, YYYY-MM-DD"
  })
}

fn parse_weekday_name(
  token: &str
) -> Option<Weekday> {
  match token.trim() {
    | "monday" | "mon" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" | "tues" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" | "thur"
    | "thurs" => Some(Weekday::Thu),
    | "friday" | "fri" => {
      Some(Weekday::Fri)
    }
    | "saturday" | "sat" => {
      Some(Weekday::Sat)
    }
    | "sunday" | "sun" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

fn next_weekday_date(
  from: NaiveDate,
  target: Weekday
) -> NaiveDate {
  let from_idx = from
    .weekday()
    .num_days_from_monday()
    as u64;
  let target_idx = target
    .num_days_from_monday()
    as u64;
  let mut delta =
    (7 + target_idx - from_idx) % 7;
  if delta == 0 {
    delta = 7;
  }
  from
    .checked_add_days(Days::new(delta))
    .unwrap_or(from)
}

fn parse_month_name(
  token: &str
) -> Option<u32> {
  match token.trim() {
    | "january" | "jan" => Some(1),
    | "february" | "feb" => Some(2),
    | "march" | "mar" => Some(3),
    | "april" | "apr" => Some(4),
    | "may" => Some(5),
    | "june" | "jun" => Some(6),
    | "july" | "jul" => Some(7),
    | "august" | "aug" => Some(8),
    | "september" | "sep" | "sept" => {
      Some(9)
    }
    | "october" | "oct" => Some(10),
    | "november" | "nov" => Some(11),
    | "december" | "dec" => Some(12),
    | _ => None
  }
}

/// `15:23`, `3:23pm`, `9:05 am`.
pub fn parse_clock_time(
  token: &str
) -> Option<NaiveTime> {
  let clock_re = Regex::new(
    r"(?i)^(?P<hour>\d{1,2}):(?P<minute>\d{2})\s*(?P<ampm>[ap]m)?$",
  )
  .ok()?;
  let captures =
    clock_re.captures(token.trim())?;

  let raw_hour = captures
    .name("hour")?
    .as_str()
    .parse::<u32>()
    .ok()?;
  let minute = captures
    .name("minute")?
    .as_str()
    .parse::<u32>()
    .ok()?;
  if minute > 59 {
    return None;
  }

  let hour = if let Some(ampm_match) =
    captures.name("ampm")
  {
    let ampm = ampm_match
      .as_str()
      .to_ascii_lowercase();
    if raw_hour == 0 || raw_hour > 12 {
      return None;
    }
    match ampm.as_str() {
      | "am" => {
        if raw_hour == 12 {
          0
        } else {
          raw_hour
        }
      }
      | "pm" => {
        if raw_hour == 12 {
          12
        } else {
          raw_hour + 12
        }
      }
      | _ => return None
    }
  } else {
    if raw_hour > 23 {
      return None;
    }
    raw_hour
  };

  NaiveTime::from_hms_opt(
    hour, minute, 0
  )
}


/// Deadline dates as `YYYY-MM-DD`;
/// blank strings read as "no date".
pub mod lenient_date_serde {
  use chrono::NaiveDate;
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  pub fn serialize<S>(
    date: &Option<NaiveDate>,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    match date {
      | Some(value) => {
        serializer.serialize_str(
          &value
            .format("%Y-%m-%d")
            .to_string()
        )
      }
      | None => {
        serializer.serialize_none()
      }
    }
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<Option<NaiveDate>, D::Error>
  where
    D: Deserializer<'de>
  {
    let opt =
      Option::<String>::deserialize(
        deserializer
      )?;
    match opt.as_deref().map(str::trim)
    {
      | None | Some("") => Ok(None),
      | Some(raw) => {
        let day = raw
          .get(..10)
          .unwrap_or(raw);
        NaiveDate::parse_from_str(
          day, "%Y-%m-%d"
        )
        .map(Some)
        .map_err(
          serde::de::Error::custom
        )
      }
    }
  }
}

/// Times of day as `HH:MM`; `HH:MM:SS`
/// is accepted on read.
pub mod clock_time_serde {
  pub mod option {
    use chrono::NaiveTime;
    use serde::{
      Deserialize,
      Deserializer,
      Serializer
    };

    pub fn serialize<S>(
      time: &Option<NaiveTime>,
      serializer: S
    ) -> Result<S::Ok, S::Error>
    where
      S: Serializer
    {
      match time {
        | Some(value) => {
          serializer.serialize_str(
            &value
              .format("%H:%M")
              .to_string()
          )
        }
        | None => {
          serializer.serialize_none()
        }
      }
    }

    pub fn deserialize<'de, D>(
      deserializer: D
    ) -> Result<
      Option<NaiveTime>,
      D::Error
    >
    where
      D: Deserializer<'de>
    {
      let opt =
        Option::<String>::deserialize(
          deserializer
        )?;
      match opt
        .as_deref()
        .map(str::trim)
      {
        | None | Some("") => Ok(None),
        | Some(raw) => {
          NaiveTime::parse_from_str(
            raw, "%H:%M"
          )
          .or_else(|_| {
            NaiveTime::parse_from_str(
              raw, "%H:%M:%S"
            )
          })
          .map(Some)
          .map_err(
            serde::de::Error::custom
          )
        }
      }
    }
  }
}
