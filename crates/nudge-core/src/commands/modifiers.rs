use anyhow::anyhow;
use chrono::{
  DateTime,
  NaiveDate,
  NaiveTime
};
use chrono_tz::Tz;
use tracing::{
  instrument,
  warn
};

use crate::datetime::{
  parse_clock_time,
  parse_date_expr
};
use crate::task::{
  Importance,
  TaskDraft
};

/// One `key:value` or `+flag` token
/// from an `add`/`edit` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Mod {
  Title(String),
  Due(NaiveDate),
  Time(Option<NaiveTime>),
  Importance(Importance),
  Note(String),
  Daily(bool)
}

/// Splits words from modifiers. Words
/// after `--` are always words.
#[instrument(skip(args, now))]
pub(super) fn parse_desc_and_mods(
  args: &[String],
  now: &DateTime<Tz>
) -> anyhow::Result<(String, Vec<Mod>)>
{
  let mut desc_parts = Vec::new();
  let mut mods = Vec::new();

  let mut literal = false;
  for arg in args {
    if arg == "--" && !literal {
      literal = true;
      continue;
    }

    if !literal
      && let Some(one_mod) =
        parse_one_mod(arg, now)?
    {
      mods.push(one_mod);
      continue;
    }

    desc_parts.push(arg.clone());
  }

  Ok((desc_parts.join(" "), mods))
}

fn parse_one_mod(
  tok: &str,
  now: &DateTime<Tz>
) -> anyhow::Result<Option<Mod>> {
  match tok {
    | "+daily" => {
      return Ok(Some(Mod::Daily(true)));
    }
    | "-daily" => {
      return Ok(Some(Mod::Daily(
        false
      )));
    }
    | _ => {}
  }

  let Some((key, value)) =
    tok.split_once(':')
  else {
    return Ok(None);
  };

  let key = key.to_ascii_lowercase();

  match key.as_str() {
    | "title" => {
      if value.trim().is_empty() {
        return Err(anyhow!(
          "title: needs some text"
        ));
      }
      Ok(Some(Mod::Title(
        value.to_string()
      )))
    }
    | "due" | "ddl" => {
      Ok(Some(Mod::Due(
        parse_date_expr(value, now)?
      )))
    }
    | "time" | "at" => {
      let trimmed = value.trim();
      if trimmed.is_empty()
        || trimmed
          .eq_ignore_ascii_case("none")
      {
        return Ok(Some(Mod::Time(
          None
        )));
      }
      let time = parse_clock_time(
        trimmed
      )
      .ok_or_else(|| {
        anyhow!(
          "invalid time: {value} \
           (expected HH:MM)"
        )
      })?;
      Ok(Some(Mod::Time(Some(time))))
    }
    | "imp" | "importance" => {
      let level =
        Importance::parse(value)
          .ok_or_else(|| {
            anyhow!(
              "invalid importance: \
               {value} (expected 1-3 \
               or trivial/normal/\
               important)"
            )
          })?;
      Ok(Some(Mod::Importance(level)))
    }
    | "note" | "content" => {
      Ok(Some(Mod::Note(
        value.to_string()
      )))
    }
    | _ => {
      warn!(token = %tok, "unknown modifier key; treating token as a word");
      Ok(None)
    }
  }
}

pub(super) fn apply_mods(
  draft: &mut TaskDraft,
  mods: Vec<Mod>
) {
  for one_mod in mods {
    match one_mod {
      | Mod::Title(title) => {
        draft.title = title;
      }
      | Mod::Due(date) => {
        draft.ddl = Some(date);
      }
      | Mod::Time(time) => {
        draft.time = time;
      }
      | Mod::Importance(level) => {
        draft.importance_level = level;
      }
      | Mod::Note(note) => {
        draft.content = note;
      }
      | Mod::Daily(daily) => {
        draft.is_everyday = daily;
      }
    }
  }
}
