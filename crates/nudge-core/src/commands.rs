use std::io::{self, IsTerminal, Write};
use std::thread;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::cli::Invocation;
use crate::config::Config;
use crate::datastore::DataStore;
use crate::datetime::resolve_timezone;
use crate::history::HistoryArchive;
use crate::rank::SortMode;
use crate::render::Renderer;
use crate::task::{Task, TaskDraft};
use crate::tracker::{CompleteOutcome, RestoreOutcome, Tracker};
use crate::view::ViewModel;

mod modifiers;

use modifiers::{apply_mods, parse_desc_and_mods};

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "add", "edit", "done", "delete", "info", "next", "list", "history", "restore", "purge",
        "sort", "watch", "export", "help", "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

/// Clock and settings shared by every command in one run.
struct Session<'a> {
    store: &'a DataStore,
    cfg: &'a Config,
    renderer: &'a Renderer,
    tz: Tz,
}

impl Session<'_> {
    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.tz)
    }

    fn sort_mode(&self) -> anyhow::Result<SortMode> {
        match self.store.get_sort_mode()? {
            Some(mode) => Ok(mode),
            None => self.cfg.sort_mode(),
        }
    }

    fn view(&self, tracker: &Tracker, now: &DateTime<Tz>) -> anyhow::Result<ViewModel> {
        Ok(tracker.view(self.sort_mode()?, now))
    }
}

#[instrument(skip(store, cfg, renderer, inv))]
pub fn dispatch(
    store: &DataStore,
    cfg: &Config,
    renderer: &Renderer,
    inv: Invocation,
) -> anyhow::Result<()> {
    let tz = resolve_timezone(cfg.get("timezone").as_deref());
    let session = Session {
        store,
        cfg,
        renderer,
        tz,
    };
    let Invocation {
        refs,
        command,
        command_args,
    } = inv;

    debug!(
        command = %command,
        refs = ?refs,
        args = ?command_args,
        %tz,
        "dispatching command"
    );

    if !refs.is_empty() && !command_takes_refs(&command) {
        warn!(command = %command, refs = ?refs, "command ignores task references");
    }

    match command.as_str() {
        "next" | "list" => cmd_next(&session),
        "add" => cmd_add(&session, &command_args),
        "edit" => cmd_edit(&session, refs, command_args),
        "done" => cmd_done(&session, join_refs(refs, command_args)),
        "delete" => cmd_delete(&session, join_refs(refs, command_args)),
        "info" => cmd_info(&session, join_refs(refs, command_args)),
        "history" => cmd_history(&session),
        "restore" => cmd_restore(&session, join_refs(refs, command_args)),
        "purge" => cmd_purge(&session, join_refs(refs, command_args)),
        "sort" => cmd_sort(&session, &command_args),
        "watch" => cmd_watch(&session, &command_args),
        "export" => cmd_export(&session),
        "help" => cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

fn command_takes_refs(command: &str) -> bool {
    matches!(
        command,
        "edit" | "done" | "delete" | "info" | "restore" | "purge"
    )
}

/// References may come before the command, after it, or both.
fn join_refs(mut refs: Vec<String>, args: Vec<String>) -> Vec<String> {
    refs.extend(args);
    refs
}

#[instrument(skip(session))]
fn cmd_next(session: &Session) -> anyhow::Result<()> {
    info!("command next");
    let tracker = session.store.load_tracker()?;
    let now = session.now();
    let view = session.view(&tracker, &now)?;
    session.renderer.print_dashboard(&view, &now)
}

#[instrument(skip(session, args))]
fn cmd_add(session: &Session, args: &[String]) -> anyhow::Result<()> {
    info!("command add");

    let now = session.now();
    let (title, mods) = parse_desc_and_mods(args, &now)?;
    let mut draft = TaskDraft::new_default(&now);
    draft.title = title;
    apply_mods(&mut draft, mods);
    if draft.title.trim().is_empty() {
        return Err(anyhow!("add: a title is required"));
    }

    let mut tracker = session.store.load_tracker()?;
    let task = tracker.save(draft, now.with_timezone(&Utc))?;
    session.store.save_tracker(&tracker)?;

    println!("Created task {}: {}.", short_id(&task.id), task.title);
    Ok(())
}

#[instrument(skip(session, refs, args))]
fn cmd_edit(session: &Session, refs: Vec<String>, args: Vec<String>) -> anyhow::Result<()> {
    info!("command edit");

    let (target, args) = match refs.as_slice() {
        [] => {
            let (first, rest) = args
                .split_first()
                .ok_or_else(|| anyhow!("edit: which task? give a position or id"))?;
            (first.clone(), rest.to_vec())
        }
        [one] => (one.clone(), args),
        _ => return Err(anyhow!("edit: only one task can be edited at a time")),
    };

    let now = session.now();
    let mut tracker = session.store.load_tracker()?;
    let view = session.view(&tracker, &now)?;
    let id = resolve_task_ref(&view, tracker.store().tasks(), &target)?;
    let current = tracker
        .store()
        .get(&id)
        .ok_or_else(|| anyhow!("task vanished: {id}"))?;

    let (words, mods) = parse_desc_and_mods(&args, &now)?;
    if words.is_empty() && mods.is_empty() {
        return Err(anyhow!("edit: nothing to change"));
    }
    let mut draft = TaskDraft::from_task(current);
    if !words.is_empty() {
        draft.title = words;
    }
    apply_mods(&mut draft, mods);

    let saved = tracker.save(draft, now.with_timezone(&Utc))?;
    session.store.save_tracker(&tracker)?;

    println!("Updated task {}: {}.", short_id(&saved.id), saved.title);
    Ok(())
}

#[instrument(skip(session, refs))]
fn cmd_done(session: &Session, refs: Vec<String>) -> anyhow::Result<()> {
    info!("command done");

    let now = session.now();
    let mut tracker = session.store.load_tracker()?;
    let ids = resolve_task_refs(session, &tracker, &now, &refs)?;

    for id in ids {
        match tracker.complete(&id, now.with_timezone(&Utc))? {
            CompleteOutcome::Archived { entry_id } => {
                let title = tracker
                    .history()
                    .get(entry_id)
                    .map(|entry| entry.task.title.clone())
                    .unwrap_or_default();
                println!("Completed '{title}'.");
            }
            CompleteOutcome::Logged { task, .. } => {
                println!("Logged '{}' for today; it returns tomorrow.", task.title);
            }
        }
    }

    session.store.save_tracker(&tracker)
}

#[instrument(skip(session, refs))]
fn cmd_delete(session: &Session, refs: Vec<String>) -> anyhow::Result<()> {
    info!("command delete");

    let now = session.now();
    let mut tracker = session.store.load_tracker()?;
    let ids = resolve_task_refs(session, &tracker, &now, &refs)?;

    for id in ids {
        let task = tracker.delete(&id)?;
        println!("Deleted '{}'.", task.title);
    }

    session.store.save_tracker(&tracker)
}

#[instrument(skip(session, refs))]
fn cmd_info(session: &Session, refs: Vec<String>) -> anyhow::Result<()> {
    info!("command info");

    let now = session.now();
    let tracker = session.store.load_tracker()?;
    let ids = resolve_task_refs(session, &tracker, &now, &refs)?;

    for (idx, id) in ids.iter().enumerate() {
        if idx > 0 {
            println!();
        }
        let task = tracker
            .store()
            .get(id)
            .ok_or_else(|| anyhow!("task vanished: {id}"))?;
        session.renderer.print_task_info(task, &now)?;
    }
    Ok(())
}

#[instrument(skip(session))]
fn cmd_history(session: &Session) -> anyhow::Result<()> {
    info!("command history");
    let tracker = session.store.load_tracker()?;
    let now = session.now();
    let view = session.view(&tracker, &now)?;
    session
        .renderer
        .print_history(&view.history, view.history_capacity, &now)
}

#[instrument(skip(session, refs))]
fn cmd_restore(session: &Session, refs: Vec<String>) -> anyhow::Result<()> {
    info!("command restore");

    let mut tracker = session.store.load_tracker()?;
    let entry_ids = resolve_history_refs(tracker.history(), &refs)?;

    let mut changed = false;
    for entry_id in entry_ids {
        match tracker.restore(entry_id)? {
            RestoreOutcome::Restored(task) => {
                changed = true;
                println!("Restored '{}'.", task.title);
            }
            RestoreOutcome::Ignored => {
                let entry_id = entry_id.to_string();
                println!("Entry {} is a daily log and cannot be restored.", short_id(&entry_id));
            }
        }
    }

    if changed {
        session.store.save_tracker(&tracker)?;
    }
    Ok(())
}

#[instrument(skip(session, refs))]
fn cmd_purge(session: &Session, refs: Vec<String>) -> anyhow::Result<()> {
    info!("command purge");

    let mut tracker = session.store.load_tracker()?;
    let entry_ids = resolve_history_refs(tracker.history(), &refs)?;

    for entry_id in entry_ids {
        let entry = tracker.purge(entry_id)?;
        println!("Purged '{}' from history.", entry.task.title);
    }

    session.store.save_tracker(&tracker)
}

#[instrument(skip(session, args))]
fn cmd_sort(session: &Session, args: &[String]) -> anyhow::Result<()> {
    info!("command sort");

    let current = session.sort_mode()?;
    let next = match args {
        [] => {
            println!("{current}");
            return Ok(());
        }
        [arg] if arg.eq_ignore_ascii_case("toggle") => match current {
            SortMode::Time => SortMode::Importance,
            SortMode::Importance => SortMode::Time,
        },
        [arg] => arg.parse::<SortMode>()?,
        _ => return Err(anyhow!("sort: expected one of time, importance, toggle")),
    };

    session.store.set_sort_mode(Some(next))?;
    println!("Sorting by {next}.");
    Ok(())
}

/// Re-renders the dashboard every `watch.interval`. Data is reloaded each
/// tick so edits from another shell show up.
#[instrument(skip(session, args))]
fn cmd_watch(session: &Session, args: &[String]) -> anyhow::Result<()> {
    let interval = session.cfg.watch_interval()?;
    let ticks = match args {
        [] => None,
        [raw] => Some(
            raw.parse::<u64>()
                .with_context(|| format!("watch: tick count must be a number, got {raw}"))?,
        ),
        _ => return Err(anyhow!("watch: expected at most one tick count")),
    };
    info!(interval_secs = interval.as_secs(), ?ticks, "command watch");

    let clear = io::stdout().is_terminal();
    let mut tick = 0_u64;
    loop {
        let tracker = session.store.load_tracker()?;
        let now = session.now();
        let view = session.view(&tracker, &now)?;
        if clear {
            print!("\x1b[2J\x1b[H");
            io::stdout().flush()?;
        }
        session.renderer.print_dashboard(&view, &now)?;

        tick += 1;
        if ticks.is_some_and(|limit| tick >= limit) {
            return Ok(());
        }
        debug!(tick, "sleeping until next refresh");
        thread::sleep(interval);
    }
}

#[instrument(skip(session))]
fn cmd_export(session: &Session) -> anyhow::Result<()> {
    info!("command export");
    let tracker = session.store.load_tracker()?;
    let now = session.now();
    let view = session.view(&tracker, &now)?;
    let json = serde_json::to_string_pretty(&view).context("failed to serialize view")?;
    println!("{json}");
    Ok(())
}

fn cmd_help() -> anyhow::Result<()> {
    println!(
        "usage: nudge [-v|-q] [--rc KEY=VALUE] [--nudgerc PATH] [--data DIR] [COMMAND] [ARGS]

  next | list                  show the dashboard (default)
  add TITLE [MODS]             new reminder; due tomorrow unless due: is given
  edit REF [WORDS] [MODS]      change a reminder; words replace the title
  done REF...                  complete; daily reminders come back tomorrow
  delete REF...                remove without archiving
  info REF...                  show one reminder in full
  history                      recently completed reminders
  restore HREF...              put a completed reminder back
  purge HREF...                drop a history entry
  sort [time|importance|toggle]
  watch [TICKS]                redraw every watch.interval seconds
  export                       dashboard as JSON
  help | version

MODS: due:DATE time:HH:MM|none imp:1-3 note:TEXT title:TEXT +daily -daily
REF: dashboard position or id prefix; HREF: history position or entry prefix"
    );
    Ok(())
}

/// Resolves every reference against one dashboard view, before anything
/// changes, so positions stay meaningful across a multi-task command.
fn resolve_task_refs(
    session: &Session,
    tracker: &Tracker,
    now: &DateTime<Tz>,
    refs: &[String],
) -> anyhow::Result<Vec<String>> {
    if refs.is_empty() {
        return Err(anyhow!("which task? give a position or id"));
    }
    let view = session.view(tracker, now)?;
    let mut ids: Vec<String> = Vec::with_capacity(refs.len());
    for token in refs {
        let id = resolve_task_ref(&view, tracker.store().tasks(), token)?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

/// A 1-based dashboard position, or a unique prefix of any live task's id
/// (including daily tasks hidden for the rest of today).
fn resolve_task_ref(view: &ViewModel, tasks: &[Task], token: &str) -> anyhow::Result<String> {
    if let Ok(position) = token.parse::<usize>() {
        return position
            .checked_sub(1)
            .and_then(|idx| view.ordered().nth(idx))
            .map(|ranked| ranked.task.id.clone())
            .ok_or_else(|| anyhow!("no task at position {token}"));
    }

    let mut matches = tasks.iter().filter(|task| task.id.starts_with(token));
    match (matches.next(), matches.next()) {
        (Some(task), None) => Ok(task.id.clone()),
        (None, _) => Err(anyhow!("no task matches {token}")),
        (Some(_), Some(_)) => Err(anyhow!("{token} matches more than one task")),
    }
}

fn resolve_history_refs(history: &HistoryArchive, refs: &[String]) -> anyhow::Result<Vec<Uuid>> {
    if refs.is_empty() {
        return Err(anyhow!("which entry? give a history position or entry id"));
    }
    let mut ids: Vec<Uuid> = Vec::with_capacity(refs.len());
    for token in refs {
        let id = resolve_history_ref(history, token)?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

fn resolve_history_ref(history: &HistoryArchive, token: &str) -> anyhow::Result<Uuid> {
    if let Ok(position) = token.parse::<usize>() {
        return position
            .checked_sub(1)
            .and_then(|idx| history.iter().nth(idx))
            .map(|entry| entry.entry_id)
            .ok_or_else(|| anyhow!("no history entry at position {token}"));
    }

    let token = token.to_ascii_lowercase();
    let mut matches = history
        .iter()
        .filter(|entry| entry.entry_id.to_string().starts_with(&token));
    match (matches.next(), matches.next()) {
        (Some(entry), None) => Ok(entry.entry_id),
        (None, _) => Err(anyhow!("no history entry matches {token}")),
        (Some(_), Some(_)) => Err(anyhow!("{token} matches more than one history entry")),
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
