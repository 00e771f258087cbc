use std::io::{self, IsTerminal, Write};

use chrono::{DateTime, TimeZone};
use chrono_tz::Tz;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::format_countdown;
use crate::history::{EntryKind, HistoryEntry};
use crate::partition::HeroSelection;
use crate::rank::{RankedTask, Tone};
use crate::task::Task;
use crate::view::ViewModel;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    /// Colour follows the rc `color` flag, and only when stdout is a terminal.
    pub fn new(cfg: &Config) -> Self {
        let color = cfg.get_bool("color").unwrap_or(true) && io::stdout().is_terminal();
        Self { color }
    }

    pub fn print_dashboard<Z: TimeZone>(
        &self,
        view: &ViewModel,
        now: &DateTime<Z>,
    ) -> anyhow::Result<()> {
        self.write_dashboard(io::stdout().lock(), view, now)
    }

    /// Hero section, then the grid as a table. Positions run across both so
    /// they can be used as task references.
    #[tracing::instrument(skip_all, fields(hero = view.hero.len(), grid = view.grid.len()))]
    pub fn write_dashboard<W: Write, Z: TimeZone>(
        &self,
        mut out: W,
        view: &ViewModel,
        now: &DateTime<Z>,
    ) -> anyhow::Result<()> {
        let mut summary = format!("sorted by {}", view.sort_mode);
        if view.hidden > 0 {
            summary.push_str(&format!("; {} daily done today", view.hidden));
        }
        writeln!(out, "{}", self.paint(&summary, "2"))?;

        if view.is_empty() {
            writeln!(out)?;
            writeln!(out, "Nothing to do. Add one with `nudge add <title> due:<date>`.")?;
            return Ok(());
        }

        let heading = match view.selection {
            HeroSelection::UrgentSet => "URGENT",
            HeroSelection::TopRanked | HeroSelection::Empty => "UP NEXT",
        };
        writeln!(out)?;
        writeln!(out, "{}", self.paint(heading, "1"))?;
        for (idx, ranked) in view.hero.iter().enumerate() {
            let line = format!(
                "{:>2}. {} {}  {}",
                idx + 1,
                ranked.task.importance_level.icon(),
                ranked.task.title,
                format_countdown(&ranked.task, now)
            );
            writeln!(out, "{}", self.paint(&line, tone_code(ranked.tone())))?;
            if !ranked.task.content.is_empty() {
                writeln!(out, "    {}", ranked.task.content)?;
            }
        }

        if view.grid.is_empty() {
            return Ok(());
        }

        writeln!(out)?;
        let headers = ["#", "Due", "Imp", "Title", "Kind"]
            .map(String::from)
            .to_vec();
        let offset = view.hero.len();
        let rows = view
            .grid
            .iter()
            .enumerate()
            .map(|(idx, ranked)| self.grid_row(offset + idx + 1, ranked, now))
            .collect();
        write_table(&mut out, headers, rows)
    }

    fn grid_row<Z: TimeZone>(
        &self,
        position: usize,
        ranked: &RankedTask,
        now: &DateTime<Z>,
    ) -> Vec<String> {
        let code = tone_code(ranked.tone());
        vec![
            self.paint(&position.to_string(), "33"),
            self.paint(&format_countdown(&ranked.task, now), code),
            ranked.task.importance_level.icon().to_string(),
            ranked.task.title.clone(),
            kind_label(&ranked.task).to_string(),
        ]
    }

    pub fn print_history(
        &self,
        entries: &[HistoryEntry],
        capacity: usize,
        now: &DateTime<Tz>,
    ) -> anyhow::Result<()> {
        self.write_history(io::stdout().lock(), entries, capacity, now)
    }

    #[tracing::instrument(skip_all, fields(count = entries.len()))]
    pub fn write_history<W: Write>(
        &self,
        mut out: W,
        entries: &[HistoryEntry],
        capacity: usize,
        now: &DateTime<Tz>,
    ) -> anyhow::Result<()> {
        let header = format!("completed ({}/{capacity})", entries.len());
        writeln!(out, "{}", self.paint(&header, "1"))?;

        if entries.is_empty() {
            writeln!(out, "No completed tasks yet.")?;
            return Ok(());
        }

        let tz = now.timezone();
        let headers = ["#", "Completed", "Title", "Kind", "Entry"]
            .map(String::from)
            .to_vec();
        let rows = entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| {
                let kind = match entry.kind {
                    EntryKind::Normal => "done".to_string(),
                    EntryKind::DailyLog => self.paint("daily", "36"),
                };
                let mut entry_id = entry.entry_id.to_string();
                entry_id.truncate(8);
                vec![
                    self.paint(&(idx + 1).to_string(), "33"),
                    entry
                        .completed_at
                        .with_timezone(&tz)
                        .format("%Y-%m-%d %H:%M")
                        .to_string(),
                    entry.task.title.clone(),
                    kind,
                    entry_id,
                ]
            })
            .collect();
        write_table(&mut out, headers, rows)
    }

    #[tracing::instrument(skip(self, task, now), fields(id = %task.id))]
    pub fn print_task_info(&self, task: &Task, now: &DateTime<Tz>) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let tz = now.timezone();

        writeln!(out, "id          {}", task.id)?;
        writeln!(out, "title       {}", task.title)?;
        writeln!(out, "kind        {}", kind_label(task))?;
        writeln!(
            out,
            "importance  {} ({})",
            task.importance_level.level(),
            task.importance_level.label()
        )?;
        if let Some(ddl) = task.deadline_date() {
            match task.time {
                Some(time) => writeln!(out, "due         {ddl} {}", time.format("%H:%M"))?,
                None => writeln!(out, "due         {ddl}")?,
            }
        }
        writeln!(out, "countdown   {}", format_countdown(task, now))?;
        writeln!(
            out,
            "created     {}",
            task.created_at.with_timezone(&tz).format("%Y-%m-%d %H:%M")
        )?;
        if let Some(done) = task.last_completed_at {
            writeln!(
                out,
                "last done   {}",
                done.with_timezone(&tz).format("%Y-%m-%d %H:%M")
            )?;
        }
        if !task.content.is_empty() {
            writeln!(out, "note        {}", task.content)?;
        }

        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn tone_code(tone: Tone) -> &'static str {
    match tone {
        Tone::Urgent => "31",
        Tone::Daily => "36",
        Tone::Hot => "35",
        Tone::Warm => "33",
        Tone::Calm => "32",
    }
}

fn kind_label(task: &Task) -> &'static str {
    if task.is_everyday { "daily" } else { "once" }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths: Vec<usize> = headers
        .iter()
        .map(|header| UnicodeWidthStr::width(header.as_str()))
        .collect();

    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    let header_line: Vec<String> = headers
        .iter()
        .zip(&widths)
        .map(|(header, width)| format!("{header:width$}"))
        .collect();
    writeln!(writer, "{}", header_line.join(" ").trim_end())?;

    let rule: Vec<String> = widths.iter().map(|width| "-".repeat(*width)).collect();
    writeln!(writer, "{}", rule.join(" "))?;

    for row in rows {
        let mut line = String::new();
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            if idx > 0 {
                line.push(' ');
            }
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            line.push_str(cell);
            line.push_str(&" ".repeat(widths[idx].saturating_sub(visible_width)));
        }
        writeln!(writer, "{}", line.trim_end())?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use chrono::{Days, Duration, Utc};

    use super::*;
    use crate::history::HistoryArchive;
    use crate::rank::SortMode;
    use crate::task::Importance;
    use crate::view::derive_view;

    fn plain() -> Renderer {
        Renderer { color: false }
    }

    #[test]
    fn color_flag_comes_from_config() {
        for value in ["off", "no", "0", "false"] {
            let mut cfg = Config::default();
            cfg.apply_overrides([("color".to_string(), value.to_string())]);
            assert!(!Renderer::new(&cfg).color, "color={value}");
        }
    }

    fn now() -> DateTime<Tz> {
        chrono_tz::UTC
            .with_ymd_and_hms(2026, 10, 16, 12, 0, 0)
            .single()
            .expect("valid now")
    }

    fn task(id: &str, days: Option<u64>) -> Task {
        let now = now();
        Task {
            id: id.to_string(),
            title: format!("{id} title"),
            content: String::new(),
            importance_level: Importance::Important,
            is_everyday: days.is_none(),
            ddl: days.and_then(|d| now.date_naive().checked_add_days(Days::new(d))),
            time: None,
            created_at: now.with_timezone(&Utc) - Duration::days(1),
            last_completed_at: None,
        }
    }

    fn render(view: &ViewModel) -> String {
        let mut buf = Vec::new();
        plain()
            .write_dashboard(&mut buf, view, &now())
            .expect("render");
        String::from_utf8(buf).expect("utf8")
    }

    #[test]
    fn dashboard_numbers_hero_then_grid() {
        let tasks = vec![task("soon", Some(0)), task("later", Some(9)), task("daily", None)];
        let view = derive_view(&tasks, &HistoryArchive::default(), SortMode::Time, &now());
        let text = render(&view);

        assert!(text.contains("URGENT"));
        assert!(text.contains(" 1. ! soon title  due today (11h 59m left)"));
        let grid: Vec<&str> = text.lines().skip_while(|l| !l.starts_with('#')).collect();
        assert!(grid[2].starts_with("2 "));
        assert!(grid[2].contains("due in 9 days"));
        assert!(grid[3].starts_with("3 "));
        assert!(grid[3].contains("daily"));
    }

    #[test]
    fn empty_dashboard_has_a_hint() {
        let view = derive_view(&[], &HistoryArchive::default(), SortMode::Importance, &now());
        let text = render(&view);
        assert!(text.starts_with("sorted by importance"));
        assert!(text.contains("Nothing to do."));
    }

    #[test]
    fn history_header_counts_against_capacity() {
        let mut archive = HistoryArchive::default();
        archive.archive(task("walk", None), now().with_timezone(&Utc), EntryKind::DailyLog);
        archive.archive(task("taxes", Some(1)), now().with_timezone(&Utc), EntryKind::Normal);

        let mut buf = Vec::new();
        plain()
            .write_history(&mut buf, &archive.to_vec(), 20, &now())
            .expect("render");
        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "completed (2/20)");
        assert!(lines[3].contains("taxes title") && lines[3].contains("done"));
        assert!(lines[4].contains("walk title") && lines[4].contains("daily"));

        let mut buf = Vec::new();
        plain()
            .write_history(&mut buf, &[], 20, &now())
            .expect("render");
        assert_eq!(
            String::from_utf8(buf).expect("utf8"),
            "completed (0/20)\nNo completed tasks yet.\n"
        );
    }

    #[test]
    fn table_pads_by_visible_width() {
        let mut buf = Vec::new();
        write_table(
            &mut buf,
            vec!["A".to_string(), "B".to_string()],
            vec![vec!["\x1b[31mxyz\x1b[0m".to_string(), "1".to_string()]],
        )
        .expect("table");
        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "A   B");
        assert_eq!(lines[1], "--- -");
        assert_eq!(strip_ansi(lines[2]), "xyz 1");
    }
}
