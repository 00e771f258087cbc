use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use crate::commands::{expand_command_abbrev, known_command_names};
use crate::config::Config;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "nudge",
    version,
    about = "nudge: a personal reminder tracker that surfaces what is due next",
    disable_help_subcommand = true,
    arg_required_else_help = false
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "nudgerc")]
    pub nudgerc: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub rest: Vec<OsString>,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = match (quiet, verbose) {
        (q, _) if q >= 2 => "error",
        (1, _) => "warn",
        (_, v) if v >= 3 => "trace",
        (_, 2) => "debug",
        (_, 1) => "info",
        _ => "warn",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.key=value` / `rc.key:value` overrides out of argv.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = rest.split_once('=').or_else(|| rest.split_once(':'));
            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((format!("rc.{k}"), v.to_string()));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

/// One command line after global flags: task references written before the
/// command, the command itself, and whatever follows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub refs: Vec<String>,
    pub command: String,
    pub command_args: Vec<String>,
}

impl Invocation {
    #[tracing::instrument(skip(cfg, rest))]
    pub fn parse(cfg: &Config, rest: Vec<OsString>) -> anyhow::Result<Self> {
        let tokens: Vec<String> = rest
            .into_iter()
            .map(|arg| arg.to_string_lossy().to_string())
            .collect();

        if tokens.is_empty() {
            let cmd = cfg
                .get("default.command")
                .unwrap_or_else(|| "next".to_string());
            let command = expand_command_abbrev(&cmd, &known_command_names())
                .ok_or_else(|| anyhow!("default.command is not a command: {cmd}"))?;
            debug!(command, "no explicit command, using default");
            return Ok(Self {
                refs: vec![],
                command: command.to_string(),
                command_args: vec![],
            });
        }

        let known = known_command_names();
        for (i, token) in tokens.iter().enumerate() {
            if let Some(full) = expand_command_abbrev(token, &known) {
                debug!(
                    token = %token,
                    expanded = %full,
                    split_index = i,
                    "resolved command token"
                );
                return Ok(Self {
                    refs: tokens[..i].to_vec(),
                    command: full.to_string(),
                    command_args: tokens[i + 1..].to_vec(),
                });
            }
        }

        if !tokens.iter().all(|tok| looks_like_ref(tok)) {
            return Err(anyhow!(
                "unknown command: {} (try `nudge help`)",
                tokens[0]
            ));
        }

        warn!("no command given; showing details for the referenced tasks");
        Ok(Self {
            refs: tokens,
            command: "info".to_string(),
            command_args: vec![],
        })
    }
}

/// Dashboard positions are numbers; ids are uuids, so hex digits and dashes.
fn looks_like_ref(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c.is_ascii_hexdigit() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<Invocation> {
        let rest = args.iter().map(OsString::from).collect();
        Invocation::parse(&Config::default(), rest)
    }

    #[test]
    fn empty_command_line_uses_default_command() {
        let inv = parse(&[]).expect("parse");
        assert_eq!(inv.command, "next");
        assert!(inv.refs.is_empty());
    }

    #[test]
    fn refs_may_precede_the_command() {
        let inv = parse(&["2", "3", "do"]).expect("parse");
        assert_eq!(inv.command, "done");
        assert_eq!(inv.refs, ["2", "3"]);

        let inv = parse(&["add", "Buy", "milk", "due:tomorrow"]).expect("parse");
        assert_eq!(inv.command, "add");
        assert!(inv.refs.is_empty());
        assert_eq!(inv.command_args, ["Buy", "milk", "due:tomorrow"]);
    }

    #[test]
    fn bare_refs_mean_info() {
        let inv = parse(&["4"]).expect("parse");
        assert_eq!(inv.command, "info");
        assert_eq!(inv.refs, ["4"]);
        assert!(parse(&["frobnicate"]).is_err());
    }

    #[test]
    fn positional_rc_overrides_are_extracted() {
        let raw: Vec<OsString> = ["nudge", "rc.color=off", "next", "rc.sort.mode:importance"]
            .iter()
            .map(OsString::from)
            .collect();
        let pre = preprocess_args(&raw).expect("preprocess");
        assert_eq!(pre.cleaned_args, [OsString::from("nudge"), OsString::from("next")]);
        assert_eq!(
            pre.rc_overrides,
            [
                ("rc.color".to_string(), "off".to_string()),
                ("rc.sort.mode".to_string(), "importance".to_string()),
            ]
        );
    }
}
