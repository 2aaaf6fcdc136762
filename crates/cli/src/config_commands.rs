use std::path::Path;

use {anyhow::Result, clap::Subcommand};

use ribbon_config::validate::{self, Severity};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors/warnings.
    Check {
        /// Show informational diagnostics in addition to errors and warnings.
        #[arg(long)]
        verbose: bool,
    },
    /// Print the effective configuration as TOML.
    Show,
    /// Print the config file path in use (or the default one).
    Path,
    /// Write a default config file if none exists yet.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

pub fn handle_config(action: &ConfigAction, explicit: Option<&Path>) -> Result<()> {
    let path = explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(ribbon_config::find_or_default_config_path);
    match action {
        ConfigAction::Check { verbose } => check(&path, *verbose),
        ConfigAction::Show => {
            let config = if path.exists() {
                ribbon_config::load_config(&path)?
            } else {
                ribbon_config::RibbonConfig::default()
            };
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        },
        ConfigAction::Path => {
            println!("{}", path.display());
            Ok(())
        },
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
            }
            ribbon_config::save_config(&ribbon_config::RibbonConfig::default(), &path)?;
            println!("Wrote {}", path.display());
            Ok(())
        },
    }
}

const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn color(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => RED,
        Severity::Warning => YELLOW,
        Severity::Info => CYAN,
    }
}

fn check(path: &Path, verbose: bool) -> Result<()> {
    if !path.exists() {
        eprintln!("No config file at {}; defaults apply.", path.display());
        return Ok(());
    }
    let result = validate::validate(path);
    eprintln!("Checking {}\n", path.display());

    let shown: Vec<_> = result
        .diagnostics
        .iter()
        .filter(|d| verbose || d.severity != Severity::Info)
        .collect();
    for d in &shown {
        let tag = format!("{BOLD}{}{}{RESET}", color(d.severity), d.severity.label());
        match d.path.as_str() {
            "" => eprintln!("  {tag} [{}] {}", d.category, d.message),
            at => eprintln!("  {tag} [{}] {at}: {}", d.category, d.message),
        }
    }
    if !shown.is_empty() {
        eprintln!();
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);
    match (errors, warnings) {
        (0, 0) => eprintln!("No issues found."),
        _ => eprintln!("{errors} error(s), {warnings} warning(s)"),
    }
    if result.has_errors() {
        anyhow::bail!("configuration has {errors} error(s)");
    }
    Ok(())
}
