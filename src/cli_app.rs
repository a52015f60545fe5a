//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use kerberos_analyzer::core::config::{Config, ScanMode};
use kerberos_analyzer::core::errors::KerbError;
use kerberos_analyzer::core::paths::resolve_absolute_path;
use kerberos_analyzer::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};
use kerberos_analyzer::platform::pal::{Platform, detect_platform};
use kerberos_analyzer::report::TreeReport;
use kerberos_analyzer::scanner::classifier::PatternClassifier;
use kerberos_analyzer::scanner::integrity::verify_image;
use kerberos_analyzer::scanner::snapshot::{SnapshotBuilder, write_image};
use kerberos_analyzer::scanner::tree::TreeRenderer;

/// Kerberos: bounded disk analyzer for low-resource machines.
#[derive(Debug, Parser)]
#[command(
    name = "kerb",
    author,
    version,
    about = "Kerberos - bounded disk analyzer and snapshot tool",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Increase verbosity.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Quiet mode (errors only).
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Render an annotated tree report of one or more targets and save it.
    Analyze(AnalyzeArgs),
    /// Deep tree report without script classification.
    FullScan(ReportArgs),
    /// Shallow look at a directory; printed, never saved.
    Prescan(PrescanArgs),
    /// Write a .kbi snapshot image and its checksum record.
    Image(ImageArgs),
    /// Check a .kbi image against its checksum record.
    Verify(VerifyArgs),
    /// Classify a single script file.
    Classify(ClassifyArgs),
    /// List mounted volumes and their capacity.
    Volumes,
    /// View configuration state.
    Config(ConfigArgs),
    /// Show version; `-v` adds build metadata.
    Version,
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args, Default)]
struct ReportArgs {
    /// Targets to scan. Defaults to `paths.default_roots` from config.
    #[arg(value_name = "PATH")]
    paths: Vec<PathBuf>,
    /// Directory the report is saved into (overrides `paths.output_dir`).
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,
    /// Print the report without saving it.
    #[arg(long)]
    no_save: bool,
}

#[derive(Debug, Clone, Args, Default)]
struct AnalyzeArgs {
    #[command(flatten)]
    report: ReportArgs,
    /// Use the extended depth (`scan.deep_max_depth`).
    #[arg(long)]
    deep: bool,
}

#[derive(Debug, Clone, Args)]
struct PrescanArgs {
    /// Directory to look into.
    #[arg(value_name = "DIR")]
    path: PathBuf,
}

#[derive(Debug, Clone, Args)]
struct ImageArgs {
    /// Directory to snapshot.
    #[arg(value_name = "DIR")]
    path: PathBuf,
    /// Directory the image is written into (overrides `paths.output_dir`).
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct VerifyArgs {
    /// Image manifest to check.
    #[arg(value_name = "MANIFEST")]
    manifest: PathBuf,
    /// Checksum record path. Defaults to `<MANIFEST>.sha256`.
    #[arg(long, value_name = "PATH")]
    checksum: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct ClassifyArgs {
    /// Script file to classify.
    #[arg(value_name = "FILE")]
    file: PathBuf,
}

#[derive(Debug, Clone, Args, Default)]
struct ConfigArgs {
    /// Config operation to run.
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print resolved config file path.
    Path,
    /// Print effective merged configuration.
    Show,
    /// Validate configuration and exit.
    Validate,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input at runtime.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// An image does not match its checksum record.
    #[error("{0}")]
    Mismatch(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Json(_) => 3,
            Self::Mismatch(_) => 4,
        }
    }
}

impl From<KerbError> for CliError {
    fn from(error: KerbError) -> Self {
        match error {
            KerbError::InvalidConfig { .. }
            | KerbError::MissingConfig { .. }
            | KerbError::ConfigParse { .. }
            | KerbError::ChecksumParse { .. } => Self::User(error.to_string()),
            _ => Self::Runtime(error.to_string()),
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Analyze(args) => {
            let mode = if args.deep {
                ScanMode::Deep
            } else {
                ScanMode::Standard
            };
            run_report(cli, "analyze", mode, &args.report)
        }
        Command::FullScan(args) => run_report(cli, "full-scan", ScanMode::Full, args),
        Command::Prescan(args) => run_prescan(cli, args),
        Command::Image(args) => run_image(cli, args),
        Command::Verify(args) => run_verify(cli, args),
        Command::Classify(args) => run_classify(cli, args),
        Command::Volumes => run_volumes(cli),
        Command::Config(args) => run_config(cli, args),
        Command::Version => emit_version(cli),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Activity log
// ---------------------------------------------------------------------------

/// Per-command JSONL activity recorder. Never fails the command.
struct ActivityLog {
    writer: JsonlWriter,
    command: &'static str,
    config_hash: Option<String>,
    started: Instant,
}

impl ActivityLog {
    fn open(config: &Config, command: &'static str) -> Self {
        let mut jsonl = JsonlConfig::at(&config.paths.jsonl_log);
        jsonl.fallback_path = Some(std::env::temp_dir().join("kerberos-activity.jsonl"));
        Self {
            writer: JsonlWriter::open(jsonl),
            command,
            config_hash: config.stable_hash().ok(),
            started: Instant::now(),
        }
    }

    fn entry(&self, event: EventType, severity: Severity) -> LogEntry {
        let mut entry = LogEntry::new(event, severity);
        entry.command = Some(self.command.to_string());
        entry.config_hash.clone_from(&self.config_hash);
        entry.duration_ms = Some(u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX));
        entry
    }

    fn record(&mut self, entry: &LogEntry) {
        self.writer.write_entry(entry);
    }

    /// Log `error` and hand it back converted for the caller's `?`.
    fn fail(&mut self, error: KerbError) -> CliError {
        let mut entry = LogEntry::from_error(self.command, &error);
        entry.config_hash.clone_from(&self.config_hash);
        self.record(&entry);
        CliError::from(error)
    }
}

impl Drop for ActivityLog {
    fn drop(&mut self) {
        self.writer.flush();
    }
}

// ---------------------------------------------------------------------------
// Tree reports
// ---------------------------------------------------------------------------

fn run_report(
    cli: &Cli,
    command: &'static str,
    mode: ScanMode,
    args: &ReportArgs,
) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let mut log = ActivityLog::open(&config, command);

    let raw_targets = if args.paths.is_empty() {
        &config.paths.default_roots
    } else {
        &args.paths
    };
    let mut targets = Vec::with_capacity(raw_targets.len());
    for raw in raw_targets {
        if !raw.exists() {
            return Err(CliError::User(format!(
                "target does not exist: {}",
                raw.display()
            )));
        }
        targets.push(resolve_absolute_path(raw));
    }

    for target in &targets {
        let mut entry = log.entry(EventType::ScanStart, Severity::Info);
        entry.mode = Some(mode.label().to_string());
        entry.target = Some(target.to_string_lossy().into_owned());
        log.record(&entry);
    }

    // No platform collaborator means every Space line reads N/A.
    let platform: Option<Arc<dyn Platform>> = detect_platform().ok();
    let scan_config = config.scan_config(mode);
    let report = TreeReport::build(&targets, mode, &scan_config, platform.as_deref());

    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| config.paths.output_dir.clone());
    let save_path = if args.no_save {
        None
    } else {
        mode.report_file_name().map(|name| output_dir.join(name))
    };
    let saved = save_path
        .as_deref()
        .map(|path| report.save(path).map(|()| path.to_path_buf()))
        .transpose();

    match &saved {
        Ok(Some(path)) => {
            let mut entry = log.entry(EventType::ReportWritten, Severity::Info);
            entry.mode = Some(mode.label().to_string());
            entry.output = Some(path.to_string_lossy().into_owned());
            entry.entries = u64::try_from(report.tree_lines()).ok();
            entry.ok = Some(true);
            log.record(&entry);
        }
        Ok(None) => {}
        Err(error) => {
            let entry = LogEntry::from_error(command, error);
            log.record(&entry);
        }
    }

    // The report is shown even when it could not be saved.
    match output_mode(cli) {
        OutputMode::Human => {
            if !cli.quiet {
                println!("{}", report.to_text());
            }
            match &saved {
                Ok(Some(path)) if !cli.quiet => {
                    println!("{} {}", "Report saved:".green(), path.display());
                }
                Err(error) => eprintln!("{} {error}", "Report not saved:".red()),
                _ => {}
            }
            if cli.verbose {
                eprintln!(
                    "{} lines across {} target(s) in {:.1}s",
                    report.tree_lines(),
                    targets.len(),
                    log.started.elapsed().as_secs_f64()
                );
            }
        }
        OutputMode::Json => {
            let saved_to = match &saved {
                Ok(Some(path)) => Value::from(path.to_string_lossy().into_owned()),
                _ => Value::Null,
            };
            let payload = json!({
                "command": command,
                "mode": mode,
                "report": serde_json::to_value(&report)?,
                "saved_to": saved_to,
            });
            write_json_line(&payload)?;
        }
    }

    saved.map(|_| ()).map_err(CliError::from)
}

fn run_prescan(cli: &Cli, args: &PrescanArgs) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let mut log = ActivityLog::open(&config, "prescan");

    if !args.path.is_dir() {
        return Err(CliError::User(format!(
            "not a directory: {}",
            args.path.display()
        )));
    }
    let target = resolve_absolute_path(&args.path);

    let mut entry = log.entry(EventType::ScanStart, Severity::Info);
    entry.mode = Some(ScanMode::Prescan.label().to_string());
    entry.target = Some(target.to_string_lossy().into_owned());
    log.record(&entry);

    let scan_config = config.scan_config(ScanMode::Prescan);
    let (max_depth, max_entries) = (scan_config.max_depth, scan_config.max_entries_per_dir);
    let tree = TreeRenderer::new(scan_config).render_tree(&target);

    match output_mode(cli) {
        OutputMode::Human => {
            println!("{} {}", "Prescan of:".bold(), target.display());
            println!("(depth {max_depth}, max {max_entries} entries)");
            for line in &tree.lines {
                println!("{line}");
            }
            if tree.dropped_entries > 0 {
                println!("({} entries over the per-directory cap)", tree.dropped_entries);
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "prescan",
                "target": target.to_string_lossy(),
                "max_depth": max_depth,
                "max_entries_per_dir": max_entries,
                "dropped_entries": tree.dropped_entries,
                "tree": tree.lines,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

fn run_image(cli: &Cli, args: &ImageArgs) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let mut log = ActivityLog::open(&config, "image");

    if !args.path.is_dir() {
        return Err(CliError::User(format!(
            "not a directory: {}",
            args.path.display()
        )));
    }
    let target = resolve_absolute_path(&args.path);
    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| config.paths.output_dir.clone());

    let mut entry = log.entry(EventType::ScanStart, Severity::Info);
    entry.mode = Some("image".to_string());
    entry.target = Some(target.to_string_lossy().into_owned());
    log.record(&entry);

    let manifest = SnapshotBuilder::new(config.snapshot_config()).build(&target);
    let artifacts = write_image(&manifest, &output_dir).map_err(|e| log.fail(e))?;

    let mut entry = log.entry(EventType::ImageCreated, Severity::Info);
    entry.target = Some(target.to_string_lossy().into_owned());
    entry.output = Some(artifacts.manifest_path.to_string_lossy().into_owned());
    entry.entries = u64::try_from(artifacts.regular_entries).ok();
    entry.digest = Some(artifacts.record.digest_hex.clone());
    entry.ok = Some(true);
    if artifacts.truncated {
        entry.details = Some("global entry cap reached".to_string());
    }
    log.record(&entry);

    match output_mode(cli) {
        OutputMode::Human => {
            if !cli.quiet {
                println!(
                    "{} {}",
                    "Image written:".green(),
                    artifacts.manifest_path.display()
                );
                println!(
                    "Checksum: {} ({})",
                    artifacts.record_path.display(),
                    artifacts.record.digest_hex
                );
                let suffix = if artifacts.truncated {
                    " (truncated at the global cap)"
                } else {
                    ""
                };
                println!(
                    "Entries: {} directories and files{suffix}",
                    artifacts.regular_entries
                );
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "image",
                "target": target.to_string_lossy(),
                "artifacts": serde_json::to_value(&artifacts)?,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn run_verify(cli: &Cli, args: &VerifyArgs) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let mut log = ActivityLog::open(&config, "verify");

    let report = verify_image(&args.manifest, args.checksum.as_deref()).map_err(|e| log.fail(e))?;
    let passed = report.passed();

    let mut entry = log.entry(
        EventType::ImageVerified,
        if passed {
            Severity::Info
        } else {
            Severity::Warning
        },
    );
    entry.target = Some(report.manifest_path.to_string_lossy().into_owned());
    entry.digest = Some(report.actual_digest.clone());
    entry.ok = Some(passed);
    log.record(&entry);

    match output_mode(cli) {
        OutputMode::Human => {
            if passed {
                if !cli.quiet {
                    println!("{} {}", "OK".green().bold(), report.message());
                }
            } else {
                println!("{} {}", "MISMATCH".red().bold(), report.message());
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "verify",
                "passed": passed,
                "report": serde_json::to_value(&report)?,
            });
            write_json_line(&payload)?;
        }
    }

    if passed {
        Ok(())
    } else {
        Err(CliError::Mismatch(format!(
            "integrity check failed for {}",
            report.manifest_path.display()
        )))
    }
}

// ---------------------------------------------------------------------------
// Single-file classification and volumes
// ---------------------------------------------------------------------------

fn run_classify(cli: &Cli, args: &ClassifyArgs) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;

    if !args.file.is_file() {
        return Err(CliError::User(format!("not a file: {}", args.file.display())));
    }
    let classifier = PatternClassifier::new(config.scan.script_sample_bytes);
    let analysis = classifier.analyze_file(&args.file).ok_or_else(|| {
        CliError::User(format!(
            "{} is not a recognized script type",
            args.file.display()
        ))
    })?;

    match output_mode(cli) {
        OutputMode::Human => {
            let verdict = analysis.verdict.render();
            let shown = if analysis.verdict.is_clean() {
                verdict.green()
            } else if analysis.verdict.has_risk() {
                verdict.red()
            } else {
                verdict.yellow()
            };
            println!("{}  [{shown}]", args.file.display());
            if cli.verbose {
                println!("language: {}", analysis.language);
                println!("sample truncated: {}", analysis.sample_truncated);
                if !analysis.imports.is_empty() {
                    println!("imports: {}", analysis.imports.join(", "));
                }
                for label in &analysis.risk_labels {
                    println!("risk: {label}");
                }
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "classify",
                "path": args.file.to_string_lossy(),
                "rendered": analysis.verdict.render(),
                "analysis": serde_json::to_value(&analysis)?,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn run_volumes(cli: &Cli) -> Result<(), CliError> {
    let platform = detect_platform()?;
    let volumes = platform.volumes()?;

    let rows: Vec<(String, String, Option<(u64, u64)>)> = volumes
        .iter()
        .map(|volume| {
            let capacity = platform
                .capacity(&volume.path)
                .ok()
                .map(|cap| (cap.used_bytes(), cap.total_bytes));
            (
                volume.path.to_string_lossy().into_owned(),
                volume.fs_type.clone(),
                capacity,
            )
        })
        .collect();

    match output_mode(cli) {
        OutputMode::Human => {
            println!(
                "  {:<40}  {:<10}  {:>10}  {:>10}",
                "Mount", "Type", "Used", "Total"
            );
            println!("  {}", "-".repeat(76));
            for (path, fs_type, capacity) in &rows {
                let (used, total) = capacity.map_or_else(
                    || ("?".to_string(), "?".to_string()),
                    |(used, total)| (format_bytes(used), format_bytes(total)),
                );
                println!("  {path:<40}  {fs_type:<10}  {used:>10}  {total:>10}");
            }
        }
        OutputMode::Json => {
            let entries: Vec<Value> = rows
                .iter()
                .map(|(path, fs_type, capacity)| {
                    json!({
                        "path": path,
                        "fs_type": fs_type,
                        "used_bytes": capacity.map(|(used, _)| used),
                        "total_bytes": capacity.map(|(_, total)| total),
                    })
                })
                .collect();
            let payload = json!({
                "command": "volumes",
                "volumes": entries,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Config and version
// ---------------------------------------------------------------------------

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    match &args.command {
        None | Some(ConfigCommand::Path) => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            let exists = path.exists();

            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{}", path.display());
                    if !exists {
                        println!("  (file does not exist; defaults will be used)");
                    }
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config path",
                        "path": path.to_string_lossy(),
                        "exists": exists,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Show) => {
            let config = Config::load(cli.config.as_deref())?;

            match output_mode(cli) {
                OutputMode::Human => {
                    let toml_str = toml::to_string_pretty(&config)
                        .map_err(|e| CliError::Runtime(format!("serialize config: {e}")))?;
                    println!("{toml_str}");
                }
                OutputMode::Json => {
                    let value = serde_json::to_value(&config)?;
                    let payload = json!({
                        "command": "config show",
                        "config": value,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Validate) => match Config::load(cli.config.as_deref()) {
            Ok(config) => {
                let hash = config.stable_hash()?;

                match output_mode(cli) {
                    OutputMode::Human => {
                        println!("Configuration is valid.");
                        println!("  Source: {}", config.paths.config_file.display());
                        println!("  Hash: {hash}");
                    }
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": true,
                            "path": config.paths.config_file.to_string_lossy(),
                            "hash": hash,
                        });
                        write_json_line(&payload)?;
                    }
                }
                Ok(())
            }
            Err(e) => {
                match output_mode(cli) {
                    OutputMode::Human => {
                        eprintln!("Configuration is INVALID: {e}");
                    }
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": false,
                            "code": e.code(),
                            "error": e.to_string(),
                        });
                        write_json_line(&payload)?;
                    }
                }
                Err(CliError::User(format!("invalid config: {e}")))
            }
        },
    }
}

fn emit_version(cli: &Cli) -> Result<(), CliError> {
    let version = env!("CARGO_PKG_VERSION");
    let package = env!("CARGO_PKG_NAME");
    let target = option_env!("TARGET").unwrap_or("unknown");
    let profile = option_env!("PROFILE").unwrap_or("unknown");

    match output_mode(cli) {
        OutputMode::Human => {
            println!("kerb {version}");
            if cli.verbose {
                println!("package: {package}");
                println!("target: {target}");
                println!("profile: {profile}");
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "binary": "kerb",
                "version": version,
                "package": package,
                "build": {
                    "target": target,
                    "profile": profile,
                }
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

#[allow(clippy::cast_precision_loss)]
fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * KIB;
    const GIB: u64 = 1024 * MIB;
    const TIB: u64 = 1024 * GIB;

    if bytes >= TIB {
        format!("{:.1} TB", bytes as f64 / TIB as f64)
    } else if bytes >= GIB {
        format!("{:.1} GB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("KERB_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_commands_parse() {
        let cases = [
            vec!["kerb", "analyze"],
            vec!["kerb", "analyze", "/tmp", "--deep"],
            vec!["kerb", "analyze", "/a", "/b", "--output-dir", "/tmp/out", "--no-save"],
            vec!["kerb", "full-scan", "/tmp"],
            vec!["kerb", "prescan", "/tmp"],
            vec!["kerb", "image", "/tmp", "--output-dir", "/tmp/out"],
            vec!["kerb", "verify", "x.kbi"],
            vec!["kerb", "verify", "x.kbi", "--checksum", "x.sum"],
            vec!["kerb", "classify", "tool.py"],
            vec!["kerb", "volumes"],
            vec!["kerb", "config"],
            vec!["kerb", "config", "show"],
            vec!["kerb", "config", "path"],
            vec!["kerb", "config", "validate"],
            vec!["kerb", "version", "--verbose"],
            vec!["kerb", "--json", "--no-color", "version"],
        ];

        for case in cases {
            let parsed = Cli::try_parse_from(case.clone());
            assert!(parsed.is_ok(), "failed to parse case: {case:?}");
        }
    }

    #[test]
    fn prescan_and_image_require_a_path() {
        assert!(Cli::try_parse_from(["kerb", "prescan"]).is_err());
        assert!(Cli::try_parse_from(["kerb", "image"]).is_err());
        assert!(Cli::try_parse_from(["kerb", "verify"]).is_err());
    }

    #[test]
    fn verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["kerb", "-v", "-q", "volumes"]).is_err());
    }

    #[test]
    fn completions_support_bash_zsh_and_fish() {
        for shell in ["bash", "zsh", "fish"] {
            let parsed = Cli::try_parse_from(["kerb", "completions", shell]);
            assert!(parsed.is_ok(), "failed shell parse for {shell}");
        }
    }

    #[test]
    fn output_mode_resolution_honors_precedence() {
        assert_eq!(
            resolve_output_mode(true, Some("human"), true),
            OutputMode::Json
        );
        assert_eq!(
            resolve_output_mode(false, Some("json"), true),
            OutputMode::Json
        );
        assert_eq!(
            resolve_output_mode(false, Some("human"), false),
            OutputMode::Human
        );
        assert_eq!(
            resolve_output_mode(false, Some("auto"), true),
            OutputMode::Human
        );
        assert_eq!(resolve_output_mode(false, None, false), OutputMode::Json);
    }

    #[test]
    fn exit_codes_follow_contract() {
        assert_eq!(CliError::User(String::new()).exit_code(), 1);
        assert_eq!(CliError::Runtime(String::new()).exit_code(), 2);
        assert_eq!(CliError::Mismatch(String::new()).exit_code(), 4);
    }

    #[test]
    fn config_errors_are_user_errors() {
        let missing = KerbError::MissingConfig {
            path: PathBuf::from("/nope.toml"),
        };
        assert_eq!(CliError::from(missing).exit_code(), 1);

        let write = KerbError::write("/r.txt", io::Error::other("disk full"));
        assert_eq!(CliError::from(write).exit_code(), 2);
    }

    #[test]
    fn format_bytes_scales_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn help_lists_command_surface() {
        let mut cmd = Cli::command();
        let help = cmd.render_long_help().to_string();
        for keyword in [
            "analyze",
            "full-scan",
            "prescan",
            "image",
            "verify",
            "classify",
            "volumes",
            "completions",
        ] {
            assert!(
                help.contains(keyword),
                "help output missing command: {keyword}"
            );
        }
    }
}
