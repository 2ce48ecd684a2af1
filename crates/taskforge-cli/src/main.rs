use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use taskforge_core::compiler::{CompileOptions, EmitOptions, RunReport, TaskSpecCompiler};
use taskforge_core::TaskId;

/// Taskforge CLI - compile checklist plans into task records
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a checklist into one record file per task
    Compile {
        /// Checklist file, or a directory containing tasks.md
        source: PathBuf,

        /// Output directory for task records
        #[arg(short, long, value_name = "DIR")]
        out: PathBuf,

        /// Compute the full write plan without touching the filesystem
        #[arg(long)]
        dry_run: bool,

        /// Replace existing records instead of skipping them
        #[arg(long)]
        overwrite: bool,

        /// Abort on the first failed write instead of isolating it
        #[arg(long)]
        fail_fast: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Parse and validate a checklist without writing records
    Check {
        /// Checklist file, or a directory containing tasks.md
        source: PathBuf,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        // Exit 2: completed, but with non-fatal diagnostics.
        Ok(report) if report.has_warnings() => ExitCode::from(2),
        Ok(_) => ExitCode::SUCCESS,
        // Exit 1: fatal error, nothing was written.
        Err(err) => {
            eprintln!("{} {:#}", "error:".red().bold(), err);
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<RunReport> {
    match cli.command {
        Commands::Compile {
            source,
            out,
            dry_run,
            overwrite,
            fail_fast,
            json,
        } => {
            let text = read_source(&source)?;
            let compiler = TaskSpecCompiler::new(CompileOptions {
                emit: EmitOptions {
                    overwrite,
                    dry_run,
                    fail_fast,
                    ..Default::default()
                },
                timestamp: None,
            });
            let report = compiler.compile(&text, &out)?;
            render(&report, json);
            Ok(report)
        }
        Commands::Check { source, json } => {
            let text = read_source(&source)?;
            let report = TaskSpecCompiler::default().check(&text)?;
            render(&report, json);
            Ok(report)
        }
    }
}

/// Resolve the checklist source: a file directly, or `tasks.md` inside a
/// directory.
fn read_source(source: &Path) -> anyhow::Result<String> {
    let path = if source.is_dir() {
        source.join("tasks.md")
    } else {
        source.to_path_buf()
    };
    tracing::debug!(path = %path.display(), "reading checklist");
    std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read checklist {}", path.display()))
}

fn render(report: &RunReport, json: bool) {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(report).expect("report serializes")
        );
        return;
    }

    let verb = if report.dry_run { "planned" } else { "compiled" };
    println!(
        "{} {} tasks, {} batches, critical path {} edges",
        verb.green().bold(),
        report.total_tasks,
        report.batch_count,
        report.critical_path_len,
    );

    for phase in &report.tasks_per_phase {
        println!(
            "  phase {} ({}): {} tasks",
            phase.ordinal, phase.label, phase.count
        );
    }
    for (story, count) in &report.tasks_per_story {
        println!("  story {}: {} tasks", story, count);
    }

    println!("\n{}", "execution order".bold());
    println!("  {}", join_ids(&report.execution_order));

    println!("\n{}", "critical path".bold());
    println!("  {}", join_ids(&report.critical_path));

    if !report.files.is_empty() {
        println!("\n{}", "records".bold());
        for file in &report.files {
            println!("  {:<18} {}", file.action.to_string(), file.path.display());
        }
    }

    if report.has_warnings() {
        println!("\n{}", "warnings".yellow().bold());
        for warning in &report.warnings {
            println!("  {}", warning.to_string().yellow());
        }
    }
}

fn join_ids(ids: &[TaskId]) -> String {
    ids.iter()
        .map(TaskId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}
