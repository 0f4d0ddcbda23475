//! litkernel - annotate a long document with a validated dramatic-arc
//! alignment, macro profile and literary-device catalog.
//!
//! ## Commands
//!
//! - `run`: drive the four stages, resuming from the furthest checkpoint
//! - `patch`: backfill an older record with fields from a newer one, writing
//!   the next record version and keeping a backup of the old one
//! - `archive`: keep labelled copies of superseded files
//! - `verify`: re-check a saved record
//! - `status`: list which stage checkpoints exist for a document

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use litkernel_core::obs::PipelineSpan;
use litkernel_core::versioning::patch_to_version;
use litkernel_core::{
    patch_file, read_record, schema_version_of, verify_record, AnthropicClient, Archive, ArchiveRequest,
    BookMetadata, Document, PatchOptions, PipelineConfig, PipelineController, RecordVersion,
    ReviewDecision, Stage, StageReviewer, StructureVerdict, CURRENT_SCHEMA_VERSION,
};
use litkernel_store::{read_json_file, slugify, FsCheckpointStore};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "litkernel")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Literary kernel pipeline: structure, passages, macro profile and devices", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline over a document, resuming from valid checkpoints
    Run {
        /// Source document (.pdf, or plain text)
        document: PathBuf,

        /// Document title (also names checkpoints and the record)
        title: String,

        author: String,

        edition: String,

        /// Delete this stage's checkpoint and every later one first
        #[arg(long, conflicts_with = "fresh")]
        from_stage: Option<Stage>,

        /// Delete every checkpoint of this document first
        #[arg(long)]
        fresh: bool,

        /// Chapter count (detected from headings if omitted)
        #[arg(long)]
        chapters: Option<u32>,

        /// Approve every stage without prompting
        #[arg(short, long)]
        yes: bool,

        /// TOML configuration file
        #[arg(long, env = "LITKERNEL_CONFIG")]
        config: Option<PathBuf>,

        /// Checkpoint directory (overrides config)
        #[arg(long)]
        checkpoint_dir: Option<PathBuf>,

        /// Record output directory (overrides config)
        #[arg(long)]
        records_dir: Option<PathBuf>,

        /// Model identifier (overrides config)
        #[arg(long)]
        model: Option<String>,
    },

    /// Copy fields missing from an older record in from a newer one
    Patch {
        /// Record to preserve
        old: PathBuf,

        /// Record to take missing fields from
        new: PathBuf,

        /// Output path (default: the old path tagged with the new version)
        #[arg(short, long, conflicts_with = "stdout")]
        output: Option<PathBuf>,

        /// Record version to stamp (default: the old record's version + 0.1)
        #[arg(long = "version", value_name = "X.Y")]
        target_version: Option<RecordVersion>,

        /// Do not copy the old record aside before writing
        #[arg(long)]
        no_backup: bool,

        /// Print the patched record instead of writing any file
        #[arg(long)]
        stdout: bool,
    },

    /// Keep labelled, indexed copies of superseded files
    Archive {
        /// Archive directory
        #[arg(long, default_value = "archive")]
        dir: PathBuf,

        #[command(subcommand)]
        action: ArchiveAction,
    },

    /// Re-run structure and placement checks over a saved record
    Verify {
        record: PathBuf,
    },

    /// Show which stage checkpoints exist for a document
    Status {
        title: String,

        /// TOML configuration file
        #[arg(long, env = "LITKERNEL_CONFIG")]
        config: Option<PathBuf>,

        /// Checkpoint directory (overrides config)
        #[arg(long)]
        checkpoint_dir: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ArchiveAction {
    /// Copy a file into the archive under a versioned name
    Add {
        file: PathBuf,

        #[arg(long = "version", value_name = "X.Y")]
        file_version: RecordVersion,

        /// Why the file is being archived
        #[arg(short, long)]
        reason: String,

        /// Short label for the archived file name (default: from the reason)
        #[arg(short, long, default_value = "")]
        description: String,

        /// What replaced this file
        #[arg(long)]
        replaced_by: Option<String>,

        #[arg(long, default_value = "")]
        notes: String,
    },

    /// List archived versions of a file, newest first
    List {
        /// Base name, e.g. `The_Giver_record`
        base: String,
    },

    /// Summarise the archive index
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    litkernel_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run {
            document,
            title,
            author,
            edition,
            from_stage,
            fresh,
            chapters,
            yes,
            config,
            checkpoint_dir,
            records_dir,
            model,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(dir) = checkpoint_dir {
                config = config.with_checkpoint_dir(dir);
            }
            if let Some(dir) = records_dir {
                config = config.with_records_dir(dir);
            }
            if let Some(model) = model {
                config = config.with_model(model);
            }
            let restart = match (fresh, from_stage) {
                (true, _) => Some(Stage::Structure),
                (false, stage) => stage,
            };
            cmd_run(
                config,
                &document,
                BookMetadata::new(title, author, edition),
                chapters,
                restart,
                yes,
            )
            .await
        }
        Commands::Patch {
            old,
            new,
            output,
            target_version,
            no_backup,
            stdout,
        } => {
            if stdout {
                cmd_patch_stdout(&old, &new, target_version)
            } else {
                let options = PatchOptions {
                    version: target_version,
                    backup: !no_backup,
                    output,
                };
                cmd_patch(&old, &new, &options)
            }
        }
        Commands::Archive { dir, action } => cmd_archive(&dir, action),
        Commands::Verify { record } => cmd_verify(&record),
        Commands::Status {
            title,
            config,
            checkpoint_dir,
        } => {
            let config = load_config(config.as_deref())?;
            let dir = checkpoint_dir.unwrap_or(config.checkpoint_dir);
            cmd_status(&dir, &title)
        }
    }
}

/// Defaults, then the optional TOML file, then the environment.
fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let config = match path {
        Some(path) => PipelineConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load config {:?}", path))?
            .overlay_env(|key| std::env::var(key).ok())?,
        None => PipelineConfig::from_env()?,
    };
    Ok(config)
}

/// Asks the operator on stdin to approve each generated stage.
struct InteractiveReviewer;

impl StageReviewer for InteractiveReviewer {
    fn review(&self, stage: Stage, summary: &str) -> ReviewDecision {
        println!("\n=== {stage} ===\n{summary}");
        print!("Accept {stage} output? [y/N] ");
        if io::stdout().flush().is_err() {
            return ReviewDecision::Reject {
                reason: "stdout unavailable".into(),
            };
        }

        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return ReviewDecision::Reject {
                reason: "no answer on stdin".into(),
            };
        }
        match answer.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => ReviewDecision::Approve,
            _ => ReviewDecision::Reject {
                reason: "declined by operator".into(),
            },
        }
    }
}

/// Run every stage and write the record.
async fn cmd_run(
    config: PipelineConfig,
    document_path: &Path,
    book: BookMetadata,
    chapters: Option<u32>,
    restart: Option<Stage>,
    auto_approve: bool,
) -> Result<()> {
    let document = Document::load(document_path, chapters)
        .with_context(|| format!("Failed to load document {:?}", document_path))?;
    info!(
        words = document.word_count(),
        chapters = document.chapter_count(),
        "document loaded"
    );

    let service = AnthropicClient::new(config.service.clone())
        .context("Failed to configure generative service")?;
    let store = FsCheckpointStore::new(&config.checkpoint_dir)
        .with_context(|| format!("Failed to open checkpoint directory {:?}", config.checkpoint_dir))?;

    let mut controller =
        PipelineController::new(config, book, document, Arc::new(service), Arc::new(store));
    if !auto_approve {
        controller = controller.with_reviewer(Box::new(InteractiveReviewer));
    }
    if let Some(stage) = restart {
        controller.restart_from(stage)?;
    }

    let record = controller.run().await.context("Pipeline halted")?;

    println!("Record written: {}", controller.record_path().display());
    println!("  chapters: {}", record.metadata.total_chapters);
    for seg in record.alignment.iter() {
        println!("  {:<15} {}", seg.kind.as_str(), seg.chapter_range);
    }
    println!("  devices: {}", record.devices.len());
    if !record.consistency_report.is_noop() {
        println!(
            "  repaired: {} relocated, {} duplicates removed, {} point-of-view removals",
            record.consistency_report.relocated.len(),
            record.consistency_report.duplicates_removed.len(),
            record.consistency_report.exclusivity_violations.len()
        );
    }
    Ok(())
}

/// Patch `old` from `new`, back it up and write the next record version.
fn cmd_patch(old: &Path, new: &Path, options: &PatchOptions) -> Result<()> {
    let _span = PipelineSpan::enter(&old.display().to_string(), "patch");

    let outcome = patch_file(old, new, options)
        .with_context(|| format!("Failed to patch {:?} from {:?}", old, new))?;
    if let Some(backup) = &outcome.backup {
        println!("Backup: {}", backup.display());
    }
    println!(
        "Patched record v{} -> v{} (schema v{} -> v{}) written to {}",
        outcome.from_version,
        outcome.to_version,
        outcome.from_schema,
        CURRENT_SCHEMA_VERSION,
        outcome.output.display()
    );
    Ok(())
}

/// Patch `old` from `new` and print the result without touching any file.
fn cmd_patch_stdout(old: &Path, new: &Path, version: Option<RecordVersion>) -> Result<()> {
    let old_value = read_json_file(old).with_context(|| format!("Failed to read {:?}", old))?;
    let new_value = read_json_file(new).with_context(|| format!("Failed to read {:?}", new))?;
    let version = version.unwrap_or_else(|| {
        RecordVersion::of_record(&old_value)
            .unwrap_or(RecordVersion::INITIAL)
            .next()
    });
    info!(schema = schema_version_of(&old_value), %version, "patching to stdout");
    let patched = patch_to_version(old_value, new_value, version).context("Failed to patch record")?;
    println!("{}", serde_json::to_string_pretty(&patched)?);
    Ok(())
}

fn cmd_archive(dir: &Path, action: ArchiveAction) -> Result<()> {
    let archive = Archive::open(dir).with_context(|| format!("Failed to open archive {:?}", dir))?;
    match action {
        ArchiveAction::Add {
            file,
            file_version,
            reason,
            description,
            replaced_by,
            notes,
        } => {
            let mut request = ArchiveRequest::new(file_version, reason).with_description(description);
            request.replaced_by = replaced_by;
            request.notes = notes;
            let entry = archive
                .archive(&file, &request)
                .with_context(|| format!("Failed to archive {:?}", file))?;
            println!("Archived: {} -> {}", entry.original_name, entry.archived_name);
        }
        ArchiveAction::List { base } => {
            let versions = archive.versions(&base)?;
            if versions.is_empty() {
                println!("No archived versions of {}", base);
            }
            for (i, entry) in versions.iter().enumerate() {
                println!("{}. {}", i + 1, entry.archived_name);
                println!("   version: {}", entry.version);
                println!("   archived: {}", entry.archived_at.format("%Y-%m-%d %H:%M:%S"));
                println!("   reason: {}", entry.reason);
                if let Some(replacement) = &entry.replaced_by {
                    println!("   replaced by: {}", replacement);
                }
                if !entry.notes.is_empty() {
                    println!("   notes: {}", entry.notes);
                }
            }
        }
        ArchiveAction::Show => {
            let index = archive.index()?;
            println!("Archive: {}", archive.dir().display());
            println!("  created: {}", index.created.format("%Y-%m-%d %H:%M:%S"));
            println!("  last updated: {}", index.last_updated.format("%Y-%m-%d %H:%M:%S"));
            println!("  archived versions: {}", index.total_versions());
            for (base, versions) in &index.files {
                println!("  - {}: {} version(s)", base, versions.len());
            }
        }
    }
    Ok(())
}

fn cmd_verify(path: &Path) -> Result<()> {
    let record = read_record(path).with_context(|| format!("Failed to read record {:?}", path))?;
    let _span = PipelineSpan::enter(&slugify(&record.metadata.title), &record.metadata.run_id.to_string());
    let verification = verify_record(&record);

    match &verification.structure {
        StructureVerdict::Valid => println!(
            "structure: ok ({} chapters)",
            record.metadata.total_chapters
        ),
        StructureVerdict::Invalid(diagnostics) => println!("structure: {}", diagnostics),
    }
    for misplaced in &verification.misplaced_primaries {
        println!(
            "warning: {} primary chapter {} lies outside {}",
            misplaced.segment, misplaced.primary_chapter, misplaced.chapter_range
        );
    }
    for violation in &verification.placement_violations {
        let chapter = violation
            .chapter
            .map_or_else(|| "?".to_string(), |c| c.to_string());
        println!(
            "warning: {} example in chapter {} ({:?})",
            violation.device, chapter, violation.problem
        );
    }

    if !verification.is_valid() {
        anyhow::bail!("Record {:?} failed verification", path);
    }
    Ok(())
}

fn cmd_status(checkpoint_dir: &Path, title: &str) -> Result<()> {
    let store = FsCheckpointStore::new(checkpoint_dir)
        .with_context(|| format!("Failed to open checkpoint directory {:?}", checkpoint_dir))?;
    let status = PipelineController::checkpoint_status(&store, title)?;

    println!("{} ({})", title, slugify(title));
    for entry in &status {
        let mark = if entry.present { "checkpointed" } else { "-" };
        println!("  {:<8} {}", entry.stage.id(), mark);
    }
    match status.iter().find(|s| !s.present) {
        Some(next) => println!("next stage: {}", next.stage),
        None => println!("all stages checkpointed"),
    }
    Ok(())
}
