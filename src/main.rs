//! CLI entry point for `mboxextract`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use mboxextract::config::{self, Config, ProcessorConfig};
use mboxextract::error::MboxError;
use mboxextract::pipeline::{MailboxPipeline, ProcessingStats};

/// Default log file name.
const LOG_FILE_NAME: &str = "mboxextract.log";

/// Number of rows in the "top senders" and "top types" tables.
const TOP_N: usize = 5;

#[derive(Parser)]
#[command(name = "mboxextract", version, about = "Extract attachments from MBOX files")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// MBOX file to process
    #[arg(value_name = "INPUT")]
    input: Option<PathBuf>,

    /// Directory that receives the `attachments/` tree
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Output mailbox path (reserved, currently unused)
    #[arg(long, value_name = "FILE")]
    output_mbox: Option<PathBuf>,

    /// Stop after N messages (0 = unlimited)
    #[arg(short, long, value_name = "N", allow_negative_numbers = true)]
    max_messages: Option<i64>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Detect the type of extension-less attachments after extraction
    #[arg(long)]
    post_process: bool,

    /// Keep the staging directory after post-processing
    #[arg(long)]
    keep_temp: bool,

    /// Keep HTML bodies alongside the plain text
    #[arg(long)]
    keep_html: bool,

    /// Log file (default: mboxextract.log in the cache directory)
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Print statistics as JSON instead of a table
    #[arg(long)]
    json: bool,

    /// Hide the progress bar
    #[arg(long)]
    no_progress: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate shell completions
    Completions {
        /// Shell to generate for
        shell: clap_complete::Shell,
    },
    /// Generate man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Completions { shell }) => return cmd_completions(shell),
        Some(Commands::Manpage) => return cmd_manpage(),
        None => {}
    }

    let config = config::load_config();

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, cli.log_file.as_deref(), &config);

    let interrupted = install_interrupt_handler()?;
    cmd_extract(&cli, &config, interrupted)
}

/// First Ctrl-C stops the run after the current message; a second one exits
/// immediately. Both end with exit code 1.
fn install_interrupt_handler() -> anyhow::Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&flag);
    ctrlc::set_handler(move || {
        if handler_flag.swap(true, Ordering::Relaxed) {
            std::process::exit(1);
        }
        tracing::warn!("Interrupt received, finishing the current message");
    })?;
    Ok(flag)
}

/// Set up tracing with stderr output and file logging.
fn setup_logging(level: &str, log_file: Option<&Path>, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let (log_dir, file_name) = match log_file {
        Some(path) => (
            path.parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
            path.file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(LOG_FILE_NAME)),
        ),
        None => (config::log_dir(config), PathBuf::from(LOG_FILE_NAME)),
    };

    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, file_name);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mboxextract", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

/// Resolve the run configuration: CLI flags over file values.
fn processor_config(cli: &Cli, input: PathBuf, config: &Config) -> ProcessorConfig {
    let mut processor = ProcessorConfig::from_config(input, config);
    if let Some(ref dir) = cli.output_dir {
        processor.output_dir = dir.clone();
    }
    if let Some(ref mbox) = cli.output_mbox {
        processor.output_mbox = mbox.clone();
    }
    if let Some(max) = cli.max_messages {
        processor.max_messages = max;
    }
    processor.verbose = cli.verbose > 0;
    processor.post_process |= cli.post_process;
    processor.keep_temp |= cli.keep_temp;
    processor.keep_html |= cli.keep_html;
    processor
}

/// Extract every attachment from the input mailbox and print a summary.
fn cmd_extract(cli: &Cli, config: &Config, interrupted: Arc<AtomicBool>) -> anyhow::Result<()> {
    let input = cli
        .input
        .clone()
        .ok_or_else(|| anyhow::anyhow!("No input file given (see --help)"))?;

    let processor = processor_config(cli, input, config);
    let mut pipeline = MailboxPipeline::new(processor)?.with_interrupt_flag(interrupted);

    let pb = if cli.no_progress {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(0)
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} Extracting [{bar:40.cyan/blue}] {pos}/{len} messages ({eta})",
            )
            .expect("valid template")
            .progress_chars("#>-"),
    );

    let report = pipeline.run(Some(&|current, total| {
        pb.set_length(total);
        pb.set_position(current);
    }));
    pb.finish_and_clear();

    if matches!(report.error, Some(MboxError::Interrupted)) {
        return Err(MboxError::Interrupted.into());
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report.stats)?);
    } else {
        print_summary(&pipeline.config().input_file, &report.stats);
    }

    report.into_result()?;
    Ok(())
}

fn print_summary(path: &Path, stats: &ProcessingStats) {
    use humansize::{format_size, BINARY};

    println!();
    println!("  {:<26} {}", "File", path.display());
    println!("  {:<26} {}", "Total messages", stats.total_messages);
    println!("  {:<26} {}", "Processed messages", stats.processed_messages);
    println!("  {:<26} {}", "Failed messages", stats.failed_messages);
    println!(
        "  {:<26} {}",
        "Messages with attachments", stats.messages_with_attachments
    );
    println!("  {:<26} {}", "Attachments found", stats.total_attachments);
    println!("  {:<26} {}", "Attachments saved", stats.saved_attachments);
    println!(
        "  {:<26} {}",
        "Attachment size",
        format_size(stats.attachments_size_bytes, BINARY)
    );
    if stats.post_processed > 0 {
        println!("  {:<26} {}", "Types detected", stats.post_processed);
    }
    if let (Some(start), Some(end)) = (stats.start_time, stats.end_time) {
        println!("  {:<26} {}", "Started", start.format("%Y-%m-%d %H:%M:%S"));
        println!("  {:<26} {}", "Finished", end.format("%Y-%m-%d %H:%M:%S"));
    }
    println!("  {:<26} {:.2}s", "Duration", stats.duration_seconds);
    println!("  {:<26} {:.1}", "Messages per second", stats.messages_per_second);

    let types = stats.top_types(TOP_N);
    if !types.is_empty() {
        println!();
        println!("  Top attachment types:");
        for (ext, count) in &types {
            let ext = if ext.is_empty() { "(none)" } else { ext };
            println!("    {count:>6}  {ext}");
        }
    }

    let senders = stats.top_senders(TOP_N);
    if !senders.is_empty() {
        println!();
        println!("  Top senders:");
        for (sender, count) in &senders {
            println!("    {count:>6}  {sender}");
        }
    }
    println!();
}
