//! bookforge CLI - PDF to EPUB conversion tool

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use bookforge::exec::probe_tool;
use bookforge::{
    parse_file, validate_file, ConversionPipeline, FallbackOptions, PipelineOptions, QualityProfile,
};

#[derive(Parser)]
#[command(name = "bookforge")]
#[command(author = "iyulab")]
#[command(version)]
#[command(about = "Convert PDF documents to EPUB with structure recovery", long_about = None)]
struct Cli {
    /// Input PDF file
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,

    /// Output EPUB file
    #[arg(value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// Conversion quality profile
    #[arg(long, value_enum)]
    profile: Option<Profile>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert PDF to EPUB
    Convert {
        /// Input PDF file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output EPUB file (defaults to the input name with .epub)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Conversion quality profile
        #[arg(long, value_enum)]
        profile: Option<Profile>,

        /// Skip the built-in pipeline and convert with the external tool
        #[arg(long)]
        force_external: bool,

        /// Never fall back to the external tool
        #[arg(long)]
        no_fallback: bool,
    },

    /// Show document information
    Info {
        /// Input PDF file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check availability of external helper tools
    CheckTools,

    /// Show version information
    Version,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Profile {
    /// Smaller images, fastest conversion
    Fast,
    /// Balanced quality and speed (default)
    Standard,
    /// Largest images, best output quality
    High,
}

impl From<Profile> for QualityProfile {
    fn from(profile: Profile) -> Self {
        match profile {
            Profile::Fast => QualityProfile::Fast,
            Profile::Standard => QualityProfile::Standard,
            Profile::High => QualityProfile::High,
        }
    }
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Convert {
            input,
            output,
            profile,
            force_external,
            no_fallback,
        }) => cmd_convert(
            &input,
            output.as_deref(),
            profile,
            force_external,
            no_fallback,
        ),
        Some(Commands::Info { input, json }) => cmd_info(&input, json),
        Some(Commands::CheckTools) => cmd_check_tools(),
        Some(Commands::Version) => {
            cmd_version();
            Ok(())
        }
        None => {
            // Default behavior: convert if input is provided
            if let Some(input) = cli.input {
                cmd_convert(&input, cli.output.as_deref(), cli.profile, false, false)
            } else {
                println!("{}", "Usage: bookforge <FILE> [OUTPUT]".yellow());
                println!("       bookforge --help for more information");
                Ok(())
            }
        }
    };

    if let Err(e) = result {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn cmd_convert(
    input: &Path,
    output: Option<&Path>,
    profile: Option<Profile>,
    force_external: bool,
    no_fallback: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let output = output
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| input.with_extension("epub"));

    let mut options = PipelineOptions::new().with_force_external(force_external);
    if let Some(profile) = profile {
        options = options.with_profile(profile.into());
    }
    if no_fallback {
        options = options.with_fallback(FallbackOptions::new().with_enabled(false));
    }

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );

    let progress = pb.clone();
    let pipeline = ConversionPipeline::with_options(options).with_progress(move |event| {
        progress.set_position((event.fraction * 100.0) as u64);
        progress.set_message(event.description);
    });

    let result = pipeline.convert(input, &output);
    pb.finish_with_message("Done!");

    if !result.success {
        return Err(result
            .error
            .unwrap_or_else(|| "conversion failed".to_string())
            .into());
    }

    println!();
    println!("{}", "Conversion Summary".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());
    println!("{}: {}", "Output".bold(), output.display());
    println!("{}: {}", "Method".bold(), result.method);
    println!("{}: {:.1}/100", "Quality".bold(), result.quality_score);
    println!("{}: {:.1}s", "Duration".bold(), result.duration.as_secs_f64());
    println!(
        "{}: {}",
        "Stages".bold(),
        result.stages_completed.join(", ")
    );

    if !result.metadata.is_empty() {
        println!();
        println!("{}", "Details".cyan().bold());
        println!("{}", "─".repeat(40).dimmed());
        for (key, value) in &result.metadata {
            println!("  {}: {}", key, value);
        }
    }

    Ok(())
}

fn cmd_info(input: &Path, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let validation = validate_file(input);

    // Full parse only when the container is readable; validation alone
    // still covers broken and encrypted files.
    let document = if validation.is_valid && !validation.is_encrypted {
        match parse_file(input) {
            Ok(doc) => Some(doc),
            Err(e) => {
                log::warn!("full parse failed, showing validation only: {e}");
                None
            }
        }
    } else {
        None
    };

    if json {
        let value = serde_json::json!({
            "validation": validation,
            "metadata": document.as_ref().map(|d| &d.metadata),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("{}", "Document Information".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());

    println!("{}: {}", "File".bold(), input.display());
    println!("{}: {}", "Size".bold(), format_size(validation.file_size));
    println!("{}: {}", "Valid".bold(), yes_no(validation.is_valid));
    println!("{}: {}", "Pages".bold(), validation.page_count);
    println!("{}: {}", "Encrypted".bold(), yes_no(validation.is_encrypted));
    println!("{}: {}", "Outline".bold(), yes_no(validation.has_outline));
    if let Some(ref error) = validation.error {
        println!("{}: {}", "Problem".bold(), error.red());
    }

    let Some(doc) = document else {
        return Ok(());
    };

    println!();
    println!("{}", "Metadata".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());

    if let Some(ref title) = doc.metadata.title {
        println!("{}: {}", "Title".bold(), title);
    }
    if let Some(ref author) = doc.metadata.author {
        println!("{}: {}", "Author".bold(), author);
    }
    if let Some(ref subject) = doc.metadata.subject {
        println!("{}: {}", "Subject".bold(), subject);
    }
    if let Some(ref creator) = doc.metadata.creator {
        println!("{}: {}", "Creator".bold(), creator);
    }
    if let Some(ref producer) = doc.metadata.producer {
        println!("{}: {}", "Producer".bold(), producer);
    }
    if let Some(created) = doc.metadata.created {
        println!("{}: {}", "Created".bold(), created.format("%Y-%m-%d"));
    }

    println!();
    println!("{}", "Content Statistics".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());

    let text = doc.plain_text();
    let words: usize = text.split_whitespace().count();

    println!("{}: {}", "Words".bold(), words);
    println!("{}: {}", "Characters".bold(), text.chars().count());
    println!("{}: {}", "Images".bold(), doc.images.len());
    println!("{}: {}", "Outline entries".bold(), doc.outline.len());
    println!(
        "{}: {:.0}%",
        "Scan probability".bold(),
        doc.metadata.scan_probability * 100.0
    );

    Ok(())
}

fn cmd_check_tools() -> Result<(), Box<dyn std::error::Error>> {
    const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

    let tools: [(&str, &[&str], &str); 3] = [
        ("tesseract", &["--version"], "OCR for scanned pages"),
        ("ebook-convert", &["--version"], "external conversion fallback"),
        ("pdftoppm", &["-v"], "page rasterization for OCR"),
    ];

    println!("{}", "External Tools".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());

    let mut missing = 0;
    for (tool, args, purpose) in tools {
        match probe_tool(tool, args, PROBE_TIMEOUT) {
            Some(version) => {
                println!("{} {} ({})", "✓".green(), tool.bold(), version);
            }
            None => {
                missing += 1;
                println!("{} {} {}", "✗".red(), tool.bold(), "not found".red());
            }
        }
        println!("  {}", purpose.dimmed());
    }

    if missing > 0 {
        println!();
        println!(
            "{}",
            "Missing tools disable the features above; conversion itself still works.".yellow()
        );
    }

    Ok(())
}

fn cmd_version() {
    println!(
        "{} {}",
        "bookforge".cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("PDF to EPUB conversion tool");
    println!();
    println!(
        "Repository: {}",
        "https://github.com/iyulab/bookforge".dimmed()
    );
    println!("License: MIT");
}

fn format_size(bytes: u64) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "Yes"
    } else {
        "No"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn test_yes_no() {
        assert_eq!(yes_no(true), "Yes");
        assert_eq!(yes_no(false), "No");
    }

    #[test]
    fn test_profile_conversion() {
        assert_eq!(QualityProfile::from(Profile::Fast), QualityProfile::Fast);
        assert_eq!(QualityProfile::from(Profile::High), QualityProfile::High);
        assert_eq!(
            QualityProfile::from(Profile::Standard),
            QualityProfile::Standard
        );
    }
}
