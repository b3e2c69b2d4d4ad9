/// Keycap Check - verifies that a keyboard photo shows every keycap
///
/// The main entry point for the command-line tool. It parses command-line
/// arguments, runs recognition on each image and prints or exports the reports.

use anyhow::Result;
use clap::{ArgAction, ArgGroup, Parser};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn, LevelFilter};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Instant;

use keycap_check::app;
use keycap_check::config::{Config, ConfigError};
use keycap_check::utils::{image_utils, output_formatter};
use keycap_check::{ImageAnalysis, KeyboardAnalyzer};

/// Command line argument structure
#[derive(Parser, Debug)]
#[command(
    name = "keycap_check",
    version,
    about = "Checks that a keyboard photo shows every digit and letter keycap",
    long_about = "Runs optical character recognition on keyboard photos and compares the result
against the expected keycaps 0-9 and A-Z, reporting:
- Missing numbers and letters
- Unexpected characters
- Characters detected more than once"
)]
#[command(group(
    ArgGroup::new("input")
        .required(true)
        .args(["image_paths", "dir"]),
))]
struct Args {
    /// Path(s) to the keyboard image(s) to check
    image_paths: Vec<String>,

    /// Check all images in directory (recursively)
    #[arg(long = "dir")]
    dir: Option<String>,

    /// Exclude file name pattern (glob syntax, can be used multiple times)
    #[arg(long = "exclude", action = ArgAction::Append)]
    exclude: Option<Vec<String>>,

    /// Include only file name pattern (glob syntax, can be used multiple times)
    #[arg(long = "include", action = ArgAction::Append)]
    include: Option<Vec<String>>,

    /// Maximum image size to check in MB
    #[arg(long = "max-size", default_value = "50")]
    max_size: u64,

    /// Maximum number of images to check
    #[arg(long = "max-files", default_value = "1000")]
    max_files: usize,

    /// Replay a recorded recognition result (JSON) instead of running tesseract
    #[arg(long = "recording")]
    recording: Option<PathBuf>,

    /// Tesseract executable, overrides the configuration file
    #[arg(long = "tesseract")]
    tesseract: Option<String>,

    /// Recognition language, overrides the configuration file
    #[arg(long = "lang")]
    lang: Option<String>,

    /// Print every detected character with its position
    #[arg(long = "show-detections", action = ArgAction::SetTrue)]
    show_detections: bool,

    /// Output in markdown format (wrapped in triple backticks)
    #[arg(long = "md", action = ArgAction::SetTrue)]
    md: bool,

    /// Export results to JSON file
    #[arg(long = "json")]
    json: Option<String>,

    /// Export results to HTML report
    #[arg(long = "html")]
    html: Option<String>,

    /// Export results to CSV file
    #[arg(long = "csv")]
    csv: Option<String>,

    /// Directory to store all output files
    #[arg(long = "output-dir")]
    output_dir: Option<String>,

    /// Suppress terminal output
    #[arg(long = "quiet", action = ArgAction::SetTrue)]
    quiet: bool,

    /// Show only summary information
    #[arg(long = "summary-only", action = ArgAction::SetTrue)]
    summary_only: bool,

    /// Exit with status 2 unless every image shows a complete keyboard
    #[arg(long = "strict", action = ArgAction::SetTrue)]
    strict: bool,

    /// Path to configuration file
    #[arg(long = "config")]
    config: Option<String>,

    /// Number of parallel workers (0=auto)
    #[arg(long = "parallel", default_value = "0")]
    parallel: usize,

    /// Recognition timeout in seconds per image, overrides the configuration file
    #[arg(long = "timeout")]
    timeout: Option<u64>,

    /// Set logging level
    #[arg(long = "log-level", default_value = "info")]
    log_level: LevelFilter,

    /// Log file path
    #[arg(long = "log-file", default_value = "keycap_check.log")]
    log_file: String,
}

type CheckResult = (PathBuf, Result<ImageAnalysis>);

/// Main entry point function
fn main() -> Result<()> {
    let start_time = Instant::now();

    let args = Args::parse();

    setup_logging(&args);

    let config = load_config(&args)?;

    let images = get_images_to_check(&args)?;
    if images.is_empty() {
        eprintln!("{}", "Error: No images specified or found for checking".red());
        eprintln!("Run with --help for usage information");
        process::exit(1);
    }

    let recognizer = app::build_recognizer(&config.recognition, args.recording.as_deref())?;
    let analyzer = KeyboardAnalyzer::new(recognizer);

    let results = check_images(&images, &analyzer, &args)?;

    let analyses: Vec<ImageAnalysis> = results
        .into_iter()
        .filter_map(|(image, result)| match result {
            Ok(analysis) => Some(analysis),
            Err(e) => {
                error!("Error checking {}: {:#}", image.display(), e);
                eprintln!("{} {}: {:#}", "Error:".red().bold(), image.display(), e);
                None
            }
        })
        .collect();
    let failures = images.len() - analyses.len();

    export_all_results(&analyses, &args)?;

    if !args.quiet {
        println!("\n{}", output_formatter::create_summary(&analyses));
        if failures > 0 {
            println!("{} {}", "Images failed:".red(), failures);
        }
        println!(
            "{} {:.2} seconds",
            "Time elapsed:".green(),
            start_time.elapsed().as_secs_f64()
        );

        if !args.summary_only {
            for analysis in &analyses {
                println!("\n{}", "=".repeat(80).bold());
                println!("{} {}", "Results for:".cyan(), analysis.image);
                println!("{}", "=".repeat(80).bold());

                if args.show_detections {
                    println!("{}", output_formatter::format_detections(&analysis.detections));
                }
                println!("{}", output_formatter::format_report(&analysis.report, args.md));
            }
        }
    }

    if args.strict && (failures > 0 || analyses.iter().any(|a| !a.report.is_complete())) {
        process::exit(2);
    }

    Ok(())
}

/// Set up logging to the log file, falling back to stderr
fn setup_logging(args: &Args) {
    let mut builder = env_logger::Builder::new();

    builder.filter_level(args.log_level);

    builder.format(|buf, record| {
        use chrono::Local;
        use std::io::Write;
        writeln!(
            buf,
            "{} - {} - {} - {}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.target(),
            record.args()
        )
    });

    if let Ok(file) = File::create(&args.log_file) {
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.init();
}

/// Load configuration from file if provided and apply command-line overrides
fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => match Config::from_file(Path::new(path)) {
            Ok(config) => config,
            Err(e @ ConfigError::NotFound(_)) => {
                error!("{}", e);
                Config::default()
            }
            Err(e) => return Err(e.into()),
        },
        None => Config::default(),
    };

    if let Some(tesseract) = &args.tesseract {
        config.recognition.tesseract_path = tesseract.clone();
    }
    if let Some(lang) = &args.lang {
        config.recognition.language = lang.clone();
    }
    if let Some(timeout) = args.timeout {
        config.recognition.timeout_seconds = timeout;
    }

    Ok(config)
}

/// Get list of images to check based on command line arguments
fn get_images_to_check(args: &Args) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    let size_limit = max_size_bytes(args.max_size);

    for image_path in &args.image_paths {
        let path = PathBuf::from(image_path);
        if !path.exists() {
            error!("Image not found: {}", path.display());
            continue;
        }
        if !path.is_file() {
            warn!("Skipping {}: not a file", path.display());
            continue;
        }
        match path.metadata() {
            Ok(metadata) if metadata.len() > size_limit => warn!(
                "Skipping {}: exceeds maximum file size ({:.2} MB)",
                path.display(),
                metadata.len() as f64 / 1024.0 / 1024.0
            ),
            Ok(_) => images.push(path),
            Err(e) => error!("Error reading metadata for {}: {}", path.display(), e),
        }
    }

    if let Some(dir) = &args.dir {
        let dir = PathBuf::from(dir);
        if !dir.is_dir() {
            error!("Directory not found: {}", dir.display());
        } else {
            let remaining = args.max_files.saturating_sub(images.len());
            images.extend(image_utils::collect_images(
                &dir,
                args.include.as_deref().unwrap_or(&[]),
                args.exclude.as_deref().unwrap_or(&[]),
                remaining,
                size_limit,
            )?);
        }
    }

    images.truncate(args.max_files);
    Ok(images)
}

/// Convert the `--max-size` limit to bytes, saturating for absurd values
fn max_size_bytes(megabytes: u64) -> u64 {
    megabytes.saturating_mul(1024 * 1024)
}

/// Check all images with progress tracking
fn check_images(
    images: &[PathBuf],
    analyzer: &KeyboardAnalyzer,
    args: &Args,
) -> Result<Vec<CheckResult>> {
    let num_workers = if args.parallel == 0 {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    } else {
        args.parallel
    };

    if !args.quiet {
        println!(
            "\n{} {} images with {} workers using {}...",
            "Checking".bold(),
            images.len(),
            num_workers,
            analyzer.engine()
        );
    }
    info!("Checking {} images with {} workers", images.len(), num_workers);

    let progress_bar = if !args.quiet {
        let pb = ProgressBar::new(images.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} images ({eta})")?
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_workers)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build thread pool: {}", e))?;

    let results = pool.install(|| {
        app::run_checks(images, analyzer, || {
            if let Some(pb) = &progress_bar {
                pb.inc(1);
            }
        })
    });

    if let Some(pb) = progress_bar {
        pb.finish_with_message("Check complete");
    }

    Ok(results)
}

/// Export results for all checked images based on command line arguments
fn export_all_results(analyses: &[ImageAnalysis], args: &Args) -> Result<()> {
    if let Some(output_dir) = &args.output_dir {
        std::fs::create_dir_all(output_dir)?;
    }

    let several = analyses.len() > 1;
    let output_dir = args.output_dir.as_deref();
    for analysis in analyses {
        if let Some(json_path) = &args.json {
            let path = output_path(output_dir, analysis, json_path, several);
            output_formatter::export_report_json(analysis, &path)?;
            info!("Wrote JSON report to {}", path.display());
        }

        if let Some(html_path) = &args.html {
            let path = output_path(output_dir, analysis, html_path, several);
            output_formatter::create_html_report(analysis, &path)?;
            info!("Wrote HTML report to {}", path.display());
        }

        if let Some(csv_path) = &args.csv {
            let path = output_path(output_dir, analysis, csv_path, several);
            output_formatter::create_csv_report(&analysis.report, &path)?;
            info!("Wrote CSV report to {}", path.display());
        }
    }

    Ok(())
}

/// Resolve an export path.
///
/// A single image uses the requested path. With several images each report
/// is named `<requested stem>_<image stem>_<tag><ext>` next to the requested
/// path, where the tag is a SHA-256 prefix of the image path. Images sharing
/// a file name in different directories still get their own report. Relative paths land in `--output-dir` when given.
fn output_path(output_dir: Option<&str>, analysis: &ImageAnalysis, requested: &str, several: bool) -> PathBuf {
    let requested = Path::new(requested);
    let file_name = if several {
        let prefix = requested.file_stem().unwrap_or_default().to_string_lossy();
        let image_stem = Path::new(&analysis.image).file_stem().unwrap_or_default().to_string_lossy();
        let tag: String = image_utils::fingerprint(analysis.image.as_bytes()).chars().take(8).collect();
        let extension = requested
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        requested.with_file_name(format!("{}_{}_{}{}", prefix, image_stem, tag, extension))
    } else {
        requested.to_path_buf()
    };

    match output_dir {
        Some(dir) if file_name.is_relative() => PathBuf::from(dir).join(file_name),
        _ => file_name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keycap_check::AnalysisReport;

    fn analysis(image: &str, sha256: &str) -> ImageAnalysis {
        ImageAnalysis {
            image: image.to_string(),
            sha256: sha256.to_string(),
            engine: "recorded".to_string(),
            data_url: String::new(),
            detections: Vec::new(),
            report: AnalysisReport::default(),
        }
    }

    #[test]
    fn test_single_image_uses_requested_path() {
        let a = analysis("photos/kb.jpg", "0123456789abcdef");
        assert_eq!(output_path(None, &a, "report.json", false), PathBuf::from("report.json"));
        assert_eq!(
            output_path(Some("out"), &a, "report.json", false),
            PathBuf::from("out/report.json")
        );
        assert_eq!(
            output_path(Some("out"), &a, "/tmp/report.json", false),
            PathBuf::from("/tmp/report.json")
        );
    }

    #[test]
    fn test_same_stem_in_different_directories_gets_distinct_reports() {
        // Same photo copied into two directories
        let a = analysis("a/kb.jpg", "aaaaaaaa11112222");
        let b = analysis("b/kb.jpg", "aaaaaaaa11112222");

        let path_a = output_path(None, &a, "results/report.json", true);
        let path_b = output_path(None, &b, "results/report.json", true);

        assert_ne!(path_a, path_b);
        assert_eq!(path_a, PathBuf::from("results/report_kb_04a39d20.json"));
        assert_eq!(path_b, PathBuf::from("results/report_kb_1bee890f.json"));
    }

    #[test]
    fn test_several_images_keep_requested_name_and_output_dir() {
        let a = analysis("kb.png", "cafebabe00000000");
        assert_eq!(
            output_path(Some("out"), &a, "keyboard.html", true),
            PathBuf::from("out/keyboard_kb_6e7385eb.html")
        );
        assert_eq!(
            output_path(None, &a, "summary", true),
            PathBuf::from("summary_kb_6e7385eb")
        );
    }

    #[test]
    fn test_max_size_bytes_saturates() {
        assert_eq!(max_size_bytes(50), 50 * 1024 * 1024);
        assert_eq!(max_size_bytes(u64::MAX), u64::MAX);
        assert_eq!(max_size_bytes(u64::MAX / 1024), u64::MAX);
    }
}
