//! CLI tool for replacing the background of PowerPoint decks.

mod local;
mod serve;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use deckbg_pptx::{PptxParser, TransformEngine};
use deckbg_service::ServiceConfig;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Rebuild PowerPoint decks over a new background image.
#[derive(Parser, Debug)]
#[command(name = "deckbg")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rebuild one deck with an image as the background of every slide
    Transform {
        /// Input deck (.pptx)
        deck: PathBuf,

        /// Background image (JPEG, PNG, GIF or BMP)
        image: PathBuf,

        /// Output deck (default: <deck>_bg.pptx next to the input)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the parsed deck as JSON
    Inspect {
        /// Input deck (.pptx)
        deck: PathBuf,

        /// Single-line JSON instead of pretty-printed
        #[arg(long)]
        compact: bool,
    },

    /// Read upload events as JSON lines from stdin and answer on stdout
    Serve {
        /// JSON service configuration; flags below override it
        #[arg(short, long, env = "DECKBG_CONFIG")]
        config: Option<PathBuf>,

        /// Directory for per-user uploads and output
        #[arg(long, env = "DECKBG_WORK_DIR")]
        work_dir: Option<PathBuf>,

        /// Maximum number of transforms running at once
        #[arg(long, env = "DECKBG_WORKERS")]
        workers: Option<usize>,

        /// Directory delivered decks are copied into
        #[arg(long, env = "DECKBG_OUTBOX", default_value = "outbox")]
        outbox: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    match cli.command {
        Command::Transform {
            deck,
            image,
            output,
        } => transform(&deck, &image, output),
        Command::Inspect { deck, compact } => inspect(&deck, compact),
        Command::Serve {
            config,
            work_dir,
            workers,
            outbox,
        } => {
            let mut config = match config {
                Some(path) => load_config(&path)?,
                None => ServiceConfig::default(),
            };
            if let Some(work_dir) = work_dir {
                config.work_dir = work_dir;
            }
            if let Some(workers) = workers {
                config = config.with_max_concurrent_transforms(workers);
            }
            serve::run(config, outbox)
        }
    }
}

fn transform(deck: &Path, image: &Path, output: Option<PathBuf>) -> Result<()> {
    let output = output.unwrap_or_else(|| default_output_path(deck));

    let summary = TransformEngine::new()
        .run(deck, image, &output)
        .with_context(|| format!("Failed to transform {}", deck.display()))?;

    log::debug!(
        "{} slides, {} text boxes",
        summary.slides,
        summary.text_boxes
    );
    println!("{}", output.display());
    Ok(())
}

fn inspect(deck: &Path, compact: bool) -> Result<()> {
    let parsed = PptxParser::new()
        .open(deck)
        .with_context(|| format!("Failed to read {}", deck.display()))?;

    let json = if compact {
        serde_json::to_string(&parsed)?
    } else {
        serde_json::to_string_pretty(&parsed)?
    };
    println!("{}", json);
    Ok(())
}

/// Read a [`ServiceConfig`] from a JSON file. Missing keys keep their
/// defaults.
fn load_config(path: &Path) -> Result<ServiceConfig> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open config {}", path.display()))?;
    let config = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Invalid config {}", path.display()))?;
    Ok(config)
}

/// `<stem>_bg.pptx` next to the input deck.
fn default_output_path(deck: &Path) -> PathBuf {
    let stem = deck
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");

    deck.with_file_name(format!("{}_bg.pptx", stem))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            default_output_path(Path::new("/decks/sunday.pptx")),
            PathBuf::from("/decks/sunday_bg.pptx")
        );
        assert_eq!(
            default_output_path(Path::new("talk.PPTX")),
            PathBuf::from("talk_bg.pptx")
        );
    }

    #[test]
    fn test_serve_flags() {
        let cli = Cli::try_parse_from([
            "deckbg",
            "serve",
            "--work-dir",
            "/tmp/work",
            "--workers",
            "3",
        ])
        .unwrap();

        match cli.command {
            Command::Serve {
                config,
                work_dir,
                workers,
                outbox,
            } => {
                assert_eq!(config, None);
                assert_eq!(work_dir, Some(PathBuf::from("/tmp/work")));
                assert_eq!(workers, Some(3));
                assert_eq!(outbox, PathBuf::from("outbox"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_load_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deckbg.json");
        std::fs::write(&path, r#"{"work_dir":"/srv/decks","max_concurrent_transforms":4}"#)
            .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.work_dir, PathBuf::from("/srv/decks"));
        assert_eq!(config.max_concurrent_transforms, 4);

        std::fs::write(&path, "not json").unwrap();
        assert!(load_config(&path).is_err());
        assert!(load_config(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_transform_requires_image() {
        assert!(Cli::try_parse_from(["deckbg", "transform", "a.pptx"]).is_err());
    }
}
