use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use books_core::config::{
    collection_path_from_config, config_path, load_config, open_options_from_config, AppConfig,
};
use books_core::epub::package::DC_FIELDS;
use books_core::prelude::*;
use books_core::progress::{ProgressEvent, ProgressHandler};
use indicatif::{ProgressBar, ProgressStyle};

type CliResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[derive(Parser)]
#[command(name = "books")]
#[command(about = "Read EPUB metadata and reading order, and manage a book collection")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Extraction cache directory (overrides config)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Collection table file (overrides config)
    #[arg(long, global = true)]
    collection: Option<PathBuf>,

    /// Extract into memory instead of the cache directory
    #[arg(long, global = true)]
    memory: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show book metadata
    Info {
        /// Input file
        #[arg(required = true)]
        input: String,
    },

    /// List documents in reading order
    Spine {
        /// Input file
        #[arg(required = true)]
        input: String,
    },

    /// Locate or extract the cover image
    Cover {
        /// Input file
        #[arg(required = true)]
        input: String,

        /// Write the image here
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Step through the reading order from a starting document
    Walk {
        /// Input file
        #[arg(required = true)]
        input: String,

        /// Start at this document URI (fragment allowed)
        #[arg(long)]
        from: Option<String>,

        /// Walk towards the beginning
        #[arg(long)]
        reverse: bool,
    },

    /// Add books to the collection
    Add {
        /// Input file(s)
        #[arg(required = true)]
        input: Vec<String>,
    },

    /// Remove a book from the collection
    Remove {
        /// Path as stored in the collection
        #[arg(required = true)]
        path: String,
    },

    /// List books in the collection
    List {
        /// Only books whose author or title contains this (case-insensitive)
        #[arg(long)]
        filter: Option<String>,
    },

    /// Drop collection entries whose files no longer exist
    Prune,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Initialize default config file
    Init,
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Key (dot-separated path)
        key: String,
        /// Value
        value: String,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let result = match &cli.command {
        Commands::Info { input } => run_info(&cli, input),
        Commands::Spine { input } => run_spine(&cli, input),
        Commands::Cover { input, output } => run_cover(&cli, input, output.as_deref()),
        Commands::Walk { input, from, reverse } => run_walk(&cli, input, from.as_deref(), *reverse),
        Commands::Add { input } => run_add(&cli, input),
        Commands::Remove { path } => run_remove(&cli, path),
        Commands::List { filter } => run_list(&cli, filter.as_deref()),
        Commands::Prune => run_prune(&cli),
        Commands::Config { action } => run_config(action, cli.json),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Extraction progress on stderr. Stays hidden unless stderr is a terminal.
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new(json: bool) -> Self {
        let bar = if json { ProgressBar::hidden() } else { ProgressBar::new(0) };
        let style = ProgressStyle::with_template("{msg} [{bar:30}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        bar.set_style(style);
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressHandler for BarProgress {
    fn on_progress(&self, event: ProgressEvent) {
        self.bar.set_length(event.total);
        self.bar.set_position(event.current);
        self.bar.set_message(event.entry);
    }
}

fn open_options(cli: &Cli, cfg: &AppConfig) -> OpenOptions {
    let mut opts = open_options_from_config(cfg);
    if let Some(dir) = &cli.cache_dir {
        opts.cache_dir = dir.clone();
    }
    if cli.memory {
        opts.mode = ExtractionMode::Memory;
    }
    opts
}

fn open_book(cli: &Cli, input: &str) -> Result<EpubContainer, Box<dyn std::error::Error + Send + Sync>> {
    let cfg = load_config();
    let progress = BarProgress::new(cli.json);
    let result = EpubContainer::open_with_progress(input, &open_options(cli, &cfg), Some(&progress));
    progress.finish();
    Ok(result?)
}

fn load_collection(cli: &Cli) -> Collection<JsonStore> {
    let cfg = load_config();
    let path = cli
        .collection
        .clone()
        .unwrap_or_else(|| collection_path_from_config(&cfg));
    Collection::load(JsonStore::new(path))
}

fn run_info(cli: &Cli, input: &str) -> CliResult {
    let epub = open_book(cli, input)?;

    if cli.json {
        let metadata: serde_json::Map<String, serde_json::Value> = DC_FIELDS
            .iter()
            .filter(|f| !epub.meta_all(f).is_empty())
            .map(|f| (f.to_string(), serde_json::json!(epub.meta_all(f))))
            .collect();
        let info = serde_json::json!({
            "path": epub.source_path(),
            "package": epub.package_path(),
            "version": epub.package().version,
            "metadata": metadata,
            "cover": epub.cover().map(Location::uri),
            "documents": epub.spine().len(),
        });
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        if let Some(t) = epub.meta("title") {
            println!("Title: {}", t);
        }
        let creators = epub.meta_all("creator");
        if !creators.is_empty() {
            println!("Authors: {}", creators.join(", "));
        }
        for field in DC_FIELDS.iter().filter(|f| !matches!(**f, "title" | "creator")) {
            if let Some(v) = epub.meta(field) {
                println!("{}: {}", capitalize(field), v);
            }
        }
        println!("Package: {}", epub.package_path());
        println!("Documents: {}", epub.spine().len());
        match epub.cover() {
            Some(cover) => println!("Cover: {}", cover),
            None => println!("Cover: none"),
        }
    }
    Ok(())
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn run_spine(cli: &Cli, input: &str) -> CliResult {
    let epub = open_book(cli, input)?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&epub.spine().iter().collect::<Vec<_>>())?);
    } else {
        for (i, uri) in epub.spine().iter().enumerate() {
            println!("{:>4}  {}", i + 1, uri);
        }
    }
    Ok(())
}

fn run_cover(cli: &Cli, input: &str, output: Option<&str>) -> CliResult {
    let epub = open_book(cli, input)?;
    let cover = epub.cover().ok_or("No cover image found")?;

    let Some(out) = output else {
        if cli.json {
            println!("{}", serde_json::to_string_pretty(cover)?);
        } else {
            println!("{}", cover);
        }
        return Ok(());
    };

    let data = match cover {
        Location::File(path) => std::fs::read(path)?,
        Location::Entry(name) => epub.content().read(name)?,
    };
    std::fs::write(out, &data)?;
    if !cli.json {
        println!("Extracted cover to {}", out);
    }
    Ok(())
}

fn run_walk(cli: &Cli, input: &str, from: Option<&str>, reverse: bool) -> CliResult {
    let mut epub = open_book(cli, input)?;
    if epub.spine().is_empty() {
        return Err("Book has no readable documents".into());
    }
    if let Some(uri) = from {
        epub.set_uri(uri);
    }

    let mut visited = Vec::new();
    loop {
        if let Some(uri) = epub.uri() {
            visited.push(uri.to_string());
        }
        let at_end = if reverse { epub.is_first() } else { epub.is_last() };
        if at_end {
            break;
        }
        if reverse {
            epub.previous();
        } else {
            epub.next();
        }
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&visited)?);
    } else {
        for uri in &visited {
            println!("{}", uri);
        }
    }
    Ok(())
}

fn run_add(cli: &Cli, inputs: &[String]) -> CliResult {
    let cfg = load_config();
    let opts = open_options(cli, &cfg);
    let mut collection = load_collection(cli);
    let mut added = Vec::new();
    let mut failed = 0usize;

    for input in inputs {
        let path = Path::new(input);
        let path = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        match collection.add_book(&path, &opts) {
            Ok(entry) => {
                if !cli.json {
                    println!("Added: {}", describe(&entry));
                }
                added.push(entry);
            }
            Err(e) => {
                eprintln!("Skipping {}: {}", input, e);
                failed += 1;
            }
        }
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&added)?);
    }
    if failed > 0 {
        return Err(format!("{} book(s) could not be added", failed).into());
    }
    Ok(())
}

fn run_remove(cli: &Cli, path: &str) -> CliResult {
    let mut collection = load_collection(cli);
    let as_given = PathBuf::from(path);
    let removed = collection.remove(&as_given).or_else(|| {
        std::fs::canonicalize(&as_given)
            .ok()
            .and_then(|p| collection.remove(&p))
    });

    let entry = removed.ok_or_else(|| format!("Not in collection: {}", path))?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        println!("Removed: {}", describe(&entry));
    }
    Ok(())
}

fn run_list(cli: &Cli, filter: Option<&str>) -> CliResult {
    let mut collection = load_collection(cli);
    collection.set_filter(filter);
    let visible = collection.visible();

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&visible)?);
    } else {
        for entry in visible {
            println!("{}", describe(entry));
        }
    }
    Ok(())
}

fn run_prune(cli: &Cli) -> CliResult {
    let mut collection = load_collection(cli);
    let removed = collection.prune_missing();

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&removed)?);
    } else if removed.is_empty() {
        println!("No missing books.");
    } else {
        println!("Removed {} book(s) from your collection:", removed.len());
        for entry in &removed {
            println!("  {}", describe(entry));
        }
    }
    Ok(())
}

fn describe(entry: &CollectionEntry) -> String {
    format!(
        "{} - {} ({})",
        entry.author.as_deref().unwrap_or("Unknown author"),
        entry.title.as_deref().unwrap_or("Untitled"),
        entry.path.display()
    )
}

fn run_config(action: &ConfigAction, json: bool) -> CliResult {
    match action {
        ConfigAction::Init => {
            let path = config_path().ok_or("Could not determine config directory")?;
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let default_cfg = AppConfig::default();
            let toml = toml::to_string_pretty(&default_cfg)?;
            std::fs::write(&path, toml)?;
            println!("Wrote default config to {}", path.display());
        }
        ConfigAction::Show => {
            let cfg = load_config();
            if json {
                println!("{}", serde_json::to_string_pretty(&cfg)?);
            } else {
                println!("{}", toml::to_string_pretty(&cfg)?);
            }
        }
        ConfigAction::Set { key, value } => {
            let path = config_path().ok_or("Could not determine config directory")?;
            let mut cfg: AppConfig = if path.exists() {
                let s = std::fs::read_to_string(&path)?;
                toml::from_str(&s).map_err(|e| format!("Malformed config {}: {}", path.display(), e))?
            } else {
                AppConfig::default()
            };

            set_config_key(&mut cfg, key, value)?;

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let toml = toml::to_string_pretty(&cfg)?;
            std::fs::write(&path, toml)?;
            if !json {
                println!("Updated {}", key);
            }
        }
    }
    Ok(())
}

fn set_config_key(cfg: &mut AppConfig, key: &str, value: &str) -> CliResult {
    let parts: Vec<&str> = key.splitn(2, '.').collect();
    match parts.as_slice() {
        ["cache", sub] => match *sub {
            "dir" => cfg.cache.dir = Some(value.to_string()),
            "mode" => {
                cfg.cache.mode = match value {
                    "directory" => ExtractionMode::Directory,
                    "memory" => ExtractionMode::Memory,
                    _ => return Err(format!("Invalid cache.mode: {} (directory or memory)", value).into()),
                }
            }
            _ => return Err(format!("Unknown key: {}", key).into()),
        },
        ["collection", sub] => match *sub {
            "database" => cfg.collection.database = Some(value.to_string()),
            _ => return Err(format!("Unknown key: {}", key).into()),
        },
        ["security", sub] => match *sub {
            "max_file_size_mb" => cfg.security.max_file_size_mb = Some(parse_number(key, value)?),
            "max_compression_ratio" => cfg.security.max_compression_ratio = Some(parse_number(key, value)?),
            "max_entry_count" => cfg.security.max_entry_count = Some(parse_number(key, value)?),
            _ => return Err(format!("Unknown key: {}", key).into()),
        },
        _ => return Err(format!("Unknown key: {}", key).into()),
    }
    Ok(())
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("Invalid value for {}: {} (expected a number)", key, value))
}
