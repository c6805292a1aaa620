//! vdump CLI - Import vertical database dumps
//!
//! # Main Commands
//!
//! ```bash
//! vdump import posts.txt --config posts.json --schema post.schema.json --store store.json
//! vdump import posts.txt --config posts.json --schema post.schema.json --dry-run
//! ```
//!
//! # Debug Commands
//!
//! ```bash
//! vdump scan posts.txt --prefix COLUMN_    # Print raw rows as JSON
//! vdump operations                         # Show available value operations
//! ```

use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use vdump::{
    describe_operations, import_file, import_file_with, read_dump, scan_str, Diagnostics,
    Document, Entity, FailurePolicy, FieldPattern, ImportConfigFile, ImportReport, JsonStore,
    RawRow, SchemaModel, DEFAULT_LINE_BREAK,
};

#[derive(Parser)]
#[command(name = "vdump")]
#[command(about = "Import vertical-format database dumps into a record store", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a dump: map, validate, then insert or update by key
    Import {
        /// Dump file
        input: PathBuf,

        /// Import configuration (JSON)
        #[arg(short, long, env = "VDUMP_CONFIG")]
        config: PathBuf,

        /// JSON Schema describing the target model
        #[arg(short, long)]
        schema: PathBuf,

        /// Record store file (required unless --dry-run)
        #[arg(long, env = "VDUMP_STORE")]
        store: Option<PathBuf>,

        /// Print populated entities instead of validating and storing them
        #[arg(long)]
        dry_run: bool,

        /// Do not report invalid records
        #[arg(short, long)]
        quiet: bool,

        /// Abort on the first unmapped field or invalid record
        #[arg(long)]
        strict: bool,

        /// Write all diagnostics as JSON to this file
        #[arg(long)]
        log_json: Option<PathBuf>,
    },

    /// Scan a dump and print its raw rows as JSON
    Scan {
        /// Dump file
        input: PathBuf,

        /// Field name prefix (regular expression fragment)
        #[arg(short, long, default_value = "")]
        prefix: String,

        /// Line-break marker for continuation lines
        #[arg(long, default_value = DEFAULT_LINE_BREAK)]
        line_break: String,
    },

    /// Show available value operations
    Operations,
}

fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Import {
            input,
            config,
            schema,
            store,
            dry_run,
            quiet,
            strict,
            log_json,
        } => cmd_import(&ImportArgs {
            input: &input,
            config: &config,
            schema: &schema,
            store: store.as_deref(),
            dry_run,
            quiet,
            strict,
            log_json: log_json.as_deref(),
        }),

        Commands::Scan {
            input,
            prefix,
            line_break,
        } => cmd_scan(&input, &prefix, &line_break),

        Commands::Operations => cmd_operations(),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

struct ImportArgs<'a> {
    input: &'a Path,
    config: &'a Path,
    schema: &'a Path,
    store: Option<&'a Path>,
    dry_run: bool,
    quiet: bool,
    strict: bool,
    log_json: Option<&'a Path>,
}

fn cmd_import(args: &ImportArgs) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Importing: {}", args.input.display());

    let file = ImportConfigFile::load(args.config)?;
    let model = SchemaModel::from_file(args.schema, Some(file.entity.as_str()))?;

    let mut builder = file.into_builder::<Document>()?;
    if args.quiet {
        builder = builder.verbose(false);
    }
    if args.strict {
        builder = builder.policy(FailurePolicy::strict());
    }
    let config = builder.build()?;

    eprintln!("   Entity: {} (key: {})", config.entity_type(), config.key_field());
    if !config.prefix().is_empty() {
        eprintln!("   Prefix: {}", config.prefix());
    }

    let report = if args.dry_run {
        eprintln!("   Dry run: nothing is validated or stored");
        let mut printed = Vec::new();
        let report = import_file_with(args.input, &config, &model, Diagnostics::stderr(), |doc: Document| {
            printed.push(doc.attributes())
        })?;
        println!("{}", serde_json::to_string_pretty(&printed)?);
        report
    } else {
        let store_path = args
            .store
            .ok_or("--store (or VDUMP_STORE) is required unless --dry-run is given")?;
        let mut store = JsonStore::open(model.clone(), store_path)?;
        let report = import_file(args.input, &config, &model, &mut store, Diagnostics::stderr())?;
        eprintln!("💾 Store: {} ({} records)", store_path.display(), store.len());
        report
    };

    print_report(&report);

    if let Some(path) = args.log_json {
        fs::write(path, serde_json::to_string_pretty(&report.diagnostics)?)?;
        eprintln!("💾 Diagnostics written to: {}", path.display());
    }

    eprintln!("\n✨ Done!");
    Ok(())
}

fn print_report(report: &ImportReport) {
    if let Some(ref encoding) = report.encoding {
        eprintln!("   Encoding: {}", encoding);
    }
    eprintln!("\n📊 Results:");
    if report.yielded > 0 {
        eprintln!("   Rows: {}", report.yielded);
    } else {
        eprintln!("   ✅ Inserted: {}", report.inserted);
        eprintln!("   ✅ Updated: {}", report.updated);
        if report.invalid > 0 {
            eprintln!("   ❌ Invalid: {}", report.invalid);
        }
    }
    if report.unmapped_fields > 0 {
        eprintln!("   ⚠️  Unmapped fields: {}", report.unmapped_fields);
    }
    if report.dropped_lines > 0 {
        eprintln!("   ⚠️  Dropped lines: {}", report.dropped_lines);
    }
}

fn cmd_scan(input: &Path, prefix: &str, line_break: &str) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Scanning: {}", input.display());

    let dump = read_dump(input)?;
    eprintln!("   Encoding: {}", dump.encoding);

    let pattern = FieldPattern::new(prefix)?;
    let mut scanner = scan_str(&dump.content, pattern, line_break);
    let mut rows: Vec<RawRow> = Vec::new();
    for row in scanner.by_ref() {
        rows.push(row?);
    }

    for dropped in scanner.take_dropped() {
        eprintln!("   ⚠️  Line {} dropped: {}", dropped.line, dropped.text);
    }
    eprintln!("✅ Scanned {} rows ({} lines)", rows.len(), scanner.lines_read());

    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}

fn cmd_operations() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", describe_operations());
    Ok(())
}
