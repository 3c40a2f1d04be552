//! relmig CLI
//!
//! Diff model snapshots into migrations, render migration scripts and inspect
//! the migrations history table of a PostgreSQL database.

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use relmig::migration::{
    HistoryRepository, MigrationId, MigrationScripter, MigrationsSqlGenerator, ModelDiffer, ScriptOptions,
    ScriptTarget, INITIAL_DATABASE,
};
use relmig::schema::DefaultTypeMapper;
use relmig::{DatabaseConfig, MayPostgresExecutor, MigrationsConfig};
use relmig_cli::{load_migrations, load_snapshot, pending_migrations, write_migration};

#[derive(Parser)]
#[command(name = "relmig")]
#[command(about = "Schema diffing and migration scripting for PostgreSQL")]
#[command(version = "0.1.0")]
struct Cli {
    /// Database connection URL
    #[arg(long)]
    database_url: Option<String>,

    /// Migrations directory path
    #[arg(long, default_value = "migrations")]
    migrations_dir: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Diff two model snapshots and print the DDL
    Diff {
        /// Snapshot the database is at now (omit for an empty database)
        #[arg(long)]
        from: Option<PathBuf>,

        /// Snapshot the database should end up at
        #[arg(long)]
        to: PathBuf,

        /// Print the down script instead of the up script
        #[arg(long)]
        down: bool,

        /// Save the diff as a migration with this name
        #[arg(long)]
        name: Option<String>,
    },

    /// Render the migrations directory as one script
    Script {
        /// Start after this migration (omit or pass 0 to start from an empty database)
        #[arg(long)]
        from: Option<String>,

        /// Stop at this migration (omit for the latest, 0 to revert everything)
        #[arg(long)]
        to: Option<String>,

        /// Guard every statement so the script can be re-run
        #[arg(long)]
        idempotent: bool,

        /// Do not prefix the script with the history table DDL
        #[arg(long)]
        no_history_table: bool,
    },

    /// Inspect the migrations history table
    History {
        #[command(subcommand)]
        command: HistoryCommands,
    },
}

#[derive(Subcommand)]
enum HistoryCommands {
    /// Print the DDL that creates the history table
    CreateScript {
        /// Make the script a no-op when the table exists
        #[arg(long)]
        if_not_exists: bool,
    },

    /// Show applied and pending migrations
    Status,
}

fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    if cli.quiet {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("error")).init();
    } else if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    match run(&cli) {
        Ok(()) => {
            if !cli.quiet {
                eprintln!("{}", "✅ Success".green());
            }
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{} {:#}", "❌ Error:".red(), e);
            process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = MigrationsConfig::load().context("loading migrations configuration")?;
    let dialect = config.sql_dialect()?;
    let generator = MigrationsSqlGenerator::new(Arc::clone(&dialect), Arc::new(DefaultTypeMapper::new()));
    let history = HistoryRepository::new(dialect, &config);

    match &cli.command {
        Commands::Diff { from, to, down, name } => {
            handle_diff(&generator, &cli.migrations_dir, from.as_deref(), to, *down, name.as_deref())
        }
        Commands::Script {
            from,
            to,
            idempotent,
            no_history_table,
        } => {
            let options = ScriptOptions {
                idempotent: *idempotent,
                create_history_table: !*no_history_table,
            };
            handle_script(generator, history, &cli.migrations_dir, from.as_deref(), to.as_deref(), options)
        }
        Commands::History {
            command: HistoryCommands::CreateScript { if_not_exists },
        } => {
            let script = if *if_not_exists {
                history.create_if_not_exists_script()?
            } else {
                history.create_script()?
            };
            print!("{script}");
            Ok(())
        }
        Commands::History {
            command: HistoryCommands::Status,
        } => handle_status(history, &cli.migrations_dir, cli.database_url.clone()),
    }
}

fn handle_diff(
    generator: &MigrationsSqlGenerator,
    migrations_dir: &Path,
    from: Option<&Path>,
    to: &Path,
    down: bool,
    name: Option<&str>,
) -> Result<()> {
    let source = load_snapshot(from)?;
    let target = load_snapshot(Some(to))?;
    let differ = ModelDiffer::default();

    if let Some(name) = name {
        let id = MigrationId::generate(name)?;
        let migration = differ.create_migration(id, source.as_ref(), target.as_ref())?;
        let path = write_migration(migrations_dir, &migration)?;
        eprintln!("✅ Generated migration: {}", path.display().to_string().bold());
        let operations = if down { &migration.down } else { &migration.up };
        print!("{}", generator.generate_script(operations)?);
        return Ok(());
    }

    let operations = if down {
        differ.get_differences(target.as_ref(), source.as_ref())?
    } else {
        differ.get_differences(source.as_ref(), target.as_ref())?
    };
    if operations.is_empty() {
        eprintln!("No differences found");
        return Ok(());
    }
    print!("{}", generator.generate_script(&operations)?);
    Ok(())
}

fn handle_script(
    generator: MigrationsSqlGenerator,
    history: HistoryRepository,
    migrations_dir: &Path,
    from: Option<&str>,
    to: Option<&str>,
    options: ScriptOptions,
) -> Result<()> {
    let migrations = load_migrations(migrations_dir)?;
    let from: Option<MigrationId> = match from {
        None | Some(INITIAL_DATABASE) => None,
        Some(id) => Some(id.parse::<MigrationId>()?),
    };
    let to: ScriptTarget = to.map(str::parse::<ScriptTarget>).transpose()?.unwrap_or_default();
    let named_to = match &to {
        ScriptTarget::Migration(id) => Some(id),
        _ => None,
    };
    for id in from.iter().chain(named_to) {
        if !migrations.iter().any(|m| &m.id == id) {
            bail!("migration '{id}' not found in {}", migrations_dir.display());
        }
    }

    let scripter = MigrationScripter::new(generator, history);
    print!("{}", scripter.generate_script(&migrations, from.as_ref(), &to, options)?);
    Ok(())
}

fn handle_status(history: HistoryRepository, migrations_dir: &Path, database_url: Option<String>) -> Result<()> {
    let config = DatabaseConfig::load().ok();
    let database_url = database_url
        .or_else(|| std::env::var("RELMIG_DATABASE_URL").ok())
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .or_else(|| config.as_ref().map(|config| config.url.clone()))
        .context("Database URL not provided. Use --database-url or set RELMIG_DATABASE_URL or DATABASE_URL")?;
    let connection_string = config.unwrap_or_default().connection_string(&database_url);

    let executor = MayPostgresExecutor::connect(&connection_string).context("connecting to database")?;
    let history = history.with_executor(Arc::new(executor));
    let migrations = load_migrations(migrations_dir)?;

    if !history.spawn_exists().join()? {
        println!("\n📊 History table {} does not exist yet\n", history.table_name());
    }
    let applied = history.spawn_applied_migrations().join()?;
    let pending = pending_migrations(&migrations, &applied);

    println!("\n📊 Migration Status\n");

    if !applied.is_empty() {
        println!("{}", format!("✅ Applied Migrations ({}):", applied.len()).green());
        for row in &applied {
            let known = migrations.iter().any(|m| m.id.to_string() == row.migration_id);
            let note = if known { String::new() } else { " (not in migrations directory)".yellow().to_string() };
            println!("  ✓ {} ({}){}", row.migration_id, row.product_version, note);
        }
    } else {
        println!("✅ Applied Migrations: None");
    }

    println!();

    if !pending.is_empty() {
        println!("{}", format!("⏳ Pending Migrations ({}):", pending.len()).yellow());
        for migration in &pending {
            println!("  ⏳ {} (pending)", migration.id);
        }
    } else {
        println!("⏳ Pending Migrations: None");
    }

    println!("\n📈 Summary: {} applied, {} pending", applied.len(), pending.len());
    Ok(())
}
