use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use spk_audit::{verify_hash_chain, VerifyResult};
use spk_db::{PgStore, SessionLog};
use spk_registry::AnalyticsRange;

mod commands;

#[derive(Parser)]
#[command(name = "spk")]
#[command(about = "Smart parking operator CLI", long_about = None)]
struct Cli {
    /// Layered config paths in merge order
    #[arg(long = "config", global = true)]
    config_paths: Vec<String>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> site -> local...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Audit trail utilities
    Audit {
        #[command(subcommand)]
        cmd: AuditCmd,
    },

    /// Session log utilities
    Sessions {
        #[command(subcommand)]
        cmd: SessionsCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,
    /// Apply embedded SQL migrations.
    Migrate,
}

#[derive(Subcommand)]
enum AuditCmd {
    /// Verify the hash chain of an audit JSONL file.
    Verify {
        /// Log path; defaults to audit.path from --config
        path: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum SessionsCmd {
    /// Export completed sessions to CSV (newest first).
    Export {
        #[arg(long)]
        out: PathBuf,

        /// today | week | all (boundaries in analytics.timezone)
        #[arg(long, default_value = "all")]
        range: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env.local if present (dev convenience).
    let _ = dotenvy::from_filename(".env.local");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let (_, cfg) = commands::load_service_config(&cli.config_paths)?;
            let pool = commands::connect_db(&cfg).await?;
            match cmd {
                DbCmd::Status => {
                    let s = spk_db::status(&pool).await?;
                    println!("db_ok={} has_spaces_table={}", s.ok, s.has_spaces_table);
                }
                DbCmd::Migrate => {
                    spk_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = spk_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Audit { cmd } => match cmd {
            AuditCmd::Verify { path } => {
                let path = match path {
                    Some(p) => p,
                    None => {
                        let (_, cfg) = commands::load_service_config(&cli.config_paths)?;
                        match cfg.audit_path {
                            Some(p) => PathBuf::from(p),
                            None => bail!("no audit path given and audit.path is not configured"),
                        }
                    }
                };

                match verify_hash_chain(&path)? {
                    VerifyResult::Valid { lines } => {
                        println!("audit_valid=true lines={}", lines);
                    }
                    VerifyResult::Broken { line, reason } => {
                        println!("audit_valid=false line={} reason={}", line, reason);
                        bail!("audit hash chain broken at line {}", line);
                    }
                }
            }
        },

        Commands::Sessions { cmd } => match cmd {
            SessionsCmd::Export { out, range } => {
                let range: AnalyticsRange = range.parse()?;
                let (_, cfg) = commands::load_service_config(&cli.config_paths)?;
                let pool = commands::connect_db(&cfg).await?;
                let store = PgStore::new(pool);

                let now = chrono::Utc::now().timestamp();
                let sessions = store
                    .sessions_since(range.since(now, cfg.analytics_tz))
                    .await?;
                let n = commands::sessions::export_to_path(&out, &sessions)?;
                println!("exported={} range={} out={}", n, range.as_str(), out.display());
            }
        },
    }

    Ok(())
}
