// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use af_cli::commands;

#[derive(Parser, Debug)]
#[command(name = "af", version, about = "AgentFlow verification CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Audit-chain operations.
    Audit {
        #[command(subcommand)]
        command: AuditCommands,
    },

    /// Backup operations.
    Backup {
        #[command(subcommand)]
        command: BackupCommands,
    },

    /// End-to-end environment check.
    Validate {
        /// Print JSON instead of human output.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
enum AuditCommands {
    /// Verify exported audit chains.
    Verify {
        /// JSONL export of audit entries (one entry per line, chain order).
        #[arg(long, default_value = "audits.jsonl")]
        input: PathBuf,

        /// Restrict verification to one tenant.
        #[arg(long)]
        tenant: Option<String>,

        /// Print JSON instead of human output.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
enum BackupCommands {
    /// Create a hash-manifested backup of a directory.
    Create {
        /// Directory to back up.
        #[arg(long)]
        source: PathBuf,

        /// Backup destination directory.
        #[arg(long)]
        out: PathBuf,
    },

    /// Restore a verified backup.
    Restore {
        /// Backup directory.
        #[arg(long)]
        backup: PathBuf,

        /// Restore destination.
        #[arg(long)]
        dest: PathBuf,
    },

    /// Verify a backup's manifest and files.
    Verify {
        /// Backup directory.
        #[arg(long)]
        backup: PathBuf,

        /// Print JSON instead of human output.
        #[arg(long)]
        json: bool,
    },

    /// List backups under a directory.
    List {
        /// Directory containing backups.
        #[arg(long, default_value = ".")]
        dir: PathBuf,

        /// Print JSON instead of human output.
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("af=trace")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("af=warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let code = match cli.command {
        Commands::Audit {
            command: AuditCommands::Verify { input, tenant, json },
        } => commands::audit_verify(&input, tenant.as_deref(), json),
        Commands::Backup { command } => match command {
            BackupCommands::Create { source, out } => commands::backup_create(&source, &out),
            BackupCommands::Restore { backup, dest } => commands::backup_restore(&backup, &dest),
            BackupCommands::Verify { backup, json } => commands::backup_verify(&backup, json),
            BackupCommands::List { dir, json } => commands::backup_list(&dir, json),
        },
        Commands::Validate { json } => commands::validate(json),
    };

    std::process::exit(code);
}
