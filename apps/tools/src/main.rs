use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use server_api::auth::{mint_token, AuthConfig};
use shared::domain::{OrganizationId, StepScope};
use storage::Storage;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://./data/server.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    ListDrafts,
    ExportDraft {
        org: String,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    ResetDraft {
        org: String,
        #[arg(long, default_value = "all")]
        step: StepScope,
    },
    ListSubmissions {
        #[arg(long)]
        org: Option<String>,
    },
    /// Mint a development bearer token the server will accept.
    Token {
        user: String,
        org: String,
        #[arg(long, env = "APP__AUTH_SECRET", default_value = "devsecret", hide_env_values = true)]
        secret: String,
        #[arg(long, env = "APP__AUTH_ISSUER", default_value = "gds-wizard")]
        issuer: String,
        #[arg(long, default_value_t = 3600)]
        ttl_seconds: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Command::Token {
        user,
        org,
        secret,
        issuer,
        ttl_seconds,
    } = &cli.command
    {
        let cfg = AuthConfig {
            secret: secret.clone(),
            issuer: issuer.clone(),
            ttl_seconds: *ttl_seconds,
        };
        let token = mint_token(&cfg, user, Some(&OrganizationId::from(org.as_str())))
            .context("failed to sign token")?;
        println!("{token}");
        return Ok(());
    }

    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::ListDrafts => {
            for draft in storage.list_drafts().await? {
                println!("{}\t{}", draft.org_id, draft.updated_at.to_rfc3339());
            }
        }
        Command::ExportDraft { org, output } => {
            let org = OrganizationId(org);
            let draft = storage
                .load_draft(&org)
                .await?
                .with_context(|| format!("no draft stored for {org}"))?;
            let json = serde_json::to_string_pretty(&draft)?;
            match output {
                Some(path) => {
                    tokio::fs::write(&path, json)
                        .await
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("exported draft of {org} to {}", path.display());
                }
                None => println!("{json}"),
            }
        }
        Command::ResetDraft { org, step } => {
            let org = OrganizationId(org);
            let existed = storage.reset_draft(&org, step).await?;
            if existed {
                println!("reset {} of {org}", String::from(step));
            } else {
                println!("no draft stored for {org}");
            }
        }
        Command::ListSubmissions { org } => {
            let org = org.map(OrganizationId);
            for stored in storage.list_submissions(org.as_ref()).await? {
                let record = stored.record;
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    stored.org_id,
                    record.network,
                    record.id,
                    record.status,
                    record.submitted_at.to_rfc3339()
                );
            }
        }
        Command::Token { .. } => {}
    }

    Ok(())
}
