use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    CachedDraftGateway, DraftGateway, HttpDraftGateway, RegistrationWizard, SaveOutcome,
    SectionController,
};
use shared::{
    domain::{Network, RegistrationDraft, StepKey, StepScope},
    validation::{validate_all, validate_step, ValidationReport},
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(about = "Fill in and submit a TRISA directory registration")]
struct Cli {
    #[arg(long, env = "GDS_SERVER_URL", default_value = "http://127.0.0.1:8443")]
    server_url: String,
    #[arg(long, env = "GDS_TOKEN", hide_env_values = true)]
    token: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print one step of the stored draft (or `all`) with its issues.
    Show {
        #[arg(long, default_value = "all")]
        step: StepScope,
    },
    /// Save one section taken from a draft JSON file.
    Save {
        #[arg(long)]
        step: StepKey,
        #[arg(long)]
        file: PathBuf,
    },
    /// Replace the stored draft with an exported one.
    Upload {
        #[arg(long)]
        file: PathBuf,
    },
    /// Write the stored draft to a file.
    Export {
        #[arg(long)]
        output: PathBuf,
    },
    /// Put the draft, or one step of it, back to the defaults.
    Reset {
        #[arg(long)]
        step: Option<StepScope>,
    },
    /// Submit the registration to one network.
    Submit {
        #[arg(long)]
        network: Network,
    },
    /// Show which networks have been submitted.
    Status,
    /// Check a draft file locally without contacting the server.
    Validate {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        step: Option<StepKey>,
    },
}

fn print_issues(issues: &ValidationReport) {
    if issues.is_empty() {
        println!("no issues");
        return;
    }
    for (field, issue) in issues.iter() {
        println!("{:?}\t{field}\t{}", issue.severity, issue.message);
    }
}

async fn read_draft(path: &PathBuf) -> Result<RegistrationDraft> {
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("{} is not a draft", path.display()))
}

fn gateway(cli: &Cli) -> Result<Arc<dyn DraftGateway>> {
    let Some(token) = cli.token.clone() else {
        bail!("an access token is required; pass --token or set GDS_TOKEN");
    };
    let http = HttpDraftGateway::new(&cli.server_url, token)
        .with_context(|| format!("invalid server url {}", cli.server_url))?;
    Ok(Arc::new(CachedDraftGateway::new(http)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let cli = Cli::parse();

    match &cli.command {
        Command::Validate { file, step } => {
            let draft = read_draft(file).await?;
            let issues = match step {
                Some(step) => validate_step(&draft, *step),
                None => validate_all(&draft),
            };
            print_issues(&issues);
            if issues.has_blocking() {
                bail!("draft has blocking issues");
            }
        }
        Command::Show { step } => {
            let reply = gateway(&cli)?.fetch_step(*step).await?;
            println!("{}", serde_json::to_string_pretty(&reply.form)?);
            print_issues(&reply.report());
        }
        Command::Save { step, file } => {
            if !step.is_form() {
                bail!("{step} has no form section");
            }
            let draft = read_draft(file).await?;
            let section = SectionController::new(*step, gateway(&cli)?);
            let stored = section.load().await?;
            section.set_section(&draft).await;
            match section.save(stored.form.state).await? {
                SaveOutcome::Saved(issues) => {
                    info!(%step, "section saved");
                    println!("saved {step}");
                    print_issues(&issues);
                }
                SaveOutcome::Rejected(issues) => {
                    print_issues(&issues);
                    bail!("{step} was not saved");
                }
            }
        }
        Command::Upload { file } => {
            let bytes = tokio::fs::read(file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            let reply = gateway(&cli)?.upload_full_draft(&bytes).await?;
            println!("draft replaced");
            print_issues(&reply.report());
        }
        Command::Export { output } => {
            let reply = gateway(&cli)?.fetch_step(StepScope::All).await?;
            let json = serde_json::to_vec_pretty(&reply.form)?;
            tokio::fs::write(output, json)
                .await
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!("draft written to {}", output.display());
        }
        Command::Reset { step } => {
            gateway(&cli)?.reset_draft(*step).await?;
            println!("draft reset");
        }
        Command::Submit { network } => {
            let wizard = RegistrationWizard::new(gateway(&cli)?);
            wizard.resume().await?;
            wizard.jump_to_step(StepKey::Review).await?;
            let receipt = wizard.submit(*network).await?;
            println!(
                "submitted to {} ({}), request id {}",
                receipt.registered_directory, receipt.record.network, receipt.record.id
            );
            println!("status: {}", receipt.record.status);
            if !receipt.record.message.is_empty() {
                println!("{}", receipt.record.message);
            }
            println!(
                "PKCS12 password, shown only once: {}",
                receipt.credential.reveal()
            );
        }
        Command::Status => {
            let status = gateway(&cli)?.registration_status().await?;
            for network in Network::ALL {
                match status.submitted_at(network) {
                    Some(at) => println!("{network}: submitted {}", at.to_rfc3339()),
                    None => println!("{network}: not submitted"),
                }
            }
        }
    }

    Ok(())
}
