//! toolcrib - command line front end for the tool loan kernel.
//!
//! Subcommands:
//! - `encode`: print the scannable code for an asset tag
//! - `decode`: validate a scanned string and print its asset tag
//! - `badge`: check a badge code against the configured accepted set
//! - `demo`: run a borrow/return cycle through a scan session on the in-memory store

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use toolcrib_core::badge::BadgeVerdict;
use toolcrib_core::codec::{AssetTag, CodeCodec};
use toolcrib_core::kernel::{Kernel, LoanAction, ToolDraft};
use toolcrib_core::types::{CategoryId, UserId};
use toolcrib_core::{Config, Result};

#[derive(Debug, Parser)]
#[command(name = "toolcrib", version, about = "Tool loan lifecycle kernel")]
struct Cli {
    /// JSON configuration file.
    #[arg(long, global = true, env = "TOOLCRIB_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the scannable code for an asset tag.
    Encode {
        asset_tag: String,
        /// Issuance time in epoch milliseconds (defaults to now).
        #[arg(long)]
        at: Option<u64>,
    },
    /// Validate a scanned string and print its asset tag.
    Decode { raw: String },
    /// Check a badge code against the accepted set.
    Badge { code: String },
    /// Register a tool, then borrow and return it through a scan session.
    Demo {
        #[arg(long, default_value = "4521")]
        asset_tag: String,
        #[arg(long, default_value = "3")]
        borrower: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match cli.config.as_deref().map(Config::load).transpose() {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            eprintln!("config error: {e}");
            return ExitCode::FAILURE;
        }
    };
    toolcrib_core::observability::init_tracing_with(&config.observability);

    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(kind = %e.kind(), "{e}");
            eprintln!("{}: {e}", e.kind());
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, config: Config) -> Result<()> {
    match command {
        Command::Encode { asset_tag, at } => {
            let tag = AssetTag::parse(asset_tag)?;
            let code = match at {
                Some(millis) => CodeCodec::encode(&tag, millis),
                None => CodeCodec::encode_at(&tag, chrono::Utc::now()),
            };
            println!("{code}");
        }
        Command::Decode { raw } => {
            let code = CodeCodec::decode_full(&raw)?;
            println!("{}", serde_json::json!({
                "asset_tag": code.asset_tag,
                "issued_at_ms": code.issued_at_ms,
            }));
        }
        Command::Badge { code } => {
            let kernel = Kernel::from_config(config)?;
            match kernel.badges().validate(&code) {
                BadgeVerdict::Authorized => println!("authorized"),
                BadgeVerdict::Unauthorized => {
                    return Err(toolcrib_core::Error::unauthorized(code));
                }
            }
        }
        Command::Demo { asset_tag, borrower } => demo(config, asset_tag, borrower).await?,
    }
    Ok(())
}

async fn demo(config: Config, asset_tag: String, borrower: String) -> Result<()> {
    let kernel = Kernel::from_config(config)?;
    let borrower: UserId = borrower.parse()?;
    let accepted_code = kernel
        .config()
        .badge
        .accepted_codes
        .first()
        .cloned()
        .unwrap_or_default();

    let (badge_scanner, mut grants) = kernel.badge_scanner();
    badge_scanner.start().await;
    badge_scanner.on_decode(&accepted_code).await;
    let grant = grants
        .recv()
        .await
        .ok_or_else(|| toolcrib_core::Error::unauthorized("badge session closed"))?
        .output;

    let draft = ToolDraft {
        name: "Demo tool".to_string(),
        asset_tag,
        details: String::new(),
        location: "Oficina".to_string(),
        category: Some("demo".parse::<CategoryId>()?),
        image_ref: None,
    };
    let tool = kernel.registry().register(&grant, draft, Some(borrower.clone())).await?;
    println!("registered {} as {}", tool.asset_tag, tool.code);

    let (tool_scanner, mut tools) = kernel.tool_scanner();
    tool_scanner.start().await;
    tool_scanner.on_decode(&tool.code).await;
    let scanned = tools
        .recv()
        .await
        .ok_or_else(|| toolcrib_core::Error::tool_not_found("tool session closed"))?
        .output;

    let loans = kernel.loans();
    if loans.action_for(&scanned.id, &borrower).await? == LoanAction::Borrow {
        let loan = loans.register_loan(&scanned.id, &borrower, &scanned.location).await?;
        println!("borrowed: {}", serde_json::to_string(&loan)?);
        let returned = loans.register_return(&loan.id, &scanned.location).await?;
        println!("returned: {}", serde_json::to_string(&returned)?);
    }
    Ok(())
}
