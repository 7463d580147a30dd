//! Propolis CLI
//!
//! Identities live in a directory store; envelopes are read and written as
//! text on stdin/stdout.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde_json::json;
use tokio::io::AsyncReadExt;
use tracing::{debug, error, warn};

use propolis::{
    config::{Args, Command},
    envelope::{ContentRegistry, Envelope},
    identity::{CreateIdentityParams, IdentityId, IdentityService},
    logging,
    store::{spawn_cleanup_task, DirectoryIdentityStore, MemoryPublicKeyCache},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    if let Err(e) = logging::init(&args.log_level, args.log_json) {
        eprintln!("{e}");
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let store = DirectoryIdentityStore::open(&args.data_dir)
        .await
        .with_context(|| format!("opening data dir {}", args.data_dir.display()))?;
    debug!(data_dir = %store.root().display(), "Opened identity store");

    let cache = Arc::new(MemoryPublicKeyCache::new(args.cache_config()));
    spawn_cleanup_task(Arc::clone(&cache));

    let service = IdentityService::new(Arc::new(store), cache);

    match args.command {
        Command::Create {
            handle,
            email,
            password,
        } => {
            let identity = service
                .create(&CreateIdentityParams {
                    handle,
                    email,
                    password,
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&identity.public_profile())?);
        }

        Command::Show { id } => {
            let identity = service.fetch(&IdentityId::new(id)).await?;
            println!("{}", serde_json::to_string_pretty(&identity.public_profile())?);
        }

        Command::Sign {
            id,
            password,
            subtype,
            payload,
        } => {
            let payload: serde_json::Value =
                serde_json::from_str(&payload).context("payload is not valid JSON")?;
            let signed = service
                .compose(&IdentityId::new(id), &password, &subtype, &payload)
                .await?;
            println!("{}", signed.text);
            println!("{}", signed.id);
        }

        Command::Verify { envelope } => {
            let text = match envelope {
                Some(text) => text,
                None => {
                    let mut text = String::new();
                    tokio::io::stdin()
                        .read_to_string(&mut text)
                        .await
                        .context("reading envelope from stdin")?;
                    text
                }
            };

            let envelope = Envelope::parse_with(text.trim(), &service).await?;

            let content = match ContentRegistry::standard().decode(&envelope) {
                Ok(content) => Some(content),
                Err(e) => {
                    warn!(envelope_id = %envelope.id(), error = %e, "Payload not decoded");
                    None
                }
            };

            let report = json!({
                "id": envelope.id(),
                "sender": envelope.sender(),
                "contentType": envelope.content_type(),
                "sentAt": envelope.sent_at(),
                "content": content,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
