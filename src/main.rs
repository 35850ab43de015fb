use std::path::Path;

use anyhow::Context;
use donation_storage::core::config::Config;
use donation_storage::modules::storage::{FsBlobContext, StorageManager};
use donation_storage::shared::content_type::guess_content_type;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "\
Usage:
  donation-storage upload <path> <donation-id> [provider]
  donation-storage download-url <object-name-or-handle> [provider]
  donation-storage content <url-or-handle> [provider]

Providers: object-storage, managed-blob (default from STORAGE_PROVIDER)
Managed blobs are kept under STORAGE_BLOB_DIR (default data/blobs)";

fn main() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> anyhow::Result<()> {
    // Load .env file BEFORE initializing logger so RUST_LOG is available
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        anyhow::bail!(USAGE);
    };

    let config = Config::from_env();
    let manager = StorageManager::new(&config);

    // Managed-blob handles must stay resolvable by later invocations
    let blob_context = FsBlobContext::new(&config.storage.managed_blob_dir).await?;
    tracing::info!(
        "Storage ready (default provider: {}, blob dir: {})",
        manager.default_provider(),
        blob_context.root().display()
    );

    let output = match (command.as_str(), &args[1..]) {
        ("upload", [path, donation_id, rest @ ..]) => {
            let data = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read {}", path))?;
            let file_name = Path::new(path)
                .file_name()
                .and_then(|n| n.to_str())
                .context("Path has no file name")?;
            let content_type = guess_content_type(file_name);

            let result = manager
                .upload_file(
                    data,
                    file_name,
                    content_type,
                    donation_id,
                    rest.first().map(String::as_str),
                    Some(&blob_context),
                )
                .await?;
            serde_json::to_string_pretty(&result)?
        }
        ("download-url", [name, rest @ ..]) => {
            let result = manager
                .get_download_url(name, rest.first().map(String::as_str), Some(&blob_context))
                .await?;
            serde_json::to_string_pretty(&result)?
        }
        ("content", [file_ref, rest @ ..]) => {
            let mut result = manager
                .get_file_content(file_ref, rest.first().map(String::as_str), Some(&blob_context))
                .await?;
            // Raw bytes are already carried by the data URL
            if result.url.is_some() {
                result.content = None;
            }
            serde_json::to_string_pretty(&result)?
        }
        _ => anyhow::bail!(USAGE),
    };

    println!("{}", output);
    Ok(())
}
