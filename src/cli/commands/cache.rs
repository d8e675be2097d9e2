//! Cache command - inspect cache buckets

use crate::cache::{CacheEntry, CacheStorage};
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::config::{Config, ConfigManager};
use crate::error::PrecacheResult;
use console::style;
use serde::Serialize;

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> PrecacheResult<()> {
    let storage = ConfigManager::storage(config);

    match args.action {
        CacheAction::List { format } => list_buckets(&storage, format).await,
        CacheAction::Show { name, format } => {
            let name = name.unwrap_or_else(|| config.worker.cache_name.clone());
            show_bucket(&storage, &name, format).await
        }
    }
}

#[derive(Debug, Serialize)]
struct BucketSummary {
    name: String,
    entries: usize,
    bytes: usize,
}

/// List all buckets
async fn list_buckets(storage: &CacheStorage, format: OutputFormat) -> PrecacheResult<()> {
    let mut buckets = Vec::new();
    for name in storage.keys().await? {
        let entries = storage.existing(&name).await?.entries().await?;
        buckets.push(BucketSummary {
            name,
            entries: entries.len(),
            bytes: body_bytes(&entries),
        });
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&buckets)?),
        OutputFormat::Plain => {
            for bucket in &buckets {
                println!("{}", bucket.name);
            }
        }
        OutputFormat::Table if buckets.is_empty() => {
            println!("No cache buckets found ({} storage).", storage.backend_name());
        }
        OutputFormat::Table => {
            println!("{:<32} {:>8} {:>12}", "BUCKET", "ENTRIES", "BYTES");
            println!("{}", "-".repeat(54));
            for bucket in &buckets {
                println!(
                    "{:<32} {:>8} {:>12}",
                    bucket.name, bucket.entries, bucket.bytes
                );
            }
            println!();
            println!("Total: {} bucket(s)", buckets.len());
        }
    }

    Ok(())
}

#[derive(Debug, Serialize)]
struct EntryJson<'a> {
    url: &'a str,
    method: String,
    status: u16,
    bytes: usize,
    content_type: Option<&'a str>,
    vary: &'a [(String, String)],
    stored_at: String,
}

/// Show the entries of one bucket
async fn show_bucket(
    storage: &CacheStorage,
    name: &str,
    format: OutputFormat,
) -> PrecacheResult<()> {
    let entries = storage.existing(name).await?.entries().await?;

    match format {
        OutputFormat::Json => {
            let json: Vec<EntryJson<'_>> = entries
                .iter()
                .map(|e| EntryJson {
                    url: e.key.as_str(),
                    method: e.method.to_string(),
                    status: e.response.status,
                    bytes: e.response.body.len(),
                    content_type: e.response.header("content-type"),
                    vary: &e.request_headers,
                    stored_at: e.stored_at.to_rfc3339(),
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Plain => {
            for entry in &entries {
                println!("{}", entry.key);
            }
        }
        OutputFormat::Table => print_entry_table(name, &entries),
    }

    Ok(())
}

fn print_entry_table(name: &str, entries: &[CacheEntry]) {
    println!("{} {}", style("Bucket:").bold(), name);
    println!();
    println!(
        "{:<48} {:<6} {:>10} {:<20}",
        "URL", "STATUS", "BYTES", "STORED"
    );
    println!("{}", "-".repeat(88));

    for entry in entries {
        let status = if entry.response.ok() {
            style(entry.response.status.to_string()).green()
        } else {
            style(entry.response.status.to_string()).yellow()
        };
        println!(
            "{:<48} {:<6} {:>10} {:<20}",
            entry.key.as_str(),
            status,
            entry.response.body.len(),
            entry.stored_at.format("%Y-%m-%d %H:%M")
        );
    }

    println!();
    println!("Total: {} entr{}", entries.len(), if entries.len() == 1 { "y" } else { "ies" });
}

fn body_bytes(entries: &[CacheEntry]) -> usize {
    entries.iter().map(|e| e.response.body.len()).sum()
}
