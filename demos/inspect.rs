//! Discover a table and print its fields and first page.
//!
//! Run: `DATABASE_URL=postgres://localhost/app STORE_TABLE=test cargo run --example inspect`

use relational_store::{EntityStore, NoFilter, PageRequest, Sort, StoreConfig};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("relational_store=info")),
        )
        .init();

    let config = StoreConfig::from_env()?;
    let pool = config.connect().await?;
    let store = EntityStore::discover(pool, &config.schema, &config.table, Arc::new(NoFilter), config.options()).await?;

    for field in store.fields() {
        println!(
            "{:<24} {:<10?} column={} key={} nullable={} auto_increment={}",
            field.name,
            field.semantic_type,
            field.column.name,
            field.is_key(),
            field.column.nullable,
            field.is_auto_increment()
        );
    }

    let page = store.find_page(PageRequest::default(), &Sort::unsorted()).await?;
    let keys = page
        .items
        .iter()
        .map(|e| store.key_codec().key_of(e).and_then(|k| store.key_codec().encode(&k)))
        .collect::<Result<Vec<_>, _>>()?;
    tracing::info!(total = page.total_count, pages = page.total_pages, "first page loaded");
    println!("{}", serde_json::to_string_pretty(&page)?);
    println!("keys: {:?}", keys);
    Ok(())
}
