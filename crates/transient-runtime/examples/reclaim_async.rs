//! Create a channel in a category and watch it being reclaimed.
//!
//! Run with: cargo run -p transient-runtime --example reclaim_async

use std::sync::Arc;
use std::time::Duration;

use transient_runtime::{InMemoryGateway, ReclaimConfig, Reclaimer, ScopeId};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .init();

    let gateway = Arc::new(InMemoryGateway::new());
    let reclaimer = Reclaimer::start(
        gateway.clone(),
        ReclaimConfig {
            grace_period: Duration::from_millis(500),
            group_settle_delay: Duration::from_millis(100),
        },
    );

    let scope = ScopeId(1);
    let leaf = reclaimer
        .request_leaf_creation(scope, "standup", Some("Team A"))
        .await?;
    gateway.join(leaf.id)?;
    println!("created {} in {:?}, one occupant", leaf.id, leaf.group);

    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert!(gateway.leaf(leaf.id).is_some(), "occupied leaf must survive");

    gateway.leave(leaf.id)?;
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert!(gateway.leaves(scope).is_empty());
    assert!(gateway.groups(scope).is_empty());
    println!("leaf and group reclaimed");

    reclaimer.shutdown();
    Ok(())
}
