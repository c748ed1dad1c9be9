//! Deployment Controller Example
//!
//! This example walks a deployment through its whole lifecycle against the
//! in-memory store while an informer mirrors the collection:
//! - Creates a deployment
//! - Scales it and rolls its image with conflict-retrying updates, racing
//!   a configurable number of competing writers
//! - Lists the namespace
//! - Deletes it with foreground propagation
//!
//! Run with:
//! ```bash
//! cargo run -p deployment-controller -- --contenders 3
//! ```

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use nebucloud_informer::prelude::*;
use serde_json::{json, Value};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(about = "Informer-backed deployment lifecycle demo")]
struct Args {
    /// Namespace to work in
    #[arg(short, long, default_value = "default")]
    namespace: String,

    /// Deployment name
    #[arg(long, default_value = "demo-deployment")]
    name: String,

    /// Writers scaling the deployment at the same time as the demo
    #[arg(short, long, default_value_t = 2)]
    contenders: u32,

    /// Wait for Return between steps
    #[arg(short, long, default_value_t = false)]
    interactive: bool,
}

fn replicas(obj: &Object) -> i64 {
    obj.get_nested(&["spec", "replicas"])
        .and_then(Value::as_i64)
        .unwrap_or(0)
}

fn image(obj: &Object) -> &str {
    obj.get_nested(&["spec", "template", "spec", "containers", "web", "image"])
        .and_then(Value::as_str)
        .unwrap_or("<none>")
}

fn prompt(interactive: bool) -> anyhow::Result<()> {
    if !interactive {
        return Ok(());
    }
    print!("-> Press Return key to continue.");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(())
}

fn watch_logger() -> HandlerFuncs {
    HandlerFuncs::new()
        .on_add(|obj| {
            info!(key = %obj.key(), version = %obj.version(), replicas = replicas(obj), "informer: added");
            Ok(())
        })
        .on_update(|old, new| {
            info!(
                key = %new.key(),
                from = %old.map(|o| o.version().to_string()).unwrap_or_default(),
                to = %new.version(),
                replicas = replicas(new),
                image = image(new),
                "informer: updated"
            );
            Ok(())
        })
        .on_delete(|obj| {
            info!(key = %obj.key(), version = %obj.version(), "informer: deleted");
            Ok(())
        })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    info!("Starting deployment controller example");
    info!("{}", nebucloud_informer::version::version_string());

    let store = Arc::new(MemoryStore::new());
    let config = SynchronizerConfig::builder()
        .kind("deployments")
        .selector(ListSelector::namespace(args.namespace.clone()))
        .resync_period(Duration::from_secs(30))
        .build()?;
    let sync = Synchronizer::new(store.clone(), config);
    sync.add_handler("log", watch_logger())?;
    sync.start(HandlerRegistry::new())?;
    sync.wait_for_sync(Duration::from_secs(5))
        .await
        .context("informer never synced")?;

    // Create
    let key = ResourceKey::namespaced(args.namespace.clone(), args.name.clone());
    let deployment = Object::new(
        key.clone(),
        json!({
            "spec": {
                "replicas": 2,
                "selector": {"matchLabels": {"app": "demo"}},
                "template": {
                    "metadata": {"labels": {"app": "demo"}},
                    "spec": {"containers": {"web": {"image": "nginx:1.12", "port": 80}}}
                }
            }
        }),
    )
    .with_label("app", "demo");
    let created = store.create(deployment).await?;
    println!("Created deployment {:?} at version {}.", args.name, created.version());
    prompt(args.interactive)?;

    // Update, racing the contenders
    let mutator = Mutator::new(store.clone());
    let contenders: Vec<_> = (0..args.contenders)
        .map(|i| {
            let mutator = mutator.clone();
            let key = key.clone();
            tokio::spawn(async move {
                let result = mutator
                    .mutate(
                        &key,
                        |obj| {
                            let mut next = obj.clone();
                            next.set_nested(&["spec", "replicas"], json!(replicas(obj) + 1))?;
                            Ok(next)
                        },
                        &RetryPolicy::default_retry(),
                    )
                    .await;
                if let Err(err) = &result {
                    warn!(contender = i, error = %err, "contender gave up");
                }
                result
            })
        })
        .collect();

    let updated = mutator
        .mutate(
            &key,
            |obj| {
                let mut next = obj.clone();
                next.set_nested(&["spec", "replicas"], json!(1))?;
                next.set_nested(
                    &["spec", "template", "spec", "containers", "web", "image"],
                    json!("nginx:1.13"),
                )?;
                Ok(next)
            },
            &RetryPolicy::default_backoff(),
        )
        .await
        .context("update failed")?;
    for contender in contenders {
        if let Ok(obj) = contender.await? {
            info!(version = %obj.version(), replicas = replicas(&obj), "contender applied");
        }
    }
    println!(
        "Updated deployment to version {} ({} replicas, image {}).",
        updated.version(),
        replicas(&updated),
        image(&updated)
    );
    prompt(args.interactive)?;

    // List
    let listed = store.list(&ListSelector::namespace(args.namespace.clone())).await?;
    println!(
        "Listing deployments in namespace {:?} at version {}:",
        args.namespace, listed.version
    );
    for d in &listed.items {
        println!(" * {} ({} replicas, image {})", d.key().name(), replicas(d), image(d));
    }
    println!("Informer cache holds {} entries.", sync.cache().len());
    prompt(args.interactive)?;

    // Delete
    store.delete(&key, PropagationPolicy::Foreground).await?;
    println!("Deleted deployment {:?}.", args.name);

    let cache = sync.cache();
    for _ in 0..100 {
        if !cache.contains_key(&key) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    info!(
        applied = cache.stats().events_applied(),
        deletes = cache.stats().deletes(),
        "informer caught up"
    );

    sync.stop().await;
    info!("Shut down");
    Ok(())
}
