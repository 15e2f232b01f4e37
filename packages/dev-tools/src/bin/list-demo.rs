//! Interactive list editor over the in-memory store
//!
//! Reads one command per line from stdin and applies it to an
//! `OrderEngine`, printing every committed `OrderEvent` as JSON. Useful for
//! watching allocation and rebalancing decisions with `RUST_LOG=debug`.
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=sortorder_core=debug cargo run --bin list-demo
//!
//! # Tight rank range to see rebalances quickly
//! SORTORDER_MIN_RANK=-20 SORTORDER_MAX_RANK=200 cargo run --bin list-demo
//! ```
//!
//! # Commands
//!
//! ```text
//! add             insert a new item at the head
//! add <pos>       insert a new item at a position
//! mv <from> <to>  move the item at <from> so it ends up at <to>
//! rm <pos>...     delete the items at the given positions
//! ls              print the visible order
//! config          print the active configuration
//! quit
//! ```

use anyhow::{anyhow, bail, Context};
use sortorder_core::{Item, MemoryStore, OrderEngine, OrderingConfig};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

type DemoEngine = OrderEngine<MemoryStore>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("list_demo=info,sortorder_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = OrderingConfig::from_env();
    let engine = Arc::new(
        OrderEngine::new(Arc::new(MemoryStore::new()), config)
            .context("Failed to start order engine")?,
    );

    let mut events = engine.subscribe_to_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => println!("event {}", json),
                Err(e) => tracing::warn!("Could not serialize event: {}", e),
            }
        }
    });

    println!("list-demo ready; type `help` for commands");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" || line == "exit" {
            break;
        }

        if let Err(e) = run_command(&engine, line).await {
            eprintln!("error: {:#}", e);
        }
        // Let the event printer catch up before the next prompt
        tokio::task::yield_now().await;
    }

    Ok(())
}

async fn run_command(engine: &DemoEngine, line: &str) -> anyhow::Result<()> {
    let mut parts = line.split_whitespace();
    let command = parts.next().unwrap_or_default();
    let args: Vec<usize> = parts
        .map(|arg| {
            arg.parse()
                .with_context(|| format!("`{}` is not a position", arg))
        })
        .collect::<anyhow::Result<_>>()?;

    match (command, args.as_slice()) {
        ("add", []) => {
            let item = engine.insert_at_end(Item::new()).await?;
            println!("added {} with rank {}", item.id, item.rank);
        }
        ("add", [position]) => {
            let item = engine.insert_at(Item::new(), *position).await?;
            println!("added {} at {} with rank {}", item.id, position, item.rank);
        }
        ("mv", [origin, destination]) => {
            let order = engine.visible_order().await?;
            let item = order
                .get(*origin)
                .ok_or_else(|| anyhow!("no item at position {}", origin))?;
            engine.move_item(&item.id, *origin, *destination).await?;
        }
        ("rm", positions) if !positions.is_empty() => {
            let removed = engine.delete_at_positions(positions).await?;
            println!("removed {} item(s)", removed.len());
        }
        ("ls", []) => print_order(engine).await?,
        ("config", []) => println!("{}", serde_json::to_string_pretty(engine.config())?),
        ("help", []) => {
            println!("commands: add [pos] | mv <from> <to> | rm <pos>... | ls | config | quit")
        }
        _ => bail!("unrecognized command `{}`; type `help`", line),
    }

    Ok(())
}

async fn print_order(engine: &DemoEngine) -> anyhow::Result<()> {
    let order = engine.visible_order().await?;
    if order.is_empty() {
        println!("(empty)");
    }
    for (position, item) in order.iter().enumerate() {
        println!(
            "{:>4}  {:>22}  {}  {}",
            position,
            item.rank,
            item.created_at.format("%H:%M:%S%.3f"),
            item.id
        );
    }
    Ok(())
}
