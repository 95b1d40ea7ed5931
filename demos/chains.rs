//! Chains example: long dependency chains under constant change
//!
//! This example demonstrates:
//! - Many owners linked into dependency chains of configurable depth
//! - Chain roots growing every tick by the elapsed time
//! - Intermediate links expiring and being destroyed through
//!   `NotifyDestruction` batches filled by parallel producers
//!
//! Usage: `cargo run --example chains -- [chains] [depth] [ticks]`

use std::sync::Arc;
use std::thread;
use std::time::Instant;
use zzattr::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Stat {
    Health,
    Power,
}

impl AttributeKind for Stat {
    const ALL: &'static [Self] = &[Stat::Health, Stat::Power];

    fn index(self) -> usize {
        self as usize
    }
}

const DELTA_TIME: f32 = 0.016;

struct Link {
    owner: OwnerId,
    expires_at: Option<usize>,
}

fn arg_or(position: usize, default: usize) -> usize {
    std::env::args()
        .nth(position)
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn main() -> Result<(), AttributeError<Stat>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let chain_count = arg_or(1, 64);
    let depth = arg_or(2, 32).max(2);
    let ticks = arg_or(3, 120);
    println!("=== Chains: {chain_count} chains x {depth} links, {ticks} ticks ===\n");

    let mut changer = AttributeChanger::<Stat>::with_config(EngineConfig {
        max_propagation_depth: depth + 1,
        ..EngineConfig::default()
    })?;
    let queue = Arc::new(CommandQueue::new());

    // Build every chain: link i's Power reads link i-1's Power.
    let started = Instant::now();
    let mut chains: Vec<Vec<Link>> = Vec::with_capacity(chain_count);
    for c in 0..chain_count {
        let mut links: Vec<Link> = Vec::with_capacity(depth);
        let mut batch = queue.create_batch();
        for i in 0..depth {
            let owner = changer.create_owner_with(|_| 1.0);
            // Every third intermediate link expires partway through the run.
            let expires_at = (i > 0 && i + 1 < depth && (i + c) % 3 == 0)
                .then(|| (i * ticks) / depth + 1);
            if let Some(prev) = links.last() {
                batch.add_modifier(
                    AttributeRef::new(owner, Stat::Power),
                    Modifier::from_attribute(AttributeRef::new(prev.owner, Stat::Power)),
                )?;
            }
            links.push(Link { owner, expires_at });
        }
        queue.submit(batch);
        chains.push(links);
    }
    let report = changer.process_all(&queue)?;
    println!(
        "Built {} owners, {} edges in {:?}",
        changer.owner_count(),
        report.applied(),
        started.elapsed()
    );

    let started = Instant::now();
    let mut destroyed = 0;
    for tick in 1..=ticks {
        for links in &chains {
            let root = AttributeRef::new(links[0].owner, Stat::Power);
            changer.add_base_value(root, DELTA_TIME)?;
        }

        // Producers gather this tick's expirations in parallel.
        let expired: Vec<Vec<OwnerId>> = chains
            .iter()
            .map(|links| {
                links
                    .iter()
                    .filter(|l| l.expires_at == Some(tick))
                    .map(|l| l.owner)
                    .collect()
            })
            .collect();
        let producers: Vec<_> = expired
            .iter()
            .filter(|owners| !owners.is_empty())
            .map(|owners| (queue.create_batch(), owners.clone()))
            .map(|(mut batch, owners)| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || -> Result<(), AttributeError<Stat>> {
                    for owner in owners {
                        batch.notify_destruction(owner)?;
                    }
                    queue.submit(batch);
                    Ok(())
                })
            })
            .collect();
        // Every expired link must be announced before it is destroyed.
        for producer in producers {
            match producer.join() {
                Ok(result) => result?,
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }

        changer.process_all(&queue)?;
        for owner in expired.into_iter().flatten() {
            changer.destroy_owner(owner)?;
            destroyed += 1;
        }
        for links in &mut chains {
            links.retain(|l| changer.contains_owner(l.owner));
        }
    }
    println!(
        "Ran {ticks} ticks in {:?}, destroyed {destroyed} links\n",
        started.elapsed()
    );

    for (c, links) in chains.iter().enumerate().take(4) {
        let leaf = AttributeRef::new(links[links.len() - 1].owner, Stat::Power);
        println!(
            "chain {c}: {} links left, leaf power {:.3}",
            links.len(),
            changer.get_value(leaf)?
        );
    }
    Ok(())
}
