//! Basic example: two owners, one cross-owner modifier
//!
//! This example demonstrates:
//! - Creating owners with initial base values
//! - Queueing a modifier that reads another owner's attribute
//! - Processing the queue and watching a base change cascade
//! - Inspecting a value breakdown
//!
//! Run with `RUST_LOG=zzattr=debug` to see the engine's log output.

use zzattr::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Stat {
    Strength,
    Dexterity,
}

impl AttributeKind for Stat {
    const ALL: &'static [Self] = &[Stat::Strength, Stat::Dexterity];

    fn index(self) -> usize {
        self as usize
    }
}

fn main() -> Result<(), AttributeError<Stat>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut changer = AttributeChanger::<Stat>::new();

    // Two owners, every attribute starting at 10
    let a = changer.create_owner_with(|_| 10.0);
    let b = changer.create_owner_with(|_| 10.0);
    let a_str = AttributeRef::new(a, Stat::Strength);
    let b_str = AttributeRef::new(b, Stat::Strength);
    println!("Created owners {a} and {b}, all attributes at 10");

    // A.Strength reads B.Strength
    let queue = CommandQueue::new();
    let mut batch = queue.create_batch();
    batch.add_modifier(a_str, Modifier::from_attribute(b_str))?;
    queue.submit(batch);
    println!("Queued: {a_str} += {b_str}");

    // B.Strength grows by 5 before the sync point
    changer.add_base_value(b_str, 5.0)?;
    println!("{b_str} base += 5");

    let report = changer.process_all(&queue)?;
    println!(
        "Processed {} batch(es), {} command(s) applied\n",
        report.batches,
        report.applied()
    );

    println!("{a_str} = {:.2}", changer.get_value(a_str)?);
    println!("{b_str} = {:.2}\n", changer.get_value(b_str)?);

    // Later changes cascade immediately
    changer.add_base_value(b_str, 5.0)?;
    println!("{b_str} base += 5");
    println!("{a_str} = {:.2}\n", changer.get_value(a_str)?);

    println!("Breakdown of {a_str}:");
    let breakdown = changer.breakdown(a_str)?;
    println!("  base: {:.2}", breakdown.base);
    for (description, value) in &breakdown.contributions {
        println!("  {description} -> {value:.2}");
    }
    println!("  final: {:.2}", breakdown.final_value);

    Ok(())
}
