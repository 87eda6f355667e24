use partition_selection::prelude::*;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let counts = [("berlin", 0i64), ("lyon", 3), ("oslo", 9), ("porto", 40)];

    let mut preagg = PreaggPartitionSelection::builder()
        .with_epsilon(0.5)
        .with_delta(0.02)
        .with_max_partitions_contributed(1)
        .build()?;
    println!(
        "preagg crossovers: {} / {}",
        preagg.first_crossover(),
        preagg.second_crossover()
    );
    for (key, users) in counts {
        println!(
            "  {key:<8} users={users:<3} p={:.4} keep={}",
            preagg.probability_of_keep(users),
            preagg.should_keep(users)
        );
    }

    let mut laplace = LaplacePartitionSelection::builder()
        .with_epsilon(0.5)
        .with_delta(0.02)
        .with_max_partitions_contributed(1)
        .build()?;
    println!("laplace threshold: {:.4}", laplace.threshold());
    for (key, users) in counts {
        println!("  {key:<8} users={users:<3} keep={}", laplace.should_keep(users));
    }

    Ok(())
}
