use ipatch_sync::{FileConfig, FileConfigBuilder};
use stress_test::{stress_test_slaves, stress_test_window, StressError};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async_main())?;
    Ok(())
}

async fn async_main() -> Result<(), StressError> {

    // Run async stress tests
    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║            ASYNC STRESS TESTS                               ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    // Test 1: few slaves, perfect links
    let stats = stress_test_slaves(4, 100, FileConfig::default(), 0.0).await?;
    stats.print();

    // Test 2: few slaves, lossy links
    let stats = stress_test_slaves(4, 100, FileConfig::default(), 0.1).await?;
    stats.print();

    // Test 3: many slaves, small window
    let small = FileConfigBuilder::new().history_capacity(16).build();
    let stats = stress_test_slaves(16, 200, small, 0.05).await?;
    stats.print();

    // Test 4: window analysis
    stress_test_window(40, 10).await?;

    println!("\n✓ All stress tests completed successfully!");
    Ok(())
}
