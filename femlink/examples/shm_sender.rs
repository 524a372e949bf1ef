//! Host-side sender example: publish arrays and wait for the solver's answer
//!
//! Run this first, then `shm_receiver` in a second terminal.

use femlink::{ExchangeConfig, ExchangeResult, ShmTransport};
use std::time::Duration;

fn main() -> ExchangeResult<()> {
    femlink::init_tracing();

    println!("Femlink Shared Memory Sender");
    println!("============================");

    let config = ExchangeConfig::default();
    let mut transport = ShmTransport::new(config)?;

    // Two arrays over a 5 x 4 grid
    let arrays: Vec<Vec<f64>> = (0..2)
        .map(|a| (0..20).map(|i| (a * 20 + i) as f64).collect())
        .collect();

    println!(
        "Sending {} arrays of {} values each...",
        arrays.len(),
        arrays[0].len()
    );
    transport.send_arrays("density", &arrays, &[5, 4])?;
    println!("✓ Arrays handed off, waiting for the solver...");

    let (shape, results) = transport.recv_arrays("gradient", Duration::from_secs(60))?;
    println!(
        "✓ Received {} arrays of {} values back",
        shape.num_arrays, shape.elements_per_array
    );
    println!("  First values: {:?}", &results[0][..4.min(results[0].len())]);

    println!("Cleaning up...");
    transport.teardown("density")?;
    transport.teardown("gradient")?;
    Ok(())
}
