//! File-transport example: the same exchange with no shared memory at all

use femlink::{ExchangeConfig, ExchangeResult, Transport, TransportPreference, TransportSelector};
use std::time::Duration;

fn main() -> ExchangeResult<()> {
    femlink::init_tracing();

    println!("Femlink File Transport Round Trip");
    println!("=================================");

    let config = ExchangeConfig {
        transport: TransportPreference::File,
        ..ExchangeConfig::default()
    };
    let mut transport = TransportSelector::select(&config)?;

    let input = vec![1.0, 2.0, 3.0, 4.0, 5.0];
    println!("Writing input: {:?}", input);
    transport.put_arrays("values", &[input], &[5])?;
    println!("  Spool directory: {}", config.spool_dir.display());

    // A real solver would run here and overwrite the files.
    let (shape, arrays) = transport.take_arrays("values", Duration::from_secs(1))?;
    println!(
        "Read back {} array(s) of {} values: {:?}",
        shape.num_arrays, shape.elements_per_array, arrays[0]
    );

    transport.teardown_exchange("values")?;
    println!("✓ Files removed");
    Ok(())
}
