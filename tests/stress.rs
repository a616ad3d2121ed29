//! Stress tests for shadowcast
//!
//! Run with: cargo test --release stress -- --ignored

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shadowcast::*;
use std::time::Instant;

#[test]
#[ignore] // Run manually with --ignored
fn stress_test_codec() {
    let encoder = Encoder::new();
    let decoder = Decoder::new();
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut buf = [0u8; protocol::MAX_PAYLOAD_LEN];

    let iterations = 1_000_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let reading = SensorReading::light(rng.gen(), rng.gen());
        let len = encoder.encode_into(&reading, &mut buf).unwrap();
        let decoded = decoder.decode(&buf[..len]).unwrap();
        assert_eq!(decoded, reading);
    }

    let elapsed = start.elapsed();
    let rate = iterations as f64 / elapsed.as_secs_f64();

    println!("Round-tripped {} readings in {:?}", iterations, elapsed);
    println!("Rate: {:.0} readings/second", rate);

    assert!(
        rate > 500_000.0,
        "Should round-trip at least 500k readings/s, got {:.0}",
        rate
    );
}

#[test]
#[ignore]
fn stress_test_random_payloads() {
    let decoder = Decoder::new();
    let mut rng = StdRng::seed_from_u64(42);

    for _ in 0..200_000 {
        let len = rng.gen_range(0..=16);
        let bytes: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
        // Arbitrary bytes must fail cleanly or decode within bounds.
        if let Ok(reading) = decoder.decode(&bytes) {
            assert!(reading.encoded_len() <= bytes.len());
        }
    }
}

#[test]
#[ignore]
fn stress_test_threaded_pipeline() {
    let pipeline = Pipeline::new(
        PipelineConfig::with_queue_capacity(32),
        MemoryPublisher::new(),
    )
    .unwrap();
    let metrics = pipeline.metrics();
    let (mut ingestor, handle) = pipeline.spawn().unwrap();

    let mut rng = StdRng::seed_from_u64(7);
    let senders: Vec<SenderId> = (0..16u8)
        .map(|i| SenderId::random([0xC0, 0, 0, 0, 0, i]))
        .collect();
    let mut timestamps = vec![0u32; senders.len()];
    let encoder = Encoder::new();

    let iterations = 500_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let idx = rng.gen_range(0..senders.len());
        // Roughly one in four broadcasts repeats the previous reading.
        if rng.gen_ratio(3, 4) {
            timestamps[idx] += 1;
        }
        let payload = encoder.encode(&SensorReading::light(timestamps[idx], rng.gen()));
        ingestor.ingest(senders[idx], &payload);
    }
    drop(ingestor);

    let aggregator = handle.join().unwrap();
    let elapsed = start.elapsed();
    let snapshot = metrics.snapshot();

    println!("Ingested {} broadcasts in {:?}", iterations, elapsed);
    println!("{:?}", snapshot);

    assert_eq!(snapshot.received, iterations);
    assert_eq!(
        snapshot.received,
        snapshot.duplicates + snapshot.enqueued + snapshot.dropped + snapshot.decode_failures
    );
    // Every queued packet was either aggregated or purged.
    assert_eq!(snapshot.enqueued, snapshot.aggregated() + snapshot.purged);
    assert_eq!(
        aggregator.publisher().published().len() as u64,
        snapshot.published
    );
}
