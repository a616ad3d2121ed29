// Shadowcast Concentrator - light sensor beacon simulator
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Beacon simulator.
//!
//! Plays the part of a battery-powered light sensor: every interval it
//! samples a light value, stamps it with its own uptime in seconds and
//! replaces its advertising payload. Each payload goes out several times,
//! as a radio re-advertises the same data until it changes, so a receiver
//! sees the duplicates it has to filter.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shadowcast::{Advertiser, Clock, Encoder, MonotonicClock, SensorReading};
use std::fmt::Display;
use std::time::Duration;
use tracing::{info, warn};

/// Sampling interval of the light sensor firmware
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// Advertisements sent per reading
pub const DEFAULT_REPEATS: u32 = 3;

/// Largest simulated step between two samples (lux)
const MAX_STEP: i32 = 40;

/// Simulated light sensor
pub struct Beacon<A, C = MonotonicClock> {
    advertiser: A,
    clock: C,
    encoder: Encoder,
    repeats: u32,
    lux: u16,
    rng: StdRng,
}

impl<A: Advertiser> Beacon<A> {
    /// Create a beacon on the uptime clock
    pub fn new(advertiser: A, encoder: Encoder, repeats: u32) -> Self {
        Self::with_clock(
            advertiser,
            MonotonicClock::new(),
            encoder,
            repeats,
            StdRng::from_entropy(),
        )
    }
}

impl<A: Advertiser, C: Clock> Beacon<A, C> {
    /// Create a beacon with explicit clock and randomness
    pub fn with_clock(
        advertiser: A,
        clock: C,
        encoder: Encoder,
        repeats: u32,
        mut rng: StdRng,
    ) -> Self {
        let lux = rng.gen_range(100..=500);
        Self {
            advertiser,
            clock,
            encoder,
            repeats: repeats.max(1),
            lux,
            rng,
        }
    }

    /// Seconds since the beacon started
    pub fn uptime_secs(&self) -> u32 {
        self.clock.now_secs()
    }

    /// Take the next light sample
    pub fn sample(&mut self) -> SensorReading {
        let step = self.rng.gen_range(-MAX_STEP..=MAX_STEP);
        self.lux = (i32::from(self.lux) + step).clamp(0, i32::from(u16::MAX)) as u16;
        SensorReading::light(self.uptime_secs(), self.lux)
    }

    /// Advertise `reading` the configured number of times
    pub fn advertise(&mut self, reading: &SensorReading) -> Result<(), A::Error> {
        let payload = self.encoder.encode(reading);
        for _ in 0..self.repeats {
            self.advertiser.update_advertising(&payload)?;
        }
        Ok(())
    }

    /// The outbound transport
    pub fn advertiser(&self) -> &A {
        &self.advertiser
    }
}

impl<A, C> Beacon<A, C>
where
    A: Advertiser,
    A::Error: Display,
    C: Clock,
{
    /// Sample and advertise forever, one reading per `interval`
    pub async fn run(mut self, interval: Duration) {
        info!(
            "Beacon started: one reading every {:?}, {} advertisements each",
            interval, self.repeats
        );
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let reading = self.sample();
            match self.advertise(&reading) {
                Ok(()) => info!(
                    "Advertised light {} at t={}s",
                    self.lux, reading.timestamp
                ),
                Err(e) => warn!("Advertising failed: {}", e),
            }
        }
    }
}
