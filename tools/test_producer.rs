//! Test Transaction Producer
//!
//! Generates and publishes test transactions to NATS for pipeline testing.

use chrono::Utc;
use rand::Rng;
use risk_scoring_engine::types::{Location, Transaction, TransactionType};
use std::time::Duration;
use tracing::{info, warn};

// A handful of Nigerian cities for plausible geo points.
const CITIES: &[(f64, f64)] = &[
    (6.5244, 3.3792),  // Lagos
    (9.0765, 7.3986),  // Abuja
    (11.9914, 8.5313), // Kano
    (4.8156, 7.0498),  // Port Harcourt
    (7.3775, 3.9470),  // Ibadan
];

/// Transaction generator for testing
struct TransactionGenerator {
    rng: rand::rngs::ThreadRng,
    transaction_counter: u64,
}

impl TransactionGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
            transaction_counter: 0,
        }
    }

    /// Generate a random legitimate transaction
    fn generate_legitimate(&mut self) -> Transaction {
        self.transaction_counter += 1;
        let user = format!("user_{:04}", self.rng.gen_range(1..500));
        let city = CITIES[self.rng.gen_range(0..CITIES.len())];

        let mut tx = Transaction::new(
            user.as_str(),
            // Users mostly stick to one device.
            format!("device_{user}"),
            self.rng.gen_range(500.0..80_000.0),
            self.random_type(),
        );
        tx.location = Some(Location { lat: city.0, lon: city.1 });
        tx.beneficiary_account = Some(format!("{:010}", self.rng.gen_range(0u64..10_000_000_000)));
        tx.beneficiary_bank_code = Some(format!("{:03}", self.rng.gen_range(1..200)));
        tx.ip_address = Some(self.random_ip());
        tx.created_at = Some(Utc::now());
        tx
    }

    /// Generate a suspicious transaction: shared device, round amount,
    /// far-away location, amounts near the cap.
    fn generate_suspicious(&mut self) -> Transaction {
        self.transaction_counter += 1;
        let user = format!("user_{:04}", self.rng.gen_range(1..500));
        let city = CITIES[self.rng.gen_range(0..CITIES.len())];

        let amount = if self.rng.gen_bool(0.4) {
            // Round amounts in structuring territory.
            (self.rng.gen_range(5..200) * 10_000) as f64
        } else {
            self.rng.gen_range(900_000.0..3_000_000.0)
        };

        let mut tx = Transaction::new(
            user.as_str(),
            // A small pool of mule devices shared across users.
            format!("device_shared_{:02}", self.rng.gen_range(1..10)),
            amount,
            self.random_type(),
        );
        tx.location = Some(Location { lat: city.0, lon: city.1 });
        tx.beneficiary_account = Some(format!("{:010}", self.rng.gen_range(0u64..10_000_000_000)));
        tx.beneficiary_bank_code = Some(format!("{:03}", self.rng.gen_range(1..200)));
        tx.ip_address = Some(self.random_ip());
        tx.created_at = Some(Utc::now());
        tx
    }

    fn random_type(&mut self) -> TransactionType {
        match self.rng.gen_range(0..4) {
            0 => TransactionType::Transfer,
            1 => TransactionType::Card,
            2 => TransactionType::Qr,
            _ => TransactionType::Pos,
        }
    }

    fn random_ip(&mut self) -> String {
        format!(
            "{}.{}.{}.{}",
            self.rng.gen_range(1..255),
            self.rng.gen_range(0..255),
            self.rng.gen_range(0..255),
            self.rng.gen_range(1..255)
        )
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("test_producer=info".parse()?),
        )
        .init();

    info!("Starting Test Transaction Producer");

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let nats_url = args.get(1).map(|s| s.as_str()).unwrap_or("nats://localhost:4222");
    let subject = args.get(2).map(|s| s.as_str()).unwrap_or("transactions.score");
    let count: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(100);
    let fraud_rate: f64 = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(0.1);
    let delay_ms: u64 = args.get(5).and_then(|s| s.parse().ok()).unwrap_or(100);

    info!(
        nats_url = %nats_url,
        subject = %subject,
        count = count,
        fraud_rate = fraud_rate,
        delay_ms = delay_ms,
        "Configuration loaded"
    );

    // Connect to NATS
    let client = match async_nats::connect(nats_url).await {
        Ok(c) => {
            info!("Connected to NATS");
            c
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS. Running in dry-run mode.");
            return run_dry_mode(count, fraud_rate, delay_ms).await;
        }
    };

    // Generate and publish transactions
    let mut generator = TransactionGenerator::new();
    let mut rng = rand::thread_rng();

    info!("Starting to publish {} transactions...", count);

    let mut legitimate_count = 0;
    let mut suspicious_count = 0;

    for i in 0..count {
        let transaction = if rng.gen_bool(fraud_rate) {
            suspicious_count += 1;
            generator.generate_suspicious()
        } else {
            legitimate_count += 1;
            generator.generate_legitimate()
        };

        let payload = serde_json::to_vec(&transaction)?;

        client.publish(subject.to_string(), payload.into()).await?;

        if (i + 1) % 10 == 0 {
            info!(
                "Published {}/{} transactions ({} legitimate, {} suspicious)",
                i + 1,
                count,
                legitimate_count,
                suspicious_count
            );
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    info!(
        "Completed! Published {} transactions ({} legitimate, {} suspicious)",
        count, legitimate_count, suspicious_count
    );

    Ok(())
}

async fn run_dry_mode(count: u64, fraud_rate: f64, delay_ms: u64) -> anyhow::Result<()> {
    info!("Running in dry-run mode (no NATS connection)");

    let mut generator = TransactionGenerator::new();
    let mut rng = rand::thread_rng();

    for i in 0..count {
        let transaction = if rng.gen_bool(fraud_rate) {
            generator.generate_suspicious()
        } else {
            generator.generate_legitimate()
        };

        let json = serde_json::to_string_pretty(&transaction)?;

        if (i + 1) % 10 == 0 || i == 0 {
            info!("Sample transaction {}:\n{}", i + 1, json);
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    Ok(())
}
