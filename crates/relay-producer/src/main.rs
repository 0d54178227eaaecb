use anyhow::Context;
use clap::Parser;
use relay_producer::JsonTestProducer;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;

/// Publish JSON lines to a Kafka topic
///
/// To run this producer:
/// 1. Start Kafka with Docker:
///    docker run -d --name kafka -p 9092:9092 apache/kafka:latest
/// 2. Publish a file of orders:
///    cargo run -p relay-producer -- --topic orders orders.jsonl
/// 3. Run the relay in another terminal:
///    cargo run -- run --bind orders=grp1 --forward orders=orders-exchange
#[derive(Parser)]
#[command(name = "relay-producer")]
struct Args {
    /// Kafka brokers (comma-separated)
    #[arg(long, default_value = "localhost:9092", env = "KAFKA_BROKERS")]
    brokers: String,

    /// Topic to publish to
    #[arg(long)]
    topic: String,

    /// Payload field whose string value is used as the message key
    #[arg(long, default_value = relay_types::DEFAULT_KEY_FIELD)]
    key_field: String,

    /// Partitions to create the topic with when it does not exist
    #[arg(long, default_value_t = 1)]
    partitions: i32,

    /// File with one JSON object per line (reads stdin when omitted)
    file: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match run_main(Args::parse()).await {
        Ok(count) => println!("Published {count} messages"),
        Err(e) => {
            eprintln!("Error: {e:?}");
            std::process::exit(1);
        }
    }
}

async fn run_main(args: Args) -> anyhow::Result<usize> {
    let producer = JsonTestProducer::new(&args.brokers).await?;
    producer
        .create_topic_if_not_exists(&args.topic, args.partitions)
        .await?;

    match &args.file {
        Some(path) => {
            let file =
                File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
            producer
                .publish_lines(&args.topic, BufReader::new(file), &args.key_field)
                .await
        }
        None => {
            producer
                .publish_lines(&args.topic, io::stdin().lock(), &args.key_field)
                .await
        }
    }
}
