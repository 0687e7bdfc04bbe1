use amqp_pipe::{BrokerTarget, ExchangeKind, ExchangeOptions, QueueOptions};
use amqp_relay::config::{BridgeConfig, ReceiverConfig, SenderConfig};
use amqp_relay::error::{RelayError, RelayResult};
use amqp_relay::RelayBridge;
use clap::Parser;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "amqp-relay",
    about = "Relay messages between AMQP queues and exchanges",
    version
)]
struct Args {
    /// AMQP broker URL.
    #[arg(long, env = "AMQP_URL")]
    url: String,

    /// Consume from this queue.
    #[arg(long, conflicts_with = "source_exchange")]
    source_queue: Option<String>,

    /// Consume from this exchange through an exclusive server-named queue.
    #[arg(long)]
    source_exchange: Option<String>,

    /// Exchange type for --source-exchange.
    #[arg(long, default_value = "topic")]
    source_exchange_kind: String,

    /// Binding key for --source-exchange; repeat for multiple bindings.
    #[arg(long = "routing-key")]
    routing_keys: Vec<String>,

    /// Publish to this queue.
    #[arg(long, conflicts_with = "dest_exchange")]
    dest_queue: Option<String>,

    /// Publish to this exchange.
    #[arg(long)]
    dest_exchange: Option<String>,

    /// Exchange type for --dest-exchange.
    #[arg(long, default_value = "topic")]
    dest_exchange_kind: String,

    /// Routing key used when publishing to --dest-exchange.
    #[arg(long)]
    dest_routing_key: Option<String>,

    /// Declare targets durable and buffer failed sends for redelivery.
    #[arg(long)]
    durable: bool,

    /// Outbound buffer capacity.
    #[arg(long, env = "RELAY_QUEUE_CAPACITY", default_value = "100")]
    queue_capacity: usize,

    /// Milliseconds between redelivery attempts.
    #[arg(long, env = "RELAY_RETRY_INTERVAL_MS", default_value = "1000")]
    retry_interval_ms: u64,

    /// Milliseconds between receiver health checks.
    #[arg(long, env = "RELAY_HEALTH_INTERVAL_MS", default_value = "1000")]
    health_interval_ms: u64,

    /// Log level when RUST_LOG is unset.
    #[arg(long, env = "RELAY_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> RelayResult<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let config = bridge_config(&args)?;
    info!(
        url = %config.url,
        source = %config.source.name(),
        destination = %config.destination.name(),
        "Starting relay"
    );
    let bridge = RelayBridge::new(config);

    tokio::select! {
        result = bridge.run() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    bridge.close().await;
    Ok(())
}

fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_target(true)
        .compact()
        .init();
}

/// Turn CLI arguments into a bridge configuration, rejecting anything
/// underspecified before a connection is attempted.
fn bridge_config(args: &Args) -> RelayResult<BridgeConfig> {
    if args.url.trim().is_empty() {
        return Err(RelayError::Config("AMQP URL must not be empty".into()));
    }

    let source = source_target(args)?;
    let destination = destination_target(args)?;

    Ok(BridgeConfig {
        url: args.url.clone(),
        source,
        destination,
        sender: SenderConfig {
            queue_capacity: args.queue_capacity,
            retry_interval: Duration::from_millis(args.retry_interval_ms),
        },
        receiver: ReceiverConfig {
            health_interval: Duration::from_millis(args.health_interval_ms),
        },
    })
}

fn source_target(args: &Args) -> RelayResult<BrokerTarget> {
    match (&args.source_queue, &args.source_exchange) {
        (Some(queue), None) => Ok(BrokerTarget::queue(queue, queue_options(args.durable))),
        (None, Some(exchange)) => {
            let kind: ExchangeKind = args.source_exchange_kind.parse()?;
            Ok(BrokerTarget::exchange(
                exchange,
                kind,
                exchange_options(args.durable),
                args.routing_keys.clone(),
            ))
        }
        _ => Err(RelayError::Config(
            "exactly one of --source-queue or --source-exchange is required".into(),
        )),
    }
}

fn destination_target(args: &Args) -> RelayResult<BrokerTarget> {
    match (&args.dest_queue, &args.dest_exchange) {
        (Some(queue), None) => Ok(BrokerTarget::queue(queue, queue_options(args.durable))),
        (None, Some(exchange)) => {
            let kind: ExchangeKind = args.dest_exchange_kind.parse()?;
            let routing_keys = args.dest_routing_key.clone().into_iter().collect();
            Ok(BrokerTarget::exchange(
                exchange,
                kind,
                exchange_options(args.durable),
                routing_keys,
            ))
        }
        _ => Err(RelayError::Config(
            "exactly one of --dest-queue or --dest-exchange is required".into(),
        )),
    }
}

fn queue_options(durable: bool) -> QueueOptions {
    QueueOptions {
        durable,
        ..QueueOptions::default()
    }
}

fn exchange_options(durable: bool) -> ExchangeOptions {
    ExchangeOptions {
        durable,
        ..ExchangeOptions::default()
    }
}
