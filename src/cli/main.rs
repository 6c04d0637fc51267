use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use mq_replay::{
    catalog::{get_topic, get_topics_list, key_value_source},
    config::Config,
    context::ProcessContext,
    messaging::{get_client, KafkaAdapter, Message, MessageCategory, Provider},
    replay::ReplayStore,
    telemetry::init_tracing,
    AppError,
};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "mq-replay-cli")]
#[command(about = "Publish to and inspect the mq-replay message store", long_about = None)]
#[command(version)]
struct Cli {
    /// Provider to use instead of the configured one
    #[arg(short, long, global = true, env = "MQ_PROVIDER")]
    provider: Option<Provider>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish a message
    Publish {
        #[arg(short, long)]
        topic: String,

        #[arg(short, long)]
        flow_id: String,

        #[arg(short, long)]
        action: String,

        #[arg(short, long, default_value = "business_event")]
        category: MessageCategory,

        #[arg(long, default_value = "cli")]
        connection_id: String,

        /// JSON body
        #[arg(short, long, default_value = "{}")]
        body: String,
    },

    /// Print the stored messages of one flow
    Messages {
        #[arg(short, long)]
        topic: String,

        #[arg(short, long)]
        flow_id: String,
    },

    /// List the flow ids stored for a topic
    Flows {
        #[arg(short, long)]
        topic: String,
    },

    /// Resolve every catalog topic
    Topics,

    /// Resolve one catalog topic
    Topic {
        #[arg(value_name = "NAME")]
        name: String,
    },

    /// Create Kafka topics (catalog topics when none are given)
    CreateTopics {
        #[arg(value_name = "TOPIC")]
        topics: Vec<String>,
    },

    /// List the topics the Kafka cluster knows with their partition counts
    ListTopics,

    /// Wait for the next message on a topic
    LastMessage {
        #[arg(short, long)]
        topic: String,

        /// Give up after this many seconds
        #[arg(long, default_value = "30")]
        timeout_secs: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load().context("Failed to load configuration")?;
    init_tracing(&config.observability);

    if let Some(provider) = cli.provider {
        config.messaging.provider = provider;
    }
    let provider = config.messaging.provider;
    let ctx = ProcessContext::from_config(&config.service)?;

    match cli.command {
        Commands::Publish {
            topic,
            flow_id,
            action,
            category,
            connection_id,
            body,
        } => {
            let body: serde_json::Value =
                serde_json::from_str(&body).context("--body must be valid JSON")?;
            let message = Message::new(ctx.header(category, action, connection_id, flow_id))
                .with_origin(ctx.service_name(), None)
                .with_body(body);

            let client = get_client(config.messaging.options(), ctx.clone()).await?;
            client.publish(&topic, &message).await?;
            client.close().await?;
            println!("{}", serde_json::to_string_pretty(&message)?);
        }

        Commands::Messages { topic, flow_id } => {
            ensure_recorded(&config, provider)?;
            let store = ReplayStore::new(&config.storage.root);
            let messages = store.messages(&topic, &flow_id, provider).await?;
            println!("{}", serde_json::to_string_pretty(&messages)?);
        }

        Commands::Flows { topic } => {
            ensure_recorded(&config, provider)?;
            let store = ReplayStore::new(&config.storage.root);
            for flow in store.flows(provider, &topic).await? {
                println!("{}", flow);
            }
        }

        Commands::Topics => {
            let kv = key_value_source(&config.consul)?;
            for topic in get_topics_list(&config.storage.catalog_path, kv.as_ref()).await {
                println!("{}", topic);
            }
        }

        Commands::Topic { name } => {
            let kv = key_value_source(&config.consul)?;
            match get_topic(&config.storage.catalog_path, &name, kv.as_ref()).await {
                Some(topic) => println!("{}", topic),
                None => bail!("Topic '{}' is not in the catalog", name),
            }
        }

        Commands::CreateTopics { mut topics } => {
            if topics.is_empty() {
                let kv = key_value_source(&config.consul)?;
                topics = get_topics_list(&config.storage.catalog_path, kv.as_ref()).await;
            }
            let client = get_client(config.messaging.options_for(Provider::Kafka), ctx.clone()).await?;
            client.ensure_topics(topics.clone()).await?;
            client.close().await?;
            println!("Ensured {} topics", topics.len());
        }

        Commands::ListTopics => {
            let adapter = KafkaAdapter::new(config.messaging.kafka.clone(), ctx.clone())?;
            for (topic, partitions) in adapter.list_topics().await? {
                println!("{}\t{}", topic, partitions);
            }
        }

        Commands::LastMessage {
            topic,
            timeout_secs,
        } => {
            let client = get_client(config.messaging.options(), ctx.clone()).await?;
            let waited = tokio::time::timeout(
                Duration::from_secs(timeout_secs),
                client.last_message(&topic),
            )
            .await;
            client.close().await?;

            let delivery = waited.map_err(|_| {
                AppError::Timeout(format!("no message on '{}' within {}s", topic, timeout_secs))
            })??;
            println!("{}", delivery.payload_str());
        }
    }

    Ok(())
}

fn ensure_recorded(config: &Config, provider: Provider) -> anyhow::Result<()> {
    if !config.storage.providers.includes(provider) {
        bail!(
            "Provider {} is not recorded (storage.providers = {})",
            provider,
            config.storage.providers
        );
    }
    Ok(())
}
