use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use vdag_system::RemoteServices;
use vdag_system::api::dryrun_dto::ValidateGraphDto;
use vdag_system::collaborators::{TaskStore, VdagRegistry};
use vdag_system::collaborators::callback::CallbackTaskStore;
use vdag_system::config::{BlockSettings, Settings};
use vdag_system::domain::compiler::physical_graph::Destination;
use vdag_system::domain::processor::processor::{VdagProcessor, assignment_to_wire, end_to_end_dto};
use vdag_system::domain::processor::worker::{InputsListener, Submitter, TaskWorker};
use vdag_system::domain::utils::id::{BlockId, VdagUri};
use vdag_system::runtime::block::{BlockRuntime, EchoHandler};
use vdag_system::runtime::ingress::build_entry_packet;
use vdag_system::runtime::packet::Packet;
use vdag_system::runtime::policy::BlockPolicies;
use vdag_system::runtime::router::PacketRouter;
use vdag_system::server::state::AppState;
use vdag_system::transport::codec::write_packets;
use vdag_system::transport::connection_cache::ConnectionCache;
use vdag_system::transport::queue::{QueueClient, RedisConnector, RedisQueue};
use vdag_system::{load_vdag_file, logger, server};

#[derive(Parser, Debug)]
#[command(name = "vdag-system")]
#[command(about = "vDAG compiler, submission API and block packet router")]
struct Cli {
    /// JSON settings file; environment variables override it
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// HTTP API plus the background compile worker
    Serve,
    /// Compile worker only
    Worker,
    /// Block runtime for BLOCK_ID with an echo handler
    Block,
    /// Run a dry run on a vDAG file and print the result
    Dryrun {
        #[arg(value_enum)]
        mode: DryRunMode,
        file: String,
    },
    /// Start a session on an assigned vDAG by queueing its first packet
    Ingest {
        vdag_uri: String,
        session: String,
        data: String,
        /// Queue endpoint of the head block; defaults to the configured redis_url
        #[arg(long)]
        head_redis: Option<String>,
        #[arg(long, default_value = "localhost")]
        sink_host: String,
        #[arg(long, default_value_t = 6379)]
        sink_port: u16,
        #[arg(long, default_value = "OUTPUTS")]
        sink_queue: String,
    },
    /// Copy packets from a queue to stdout as length-delimited frames
    Sink {
        #[arg(long)]
        redis: Option<String>,
        #[arg(long, default_value = "OUTPUTS")]
        queue: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum DryRunMode {
    EndToEnd,
    Assignment,
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logger::init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;
    log::info!("Settings loaded, running '{:?}'.", cli.command);

    match cli.command {
        Command::Serve => serve(settings).await,
        Command::Worker => worker(settings).await,
        Command::Block => block(settings).await,
        Command::Dryrun { mode, file } => dry_run(settings, mode, &file).await,
        Command::Ingest { vdag_uri, session, data, head_redis, sink_host, sink_port, sink_queue } => {
            let sink = Destination::new(&sink_host, sink_port, &sink_queue);
            let head_redis = head_redis.unwrap_or_else(|| settings.redis_url.clone());
            ingest(settings, &vdag_uri, &session, &data, &head_redis, sink).await
        }
        Command::Sink { redis, queue } => {
            let redis = redis.unwrap_or_else(|| settings.redis_url.clone());
            sink(&redis, &queue).await
        }
    }
}

struct Pipeline {
    processor: Arc<VdagProcessor>,
    tasks: Arc<dyn TaskStore>,
    queue: Arc<dyn QueueClient>,
}

async fn pipeline(settings: &Settings) -> anyhow::Result<Pipeline> {
    let remote = RemoteServices::from_settings(settings)?;
    let queue: Arc<dyn QueueClient> =
        Arc::new(RedisQueue::connect(&settings.redis_url).await.context("failed to connect to the queue")?);
    let tasks: Arc<dyn TaskStore> =
        Arc::new(CallbackTaskStore::new(remote.tasks.clone(), queue.clone(), &settings.task_updates_queue));

    Ok(Pipeline { processor: Arc::new(remote.processor()), tasks, queue })
}

fn spawn_worker(settings: &Settings, pipeline: &Pipeline) -> tokio::task::JoinHandle<()> {
    let (sender, receiver) = mpsc::channel(64);
    let listener = InputsListener::new(pipeline.queue.clone(), &settings.inputs_queue, sender);
    let worker = TaskWorker::new(pipeline.processor.clone(), pipeline.tasks.clone());

    tokio::spawn(listener.run());
    tokio::spawn(worker.run(receiver))
}

async fn serve(settings: Settings) -> anyhow::Result<()> {
    let pipeline = pipeline(&settings).await?;
    let _worker = spawn_worker(&settings, &pipeline);

    let state = AppState {
        processor: pipeline.processor.clone(),
        submitter: Arc::new(Submitter::new(pipeline.tasks.clone(), pipeline.queue.clone(), &settings.inputs_queue)),
    };
    server::serve(&settings.api_bind, state).await?;
    Ok(())
}

async fn worker(settings: Settings) -> anyhow::Result<()> {
    let pipeline = pipeline(&settings).await?;
    spawn_worker(&settings, &pipeline).await?;
    Ok(())
}

async fn block(settings: Settings) -> anyhow::Result<()> {
    let block_settings = BlockSettings::from_env(&settings)?;
    let block_id = BlockId::new(block_settings.block_id.as_str());
    let remote = RemoteServices::from_settings(&settings)?;

    let own_queue: Arc<dyn QueueClient> = Arc::new(
        RedisQueue::connect(&block_settings.redis_url).await.context("failed to connect to the block queue")?,
    );
    let connections = Arc::new(ConnectionCache::new(
        Arc::new(RedisConnector),
        settings.connection_cache_capacity,
        settings.connection_cache_ttl(),
    ));
    let policies = Arc::new(BlockPolicies::new(
        block_id.clone(),
        remote.registry.clone(),
        remote.policies.clone(),
        settings.policy_cache_capacity,
        settings.policy_cache_ttl(),
    ));
    let router = PacketRouter::new(block_id.clone(), own_queue.clone(), connections);

    let runtime = BlockRuntime::new(block_id, own_queue, Arc::new(EchoHandler), policies, router);
    tokio::select! {
        _ = runtime.run() => {}
        _ = tokio::signal::ctrl_c() => log::info!("Shutting down block runtime."),
    }
    Ok(())
}

async fn dry_run(settings: Settings, mode: DryRunMode, file: &str) -> anyhow::Result<()> {
    let vdag = load_vdag_file(file).with_context(|| format!("failed to read vDAG file '{}'", file))?;
    let processor = RemoteServices::from_settings(&settings)?.processor();

    let result = match mode {
        DryRunMode::Assignment => serde_json::to_value(assignment_to_wire(&processor.dry_run_assignment(&vdag).await?))?,
        DryRunMode::EndToEnd => {
            let (assignment, compiled) = processor.dry_run_end_to_end(&vdag).await?;
            serde_json::to_value(end_to_end_dto(&assignment, &compiled))?
        }
        DryRunMode::Validate => serde_json::to_value(ValidateGraphDto::from(&processor.validate_graph(&vdag).await?))?,
    };

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn ingest(
    settings: Settings,
    uri: &str,
    session: &str,
    data: &str,
    head_redis: &str,
    sink: Destination,
) -> anyhow::Result<()> {
    let uri = VdagUri::new(uri);
    let remote = RemoteServices::from_settings(&settings)?;

    let vdag = remote.registry.get_vdag(&uri).await?.with_context(|| format!("vDAG {} does not exist", uri))?;
    let compiled = vdag.compiled_graph.with_context(|| format!("vDAG {} has status {} and no compiled graph", uri, vdag.status))?;

    let entry = build_entry_packet(&compiled, &uri, session, data, vec![sink]);
    let queue = RedisQueue::connect(head_redis).await.context("failed to connect to the head block queue")?;
    queue.push(&entry.queue_name, entry.packet.encode()?).await?;

    log::info!("Session {} of vDAG {} queued on '{}' (head {}).", session, uri, entry.queue_name, entry.head);
    Ok(())
}

async fn sink(redis_url: &str, queue_name: &str) -> anyhow::Result<()> {
    let queue = RedisQueue::connect(redis_url).await.context("failed to connect to the sink queue")?;
    let mut stdout = tokio::io::stdout();
    log::info!("Copying packets from '{}' to stdout.", queue_name);

    loop {
        let payload = tokio::select! {
            popped = queue.pop(queue_name, Duration::from_secs(5)) => popped?,
            _ = tokio::signal::ctrl_c() => return Ok(()),
        };
        if let Some(payload) = payload {
            match Packet::decode(&payload) {
                Ok(packet) => write_packets(&mut stdout, [packet]).await?,
                Err(e) => log::warn!("Skipping undecodable payload on '{}': {}", queue_name, e),
            }
        }
    }
}
