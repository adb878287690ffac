//! blobmesh: a horizontally-scaled, content-addressed file replication
//! cluster node.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use blobmesh::config::{Args, Config};
use blobmesh::storage::PgMetadataGateway;
use blobmesh::{LeaseManager, MetadataGateway, PeerClient, Supervisor};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let log_level = if args.debug {
        Level::DEBUG
    } else if args.silent {
        Level::ERROR
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("failed to set tracing subscriber");

    let config = match Config::try_from(args) {
        Ok(c) => c,
        Err(e) => {
            error!("invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> blobmesh::CoreResult<()> {
    info!("connecting to metadata store");
    let pg = PgMetadataGateway::connect(&config.database_url).await?;

    info!("provisioning node {}", config.name);
    let node = match pg.get_node_by_name(&config.name).await? {
        Some(node) => node,
        None => pg.create_node(&config.name).await?,
    };

    let gateway: Arc<dyn MetadataGateway> = Arc::new(pg);
    let lease = Arc::new(LeaseManager::new(node.id, gateway.clone()));

    info!("acquiring lease");
    lease.take().await?;

    gateway
        .update_node_advertise_addr(node.id, &config.advertise_addr)
        .await?;

    info!("opening blob store at {}", config.workdir.display());
    let blob_store = Arc::new(blobmesh::BlobStore::open(&config.workdir).await?);
    let peer_client = Arc::new(PeerClient::new());

    let supervisor = Supervisor::new(
        Arc::new(config),
        gateway,
        blob_store,
        lease,
        peer_client,
        node.id,
    );

    supervisor.run().await
}
