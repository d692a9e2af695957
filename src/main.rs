use public_service_harvester::adapters::{
    HarvestAdminClient, HttpFetcher, LoggingPublisher, OrganizationsClient,
};
use public_service_harvester::harvest::{HarvestPipeline, Reconciler};
use public_service_harvester::store::InMemoryStore;
use public_service_harvester::telemetry::init_tracing;
use public_service_harvester::{HarvestAdminParameters, HarvesterConfig, HarvesterExecutor};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing()?;
    let config = HarvesterConfig::from_env()?;

    let client = reqwest::Client::builder()
        .timeout(config.fetch_timeout())
        .build()?;
    let store = Arc::new(InMemoryStore::new());

    let reconciler = Reconciler::new(store.clone(), config.harvester_uri.clone())
        .with_empty_source_is_error(config.empty_source_is_error);
    let pipeline = HarvestPipeline::new(Arc::new(HttpFetcher::new(client.clone())), reconciler)
        .with_organizations(Arc::new(OrganizationsClient::new(
            client.clone(),
            config.organizations_uri.clone(),
        )))
        .with_timeout(config.fetch_timeout());

    let registry = HarvestAdminClient::new(
        client,
        config.harvest_admin_root_url.clone(),
        config.harvest_admin_api_key.clone(),
    );
    let executor = HarvesterExecutor::new(
        Arc::new(registry),
        pipeline,
        store.clone(),
        Arc::new(LoggingPublisher),
        config.harvester_uri.clone(),
        config.max_concurrent_sources,
    );

    let reports = executor
        .run_cycle(&HarvestAdminParameters::default(), false)
        .await?;

    info!(
        sources = reports.len(),
        failed = reports.iter().filter(|r| r.harvest_error).count(),
        changed = reports.iter().filter(|r| r.has_changes()).count(),
        writes = store.write_count(),
        "Harvest finished"
    );
    Ok(())
}
