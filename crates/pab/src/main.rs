use std::sync::Arc;

use pab_airtable::AirtableStore;
use pab_core::{config::Config, ports::CandidateStore};

#[tokio::main]
async fn main() -> Result<(), pab_core::Error> {
    pab_core::logging::init("pab")?;

    let cfg = Arc::new(Config::load()?);
    tracing::info!(
        base = %cfg.airtable.base_id,
        table = %cfg.airtable.table_name,
        view = %cfg.airtable.view,
        "starting post approver"
    );

    let store: Arc<dyn CandidateStore> = Arc::new(AirtableStore::new(cfg.airtable.clone())?);

    pab_telegram::router::run_polling(cfg, store)
        .await
        .map_err(|e| pab_core::Error::External(format!("telegram bot failed: {e:#}")))?;

    Ok(())
}
