use std::sync::Arc;

use assay_service::AssayService;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<AssayService>,
}
impl AppState {
	/// Builds the service and, when `catalog.reload_on_start` is set and a catalog path is
	/// configured, loads the catalog before any listener binds.
	pub async fn new(config: assay_config::Config) -> color_eyre::Result<Self> {
		let reload_on_start = config.catalog.reload_on_start;
		let has_path = config.catalog.path.is_some();
		let service = AssayService::new(config)?;

		if reload_on_start && !has_path {
			tracing::warn!(
				"catalog.reload_on_start is set without catalog.path. No catalog is loaded on start."
			);
		} else if reload_on_start {
			let report = service.reload_catalog().await?;

			tracing::info!(
				items = report.item_count,
				fingerprint = %report.fingerprint,
				"Catalog loaded on start."
			);
		} else {
			tracing::warn!("Catalog not loaded on start. Recommendations fail until a reload.");
		}

		Ok(Self::from_service(service))
	}

	pub fn from_service(service: AssayService) -> Self {
		Self { service: Arc::new(service) }
	}
}
