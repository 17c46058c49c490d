use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = assay_api::Args::parse();

	assay_api::run(args).await
}
