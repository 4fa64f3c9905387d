use sunbiz_filer::{logging, App, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let config = match std::env::var("FILER_CONFIG") {
        Ok(path) => Config::from_file(path)?,
        Err(_) => Config::from_env(),
    };

    App::initialize(config).await?.run().await
}
