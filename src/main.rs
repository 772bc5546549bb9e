mod cli;

use anyhow::Result;
use clap::Parser;

use gibsi_client::{
    api::ApiClient,
    config::Settings,
    session::{Session, SessionConfig},
    store::{select_backend, TokenStore},
};

use crate::cli::Cli;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let mut settings = Settings::load()?;
    cli.apply(&mut settings)?;

    // Bridge storage lives in memory; keep its handle to hand the string back.
    let (backend, bridge) = select_backend(&settings)?;
    let tokens = TokenStore::new(backend);

    log::info!(
        "app.start api_url={} storage={} idle_timeout_secs={} token_refresh_secs={}",
        settings.api_url,
        tokens.backend_kind(),
        settings.idle_timeout_secs,
        settings.token_refresh_secs
    );

    let client = ApiClient::new(&settings.api_url, settings.request_timeout(), tokens)?;
    let session = Session::new(client, SessionConfig::from_settings(&settings));
    session.mount().await;

    let result = cli::run(cli.command, &session, &settings).await;

    if let Some(bridge) = bridge {
        let snapshot = bridge.snapshot();
        if settings.bridge_string.as_deref().unwrap_or("") != snapshot {
            println!("GIBSI_BRIDGE_STRING={}", snapshot);
        }
    }

    if let Err(e) = result {
        cli::report(&e);
        std::process::exit(1);
    }
    Ok(())
}
