//! mxsync - declarative Matrix resource synchronizer.
//!
//! Converges homeserver resources to match operator manifests and prints
//! a JSON change report on stdout. Logs go to stderr.

use clap::Parser;
use mxsync::cli::{Cli, Command};
use mxsync::config::{
    AccountManifest, ConnectionConfig, GroupManifest, RoomManifest, SpaceManifest,
};
use mxsync::ident::IdentityResolver;
use mxsync::output;
use mxsync::resources::{
    send, AccountReconciler, GroupReconciler, ResourceClient, RoomReconciler, SpaceReconciler,
};
use mxsync_client::{HttpDirectory, RemoteDirectory};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Initialize tracing; stdout is reserved for the JSON report.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    let cli = Cli::parse();

    let config = ConnectionConfig::load(&cli.config).map_err(|e| {
        error!(path = %cli.config.display(), error = %e, "Failed to load config");
        e
    })?;
    let token = config.access_token()?;

    let directory: Arc<dyn RemoteDirectory> =
        Arc::new(HttpDirectory::new(&config.homeserver, token.as_str())?);
    let resolver = IdentityResolver::new(config.domain.clone());
    let acting = match &config.user {
        Some(user) => resolver.user_id(user),
        None => directory.whoami().await?,
    };
    info!(homeserver = %config.homeserver, acting = %acting, "connected");

    let client = ResourceClient::new(directory, resolver, acting);

    let result = match &cli.command {
        Command::Room { manifest } => {
            let manifest = RoomManifest::load(manifest)?;
            RoomReconciler::new(&client, &manifest.alias)
                .reconcile(&manifest, cli.check)
                .await
        }
        Command::Group { manifest } => {
            let manifest = GroupManifest::load(manifest)?;
            GroupReconciler::new(&client, &manifest.localpart)
                .reconcile(&manifest, cli.check)
                .await
        }
        Command::Space { manifest } => {
            let manifest = SpaceManifest::load(manifest)?;
            SpaceReconciler::new(&client, &manifest.localpart)
                .reconcile(&manifest, cli.check)
                .await
        }
        Command::User { manifest } => {
            let manifest = AccountManifest::load(manifest)?;
            AccountReconciler::new(&client, &manifest.login)
                .reconcile(&manifest, cli.check)
                .await
        }
        Command::Send {
            room,
            message,
            notice,
        } => send::send_text(&client, room, message, *notice, cli.check).await,
    };

    match result {
        Ok(outcome) => {
            println!("{}", output::render(&outcome, cli.pretty)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(failure) => {
            error!(error = %failure.error, msg = %failure.msg, "reconciliation failed");
            println!("{}", output::render(&failure, cli.pretty)?);
            Ok(ExitCode::FAILURE)
        }
    }
}
