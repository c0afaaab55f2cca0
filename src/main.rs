//! Maubot operator - A Juju charm managing a Maubot workload.
//!
//! This is the entry point of the operator. The Juju agent runs it once per
//! hook or action, with `JUJU_DISPATCH_PATH` naming the event to handle.
//!
//! # Overview
//!
//! Maubot is a plugin-based Matrix bot framework. The operator keeps the Maubot
//! workload container configured from its integrations and exposes actions to
//! manage Maubot admins and register Matrix client accounts.
//!
//! # Features
//!
//! - **Reconciliation**: every lifecycle and relation hook rebuilds the Maubot
//!   configuration and the Pebble layer, then restarts the services
//! - **PostgreSQL Integration**: required, Maubot stays stopped without it
//! - **Matrix-auth Integration**: registers the related Synapse homeserver,
//!   matrix.org is used otherwise
//! - **Metrics**: publishes a blackbox probe scrape job to Prometheus
//! - **Actions**: `create-admin`, `delete-admin`, `reset-admin-password` and
//!   `register-client-account`
//!
//! # Operator Settings
//!
//! Where the Pebble socket and the Maubot API are can be changed with an optional
//! settings file passed with `--config`, or with `MAUBOT_OPERATOR_` prefixed
//! environment variables. See the [`config`] module.
//!
//! # Architecture
//!
//! - [`actions`] - Action handlers
//! - [`charm`] - Event routing and reporting to the Juju agent
//! - [`config`] - Operator settings
//! - [`event`] - Dispatch path parsing
//! - [`juju`] - Hook tools and unit status
//! - [`maubot`] - Maubot management API client
//! - [`reconciler`] - Workload reconciliation
//! - [`relations`] - Relation data resolvers and publishers
//! - [`utils`] - Password generation and naming helpers
//! - [`workload`] - Pebble client, layer and Maubot configuration file
//!
//! # Environment Variables
//!
//! - `JUJU_DISPATCH_PATH`, `JUJU_UNIT_NAME`, `JUJU_MODEL_NAME` - Set by the Juju agent
//! - `RUST_LOG` - Controls logging level (default: `info`)

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use log::{error, info};

use crate::{
    charm::Charm,
    config::Settings,
    event::Event,
    juju::{JujuContext, JujuHookTools},
    maubot::MaubotClient,
    workload::PebbleClient,
};

mod actions;
mod charm;
mod config;
mod event;
mod juju;
mod maubot;
mod reconciler;
mod relations;
mod utils;
mod workload;

/// Command-line arguments of the operator.
///
/// # Examples
///
/// ```bash
/// JUJU_DISPATCH_PATH=hooks/config-changed maubot-operator
/// maubot-operator --config /etc/maubot-operator.yaml --dispatch actions/create-admin
/// ```
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to an optional YAML settings file.
    #[arg(short, long)]
    config: Option<String>,

    /// Event to handle, `hooks/<name>` or `actions/<name>`.
    #[arg(short, long, env = "JUJU_DISPATCH_PATH")]
    dispatch: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Put logger at info level by default
    let env = Env::default().filter_or("RUST_LOG", "info");
    env_logger::init_from_env(env);

    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    info!("Starting maubot-operator {}...", env!("CARGO_PKG_VERSION"));

    let settings = Settings::load(args.config.as_deref()).context("failed to load settings")?;
    let event = Event::parse(&args.dispatch)?;
    let context = JujuContext::from_env()?;

    let juju = JujuHookTools::new();
    let pebble = PebbleClient::new(&settings.pebble.socket, settings.pebble.timeout());
    let maubot = MaubotClient::new(&settings.maubot.url, settings.maubot.timeout())?;

    Charm::new(&juju, &pebble, &maubot, &context, &settings)
        .handle(&event)
        .await
}
