//! Service bootstrap
//!
//! Command-line arguments, logging setup and component assembly. `main`
//! only sequences these steps.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use super::access::{AccessSettings, RegisterAccess};
use super::config::{AppConfig, PlcConfig};
use super::dispatch::{command_channel, CommandDispatcher, CommandMap, PulseWriter};
use super::poller::Poller;
use super::servo::ServoBridge;
use super::store::StateStore;
use super::transport::{Connector, McConnector, SimulatedPlc};
use crate::api::AppState;
use crate::error::Result;

/// Command-line arguments for plcbridge
#[derive(Parser, Debug, Clone)]
#[command(
    name = "plcbridge",
    version = env!("CARGO_PKG_VERSION"),
    about = "Supervisory bridge between a web dashboard and a MELSEC PLC",
    long_about = None
)]
pub struct Args {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(short = 'c', long, env = "PLCBRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short = 'l', long)]
    pub log_level: Option<String>,

    /// Bind address for API server (host:port)
    #[arg(short = 'b', long)]
    pub bind_address: Option<String>,

    /// Validation mode - only validate configuration without starting service
    #[arg(long)]
    pub validate: bool,
}

/// Logger settings from the config file, with the CLI level taking priority
pub fn log_config(config: &AppConfig, args: &Args) -> common::logging::LogConfig {
    let logging = &config.service.logging;
    common::logging::LogConfig {
        service_name: config.service.name.clone(),
        log_dir: PathBuf::from(&logging.dir),
        level: args
            .log_level
            .clone()
            .unwrap_or_else(|| logging.level.clone()),
        enable_file: logging.file,
        enable_json: logging.json,
    }
}

/// CLI bind address if given, otherwise `host:port` from config
pub fn determine_bind_address(cli: Option<String>, host: &str, port: u16) -> String {
    cli.unwrap_or_else(|| format!("{}:{}", host, port))
}

/// Network connector, or the in-memory controller when simulating
pub fn connector_for(plc: &PlcConfig) -> Arc<dyn Connector> {
    if plc.simulate {
        warn!("plc.simulate is set: using the in-memory controller");
        Arc::new(SimulatedPlc::new())
    } else {
        Arc::new(McConnector::new(plc.timeout()))
    }
}

/// Every long-lived component, wired together but not yet running
pub struct Bridge {
    pub config: Arc<AppConfig>,
    pub access: Arc<RegisterAccess>,
    pub store: Arc<StateStore>,
    pub dispatcher: Arc<CommandDispatcher>,
    pub servo: Arc<ServoBridge>,
    pub writer: PulseWriter,
    pub poller: Poller,
}

impl Bridge {
    pub fn assemble(config: AppConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        let config = Arc::new(config);

        let access = Arc::new(RegisterAccess::new(
            connector,
            AccessSettings {
                host: config.plc.host.clone(),
                port: config.plc.port,
                cooldown: config.plc.cooldown(),
            },
        ));
        let store = Arc::new(StateStore::new(&config.stations));

        let (dispatcher, writer) = command_channel(
            CommandMap::from_config(&config),
            Arc::clone(&access),
            config.dispatch.dwell(),
            config.dispatch.queue_capacity,
        );

        let servo = Arc::new(ServoBridge::new(config.servo.clone()));
        servo.bind(Arc::clone(&access))?;

        let poller = Poller::new(
            Arc::clone(&access),
            Arc::clone(&store),
            &config.stations,
            config.polling.interval(),
        );

        info!(
            "Assembled bridge: {} stations, {} buttons, servo {}",
            config.stations.len(),
            config.buttons.len(),
            config.servo.id
        );

        Ok(Self {
            config,
            access,
            store,
            dispatcher: Arc::new(dispatcher),
            servo,
            writer,
            poller,
        })
    }

    /// Handles for the HTTP layer
    pub fn app_state(&self) -> AppState {
        AppState {
            config: Arc::clone(&self.config),
            access: Arc::clone(&self.access),
            store: Arc::clone(&self.store),
            dispatcher: Arc::clone(&self.dispatcher),
            servo: Arc::clone(&self.servo),
            started_at: chrono::Utc::now(),
        }
    }
}
