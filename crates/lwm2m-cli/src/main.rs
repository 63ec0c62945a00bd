//! Device-side LWM2M client binary.
//!
//! Parses CLI flags into a [`ClientConfig`], wires a [`UdpDriver`] and
//! [`RealEnv`] to the orchestration layer, and drives [`Runtime::process_cycle`]
//! in a loop. All protocol and lifecycle behavior lives in `lwm2m-core`/
//! `lwm2m-client`/`lwm2m-app`; this binary only supplies I/O and a thin
//! `client print`/`client status` introspection surface.

mod clock;
mod udp_driver;

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};
use clock::RealEnv;
use lwm2m_app::{ClientConfig, LogLevel, OperationalServer, Runtime};
use lwm2m_client::{
    LifecycleConfig, Lwm2mClient,
    objects::{DeviceObject, ResourceValue, device::resource as device_resource},
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use udp_driver::UdpDriver;

#[derive(Parser, Debug)]
#[command(name = "lwm2m-cli")]
#[command(about = "Constrained-device LWM2M management client")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the registration/update/deregister lifecycle against the
    /// configured server(s) until interrupted.
    Run(RunArgs),
    /// Inspect the client's configuration without opening a socket.
    Client {
        #[command(subcommand)]
        action: ClientAction,
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Subcommand, Debug)]
enum ClientAction {
    /// Print the device identity and the configured object model.
    Print,
    /// Print the configured server list and lifecycle tuning.
    Status,
}

/// Flags shared by `run` and `client print`/`client status`: device
/// identity and server configuration, independent of transport.
#[derive(ClapArgs, Debug)]
struct CommonArgs {
    /// Bootstrap server URI, e.g. `coaps://bootstrap.example:5684`.
    #[arg(long)]
    bootstrap_uri: Option<String>,

    /// A preconfigured operational server, as `uri,short_server_id`.
    /// Repeatable.
    #[arg(long = "server", value_parser = parse_operational_server)]
    servers: Vec<OperationalServer>,

    /// Overrides the endpoint name this device registers under.
    #[arg(long)]
    endpoint_name: Option<String>,

    /// Device object identity: manufacturer.
    #[arg(long, default_value = "Generic Manufacturer")]
    manufacturer: String,

    /// Device object identity: model number.
    #[arg(long, default_value = "Generic Model")]
    model_number: String,

    /// Device object identity: serial number.
    #[arg(long, default_value = "0000")]
    serial_number: String,

    /// Device object identity: firmware version.
    #[arg(long, default_value = "0.1.0")]
    firmware_version: String,

    /// Log verbosity, overridden by `RUST_LOG` if set.
    #[arg(long, default_value = "info")]
    log_level: CliLogLevel,
}

#[derive(ClapArgs, Debug)]
struct RunArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Local UDP address to bind, e.g. `0.0.0.0:0` for an ephemeral port.
    #[arg(long, default_value = "0.0.0.0:0")]
    bind: String,

    /// Directory holding persisted KV records, one file per key.
    #[arg(long, default_value = "./lwm2m-state")]
    kv_dir: PathBuf,

    /// How often to poll for datagrams and drive timers, in milliseconds.
    #[arg(long, default_value_t = 200)]
    tick_millis: u64,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for LogLevel {
    fn from(level: CliLogLevel) -> Self {
        match level {
            CliLogLevel::Error => Self::Error,
            CliLogLevel::Warn => Self::Warn,
            CliLogLevel::Info => Self::Info,
            CliLogLevel::Debug => Self::Debug,
            CliLogLevel::Trace => Self::Trace,
        }
    }
}

fn parse_operational_server(raw: &str) -> Result<OperationalServer, String> {
    let (uri, ssid) = raw
        .rsplit_once(',')
        .ok_or_else(|| format!("expected 'uri,short_server_id', got '{raw}'"))?;
    let short_server_id = ssid.parse().map_err(|_| format!("invalid short_server_id in '{raw}'"))?;
    Ok(OperationalServer { uri: uri.to_string(), short_server_id })
}

fn install_tracing(log_level: LogLevel) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.as_filter()));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();
}

fn device_from_args(common: &CommonArgs) -> DeviceObject {
    DeviceObject::new(
        common.manufacturer.clone(),
        common.model_number.clone(),
        common.serial_number.clone(),
        common.firmware_version.clone(),
    )
}

fn config_from_args(common: &CommonArgs) -> ClientConfig {
    ClientConfig {
        bootstrap_uri: common.bootstrap_uri.clone(),
        operational_servers: common.servers.clone(),
        endpoint_name_override: common.endpoint_name.clone(),
        log_level: common.log_level.into(),
        lifecycle: LifecycleConfig::default(),
        coap_con_interval_secs: 86400,
    }
}

fn read_string_resource(device: &DeviceObject, resource_id: u16) -> String {
    match device.read(resource_id, 0, 0) {
        Ok(ResourceValue::String(value)) => value,
        _ => String::new(),
    }
}

async fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    install_tracing(args.common.log_level.into());
    tracing::info!("lwm2m-cli starting");

    let config = config_from_args(&args.common);
    let endpoint_name = config
        .endpoint_name_override
        .clone()
        .unwrap_or_else(|| format!("urn:dev:{}", args.common.serial_number));

    let driver = UdpDriver::bind(args.bind.as_str(), endpoint_name, args.kv_dir.clone()).await?;
    let client = Lwm2mClient::new(device_from_args(&args.common));
    let mut runtime = Runtime::new(driver, RealEnv, client, &config);

    let mut interval = tokio::time::interval(tokio::time::Duration::from_millis(args.tick_millis));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = runtime.process_cycle().await {
                    tracing::warn!(error = %e, "process cycle failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown requested");
                break;
            }
        }
    }
    Ok(())
}

fn client_print(common: &CommonArgs) {
    install_tracing(common.log_level.into());
    let device = device_from_args(common);
    tracing::info!(
        manufacturer = %read_string_resource(&device, device_resource::MANUFACTURER),
        model_number = %read_string_resource(&device, device_resource::MODEL_NUMBER),
        serial_number = %read_string_resource(&device, device_resource::SERIAL_NUMBER),
        firmware_version = %read_string_resource(&device, device_resource::FIRMWARE_VERSION),
        "device identity"
    );
    tracing::info!("object model: security, server, access-control, device, connectivity, firmware");
}

fn client_status(common: &CommonArgs, config: &ClientConfig) {
    install_tracing(common.log_level.into());
    tracing::info!(
        bootstrap_uri = ?config.bootstrap_uri,
        operational_servers = config.operational_servers.len(),
        "configured servers"
    );
    for server in &config.operational_servers {
        tracing::info!(uri = %server.uri, short_server_id = server.short_server_id, "operational server");
    }
    tracing::info!(
        hold_off = ?config.lifecycle.hold_off,
        lifetime = ?config.lifecycle.lifetime,
        bootstrap_wait = ?config.lifecycle.bootstrap_wait,
        "lifecycle tuning"
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run(args).await,
        Command::Client { action, common } => {
            let config = config_from_args(&common);
            match action {
                ClientAction::Print => client_print(&common),
                ClientAction::Status => client_status(&common, &config),
            }
            Ok(())
        },
    }
}
