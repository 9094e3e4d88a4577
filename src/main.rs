use agrisync::config::SyncConfig;
use agrisync::device::DeviceChannel;
use agrisync::reconcile::ConfigEdit;
use agrisync::topology::TopologyCoordinator;
use agrisync::transport::{MqttTransport, Transport};
use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Fetch, edit and re-parent agricultural sensor devices over MQTT.
#[derive(Parser, Debug)]
#[command(name = "agrisync")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Configuration file, defaults to $XDG_CONFIG_HOME/agrisync/config.toml
    #[arg(short, long, global = true, env = "AGRISYNC_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a device's configuration.
    Fetch {
        device: String,
        /// Ask this master on behalf of its slave
        #[arg(long)]
        via: Option<String>,
    },
    /// Attach and detach slaves of a master.
    Apply {
        master: String,
        #[arg(long, value_delimiter = ',')]
        add: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        remove: Vec<String>,
    },
    /// Apply settings such as `soil.lower_enabled=true` or `pwm=on` and push them.
    Edit {
        device: String,
        #[arg(required = true)]
        edits: Vec<ConfigEdit>,
    },
    /// Stream raw readings from a device's data topic until Ctrl-C.
    Watch { device: String },
    /// Write a default configuration file if none exists.
    InitConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;
    let args = Args::parse();

    let path = match args.config {
        Some(path) => path,
        None => SyncConfig::default_path()?,
    };

    if let Command::InitConfig = args.command {
        SyncConfig::ensure_default(&path).await?;
        println!("{}", path.display());
        return Ok(());
    }

    let config = SyncConfig::load_or_default(&path).await?;
    let transport = Arc::new(MqttTransport::new(config.broker.clone()));
    transport.connect().await?;

    let channel = Arc::new(DeviceChannel::new(
        transport.clone(),
        config.correlation.clone(),
    ));
    let outcome = run(args.command, channel).await;

    transport.disconnect().await;
    outcome
}

async fn run(command: Command, channel: Arc<DeviceChannel>) -> Result<()> {
    match command {
        Command::Fetch { device, via } => {
            let config = match via {
                Some(master) => channel.fetch_slave_config(&master, &device).await?,
                None => channel.fetch_config(&device).await?,
            };
            print!("{}", toml::to_string_pretty(&config)?);
        }
        Command::Apply {
            master,
            add,
            remove,
        } => {
            let coordinator = TopologyCoordinator::new(channel);
            let report = coordinator
                .apply_topology_change(&master, add, remove)
                .await?;
            print!("{}", report);
            if !report.is_success() {
                return Err(eyre!("topology of {} was not saved", master));
            }
        }
        Command::Edit { device, edits } => {
            let pushed = channel.apply_edits(&device, &edits).await?;
            print!("{}", toml::to_string_pretty(&pushed)?);
        }
        Command::Watch { device } => {
            let mut readings = channel.watch_data(&device).await?;
            info!("Watching {}, press Ctrl-C to stop", device);
            loop {
                tokio::select! {
                    reading = readings.recv() => match reading {
                        Some(payload) => println!("{}", payload),
                        None => break,
                    },
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            channel.unwatch_data(&device).await?;
        }
        Command::InitConfig => {}
    }
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .init();
}
