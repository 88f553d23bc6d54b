use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use amcp::color::ColorScheme;
use amcp::config::{ParamLayers, RunConfig, SendFailurePolicy, DEFAULT_LAYOUT};
use amcp::control::{control_channel, install_signal_handlers};
use amcp::controller::{ControllerOptions, LightController};
use amcp::errors::{classify, envelope, ConfigError, FailureKind};
use amcp::frame_clock::{FrameClock, ManualTimeSource};
use amcp::logging::init_logging;
use amcp::model::Model;
use amcp::opc::{NullSink, OpcClient, PixelSink};
use amcp::params::ParamOverride;
use amcp::renderer::NoiseRenderer;

const GIT_HASH: Option<&str> = option_env!("AMCP_GIT_HASH");

#[derive(Debug, Parser)]
#[command(name = "amcp")]
#[command(about = "Cloud lighting server: renders the sculpture and streams it over OPC")]
#[command(version)]
struct Cli {
    /// Print errors as a JSON envelope on stdout.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the render loop until interrupted.
    Run(RunArgs),
    /// Load a layout file and report its size and bounds.
    Check {
        #[arg(long, default_value = DEFAULT_LAYOUT)]
        layout: PathBuf,
    },
    /// Render frames offline, without a server, and report frames per second.
    Bench {
        /// Layout to render; defaults to 2560 points at (1, 2, 3).
        #[arg(long)]
        layout: Option<PathBuf>,
        #[arg(long, default_value_t = 100)]
        frames: u32,
    },
}

#[derive(Debug, Args)]
struct RunArgs {
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    layout: Option<PathBuf>,
    /// OPC server as host:port (default: $OPC_SERVER or 127.0.0.1:7890).
    #[arg(long)]
    server: Option<String>,
    #[arg(long)]
    fps: Option<u32>,
    #[arg(long)]
    max_lightning: Option<usize>,
    #[arg(long)]
    show_fps: bool,
    #[arg(long)]
    channel: Option<u8>,
    #[arg(long, value_enum)]
    on_send_error: Option<SendFailurePolicy>,
    #[arg(long, value_enum)]
    color_scheme: Option<ColorScheme>,
    #[arg(long)]
    seed: Option<u64>,
    /// YAML parameters file, re-applied whenever it changes.
    #[arg(long)]
    params_file: Option<PathBuf>,
    /// Override one parameter, e.g. --set lightning_new=0.2
    #[arg(long = "set", value_name = "NAME=VALUE")]
    set: Vec<String>,
    /// Also write logs to a daily-rolling file in this directory.
    #[arg(long)]
    log_file: Option<PathBuf>,
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let json = cli.json;

    let result = match cli.command {
        Commands::Run(args) => run_server(args),
        Commands::Check { layout } => run_check(&layout, json),
        Commands::Bench { layout, frames } => run_bench(layout.as_deref(), frames),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            if json {
                match serde_json::to_string_pretty(&envelope(&error)) {
                    Ok(rendered) => println!("{rendered}"),
                    Err(_) => eprintln!("error: {error:#}"),
                }
            } else {
                eprintln!("error: {error:#}");
            }
            exit_code(classify(&error))
        }
    }
}

fn exit_code(kind: FailureKind) -> ExitCode {
    match kind {
        FailureKind::Render => ExitCode::from(1),
        FailureKind::Config => ExitCode::from(2),
        FailureKind::Transport => ExitCode::from(3),
    }
}

fn build_config(args: &RunArgs) -> Result<(RunConfig, ParamLayers)> {
    let mut config = match &args.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };

    if let Some(layout) = &args.layout {
        config.layout = layout.clone();
    }
    if let Some(server) = &args.server {
        config.server = Some(server.clone());
    }
    if let Some(fps) = args.fps {
        config.target_fps = fps;
    }
    if let Some(max_lightning) = args.max_lightning {
        config.max_lightning = max_lightning;
    }
    if args.show_fps {
        config.show_fps = true;
    }
    if let Some(channel) = args.channel {
        config.channel = channel;
    }
    if let Some(policy) = args.on_send_error {
        config.on_send_error = policy;
    }
    if let Some(scheme) = args.color_scheme {
        config.color_scheme = scheme;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if let Some(params_file) = &args.params_file {
        config.params_file = Some(params_file.clone());
    }

    config.validate()?;

    let overrides = args
        .set
        .iter()
        .map(|raw| ParamOverride::parse(raw))
        .collect::<Result<Vec<_>>>()?;
    let layers = config.param_layers(overrides);
    config.params = layers.resolve(config.params_file.as_deref())?;
    Ok((config, layers))
}

fn run_server(args: RunArgs) -> Result<()> {
    let _logging = init_logging(args.verbose, args.log_file.as_deref())
        .context(ConfigError("failed to initialize logging".to_owned()))?;
    tracing::info!(
        action = "startup",
        version = env!("CARGO_PKG_VERSION"),
        git = GIT_HASH.unwrap_or("unknown")
    );

    #[cfg_attr(not(feature = "watch"), allow(unused_variables))]
    let (config, layers) =
        build_config(&args).context(ConfigError("invalid configuration".to_owned()))?;
    let model = Model::load(&config.layout)
        .context(ConfigError("failed to load layout".to_owned()))?;
    tracing::info!(
        action = "load_layout",
        path = %config.layout.display(),
        points = model.len()
    );

    let (handle, inbox) = control_channel();
    install_signal_handlers(&handle)
        .context(ConfigError("failed to install signal handlers".to_owned()))?;

    #[cfg(feature = "watch")]
    let _watcher = match &config.params_file {
        Some(path) => Some(
            amcp::watch::watch_params_file(path, layers, handle.clone())
                .context(ConfigError("failed to watch params file".to_owned()))?,
        ),
        None => None,
    };

    let server = config.resolved_server();
    if config.on_send_error == SendFailurePolicy::FailFast {
        config
            .check_server_resolves()
            .context(ConfigError("invalid configuration".to_owned()))?;
    }
    let sink: Box<dyn PixelSink> = match OpcClient::connect(server.as_str()) {
        Ok(client) => Box::new(client),
        Err(error) if config.on_send_error == SendFailurePolicy::Reconnect => {
            tracing::warn!(action = "opc_connect", %error, "starting disconnected");
            Box::new(OpcClient::disconnected(server.as_str()))
        }
        Err(error) => return Err(error.into()),
    };

    let mut controller = LightController::new(
        model,
        ControllerOptions::from_config(&config),
        Box::new(NoiseRenderer::new()),
        sink,
        inbox,
    );
    controller.run()
}

#[derive(Debug, Serialize)]
struct CheckReport {
    ok: bool,
    layout: String,
    points: usize,
    min: [f32; 3],
    max: [f32; 3],
}

fn run_check(layout: &Path, json: bool) -> Result<()> {
    let model = Model::load(layout).context(ConfigError("failed to load layout".to_owned()))?;
    let bounds = model.bounds();
    let report = CheckReport {
        ok: true,
        layout: layout.display().to_string(),
        points: model.len(),
        min: bounds.min,
        max: bounds.max,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "OK: {} ({} points, min {:?}, max {:?})",
            report.layout, report.points, report.min, report.max
        );
    }
    Ok(())
}

fn run_bench(layout: Option<&Path>, frames: u32) -> Result<()> {
    let model = match layout {
        Some(path) => {
            Model::load(path).context(ConfigError("failed to load layout".to_owned()))?
        }
        None => Model::from_points(vec![[1.0, 2.0, 3.0]; 40 * 64])?,
    };
    let options = ControllerOptions {
        seed: Some(0),
        ..ControllerOptions::default()
    };
    let dt = 1.0 / f64::from(options.target_fps);
    let clock = FrameClock::with_source(ManualTimeSource::default(), options.target_fps, false);
    let (_handle, inbox) = control_channel();
    let mut controller = LightController::with_clock(
        model,
        options,
        clock,
        Box::new(NoiseRenderer::new()),
        Box::new(NullSink::new()),
        inbox,
    );
    let bounds = controller.model().bounds();
    let center = [0, 1, 2].map(|axis| (bounds.min[axis] + bounds.max[axis]) * 0.5);
    for _ in 0..controller.lightning().max_lightning() {
        controller
            .lightning_mut()
            .make_lightning_bolt(center[0], center[1], center[2]);
    }

    let started = Instant::now();
    for _ in 0..frames {
        controller.draw_frame(dt)?;
    }
    let elapsed = started.elapsed().as_secs_f64();
    println!(
        "{:.2} fps ({} frames, {} points)",
        f64::from(frames) / elapsed.max(f64::EPSILON),
        frames,
        controller.model().len()
    );
    Ok(())
}
