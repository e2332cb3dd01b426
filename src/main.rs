use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use kaiser_pad_lib::config::Settings;
use kaiser_pad_lib::gamepad::{self, XboxButton};
use kaiser_pad_lib::input::{LogicalInput, VisualChange};
use kaiser_pad_lib::serial::{PortEnumerator, SystemPortOpener};
use kaiser_pad_lib::AppContext;

#[derive(Parser, Debug)]
#[command(name = "kaiser-pad", version, about = "Bridge a serial button controller to a virtual Xbox 360 pad")]
struct Cli {
    /// Settings file (JSON)
    #[arg(long, default_value = "kaiser_pad_settings.json")]
    config: PathBuf,

    /// Mapping file, overrides the settings value
    #[arg(long)]
    mapping: Option<PathBuf>,

    /// Port to open at startup
    #[arg(long)]
    port: Option<String>,

    /// Log filter, e.g. "info" or "kaiser_pad_lib=debug"
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List serial ports and exit
    ListPorts,
    /// List assignable gamepad buttons and exit
    ListButtons,
    /// Run the bridge with an interactive console (default)
    Run,
}

fn init_logging(filter: Option<&str>) {
    let filter = match filter {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    // Also bridges the `log` macros used by the library
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    match cli.command.take().unwrap_or(Command::Run) {
        Command::ListPorts => {
            let ports = PortEnumerator::list_detailed();
            if ports.is_empty() {
                println!("No Ports Found");
            }
            for port in ports {
                match (port.vid, port.pid) {
                    (Some(vid), Some(pid)) => println!(
                        "{}  [{:04x}:{:04x}] {}",
                        port.port_name,
                        vid,
                        pid,
                        port.product.unwrap_or_default()
                    ),
                    _ => println!("{}", port.port_name),
                }
            }
            Ok(())
        }
        Command::ListButtons => {
            for button in XboxButton::ALL {
                println!("{}", button);
            }
            Ok(())
        }
        Command::Run => run(cli).await,
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut settings = Settings::load(&cli.config);
    if let Some(mapping) = cli.mapping {
        settings.mapping_file = mapping;
    }
    if let Some(port) = cli.port {
        settings.auto_connect_port = Some(port);
    }
    let settings = settings.validated();

    let device = gamepad::connect();
    let mut ctx = AppContext::new(settings, device, Arc::new(SystemPortOpener));
    log::info!("Kaiser pad started (gamepad output: {})", if ctx.gamepad_available() { "on" } else { "off" });

    let visual_task = tokio::spawn(print_visual_changes(ctx.on_button_visual_change()));

    if let Some(port) = ctx.settings().auto_connect_port.clone() {
        if let Err(e) = ctx.select_port(&port).await {
            log::error!("{}", e);
        }
    }

    print_help();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read console input")? else { break };
                if !handle_command(&mut ctx, line.trim()).await {
                    break;
                }
            }
        }
    }

    ctx.shutdown().await;
    visual_task.abort();
    Ok(())
}

/// Execute one console command; returns false to quit
async fn handle_command(ctx: &mut AppContext, line: &str) -> bool {
    let mut parts = line.split_whitespace();
    match parts.next() {
        None => {}
        Some("ports") => {
            for port in ctx.available_ports() {
                println!("  {}", port);
            }
        }
        Some("select") => match parts.next() {
            Some(port) => {
                if let Err(e) = ctx.select_port(port).await {
                    println!("  {}", e);
                }
            }
            None => println!("  usage: select <port>"),
        },
        Some("map") => match (parts.next(), parts.next()) {
            (Some(input), Some(output)) => match input.parse::<LogicalInput>() {
                Ok(input) => match ctx.set_mapping(input, output) {
                    Ok(button) => println!("  {} -> {}", input, button),
                    Err(e) => println!("  {}", e),
                },
                Err(e) => println!("  {}", e),
            },
            _ => println!("  usage: map <A|S|K|L> <XUSB_GAMEPAD_...>"),
        },
        Some("mapping") => {
            for (input, output) in ctx.current_mapping().iter() {
                println!("  {} (button {}) -> {}", input, input.display_number(), output);
            }
        }
        Some("state") => {
            println!("  session: {:?}", ctx.session_state());
            for (input, pressed) in ctx.button_state().snapshot() {
                println!("  {}: {}", input, if pressed { "pressed" } else { "released" });
            }
            let stats = ctx.reader_stats();
            println!(
                "  lines: {}, events: {}, dropped: {}",
                stats.lines_read, stats.events_routed, stats.frames_dropped
            );
        }
        Some("help") => print_help(),
        Some("quit") | Some("exit") => return false,
        Some(other) => println!("  unknown command: {} (try help)", other),
    }
    true
}

async fn print_visual_changes(mut rx: tokio::sync::broadcast::Receiver<VisualChange>) {
    loop {
        match rx.recv().await {
            Ok(change) => println!(
                "[button {}] {}",
                change.input.display_number(),
                if change.pressed { "ON" } else { "off" }
            ),
            Err(RecvError::Lagged(skipped)) => log::debug!("Display skipped {} button updates", skipped),
            Err(RecvError::Closed) => break,
        }
    }
}

fn print_help() {
    println!("commands: ports | select <port> | map <input> <button> | mapping | state | quit");
}
