use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use grbllink::firmware::grbl::settings::describe_setting;
use grbllink::{
    blocking_exchange, init_json_logging, init_logging, list_ports, prepare_program,
    ConnectionParams, EventKind, GrblSettings, LinkCommand, LinkConfig, LinkEvent, LinkHandle,
    ProgramLine, SerialTransport, Transport, VirtualPort, BUILD_DATE, VERSION,
};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

const QUERY_TIMEOUT: Duration = Duration::from_secs(2);
/// Log lines echoed when a stream ends badly
const FAILURE_LOG_LINES: usize = 8;

#[derive(Debug, Parser)]
#[command(name = "grbllink", version, about = "Stream G-code to GRBL controllers")]
struct Cli {
    /// Config file (.toml or .json); defaults to the platform config directory
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Serial port, overrides the config file
    #[arg(short, long, global = true)]
    port: Option<String>,

    /// Baud rate, overrides the config file
    #[arg(short, long, global = true)]
    baud: Option<u32>,

    /// Talk to the built-in controller simulator instead of a serial port
    #[arg(long, global = true)]
    simulate: bool,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List serial ports that look like CNC controllers
    Ports,
    /// Stream a G-code file
    Stream {
        file: PathBuf,
        /// Send one line per Enter key press
        #[arg(long)]
        step: bool,
    },
    /// Send command lines through the streaming window
    Send {
        #[arg(required = true)]
        commands: Vec<String>,
    },
    /// Read back and describe the controller settings
    Settings,
    /// One synchronous request/response exchange, without a session
    Query { command: String },
    /// Write the default configuration
    ConfigInit {
        /// Destination; defaults to the platform config directory
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if cli.json_logs {
        init_json_logging()?;
    } else {
        init_logging(cli.verbose)?;
    }
    tracing::debug!(version = VERSION, build_date = BUILD_DATE, "grbllink starting");

    match &cli.command {
        Command::Ports => print_ports(),
        Command::ConfigInit { path } => config_init(path.clone()),
        Command::Query { command } => query(&cli, command).await,
        Command::Stream { file, step } => {
            let text = std::fs::read_to_string(file)
                .with_context(|| format!("reading {}", file.display()))?;
            let lines = prepare_program(&text);
            if lines.is_empty() {
                bail!("{} has no sendable lines", file.display());
            }
            stream(&cli, lines, *step).await
        }
        Command::Send { commands } => {
            let lines = prepare_program(&commands.join("\n"));
            if lines.is_empty() {
                bail!("nothing to send");
            }
            stream(&cli, lines, false).await
        }
        Command::Settings => settings(&cli).await,
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<LinkConfig> {
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => LinkConfig::default_path()?,
    };
    let mut config = LinkConfig::load_or_default(&path)
        .with_context(|| format!("loading {}", path.display()))?;

    if let Some(port) = &cli.port {
        config.connection.port = port.clone();
    }
    if let Some(baud) = cli.baud {
        config.connection.baud_rate = baud;
    }
    if cli.simulate {
        if config.connection.port.is_empty() {
            config.connection.port = "simulator".to_string();
        }
        config.connection.settle_delay_ms = 0;
    }
    config.validate()?;

    if config.connection.port.is_empty() {
        bail!("no port configured; pass --port or --simulate");
    }
    Ok(config)
}

fn transport(cli: &Cli) -> Box<dyn Transport> {
    if cli.simulate {
        Box::new(VirtualPort::simulated())
    } else {
        Box::new(SerialTransport)
    }
}

fn print_ports() -> anyhow::Result<()> {
    let ports = list_ports()?;
    if ports.is_empty() {
        println!("No CNC serial ports found");
    }
    for port in ports {
        match port.manufacturer {
            Some(manufacturer) => {
                println!("{}\t{} ({})", port.port_name, port.description, manufacturer)
            }
            None => println!("{}\t{}", port.port_name, port.description),
        }
    }
    Ok(())
}

fn config_init(path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = match path {
        Some(path) => path,
        None => LinkConfig::default_path()?,
    };
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    LinkConfig::default().save_to_file(&path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

async fn query(cli: &Cli, command: &str) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    let params = ConnectionParams::from(&config.connection);
    let settle = config.connection.settle_delay();
    let transport = transport(cli);
    let command = command.to_string();

    // The exchange blocks on the port, keep it off the runtime threads.
    let lines = tokio::task::spawn_blocking(move || -> grbllink::Result<Vec<String>> {
        let mut pair = transport.open(&params)?;
        std::thread::sleep(settle);
        let _ = pair.writer.discard_input();
        let result = blocking_exchange(
            pair.reader.as_mut(),
            pair.writer.as_mut(),
            &command,
            QUERY_TIMEOUT,
        );
        pair.writer.close();
        result
    })
    .await??;

    for line in lines {
        println!("{}", line);
    }
    Ok(())
}

/// Connect and wait until the session is ready
async fn connect(cli: &Cli) -> anyhow::Result<(LinkHandle, broadcast::Receiver<LinkEvent>)> {
    let config = load_config(cli)?;
    let handle = LinkHandle::open(transport(cli), config);
    let mut events = handle.subscribe();
    handle.send(LinkCommand::Connect).await?;

    loop {
        match events.recv().await {
            Ok(LinkEvent::Connected { port, .. }) => {
                println!("Connected to {}", port);
                return Ok((handle, events));
            }
            Ok(LinkEvent::OperationFailed { message, .. }) => bail!("connect failed: {}", message),
            Ok(LinkEvent::Disconnected(reason)) => bail!("connect failed: {}", reason),
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => bail!("link task stopped"),
        }
    }
}

async fn stream(cli: &Cli, lines: Vec<ProgramLine>, step_mode: bool) -> anyhow::Result<()> {
    let (handle, mut events) = connect(cli).await?;
    let total = lines.len();
    handle
        .send(LinkCommand::RunProgram { lines, step_mode })
        .await?;
    println!("Streaming {} lines", total);

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stepping = false;
    let outcome = loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if matches!(event, LinkEvent::StepAwaiting { .. }) {
                        println!("{} - press Enter for the next line", event);
                        stepping = true;
                        continue;
                    }
                    report(&event);
                    match event {
                        LinkEvent::StreamCompleted { .. } => break Ok(()),
                        LinkEvent::StreamAborted { .. } => {
                            break Err(anyhow::anyhow!("stream aborted"))
                        }
                        LinkEvent::StreamFailed { message } => break Err(anyhow::anyhow!(message)),
                        LinkEvent::Disconnected(reason) => {
                            break Err(anyhow::anyhow!("{}", reason))
                        }
                        _ => {}
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "event receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    break Err(anyhow::anyhow!("link task stopped"))
                }
            },
            line = stdin.next_line(), if stepping => {
                stepping = false;
                if line?.is_some() {
                    handle.send(LinkCommand::AdvanceStep).await?;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("Aborting");
                handle.send(LinkCommand::Abort).await?;
            }
        }
    };

    if outcome.is_err() {
        let log = handle.snapshot().recent_log;
        for entry in &log[log.len().saturating_sub(FAILURE_LOG_LINES)..] {
            eprintln!("{}", entry);
        }
    }
    handle.shutdown().await?;
    outcome
}

async fn settings(cli: &Cli) -> anyhow::Result<()> {
    let (handle, mut events) = connect(cli).await?;
    handle
        .send(LinkCommand::RunProgram {
            lines: prepare_program("$$"),
            step_mode: false,
        })
        .await?;

    let mut store = GrblSettings::new();
    let outcome = loop {
        match events.recv().await {
            Ok(LinkEvent::SettingReceived { number, value }) => {
                store.set(number, value);
            }
            Ok(LinkEvent::StreamCompleted { .. }) => break Ok(()),
            Ok(event) if event.ends_stream() => break Err(anyhow::anyhow!("{}", event)),
            Ok(LinkEvent::Disconnected(reason)) => break Err(anyhow::anyhow!("{}", reason)),
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => {
                break Err(anyhow::anyhow!("link task stopped"))
            }
        }
    };
    handle.shutdown().await?;
    outcome?;

    for (number, value) in store.iter() {
        let description = describe_setting(number).unwrap_or("Unknown setting");
        println!("${}={}\t{}", number, value, description);
    }
    Ok(())
}

fn report(event: &LinkEvent) {
    match event {
        // Every hundredth line and the last one.
        LinkEvent::LineSent { sent, total } if sent % 100 != 0 && sent != total => {}
        LinkEvent::PositionChanged { .. } | LinkEvent::SettingReceived { .. } => {
            tracing::debug!("{}", event);
        }
        _ if event.kind() == EventKind::Fault => eprintln!("{}", event),
        _ => println!("{}", event),
    }
}
