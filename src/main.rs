use std::fs::File;
use std::io;
use std::process::ExitCode;
use std::sync::{Mutex, mpsc};

use clap::Parser;
use ratatui::DefaultTerminal;
use tracing::{error, info};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, prelude::*};

mod controller;
mod domain;
mod fmt;
mod histogram;
mod initial;
mod model;
mod order;
mod page;
mod rpc;
mod schema;
mod table;
mod transport;
mod ui;

use controller::Controller;
use domain::{RtvConfig, RtvError};
use model::{Model, Status};
use page::Page;
use rpc::RpcClient;
use transport::WsTransport;
use ui::TableUI;

/// Browse a table held by a remote server.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Websocket endpoint of the server
    #[arg(short, long, default_value = "ws://localhost:8080/rpc")]
    url: String,

    /// Where to write the log; the terminal belongs to the viewer
    #[arg(long, default_value = "~/.rtv.log")]
    log_file: String,

    /// Milliseconds to wait for a key press before handling server replies
    #[arg(long, default_value_t = 100)]
    poll: u64,

    #[arg(long, default_value_t = 32)]
    max_column_width: usize,

    /// More logging, repeat for even more
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = setup_logging(&args.log_file, args.verbose) {
        eprintln!("Error: cannot log to {}: {e}", args.log_file);
        return ExitCode::FAILURE;
    }

    match run(args) {
        Err(e) => {
            error!("Exiting: {e:?}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
    }
}

fn setup_logging(log_file: &str, verbose: u8) -> Result<(), RtvError> {
    let path = shellexpand::full(log_file)
        .map_err(|e| RtvError::IoError(io::Error::other(e.to_string())))?;
    let file = File::create(path.as_ref())?;

    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("rtv={level}")));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(false),
        )
        .with(ErrorLayer::default())
        .init();
    Ok(())
}

fn run(args: Args) -> Result<(), RtvError> {
    info!("Starting rtv!");
    let cfg = RtvConfig::default()
        .event_poll_time(args.poll)
        .max_column_width(args.max_column_width);

    let (replies_tx, replies_rx) = mpsc::channel();
    let transport = WsTransport::connect(&args.url, replies_tx.clone())?;
    let rpc = RpcClient::new(Box::new(transport), replies_tx, replies_rx);

    let mut model = Model::init(&cfg, Page::new(rpc));
    model.start()?;

    let mut terminal = ratatui::init();
    let result = event_loop(&mut model, &cfg, &mut terminal);
    ratatui::restore();
    result
}

fn event_loop(
    model: &mut Model,
    cfg: &RtvConfig,
    terminal: &mut DefaultTerminal,
) -> Result<(), RtvError> {
    let ui = TableUI::new();
    let controller = Controller::new(cfg);

    while model.status != Status::QUITTING {
        // Dispatch server replies, then render the current view
        model.tick();
        terminal.draw(|f| ui.draw(model, f))?;

        // Handle events and map to a Message
        if let Some(message) = controller.handle_event(model)? {
            model.update(Some(message))?;
        };
    }
    Ok(())
}
