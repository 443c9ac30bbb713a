use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use log::info;

use pocketpoint::decode::ImageCrateDecoder;
use pocketpoint::flow::LkOpticalFlow;
use pocketpoint::server;
use pocketpoint::sink::EnigoSink;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    #[arg(long, default_value_t = 8765)]
    port: u16,

    #[arg(long, default_value_t = false)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let level = if verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info };
    env_logger::builder()
        .format_timestamp_millis()
        .format_target(false)
        .filter_level(level)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    info!("pocketpoint v{}", env!("CARGO_PKG_VERSION"));

    let bind: std::net::SocketAddr = format!("{}:{}", args.bind, args.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid bind address {}:{}: {e}", args.bind, args.port))?;

    let sink: Arc<dyn pocketpoint::sink::InputSink> = Arc::new(EnigoSink::new()?);
    let decoder: Arc<dyn pocketpoint::decode::ImageDecoder> = Arc::new(ImageCrateDecoder);
    let flow_engine: Arc<dyn pocketpoint::flow::OpticalFlowEngine> = Arc::new(LkOpticalFlow::default());

    let running = Arc::new(AtomicBool::new(true));
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        info!("ctrl+c received, shutting down");
        r.store(false, Ordering::SeqCst);
    })?;

    let handle = server::serve(bind, sink, decoder, flow_engine, shutdown_rx).await?;
    info!("listening on {}", handle.local_addr);

    while running.load(Ordering::SeqCst) {
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    }

    let _ = shutdown_tx.send(true);
    info!("shutdown complete");
    Ok(())
}
