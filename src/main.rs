use clap::Parser;
use env_logger::Env;
use log::info;
use mail_sink::{SinkConfig, SinkServer};
use std::path::PathBuf;
use std::time::Duration;

/// SMTP server that agrees with everything it is sent
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Listen port
    #[arg(short = 'p', long, default_value_t = 25)]
    port: u16,

    /// Listen on interface
    #[arg(short = 'i', long, default_value = "localhost")]
    interface: String,

    /// Hostname to greet with
    #[arg(short = 'H', long, default_value = "localhost")]
    hostname: String,

    /// Log the mail body
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Save attached files
    #[arg(short = 's', long)]
    save_attachments: bool,

    /// Directory attached files are saved to
    #[arg(short = 'd', long, default_value = ".")]
    dir: PathBuf,

    /// Threads decoding and writing attachments
    #[arg(long, default_value_t = 2)]
    workers: usize,

    /// Seconds between stats log lines
    #[arg(long, default_value_t = 5)]
    stats_interval: u64,
}

impl From<Cli> for SinkConfig {
    fn from(cli: Cli) -> Self {
        SinkConfig::new(&cli.hostname)
            .with_listen(&cli.interface, cli.port)
            .with_log_body(cli.verbose)
            .with_save_attachments(cli.save_attachments)
            .with_attachment_dir(cli.dir)
            .with_attachment_workers(cli.workers)
            .with_stats_interval(Duration::from_secs(cli.stats_interval))
    }
}

fn main() {
    env_logger::Builder::from_env(Env::new().filter_or("RUST_LOG", "info")).init();

    let config = SinkConfig::from(Cli::parse());
    info!("Starting mail-sink on {}", config.listen_addr());

    let server = match SinkServer::bind(config) {
        Ok(server) => server,
        Err(e) => {
            eprintln!("Failed to start server: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        eprintln!("Server error: {e}");
        std::process::exit(1);
    }
}
