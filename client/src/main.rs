use clap::Parser;
use client::network::Client;
use log::info;
use macroquad::prelude::*;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address: host:port, or a bare host for a secure default port
    #[arg(short = 's', long, default_value = "localhost:8080")]
    server: String,

    /// Window width
    #[arg(short = 'w', long, default_value = "960")]
    width: i32,

    /// Window height (no short flag to avoid conflict with --help)
    #[arg(long, default_value = "640")]
    height: i32,

    /// Minimum delay between moves in milliseconds
    #[arg(long, default_value_t = shared::MOVE_DELAY_MS)]
    move_delay_ms: u64,
}

fn window_conf() -> Conf {
    let args = Args::parse();
    Conf {
        window_title: "Maze Race".to_owned(),
        window_width: args.width,
        window_height: args.height,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Server address: {}", args.server);
    info!("Controls: WASD/arrows to move, Enter to start, C/J to create/join, Esc to leave");

    let mut client = Client::new(&args.server, Duration::from_millis(args.move_delay_ms)).await;
    client.run().await;
}
