mod campaign;
mod game_input_handler;
mod game_renderer;
mod storage;
mod terminal_batris;

use std::io;

use clap::Parser;

/// Terminal frontend for the batris battle campaign.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// The framerate at which to run the battle loop.
    #[arg(short, long)]
    fps: Option<u32>,
    /// Seed for a deterministic piece/drift/damage sequence.
    #[arg(long)]
    seed: Option<u64>,
    /// Jump straight to a single opponent by name.
    #[arg(long)]
    opponent: Option<String>,
}

fn main() -> Result<(), io::Error> {
    let args = Args::parse();
    let stdout = io::BufWriter::new(io::stdout());
    let mut app = terminal_batris::App::new(stdout, args.fps, args.seed, args.opponent);
    let msg = app.run()?;
    drop(app);
    println!("{msg}");
    Ok(())
}
