//! Converts a bms file to a Standard MIDI File.
//!
//!     bms2midi <game> <input.bms> <output.mid>
//!
//! Set RUST_LOG=bms=debug (or trace for per-opcode output) to watch the
//! interpretation.

use bms::{convert, Config, Game};

const MAX_TICKS: u64 = 10_000_000;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let (game, input, output) = match (args.next(), args.next(), args.next()) {
        (Some(game), Some(input), Some(output)) => (game, input, output),
        _ => {
            eprintln!("usage: bms2midi <pikmin1|sunshine|windwaker|pikmin2> <input.bms> <output.mid>");
            std::process::exit(2);
        }
    };
    let game = match Game::from_name(&game) {
        Some(game) => game,
        None => {
            eprintln!("unknown game: {}", game);
            std::process::exit(2);
        }
    };

    let data = std::fs::read(&input).unwrap();
    match convert(&data, game, &Config::default(), MAX_TICKS) {
        Ok(midi) => std::fs::write(&output, midi).unwrap(),
        Err(err) => {
            eprintln!("{}: {}", input, err);
            std::process::exit(1);
        }
    }
}
