//! The whole pipeline in one call: resolve a dialect, interpret the
//! sequence, serialize the result.

use tracing::{debug, info};

use crate::dialect::Dialect;
use crate::engine::{Config, Engine};
use crate::error::{BmsError, Result};
use crate::games::{builtin_registry, Game};
use smf::WriterOptions;

/// Converts one BMS buffer to a complete Standard MIDI File using the
/// built-in dialect for `game`.
///
/// `max_ticks` bounds the interpretation: a sequence that has not reached
/// its termination condition within that many ticks fails with
/// [`BmsError::TickLimit`] and produces no output bytes.
pub fn convert(data: &[u8], game: Game, config: &Config, max_ticks: u64) -> Result<Vec<u8>> {
    let registry = builtin_registry()?;
    convert_with_dialect(data, registry.resolve(game.version()), config, max_ticks)
}

/// Like [`convert`], but with an explicitly resolved dialect, which may
/// come from a caller-built [`crate::DialectRegistry`].
pub fn convert_with_dialect(
    data: &[u8],
    dialect: Dialect,
    config: &Config,
    max_ticks: u64,
) -> Result<Vec<u8>> {
    debug!(
        dialect = %dialect.version(),
        len = data.len(),
        start = config.start_offset,
        "interpreting sequence"
    );

    let mut engine = Engine::new(data, dialect, config.clone());
    let mut finished = false;
    for _ in 0..max_ticks {
        if engine.step()? {
            finished = true;
            break;
        }
    }
    if !finished && !engine.is_done() {
        return Err(BmsError::TickLimit { ticks: max_ticks });
    }

    let timeline = engine.into_timeline();
    info!(
        tracks = timeline.len(),
        "interpretation finished, writing container"
    );

    let options = WriterOptions {
        division: config.base_ppqn,
        instrument_bank: config.instrument_bank,
    };
    Ok(smf::write_timeline(&timeline, &options)?)
}
