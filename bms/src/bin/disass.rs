//! Disassembles the bms data from stdin, linearly, without following jumps.
use std::io::Read;

use bms::{builtin_registry, Command, Cursor, Game, Track};

pub fn main() {
    let game = std::env::args()
        .nth(1)
        .and_then(|name| Game::from_name(&name))
        .unwrap_or(Game::Pikmin2);
    let registry = builtin_registry().unwrap();
    let dialect = registry.resolve(game.version());

    let mut buf = Vec::new();
    std::io::stdin().read_to_end(&mut buf).unwrap();

    let mut track = Track::new(None, 0, None, Cursor::new(&buf));
    loop {
        let offset = track.offset();
        let (opcode, args) = track.parse_next_opcode(&dialect).unwrap();
        let cmd = Command::classify(opcode, args);

        println!("{:06x}: {:?}", offset, cmd);
        if cmd.is_end() {
            break;
        }
    }
}
