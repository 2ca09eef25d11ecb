//! Position hashing.
//!
//! 64-bit keys over (kind, side, hero, carried) x square, plus side-to-move
//! keys, drawn lazily from a splitmix stream with a fixed seed so every
//! process that shares transposition data sees the same keys.

use once_cell::sync::Lazy;
use rand::{RngCore, SeedableRng};
use rand_xoshiro::SplitMix64;

use crate::board::{on_board, sq_index, Piece, Side, NUM_KINDS, SQUARES};

/// kind x side x hero x carried.
pub const PIECE_STATES: usize = NUM_KINDS * 2 * 2 * 2;

const ZOBRIST_SEED: u64 = 0xC0FF_EE12_3456_7890;

struct ZobristKeys {
    piece_sq: Box<[[u64; SQUARES]; PIECE_STATES]>,
    turn: [u64; 2],
    /// Salts the TT key per searching perspective so red-rooted and
    /// blue-rooted searches never read each other's entries.
    perspective: [u64; 2],
}

static KEYS: Lazy<ZobristKeys> = Lazy::new(|| {
    let mut rng = SplitMix64::seed_from_u64(ZOBRIST_SEED);
    let mut piece_sq: Box<[[u64; SQUARES]; PIECE_STATES]> =
        Box::new([[0u64; SQUARES]; PIECE_STATES]);
    for state in piece_sq.iter_mut() {
        for key in state.iter_mut() {
            *key = rng.next_u64();
        }
    }
    let turn = [rng.next_u64(), rng.next_u64()];
    let perspective = [rng.next_u64(), rng.next_u64()];
    ZobristKeys {
        piece_sq,
        turn,
        perspective,
    }
});

#[inline]
fn piece_state_index(p: &Piece) -> usize {
    let kind = p.kind.index();
    let side = p.side.index();
    let hero = p.hero as usize;
    let carried = p.carrier.is_some() as usize;
    ((kind * 2 + side) * 2 + hero) * 2 + carried
}

/// Key contribution of one piece in its current state and square.
#[inline]
pub fn piece_key(p: &Piece) -> u64 {
    if !on_board(p.col, p.row) {
        return 0;
    }
    KEYS.piece_sq[piece_state_index(p)][sq_index(p.col, p.row)]
}

#[inline]
pub fn turn_key(side: Side) -> u64 {
    KEYS.turn[side.index()]
}

#[inline]
pub fn perspective_salt(side: Side) -> u64 {
    KEYS.perspective[side.index()]
}

/// Full position hash: XOR of every piece-state key plus the side to move.
pub fn position_hash(pieces: &[Piece], turn: Side) -> u64 {
    let mut h = turn_key(turn);
    for p in pieces {
        h ^= piece_key(p);
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{initial_setup, Kind};

    #[test]
    fn test_keys_are_distinct() {
        let mut seen = std::collections::HashSet::new();
        for state in KEYS.piece_sq.iter() {
            for &k in state.iter() {
                assert!(seen.insert(k), "duplicate zobrist key");
            }
        }
        assert!(seen.insert(KEYS.turn[0]));
        assert!(seen.insert(KEYS.turn[1]));
    }

    #[test]
    fn test_hash_is_pure_function_of_state() {
        let a = initial_setup();
        let mut b = initial_setup();
        b.reverse(); // same set, different construction order
        assert_eq!(position_hash(&a, Side::Red), position_hash(&b, Side::Red));
        assert_ne!(position_hash(&a, Side::Red), position_hash(&a, Side::Blue));
    }

    #[test]
    fn test_hero_and_carried_flags_change_hash() {
        let mut pieces = initial_setup();
        let base = position_hash(&pieces, Side::Red);
        pieces[0].hero = true;
        assert_ne!(position_hash(&pieces, Side::Red), base);
        pieces[0].hero = false;
        pieces[0].carrier = Some(2);
        assert_ne!(position_hash(&pieces, Side::Red), base);
    }

    #[test]
    fn test_incremental_update_matches_full_hash() {
        let mut pieces = initial_setup();
        let before = position_hash(&pieces, Side::Red);
        let idx = pieces
            .iter()
            .position(|p| p.kind == Kind::Infantry)
            .unwrap();
        let old_key = piece_key(&pieces[idx]);
        pieces[idx].row += 1;
        let new_key = piece_key(&pieces[idx]);
        let incremental = before ^ old_key ^ new_key;
        assert_eq!(incremental, position_hash(&pieces, Side::Red));
    }

    #[test]
    fn test_perspective_salts_differ() {
        assert_ne!(perspective_salt(Side::Red), perspective_salt(Side::Blue));
    }
}
