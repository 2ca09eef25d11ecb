use crate::board::{sq_index, Kind, Piece, Side, COLS, ROWS, SQUARES};
use crate::moves::{build_movegen_context, dests_for};

// ============================================================================
// 132-square bitboard
// ============================================================================

/// Bitset over the 11x12 board, three 64-bit words.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BB132 {
    bits: [u64; 3],
}

impl BB132 {
    pub const EMPTY: BB132 = BB132 { bits: [0; 3] };

    #[inline]
    pub fn set(&mut self, sq: usize) {
        self.bits[sq >> 6] |= 1u64 << (sq & 63);
    }

    #[inline]
    pub fn get(&self, sq: usize) -> bool {
        (self.bits[sq >> 6] >> (sq & 63)) & 1 != 0
    }

    #[inline]
    pub fn or_with(&mut self, other: &BB132) {
        for i in 0..3 {
            self.bits[i] |= other.bits[i];
        }
    }

    #[inline]
    pub fn popcount(&self) -> i32 {
        self.bits.iter().map(|w| w.count_ones() as i32).sum()
    }

    pub fn clear(&mut self) {
        self.bits = [0; 3];
    }
}

// ============================================================================
// Attack cache
// ============================================================================

/// Per-position attack summary: how many pieces of each side can land on
/// each square, plus the union "any square attacked" bitboards used as a
/// mobility proxy. Built lazily and keyed on the position hash.
#[derive(Clone)]
pub struct AttackCache {
    pub valid: bool,
    pub key: u64,
    /// counts[side][row][col]
    pub counts: [[[u8; COLS as usize]; ROWS as usize]; 2],
    pub attacked_any: [BB132; 2],
    pub attacked_square_count: [i32; 2],
}

impl Default for AttackCache {
    fn default() -> Self {
        AttackCache {
            valid: false,
            key: 0,
            counts: [[[0; COLS as usize]; ROWS as usize]; 2],
            attacked_any: [BB132::EMPTY; 2],
            attacked_square_count: [0; 2],
        }
    }
}

impl AttackCache {
    /// Rebuild from scratch for the given position (identified by `key`).
    pub fn rebuild(&mut self, pieces: &[Piece], key: u64) {
        if self.valid && self.key == key {
            return;
        }
        self.counts = [[[0; COLS as usize]; ROWS as usize]; 2];
        self.attacked_any = [BB132::EMPTY; 2];

        let ctx = build_movegen_context(pieces);
        for p in pieces.iter() {
            let side = p.side.index();
            for (dc, dr) in dests_for(p, pieces, &ctx) {
                self.counts[side][dr as usize][dc as usize] =
                    self.counts[side][dr as usize][dc as usize].saturating_add(1);
                self.attacked_any[side].set(sq_index(dc, dr));
            }
        }
        self.attacked_square_count[0] = self.attacked_any[0].popcount();
        self.attacked_square_count[1] = self.attacked_any[1].popcount();
        self.valid = true;
        self.key = key;
    }

    #[inline]
    pub fn attackers(&self, side: Side, col: i8, row: i8) -> i32 {
        self.counts[side.index()][row as usize][col as usize] as i32
    }

    pub fn invalidate(&mut self) {
        self.valid = false;
    }
}

/// Attacker count for one square; uses the cache when it is valid for the
/// current position, otherwise falls back to a direct scan.
pub fn attackers_to_square(
    pieces: &[Piece],
    col: i8,
    row: i8,
    attacker_side: Side,
    cache: Option<&AttackCache>,
) -> i32 {
    if let Some(c) = cache {
        if c.valid {
            return c.attackers(attacker_side, col, row);
        }
    }
    let ctx = build_movegen_context(pieces);
    let mut attackers = 0;
    for p in pieces.iter() {
        if p.side != attacker_side {
            continue;
        }
        if dests_for(p, pieces, &ctx).contains(&(col, row)) {
            attackers += 1;
        }
    }
    attackers
}

/// Commander coordinates for `side`, if the commander is still on the board.
pub fn commander_pos(pieces: &[Piece], side: Side) -> Option<(i8, i8)> {
    pieces
        .iter()
        .find(|p| p.side == side && p.kind == Kind::Commander)
        .map(|p| (p.col, p.row))
}

/// How many enemy pieces currently bear on `side`'s commander.
pub fn commander_attackers(
    pieces: &[Piece],
    side: Side,
    cache: Option<&AttackCache>,
) -> i32 {
    match commander_pos(pieces, side) {
        Some((c, r)) => attackers_to_square(pieces, c, r, side.opponent(), cache),
        None => 0,
    }
}
