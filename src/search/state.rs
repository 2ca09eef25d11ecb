//! Search-side board state.
//!
//! Pieces are small `Copy` structs, so the snapshot per ply is one short
//! memcpy; unmake restores the exact pre-move state bit for bit, which is
//! what keeps kamikaze, bombardment return and hero promotion honest.

use crate::attacks::AttackCache;
use crate::board::{Kind, Piece, PieceList, Side};
use crate::evaluation::quick_piece_score;
use crate::game::apply_move_rules;
use crate::moves::Move;
use crate::search::zobrist::{position_hash, turn_key};

/// Incremental quick evaluation: signed material+PST sum from the CPU
/// side's perspective.
pub fn quick_eval(pieces: &[Piece], cpu_side: Side) -> i32 {
    pieces
        .iter()
        .map(|p| {
            let s = quick_piece_score(p);
            if p.side == cpu_side {
                s
            } else {
                -s
            }
        })
        .sum()
}

/// Everything the recursive search mutates while walking the tree.
#[derive(Clone)]
pub struct SearchState {
    pub pieces: PieceList,
    pub turn: Side,
    pub hash: u64,
    /// CPU-side perspective, maintained across make/unmake.
    pub quick_eval: i32,
    pub atk: AttackCache,
    /// Commander coordinates per side; None once captured.
    pub cmd: [Option<(i8, i8)>; 2],
    pub navy_count: [i32; 2],
    pub cpu_side: Side,
}

/// Snapshot taken by `make`; `unmake` swaps it back wholesale.
pub struct Undo {
    pieces: PieceList,
    turn: Side,
    hash: u64,
    quick_eval: i32,
    cmd: [Option<(i8, i8)>; 2],
    navy_count: [i32; 2],
}

impl SearchState {
    pub fn new(pieces: &[Piece], turn: Side, cpu_side: Side) -> Self {
        let mut st = SearchState {
            pieces: pieces.to_vec(),
            turn,
            hash: position_hash(pieces, turn),
            quick_eval: quick_eval(pieces, cpu_side),
            atk: AttackCache::default(),
            cmd: [None; 2],
            navy_count: [0; 2],
            cpu_side,
        };
        st.rebuild_caches();
        st
    }

    pub fn rebuild_caches(&mut self) {
        self.cmd = [None; 2];
        self.navy_count = [0; 2];
        for p in &self.pieces {
            if p.kind == Kind::Commander {
                self.cmd[p.side.index()] = Some((p.col, p.row));
            }
            if p.kind == Kind::Navy {
                self.navy_count[p.side.index()] += 1;
            }
        }
    }

    /// Build (or revalidate) the attack cache for the current position.
    pub fn ensure_attack_cache(&mut self) {
        let (pieces, hash) = (&self.pieces, self.hash);
        if !self.atk.valid || self.atk.key != hash {
            self.atk.invalidate();
            self.atk.rebuild(pieces, hash);
        }
    }

    /// Play one move. The caller guarantees it came out of the generator
    /// for the side to move.
    pub fn make(&mut self, m: &Move) -> Undo {
        let undo = Undo {
            pieces: self.pieces.clone(),
            turn: self.turn,
            hash: self.hash,
            quick_eval: self.quick_eval,
            cmd: self.cmd,
            navy_count: self.navy_count,
        };
        self.pieces = apply_move_rules(&self.pieces, m.pid, m.dc, m.dr, self.turn);
        self.turn = self.turn.opponent();
        self.hash = position_hash(&self.pieces, self.turn);
        self.quick_eval = quick_eval(&self.pieces, self.cpu_side);
        self.atk.invalidate();
        self.rebuild_caches();
        undo
    }

    pub fn unmake(&mut self, undo: Undo) {
        self.pieces = undo.pieces;
        self.turn = undo.turn;
        self.hash = undo.hash;
        self.quick_eval = undo.quick_eval;
        self.cmd = undo.cmd;
        self.navy_count = undo.navy_count;
        self.atk.invalidate();
    }

    /// Null move: hand the opponent the move without touching a piece.
    pub fn make_null(&mut self) {
        self.hash ^= turn_key(self.turn);
        self.turn = self.turn.opponent();
        self.hash ^= turn_key(self.turn);
        self.atk.invalidate();
    }

    pub fn unmake_null(&mut self) {
        self.hash ^= turn_key(self.turn);
        self.turn = self.turn.opponent();
        self.hash ^= turn_key(self.turn);
        self.atk.invalidate();
    }

    pub fn side_piece_count(&self, side: Side) -> usize {
        self.pieces.iter().filter(|p| p.side == side).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::initial_setup;
    use crate::moves::all_moves_for;

    #[test]
    fn test_make_unmake_is_identity() {
        let pieces = initial_setup();
        let mut st = SearchState::new(&pieces, Side::Red, Side::Red);
        let before_pieces = st.pieces.clone();
        let before_hash = st.hash;
        let before_eval = st.quick_eval;

        for m in all_moves_for(&st.pieces, Side::Red).iter().take(25) {
            let undo = st.make(m);
            let u2 = {
                // one reply deep as well
                let replies = all_moves_for(&st.pieces, st.turn);
                replies.first().map(|r| st.make(r))
            };
            if let Some(u2) = u2 {
                st.unmake(u2);
            }
            st.unmake(undo);
            assert_eq!(st.pieces, before_pieces, "board must restore bit for bit");
            assert_eq!(st.hash, before_hash);
            assert_eq!(st.quick_eval, before_eval);
            assert_eq!(st.turn, Side::Red);
        }
    }

    #[test]
    fn test_null_move_round_trip() {
        let pieces = initial_setup();
        let mut st = SearchState::new(&pieces, Side::Red, Side::Red);
        let h = st.hash;
        st.make_null();
        assert_eq!(st.turn, Side::Blue);
        assert_ne!(st.hash, h);
        st.unmake_null();
        assert_eq!(st.turn, Side::Red);
        assert_eq!(st.hash, h);
    }

    #[test]
    fn test_caches_track_captures() {
        let pieces = vec![
            Piece::new(1, Side::Red, Kind::Commander, 4, 0),
            Piece::new(2, Side::Blue, Kind::Commander, 5, 11),
            Piece::new(3, Side::Red, Kind::Tank, 3, 1),
            Piece::new(4, Side::Blue, Kind::Navy, 1, 1),
        ];
        let mut st = SearchState::new(&pieces, Side::Red, Side::Red);
        assert_eq!(st.navy_count[Side::Blue.index()], 1);
        assert_eq!(st.cmd[Side::Red.index()], Some((4, 0)));
        // Tank shells the navy: stay-and-fire, blue fleet gone.
        let undo = st.make(&Move::new(3, 1, 1));
        assert_eq!(st.navy_count[Side::Blue.index()], 0);
        st.unmake(undo);
        assert_eq!(st.navy_count[Side::Blue.index()], 1);
    }

    #[test]
    fn test_quick_eval_sign_convention() {
        let pieces = initial_setup();
        let red_view = SearchState::new(&pieces, Side::Red, Side::Red);
        let blue_view = SearchState::new(&pieces, Side::Red, Side::Blue);
        assert_eq!(red_view.quick_eval, -blue_view.quick_eval);
    }
}
