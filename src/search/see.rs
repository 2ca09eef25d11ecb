//! Static Exchange Evaluation.
//!
//! Plays out the capture sequence on one square with least-valuable
//! attackers on both sides, through the full rule engine so stay-and-fire
//! and interdiction effects participate in the exchange.

use crate::board::{piece_at, Piece, Side};
use crate::game::apply_move_rules;
use crate::moves::{build_movegen_context, dests_for};

const SEE_MAX_PLIES: i32 = 6;

/// Net material outcome of `attacker_side` opening the exchange on
/// (col,row). Positive = winning capture.
pub fn see(pieces: &[Piece], col: i8, row: i8, attacker_side: Side, depth: i32) -> i32 {
    if depth > SEE_MAX_PLIES {
        return 0;
    }
    let ctx = build_movegen_context(pieces);

    // Least-valuable attacker that can land on the square.
    let mut best_atk: Option<&Piece> = None;
    let mut best_val = i32::MAX;
    for p in pieces.iter() {
        if p.side != attacker_side {
            continue;
        }
        if dests_for(p, pieces, &ctx).contains(&(col, row)) {
            let v = p.kind.value().max(1);
            if v < best_val {
                best_val = v;
                best_atk = Some(p);
            }
        }
    }
    let Some(attacker) = best_atk else {
        return 0;
    };

    let gain = piece_at(pieces, col, row).map(|t| t.kind.value()).unwrap_or(0);

    // Shallow shortcut: the cheapest attacker taking a bigger piece can
    // never lose the cycle.
    if depth == 0 && gain > best_val {
        return gain - best_val;
    }

    let after = apply_move_rules(pieces, attacker.id, col, row, attacker_side);
    gain - see(&after, col, row, attacker_side.opponent(), depth + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Kind;

    #[test]
    fn test_undefended_capture_wins_material() {
        let pieces = vec![
            Piece::new(1, Side::Red, Kind::Commander, 4, 0),
            Piece::new(2, Side::Blue, Kind::Commander, 5, 11),
            Piece::new(3, Side::Red, Kind::Tank, 4, 4),
            Piece::new(4, Side::Blue, Kind::Artillery, 4, 5),
        ];
        let v = see(&pieces, 4, 5, Side::Red, 0);
        assert!(v > 0, "tank takes artillery for free: {v}");
    }

    #[test]
    fn test_defended_victim_costs_the_attacker() {
        let pieces = vec![
            Piece::new(1, Side::Red, Kind::Commander, 4, 0),
            Piece::new(2, Side::Blue, Kind::Commander, 5, 11),
            Piece::new(3, Side::Red, Kind::Tank, 4, 4),
            Piece::new(4, Side::Blue, Kind::Infantry, 4, 5),
            Piece::new(5, Side::Blue, Kind::Infantry, 4, 6),
        ];
        // Tank (200) takes infantry (100), infantry recaptures: net -100.
        let v = see(&pieces, 4, 5, Side::Red, 0);
        assert!(v < 0, "losing exchange must be negative: {v}");
    }

    #[test]
    fn test_cheapest_attacker_shortcut() {
        let pieces = vec![
            Piece::new(1, Side::Red, Kind::Commander, 4, 0),
            Piece::new(2, Side::Blue, Kind::Commander, 5, 11),
            Piece::new(3, Side::Red, Kind::Infantry, 4, 4),
            Piece::new(4, Side::Blue, Kind::Navy, 4, 5),
        ];
        // Infantry (100) vs navy (800) on the river: at least +700.
        let v = see(&pieces, 4, 5, Side::Red, 0);
        assert_eq!(v, 700);
    }

    #[test]
    fn test_no_attacker_means_zero() {
        let pieces = vec![
            Piece::new(1, Side::Red, Kind::Commander, 4, 0),
            Piece::new(2, Side::Blue, Kind::Commander, 5, 11),
            Piece::new(4, Side::Blue, Kind::Infantry, 9, 9),
        ];
        assert_eq!(see(&pieces, 9, 9, Side::Red, 0), 0);
    }
}
