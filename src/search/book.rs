//! Hand-coded opening book.
//!
//! A short list of stabilising candidates (navy repositioning, cautious
//! pushes), written from blue's seat and mirrored for red. A book move is
//! taken only when it neither allows an immediate winning reply nor newly
//! hangs the Commander.

use crate::board::{piece_at, Kind, Piece, Side};
use crate::evaluation::board_score;
use crate::game::{apply_move_rules, has_immediate_winning_move, GameMode};
use crate::moves::{all_moves_for, moves, Move};

/// Opening only: book and style heuristics switch off as material leaves
/// the board.
pub const OPENING_MIN_PIECES: usize = 34;
pub const VERY_EARLY_MIN_PIECES: usize = 36;

/// Weight of each hanging unit class when scanning a position for
/// immediate tactical risk.
pub fn opening_immediate_risk(pieces: &[Piece], cpu_side: Side) -> i32 {
    let mut commander_hanging = false;
    let mut af_hanging: Vec<i32> = Vec::new();
    let mut navy_hanging: Vec<i32> = Vec::new();
    let mut land_hanging: Vec<i32> = Vec::new();

    for m in all_moves_for(pieces, cpu_side.opponent()) {
        let Some(t) = piece_at(pieces, m.dc, m.dr) else {
            continue;
        };
        if t.side != cpu_side {
            continue;
        }
        match t.kind {
            Kind::Commander => commander_hanging = true,
            Kind::AirForce => {
                if !af_hanging.contains(&t.id) {
                    af_hanging.push(t.id)
                }
            }
            Kind::Navy => {
                if !navy_hanging.contains(&t.id) {
                    navy_hanging.push(t.id)
                }
            }
            Kind::Artillery | Kind::Tank | Kind::Infantry => {
                if !land_hanging.contains(&t.id) {
                    land_hanging.push(t.id)
                }
            }
            _ => {}
        }
    }

    let mut risk = 0;
    if commander_hanging {
        risk += 1_000_000;
    }
    risk += af_hanging.len() as i32 * 6000;
    risk += navy_hanging.len() as i32 * 1400;
    risk += land_hanging.len() as i32 * 250;
    risk
}

/// Book squares as written for blue; red plays the row-mirror.
fn mirror(side: Side, c: i8, r: i8) -> (i8, i8) {
    match side {
        Side::Blue => (c, r),
        Side::Red => (c, 11 - r),
    }
}

fn push_from_square(
    book: &mut Vec<Move>,
    pieces: &[Piece],
    cpu_side: Side,
    from: (i8, i8),
    to: (i8, i8),
) {
    let (fc, fr) = mirror(cpu_side, from.0, from.1);
    let (tc, tr) = mirror(cpu_side, to.0, to.1);
    if let Some(p) = piece_at(pieces, fc, fr) {
        if p.side == cpu_side {
            book.push(Move::new(p.id, tc, tr));
        }
    }
}

fn is_legal_book_move(pieces: &[Piece], cpu_side: Side, cand: &Move) -> bool {
    let Some(p) = pieces.iter().find(|p| p.id == cand.pid) else {
        return false;
    };
    p.side == cpu_side && moves(p, pieces).contains(&(cand.dc, cand.dr))
}

/// Pick a vetted book move, if the opening shape still allows one.
pub fn opening_book_pick(pieces: &[Piece], cpu_side: Side, mode: GameMode) -> Option<Move> {
    if pieces.len() < OPENING_MIN_PIECES {
        return None;
    }
    let very_early = pieces.len() >= VERY_EARLY_MIN_PIECES;

    let mut book: Vec<Move> = Vec::new();

    // Navy stabilisation first: tuck the fleet off the back lane.
    let back = piece_at_mirrored(pieces, cpu_side, 0, 10);
    let front = piece_at_mirrored(pieces, cpu_side, 0, 8);
    let have_back = back.is_some_and(|p| p.side == cpu_side && p.kind == Kind::Navy);
    let have_front = front.is_some_and(|p| p.side == cpu_side && p.kind == Kind::Navy);
    if have_back && have_front {
        push_from_square(&mut book, pieces, cpu_side, (0, 8), (1, 8));
        push_from_square(&mut book, pieces, cpu_side, (0, 10), (1, 10));
    } else if have_back {
        push_from_square(&mut book, pieces, cpu_side, (0, 10), (1, 10));
    } else if have_front {
        push_from_square(&mut book, pieces, cpu_side, (0, 8), (1, 8));
    }

    // Hold the air wings back during the very first exchanges.
    if !very_early {
        push_from_square(&mut book, pieces, cpu_side, (3, 7), (2, 7));
        push_from_square(&mut book, pieces, cpu_side, (7, 7), (8, 7));
        push_from_square(&mut book, pieces, cpu_side, (3, 7), (3, 8));
        push_from_square(&mut book, pieces, cpu_side, (7, 7), (7, 8));
    }
    push_from_square(&mut book, pieces, cpu_side, (5, 7), (5, 6));
    push_from_square(&mut book, pieces, cpu_side, (4, 8), (4, 7));
    push_from_square(&mut book, pieces, cpu_side, (6, 8), (6, 7));

    let stm_after = cpu_side.opponent();
    let mut best: Option<(Move, i32)> = None;
    for cand in book {
        if !is_legal_book_move(pieces, cpu_side, &cand) {
            continue;
        }
        let np = apply_move_rules(pieces, cand.pid, cand.dc, cand.dr, cpu_side);
        if has_immediate_winning_move(&np, cpu_side.opponent(), mode) {
            continue;
        }
        let risk = opening_immediate_risk(&np, cpu_side);
        if risk >= 1_000_000 {
            continue; // never allow an immediate commander hang
        }
        let score = board_score(&np, cpu_side, None, Some(stm_after)) - risk;
        if best.as_ref().map_or(true, |(_, s)| score > *s) {
            best = Some((cand, score));
        }
    }
    best.map(|(m, _)| m)
}

fn piece_at_mirrored(pieces: &[Piece], side: Side, c: i8, r: i8) -> Option<&Piece> {
    let (mc, mr) = mirror(side, c, r);
    piece_at(pieces, mc, mr)
}
