use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::board::{
    can_stack, crosses_river, is_hq_square, is_navigable, is_reef_col, is_sea, on_board,
    piece_by_id, sq_index, Kind, Piece, Side, SQUARES,
};

/// A move: piece id plus destination square.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Move {
    pub pid: i32,
    pub dc: i8,
    pub dr: i8,
}

impl Move {
    pub fn new(pid: i32, dc: i8, dr: i8) -> Self {
        Move { pid, dc, dr }
    }
}

pub type MoveList = SmallVec<[Move; 64]>;
pub type DestList = SmallVec<[(i8, i8); 32]>;

const ORTHO_DIRS: [(i8, i8); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];
const ALL_DIRS: [(i8, i8); 8] = [
    (1, 0),
    (-1, 0),
    (0, 1),
    (0, -1),
    (1, 1),
    (1, -1),
    (-1, 1),
    (-1, -1),
];

/// Base sliding range per kind (before the hero bonus).
fn base_range(kind: Kind) -> i8 {
    match kind {
        Kind::Commander => 10,
        Kind::Headquarters => 0,
        Kind::Infantry | Kind::Militia | Kind::Engineer | Kind::AntiAir => 1,
        Kind::Tank | Kind::Missile => 2,
        Kind::Artillery => 3,
        Kind::AirForce | Kind::Navy => 4,
    }
}

/// Does this kind move on diagonals before promotion?
fn base_diagonal(kind: Kind) -> bool {
    matches!(
        kind,
        Kind::Militia | Kind::Artillery | Kind::AirForce | Kind::Navy
    )
}

// ============================================================================
// Move-generation context
// ============================================================================

/// Per-position scratch shared by all generator calls: the occupancy grid
/// and both sides' anti-air interdiction rings.
pub struct MoveGenContext {
    /// Index+1 of the uncarried piece on each square; 0 = empty.
    occ: [i16; SQUARES],
    /// aa_ring[s][sq]: square is interdicted by side `s`'s air defence.
    aa_ring: [[bool; SQUARES]; 2],
}

impl MoveGenContext {
    #[inline]
    pub fn occupant_idx(&self, col: i8, row: i8) -> Option<usize> {
        let v = self.occ[sq_index(col, row)];
        if v == 0 {
            None
        } else {
            Some((v - 1) as usize)
        }
    }

    #[inline]
    pub fn is_empty(&self, col: i8, row: i8) -> bool {
        self.occ[sq_index(col, row)] == 0
    }

    #[inline]
    pub fn in_ring_of(&self, side: Side, col: i8, row: i8) -> bool {
        self.aa_ring[side.index()][sq_index(col, row)]
    }
}

pub fn build_movegen_context(pieces: &[Piece]) -> MoveGenContext {
    let mut ctx = MoveGenContext {
        occ: [0; SQUARES],
        aa_ring: [[false; SQUARES]; 2],
    };
    for (i, p) in pieces.iter().enumerate() {
        if p.carrier.is_none() {
            ctx.occ[sq_index(p.col, p.row)] = (i + 1) as i16;
        }
    }
    for p in pieces.iter() {
        if p.carrier.is_some() {
            continue;
        }
        let radius = match p.kind {
            Kind::AntiAir | Kind::Navy => 1i8,
            Kind::Missile => 2,
            _ => continue,
        };
        let ring = &mut ctx.aa_ring[p.side.index()];
        for dc in -radius..=radius {
            for dr in -radius..=radius {
                let (c, r) = (p.col + dc, p.row + dr);
                if on_board(c, r) {
                    ring[sq_index(c, r)] = true;
                }
            }
        }
    }
    ctx
}

/// Is (col,row) inside the air-defence ring of `mover_side`'s opponent?
/// Standalone variant for `apply` call sites that have no context handy.
pub fn in_aa_range(pieces: &[Piece], col: i8, row: i8, mover_side: Side) -> bool {
    let enemy = mover_side.opponent();
    pieces.iter().any(|p| {
        p.side == enemy
            && p.carrier.is_none()
            && match p.kind {
                Kind::AntiAir | Kind::Navy => {
                    (p.col - col).abs() <= 1 && (p.row - row).abs() <= 1
                }
                Kind::Missile => (p.col - col).abs() <= 2 && (p.row - row).abs() <= 2,
                _ => false,
            }
    })
}

// ============================================================================
// Per-kind destination generation
// ============================================================================

/// Legal destination set for one piece. Carried pieces generate their
/// disembark moves from the carrier's square (the un-link happens in apply).
pub fn dests_for(piece: &Piece, pieces: &[Piece], ctx: &MoveGenContext) -> DestList {
    let mut out = DestList::new();
    let hero = piece.hero;

    // The HQ does not move at all until promoted; a heroic HQ fights on as
    // a heroic infantryman.
    let kind = piece.kind;
    if kind == Kind::Headquarters && !hero {
        return out;
    }
    let move_kind = if kind == Kind::Headquarters {
        Kind::Infantry
    } else {
        kind
    };

    let range = base_range(move_kind) + if hero { 1 } else { 0 };
    let dirs: &[(i8, i8)] = if hero || base_diagonal(move_kind) {
        &ALL_DIRS
    } else {
        &ORTHO_DIRS
    };

    let ferried = piece
        .carrier
        .and_then(|cid| piece_by_id(pieces, cid))
        .map_or(false, |c| c.kind == Kind::Engineer);

    match move_kind {
        Kind::Navy => gen_navy(piece, pieces, ctx, range, dirs, &mut out),
        Kind::AirForce => gen_air_force(piece, pieces, ctx, range, dirs, &mut out),
        Kind::Commander => gen_commander(piece, pieces, ctx, range, dirs, &mut out),
        _ => gen_land(piece, pieces, ctx, range, dirs, ferried, &mut out),
    }

    match move_kind {
        Kind::Tank => gen_sea_fire(piece, pieces, ctx, range, &mut out),
        Kind::Artillery => gen_sea_fire(piece, pieces, ctx, range, &mut out),
        Kind::Navy => gen_shore_fire(piece, pieces, ctx, 3 + if hero { 1 } else { 0 }, &mut out),
        Kind::Missile => gen_missile_fire(piece, pieces, ctx, &mut out),
        _ => {}
    }

    out
}

/// Ordinary ground slider: blocked by any piece, never enters the sea,
/// bridge-bound kinds may cross the river only from a reef column or while
/// ferried by an Engineer.
fn gen_land(
    piece: &Piece,
    pieces: &[Piece],
    ctx: &MoveGenContext,
    range: i8,
    dirs: &[(i8, i8)],
    ferried: bool,
    out: &mut DestList,
) {
    let bridge_bound = piece.kind.needs_bridge();
    let cross_ok = !bridge_bound || is_reef_col(piece.col) || ferried;
    for &(dc, dr) in dirs {
        for step in 1..=range {
            let (c, r) = (piece.col + dc * step, piece.row + dr * step);
            if !on_board(c, r) || is_sea(c, r) {
                break;
            }
            if crosses_river(piece.row, r) && !cross_ok {
                break;
            }
            if is_hq_square(c, r) && piece.kind != Kind::Commander {
                break;
            }
            match ctx.occupant_idx(c, r) {
                None => out.push((c, r)),
                Some(i) => {
                    let target = &pieces[i];
                    if target.side != piece.side {
                        out.push((c, r));
                    } else if can_stack(pieces, piece, target) {
                        out.push((c, r));
                    }
                    break;
                }
            }
        }
    }
}

/// Commander: rook slide, captures only at distance 1, plus the
/// face-to-face move along the enemy Commander's open file or rank.
fn gen_commander(
    piece: &Piece,
    pieces: &[Piece],
    ctx: &MoveGenContext,
    range: i8,
    dirs: &[(i8, i8)],
    out: &mut DestList,
) {
    for &(dc, dr) in dirs {
        for step in 1..=range {
            let (c, r) = (piece.col + dc * step, piece.row + dr * step);
            if !on_board(c, r) || is_sea(c, r) {
                break;
            }
            match ctx.occupant_idx(c, r) {
                None => out.push((c, r)),
                Some(i) => {
                    // Adjacent enemies only; the commander does not charge
                    // down a file into a capture.
                    if pieces[i].side != piece.side && step == 1 {
                        out.push((c, r));
                    }
                    break;
                }
            }
        }
    }

    // Face-to-face: any square sharing the enemy Commander's file or rank
    // with nothing between that square and the enemy Commander. Empty
    // squares and the enemy Commander itself are legal destinations.
    let Some(ec) = pieces
        .iter()
        .find(|p| p.side != piece.side && p.kind == Kind::Commander)
    else {
        return;
    };
    let mut consider = |c: i8, r: i8| {
        if !on_board(c, r) || is_sea(c, r) || (c == piece.col && r == piece.row) {
            return;
        }
        match ctx.occupant_idx(c, r) {
            None => {
                if clear_between(ctx, c, r, ec.col, ec.row) && !out.contains(&(c, r)) {
                    out.push((c, r));
                }
            }
            Some(i) => {
                let target = &pieces[i];
                if target.id == ec.id
                    && clear_between(ctx, piece.col, piece.row, ec.col, ec.row)
                    && (piece.col == ec.col || piece.row == ec.row)
                    && !out.contains(&(c, r))
                {
                    // The flying capture itself, along our own open line.
                    out.push((c, r));
                }
            }
        }
    };
    for r in 0..crate::board::ROWS {
        consider(ec.col, r);
    }
    for c in 0..crate::board::COLS {
        consider(c, ec.row);
    }
}

/// True when every square strictly between the two endpoints (which must
/// share a file or rank) is empty.
fn clear_between(ctx: &MoveGenContext, c0: i8, r0: i8, c1: i8, r1: i8) -> bool {
    if c0 != c1 && r0 != r1 {
        return false;
    }
    let dc = (c1 - c0).signum();
    let dr = (r1 - r0).signum();
    let (mut c, mut r) = (c0 + dc, r0 + dr);
    while (c, r) != (c1, r1) {
        if !ctx.is_empty(c, r) {
            return false;
        }
        c += dc;
        r += dr;
    }
    true
}

/// Navy: slides over navigable water; friendly pieces never block (the
/// fleet sails through its own formations), enemies do.
fn gen_navy(
    piece: &Piece,
    pieces: &[Piece],
    ctx: &MoveGenContext,
    range: i8,
    dirs: &[(i8, i8)],
    out: &mut DestList,
) {
    for &(dc, dr) in dirs {
        for step in 1..=range {
            let (c, r) = (piece.col + dc * step, piece.row + dr * step);
            if !on_board(c, r) || !is_navigable(c, r) {
                break;
            }
            match ctx.occupant_idx(c, r) {
                None => out.push((c, r)),
                Some(i) => {
                    let target = &pieces[i];
                    if target.side != piece.side {
                        out.push((c, r));
                        break;
                    }
                    if can_stack(pieces, piece, target) {
                        out.push((c, r));
                    }
                    // Friendly hulls are sailed through.
                }
            }
        }
    }
}

/// Air Force. Quiet repositioning follows the eight rays, overflying
/// friendly pieces; a non-hero's ray is cut by enemy anti-air rings. Air
/// strikes are path-free: any enemy within flight radius can be hit, and
/// the interdiction price for striking inside a ring (kamikaze) is settled
/// in apply.
fn gen_air_force(
    piece: &Piece,
    pieces: &[Piece],
    ctx: &MoveGenContext,
    range: i8,
    dirs: &[(i8, i8)],
    out: &mut DestList,
) {
    let enemy = piece.side.opponent();
    for &(dc, dr) in dirs {
        for step in 1..=range {
            let (c, r) = (piece.col + dc * step, piece.row + dr * step);
            if !on_board(c, r) {
                break;
            }
            let ringed = !piece.hero && ctx.in_ring_of(enemy, c, r);
            if ringed {
                break; // quiet flight neither enters nor crosses a ring
            }
            match ctx.occupant_idx(c, r) {
                None => {
                    // Open sea and command posts are overflown, not held.
                    if !is_sea(c, r) && !is_hq_square(c, r) {
                        out.push((c, r));
                    }
                }
                Some(i) => {
                    let target = &pieces[i];
                    if target.side != piece.side {
                        break; // no quiet flight past an interceptor
                    }
                    if can_stack(pieces, piece, target) {
                        out.push((c, r));
                        break;
                    }
                    // Friendly, not boardable: overfly.
                }
            }
        }
    }

    // Strikes: every enemy within Chebyshev flight radius, sea squares
    // only for Navy kills.
    for dc in -range..=range {
        for dr in -range..=range {
            if dc == 0 && dr == 0 {
                continue;
            }
            let (c, r) = (piece.col + dc, piece.row + dr);
            if !on_board(c, r) {
                continue;
            }
            if let Some(i) = ctx.occupant_idx(c, r) {
                let target = &pieces[i];
                if target.side != piece.side
                    && (!is_sea(c, r) || target.kind == Kind::Navy)
                    && !out.contains(&(c, r))
                {
                    out.push((c, r));
                }
            }
        }
    }
}

/// Tank and Artillery shelling of sea targets: orthogonal, clear path,
/// within the piece's own range. The attacker never leaves its square
/// (stay-and-fire is resolved in apply).
fn gen_sea_fire(
    piece: &Piece,
    pieces: &[Piece],
    ctx: &MoveGenContext,
    range: i8,
    out: &mut DestList,
) {
    let range = range.min(3); // tank guns reach 2, artillery 3
    for &(dc, dr) in ORTHO_DIRS.iter() {
        for step in 1..=range {
            let (c, r) = (piece.col + dc * step, piece.row + dr * step);
            if !on_board(c, r) {
                break;
            }
            match ctx.occupant_idx(c, r) {
                None => continue,
                Some(i) => {
                    let target = &pieces[i];
                    if target.side != piece.side && is_sea(c, r) && !out.contains(&(c, r)) {
                        out.push((c, r));
                    }
                    break;
                }
            }
        }
    }
}

/// Navy bombardment of shore targets: orthogonal, range 3, clear path,
/// only against squares the Navy could never sail onto.
fn gen_shore_fire(
    piece: &Piece,
    pieces: &[Piece],
    ctx: &MoveGenContext,
    range: i8,
    out: &mut DestList,
) {
    for &(dc, dr) in ORTHO_DIRS.iter() {
        for step in 1..=range {
            let (c, r) = (piece.col + dc * step, piece.row + dr * step);
            if !on_board(c, r) {
                break;
            }
            match ctx.occupant_idx(c, r) {
                None => continue,
                Some(i) => {
                    let target = &pieces[i];
                    if target.side != piece.side && !is_navigable(c, r) && !out.contains(&(c, r)) {
                        out.push((c, r));
                    }
                    break;
                }
            }
        }
    }
}

/// Missile strike: range-2 orthogonal or range-1 diagonal, against ground
/// or air units, never against sea squares. The range-2 shot passes over
/// blockers (it flies).
fn gen_missile_fire(piece: &Piece, pieces: &[Piece], ctx: &MoveGenContext, out: &mut DestList) {
    let mut strike = |c: i8, r: i8| {
        if !on_board(c, r) || is_sea(c, r) {
            return;
        }
        if let Some(i) = ctx.occupant_idx(c, r) {
            let target = &pieces[i];
            if target.side != piece.side && !out.contains(&(c, r)) {
                out.push((c, r));
            }
        }
    };
    for &(dc, dr) in ORTHO_DIRS.iter() {
        strike(piece.col + dc, piece.row + dr);
        strike(piece.col + dc * 2, piece.row + dr * 2);
    }
    for &(dc, dr) in &[(1i8, 1i8), (1, -1), (-1, 1), (-1, -1)] {
        strike(piece.col + dc, piece.row + dr);
    }
}

// ============================================================================
// Public operations
// ============================================================================

/// The legal destination set of one piece.
pub fn moves(piece: &Piece, pieces: &[Piece]) -> DestList {
    let ctx = build_movegen_context(pieces);
    dests_for(piece, pieces, &ctx)
}

/// All moves available to `side`, including disembark moves of carried
/// pieces.
pub fn all_moves_for(pieces: &[Piece], side: Side) -> MoveList {
    let ctx = build_movegen_context(pieces);
    let mut out = MoveList::new();
    for p in pieces.iter() {
        if p.side != side {
            continue;
        }
        for (dc, dr) in dests_for(p, pieces, &ctx) {
            out.push(Move::new(p.id, dc, dr));
        }
    }
    out
}

/// Membership test used by the public apply path.
pub fn has_legal_destination(piece: &Piece, pieces: &[Piece], dc: i8, dr: i8) -> bool {
    moves(piece, pieces).contains(&(dc, dr))
}

/// True when any piece of `side` has (col,row) in its destination set —
/// i.e. could move to or capture on that square right now.
pub fn square_attacked_by(pieces: &[Piece], col: i8, row: i8, side: Side) -> bool {
    let ctx = build_movegen_context(pieces);
    pieces.iter().any(|p| {
        p.side == side && dests_for(p, pieces, &ctx).contains(&(col, row))
    })
}

// ============================================================================
// Tests
// ============================================================================
