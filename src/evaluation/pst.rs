//! Phase-interpolated piece-square tables.
//!
//! Tables are generated once per process from compact shape rules rather
//! than hand-typed grids; red's table is built directly and blue reads it
//! through the row mirror.

use once_cell::sync::Lazy;

use crate::board::{
    is_navigable, is_reef_col, is_sea, sq_index, Kind, Side, ALL_KINDS, COLS, NUM_KINDS, ROWS,
    SQUARES,
};

struct PstTables {
    mid: [[i16; SQUARES]; NUM_KINDS],
    end: [[i16; SQUARES]; NUM_KINDS],
}

/// Shape rules for one square from red's point of view. `advance` is the
/// row index itself (red pushes toward row 11).
fn square_scores(kind: Kind, col: i8, row: i8) -> (i16, i16) {
    let advance = row as i32;
    let center_col = 5 - (col as i32 - 5).abs(); // 0 at the edges, 5 in the middle
    let river_gap = (if row <= 5 { 5 - row } else { row - 6 }) as i32;

    let (mid, end): (i32, i32) = match kind {
        Kind::Commander => {
            // Stay sheltered in the backfield while armies are on the board;
            // walk out only once the game empties.
            let home = (2 - advance).max(0) * 12;
            let exposure = (advance - 2).max(0) * -8;
            (home + exposure + center_col, center_col * 3 - advance.min(6))
        }
        Kind::Headquarters => (0, 0),
        Kind::Infantry => (advance * 3 + center_col, advance * 6 + center_col),
        Kind::Militia => (advance * 2 + center_col, advance * 4 + center_col),
        Kind::Tank => {
            let bridge = if is_reef_col(col) && river_gap <= 2 { 8 } else { 0 };
            (advance * 2 + center_col * 2 + bridge, advance * 4 + center_col)
        }
        Kind::Engineer => {
            let bridge = if is_reef_col(col) && river_gap <= 3 { 6 } else { 0 };
            (center_col + bridge, advance + center_col)
        }
        Kind::Artillery => {
            // Artillery shells across the river from its own bank.
            let bank = if (2..=5).contains(&row) { 10 } else { 0 };
            let bridge = if is_reef_col(col) { 6 } else { 0 };
            (bank + bridge + center_col, center_col * 2)
        }
        Kind::AntiAir => {
            // Air cover belongs over the home half.
            let home_cover = (5 - advance).max(0) * 3;
            (home_cover + center_col, center_col)
        }
        Kind::Missile => {
            let launch = if (2..=6).contains(&row) { 8 } else { 0 };
            (launch + center_col * 2, advance + center_col * 2)
        }
        Kind::AirForce => {
            // Airfields near the middle of the board dominate both halves.
            let altitude = if (3..=8).contains(&row) { 10 } else { 0 };
            (altitude + center_col * 2, altitude / 2 + center_col)
        }
        Kind::Navy => {
            if !is_navigable(col, row) {
                (0, 0)
            } else {
                let mouth = if row == 5 || row == 6 { 12 } else { 0 };
                let open_sea = if is_sea(col, row) { 6 } else { 0 };
                (mouth + open_sea + advance, mouth + advance * 2)
            }
        }
    };
    (mid as i16, end as i16)
}

static TABLES: Lazy<PstTables> = Lazy::new(|| {
    let mut mid = [[0i16; SQUARES]; NUM_KINDS];
    let mut end = [[0i16; SQUARES]; NUM_KINDS];
    for kind in ALL_KINDS {
        for row in 0..ROWS {
            for col in 0..COLS {
                let (m, e) = square_scores(kind, col, row);
                mid[kind.index()][sq_index(col, row)] = m;
                end[kind.index()][sq_index(col, row)] = e;
            }
        }
    }
    PstTables { mid, end }
});

/// Midgame/endgame pair for a piece of `side` standing on (col,row).
#[inline]
pub fn pst(kind: Kind, side: Side, col: i8, row: i8) -> (i32, i32) {
    let row = match side {
        Side::Red => row,
        Side::Blue => 11 - row,
    };
    let sq = sq_index(col, row);
    (
        TABLES.mid[kind.index()][sq] as i32,
        TABLES.end[kind.index()][sq] as i32,
    )
}

/// Interpolated value at `phase` (256 = midgame, 0 = endgame).
#[inline]
pub fn pst_phased(kind: Kind, side: Side, col: i8, row: i8, phase: i32) -> i32 {
    let (mid, end) = pst(kind, side, col, row);
    (mid * phase + end * (256 - phase)) / 256
}
