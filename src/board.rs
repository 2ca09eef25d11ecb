use serde::{Deserialize, Serialize};

// ============================================================================
// Board geometry
// ============================================================================

/// Board width in columns (0..=10).
pub const COLS: i8 = 11;
/// Board height in rows (0..=11). Red's home is rows 0-4, blue's is 7-11.
pub const ROWS: i8 = 12;
/// Total square count.
pub const SQUARES: usize = (COLS as usize) * (ROWS as usize);

#[inline]
pub fn on_board(col: i8, row: i8) -> bool {
    col >= 0 && col < COLS && row >= 0 && row < ROWS
}

/// Flattened square index in 0..SQUARES.
#[inline]
pub fn sq_index(col: i8, row: i8) -> usize {
    (row as usize) * (COLS as usize) + (col as usize)
}

#[inline]
pub fn sq_col(sq: usize) -> i8 {
    (sq % (COLS as usize)) as i8
}

#[inline]
pub fn sq_row(sq: usize) -> i8 {
    (sq / (COLS as usize)) as i8
}

/// Open sea: the two westmost columns, every row.
#[inline]
pub fn is_sea(col: i8, row: i8) -> bool {
    on_board(col, row) && col <= 1
}

/// Reef columns interrupt the river and carry the land bridges.
#[inline]
pub fn is_reef_col(col: i8) -> bool {
    col == 5 || col == 7
}

/// River water: rows 5-6 east of the coast, minus the bridge columns.
#[inline]
pub fn is_river_water(col: i8, row: i8) -> bool {
    on_board(col, row) && (row == 5 || row == 6) && col >= 2 && !is_reef_col(col)
}

/// Squares the Navy may occupy or sail through.
#[inline]
pub fn is_navigable(col: i8, row: i8) -> bool {
    is_sea(col, row) || is_river_water(col, row)
}

/// The four command-post squares. Only the Commander may stand here.
#[inline]
pub fn is_hq_square(col: i8, row: i8) -> bool {
    (row == 0 || row == 11) && (col == 4 || col == 6)
}

/// The river seam runs between rows 5 and 6.
#[inline]
pub fn crosses_river(from_row: i8, to_row: i8) -> bool {
    (from_row <= 5 && to_row >= 6) || (from_row >= 6 && to_row <= 5)
}

// ============================================================================
// Side
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Side {
    Red = 0,
    Blue = 1,
}

impl Side {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "red" | "r" => Some(Side::Red),
            "blue" | "b" => Some(Side::Blue),
            _ => None,
        }
    }

    pub fn to_str(&self) -> &'static str {
        match self {
            Side::Red => "red",
            Side::Blue => "blue",
        }
    }

    #[inline]
    pub fn opponent(&self) -> Self {
        match self {
            Side::Red => Side::Blue,
            Side::Blue => Side::Red,
        }
    }

    #[inline]
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Forward direction along rows: red advances toward row 11.
    #[inline]
    pub fn forward(&self) -> i8 {
        match self {
            Side::Red => 1,
            Side::Blue => -1,
        }
    }
}

// ============================================================================
// Kind
// ============================================================================

/// The eleven unit kinds. Discriminants double as table indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Kind {
    #[serde(rename = "C")]
    Commander = 0,
    #[serde(rename = "H")]
    Headquarters = 1,
    #[serde(rename = "In")]
    Infantry = 2,
    #[serde(rename = "M")]
    Militia = 3,
    #[serde(rename = "T")]
    Tank = 4,
    #[serde(rename = "E")]
    Engineer = 5,
    #[serde(rename = "A")]
    Artillery = 6,
    #[serde(rename = "Aa")]
    AntiAir = 7,
    #[serde(rename = "Ms")]
    Missile = 8,
    #[serde(rename = "Af")]
    AirForce = 9,
    #[serde(rename = "N")]
    Navy = 10,
}

pub const NUM_KINDS: usize = 11;

pub const ALL_KINDS: [Kind; NUM_KINDS] = [
    Kind::Commander,
    Kind::Headquarters,
    Kind::Infantry,
    Kind::Militia,
    Kind::Tank,
    Kind::Engineer,
    Kind::Artillery,
    Kind::AntiAir,
    Kind::Missile,
    Kind::AirForce,
    Kind::Navy,
];

impl Kind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "C" => Some(Kind::Commander),
            "H" => Some(Kind::Headquarters),
            "In" => Some(Kind::Infantry),
            "M" => Some(Kind::Militia),
            "T" => Some(Kind::Tank),
            "E" => Some(Kind::Engineer),
            "A" => Some(Kind::Artillery),
            "Aa" => Some(Kind::AntiAir),
            "Ms" => Some(Kind::Missile),
            "Af" => Some(Kind::AirForce),
            "N" => Some(Kind::Navy),
            _ => None,
        }
    }

    pub fn to_str(&self) -> &'static str {
        match self {
            Kind::Commander => "C",
            Kind::Headquarters => "H",
            Kind::Infantry => "In",
            Kind::Militia => "M",
            Kind::Tank => "T",
            Kind::Engineer => "E",
            Kind::Artillery => "A",
            Kind::AntiAir => "Aa",
            Kind::Missile => "Ms",
            Kind::AirForce => "Af",
            Kind::Navy => "N",
        }
    }

    /// Canonical material value (×10 scale).
    #[inline]
    pub fn value(&self) -> i32 {
        match self {
            Kind::Commander => 1000,
            Kind::Headquarters => 0,
            Kind::Infantry => 100,
            Kind::Militia => 100,
            Kind::Tank => 200,
            Kind::Engineer => 100,
            Kind::Artillery => 300,
            Kind::AntiAir => 100,
            Kind::Missile => 200,
            Kind::AirForce => 400,
            Kind::Navy => 800,
        }
    }

    #[inline]
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Foot units that may ride a Tank, Air Force or Navy.
    #[inline]
    pub fn is_person(&self) -> bool {
        matches!(
            self,
            Kind::Infantry | Kind::Militia | Kind::Engineer | Kind::Commander
        )
    }

    /// Units subject to the bridge/ferry river-crossing restriction.
    #[inline]
    pub fn needs_bridge(&self) -> bool {
        matches!(self, Kind::Artillery | Kind::AntiAir | Kind::Missile)
    }

    /// Units counted by the land-battle objective.
    #[inline]
    pub fn is_land_force(&self) -> bool {
        matches!(self, Kind::Tank | Kind::Infantry | Kind::Artillery)
    }
}

// ============================================================================
// Piece
// ============================================================================

/// A unit on the board. `id` is stable for the lifetime of a game. A piece
/// with `carrier` set is riding that carrier: its (col,row) mirrors the
/// carrier's and it does not occupy the square for blocking purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Piece {
    pub id: i32,
    #[serde(rename = "player")]
    pub side: Side,
    pub kind: Kind,
    pub col: i8,
    pub row: i8,
    #[serde(default)]
    pub hero: bool,
    #[serde(rename = "carrier_id", default)]
    pub carrier: Option<i32>,
}

impl Piece {
    pub fn new(id: i32, side: Side, kind: Kind, col: i8, row: i8) -> Self {
        Piece {
            id,
            side,
            kind,
            col,
            row,
            hero: false,
            carrier: None,
        }
    }

    #[inline]
    pub fn is_carried(&self) -> bool {
        self.carrier.is_some()
    }
}

/// The board is the flat piece list; 38 pieces at most in practice.
pub type PieceList = Vec<Piece>;

/// The uncarried piece standing on (col,row), if any.
pub fn piece_at(pieces: &[Piece], col: i8, row: i8) -> Option<&Piece> {
    pieces
        .iter()
        .find(|p| p.carrier.is_none() && p.col == col && p.row == row)
}

pub fn piece_by_id(pieces: &[Piece], id: i32) -> Option<&Piece> {
    pieces.iter().find(|p| p.id == id)
}

pub fn piece_idx_by_id(pieces: &[Piece], id: i32) -> Option<usize> {
    pieces.iter().position(|p| p.id == id)
}

pub fn piece_idx_at(pieces: &[Piece], col: i8, row: i8) -> Option<usize> {
    pieces
        .iter()
        .position(|p| p.carrier.is_none() && p.col == col && p.row == row)
}

/// Direct passengers of `carrier_id`.
pub fn carried_children<'a>(
    pieces: &'a [Piece],
    carrier_id: i32,
) -> impl Iterator<Item = &'a Piece> + 'a {
    pieces.iter().filter(move |p| p.carrier == Some(carrier_id))
}

pub fn has_carried_children(pieces: &[Piece], carrier_id: i32) -> bool {
    pieces.iter().any(|p| p.carrier == Some(carrier_id))
}

// ============================================================================
// Terrain legality & stacking capacity
// ============================================================================

/// May a piece of `kind` stand on (col,row)? Ignores occupancy. The Air
/// Force exception (sea landing while capturing a Navy) is handled by the
/// move generator, not here.
pub fn can_occupy(kind: Kind, col: i8, row: i8) -> bool {
    if !on_board(col, row) {
        return false;
    }
    if is_hq_square(col, row) {
        return kind == Kind::Commander;
    }
    match kind {
        Kind::Navy => is_navigable(col, row),
        _ => !is_sea(col, row),
    }
}

/// May `carrier` take `passenger` aboard at all? (Capacity is checked
/// separately.) Only Tank, Air Force and Navy may carry a Commander; the
/// Headquarters is never carried.
pub fn can_carry_kind(carrier: Kind, passenger: Kind) -> bool {
    if passenger == Kind::Headquarters {
        return false;
    }
    match carrier {
        Kind::Navy => {
            passenger == Kind::AirForce || passenger == Kind::Tank || passenger.is_person()
        }
        Kind::AirForce => passenger == Kind::Tank || passenger.is_person(),
        Kind::Tank => passenger.is_person(),
        Kind::Engineer => passenger.needs_bridge(),
        _ => false,
    }
}

/// Validate the direct-passenger multiset of one carrier against its
/// capacity class.
pub fn carrier_capacity_valid(pieces: &[Piece], carrier_id: i32, carrier_kind: Kind) -> bool {
    let mut air = 0u8;
    let mut tank = 0u8;
    let mut person = 0u8;
    let mut ferry = 0u8;
    let mut other = 0u8;
    for child in carried_children(pieces, carrier_id) {
        match child.kind {
            Kind::AirForce => air += 1,
            Kind::Tank => tank += 1,
            k if k.is_person() => person += 1,
            k if k.needs_bridge() => ferry += 1,
            _ => other += 1,
        }
    }
    if other > 0 {
        return false;
    }
    match carrier_kind {
        Kind::Navy => {
            ferry == 0
                && matches!(
                    (air, tank, person),
                    (0, 0, 0)
                        | (1, 0, 0)
                        | (2, 0, 0)
                        | (0, 1, 0)
                        | (0, 2, 0)
                        | (1, 1, 0)
                        | (1, 0, 1)
                        | (0, 0, 1)
                )
        }
        Kind::AirForce => {
            ferry == 0 && air == 0 && matches!((tank, person), (0, 0) | (1, 0) | (0, 1))
        }
        Kind::Tank => air == 0 && tank == 0 && ferry == 0 && person <= 1,
        Kind::Engineer => air == 0 && tank == 0 && person == 0 && ferry <= 1,
        _ => air == 0 && tank == 0 && person == 0 && ferry == 0,
    }
}

/// May `mover` legally end its move on `target`'s square, becoming its
/// carrier? Checks kind pairing and the mover's capacity after pickup.
pub fn can_stack(pieces: &[Piece], mover: &Piece, target: &Piece) -> bool {
    if mover.id == target.id || mover.side != target.side || target.carrier.is_some() {
        return false;
    }
    if !can_carry_kind(mover.kind, target.kind) {
        return false;
    }
    // Terrain still binds: the mover must be able to stand on the pickup
    // square itself.
    if !can_occupy(mover.kind, target.col, target.row) {
        return false;
    }
    // Simulate the pickup and re-check the mover's capacity class.
    let mut air = 0u8;
    let mut tank = 0u8;
    let mut person = 0u8;
    let mut ferry = 0u8;
    let count = |k: Kind, air: &mut u8, tank: &mut u8, person: &mut u8, ferry: &mut u8| match k {
        Kind::AirForce => *air += 1,
        Kind::Tank => *tank += 1,
        k if k.is_person() => *person += 1,
        k if k.needs_bridge() => *ferry += 1,
        _ => {}
    };
    for child in carried_children(pieces, mover.id) {
        count(child.kind, &mut air, &mut tank, &mut person, &mut ferry);
    }
    count(target.kind, &mut air, &mut tank, &mut person, &mut ferry);
    match mover.kind {
        Kind::Navy => {
            ferry == 0
                && matches!(
                    (air, tank, person),
                    (1, 0, 0)
                        | (2, 0, 0)
                        | (0, 1, 0)
                        | (0, 2, 0)
                        | (1, 1, 0)
                        | (1, 0, 1)
                        | (0, 0, 1)
                )
        }
        Kind::AirForce => ferry == 0 && air == 0 && matches!((tank, person), (1, 0) | (0, 1)),
        Kind::Tank => air == 0 && tank == 0 && ferry == 0 && person == 1,
        Kind::Engineer => air == 0 && tank == 0 && person == 0 && ferry == 1,
        _ => false,
    }
}

// ============================================================================
// Initial setup
// ============================================================================

/// Red half of the initial deployment; blue mirrors it through row' = 11-row.
const RED_SETUP: [(Kind, i8, i8); 19] = [
    (Kind::Missile, 2, 0),
    (Kind::Artillery, 3, 0),
    (Kind::Commander, 4, 0),
    (Kind::Headquarters, 5, 0),
    (Kind::Artillery, 7, 0),
    (Kind::Missile, 8, 0),
    (Kind::Navy, 0, 1),
    (Kind::Engineer, 4, 1),
    (Kind::Engineer, 6, 1),
    (Kind::AntiAir, 3, 2),
    (Kind::Tank, 6, 2),
    (Kind::AntiAir, 7, 2),
    (Kind::Navy, 0, 3),
    (Kind::Infantry, 2, 3),
    (Kind::Infantry, 4, 3),
    (Kind::Militia, 6, 3),
    (Kind::AirForce, 3, 4),
    (Kind::Tank, 5, 4),
    (Kind::AirForce, 7, 4),
];

/// Build the 38-piece starting position. Ids are assigned in deployment
/// order (red 1..=19, blue 20..=38) and stay stable for the whole game.
pub fn initial_setup() -> PieceList {
    let mut pieces = PieceList::with_capacity(38);
    let mut id = 1;
    for &(kind, col, row) in RED_SETUP.iter() {
        pieces.push(Piece::new(id, Side::Red, kind, col, row));
        id += 1;
    }
    for &(kind, col, row) in RED_SETUP.iter() {
        pieces.push(Piece::new(id, Side::Blue, kind, col, 11 - row));
        id += 1;
    }
    pieces
}

// ============================================================================
// State validation
// ============================================================================

/// Full structural validation (piece ids, occupancy, carrier links,
/// capacity classes). Returns a human-readable reason on failure; used by
/// debug assertions and the simulation driver.
pub fn validate_state_verbose(pieces: &[Piece]) -> Result<(), String> {
    use rustc_hash::FxHashSet;

    if pieces.len() > SQUARES {
        return Err("piece count exceeds board capacity".into());
    }

    let mut ids: FxHashSet<i32> = FxHashSet::default();
    let mut occupied: FxHashSet<(i8, i8)> = FxHashSet::default();
    for p in pieces {
        if !on_board(p.col, p.row) {
            return Err(format!("piece {} out of bounds", p.id));
        }
        if !ids.insert(p.id) {
            return Err(format!("duplicate piece id {}", p.id));
        }
        if p.carrier.is_none() && !occupied.insert((p.col, p.row)) {
            return Err(format!(
                "square ({},{}) occupied by multiple pieces",
                p.col, p.row
            ));
        }
        if is_hq_square(p.col, p.row) && p.carrier.is_none() && p.kind != Kind::Commander {
            return Err(format!("non-commander piece {} on an HQ square", p.id));
        }
    }

    for p in pieces {
        let Some(cid) = p.carrier else { continue };
        if cid == p.id {
            return Err(format!("piece {} carries itself", p.id));
        }
        let Some(c) = piece_by_id(pieces, cid) else {
            return Err(format!("piece {} has a missing carrier", p.id));
        };
        if c.side != p.side {
            return Err(format!("cross-player carrying link on piece {}", p.id));
        }
        if !can_carry_kind(c.kind, p.kind) {
            return Err(format!(
                "illegal carrier/passenger pairing {}->{}",
                c.kind.to_str(),
                p.kind.to_str()
            ));
        }
        if p.col != c.col || p.row != c.row {
            return Err(format!("carried piece {} desynced from carrier", p.id));
        }
    }

    for p in pieces {
        if !carrier_capacity_valid(pieces, p.id, p.kind) {
            return Err(format!("carrier {} capacity exceeded", p.id));
        }
    }

    // Carrier links must form a forest: walk up from every piece, bounded
    // by the piece count.
    for p in pieces {
        let mut hops = 0;
        let mut cur = p.carrier;
        while let Some(cid) = cur {
            hops += 1;
            if hops > pieces.len() {
                return Err(format!("carrier cycle reaching piece {}", p.id));
            }
            cur = piece_by_id(pieces, cid).and_then(|c| c.carrier);
        }
    }

    Ok(())
}

pub fn validate_state(pieces: &[Piece]) -> bool {
    validate_state_verbose(pieces).is_ok()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_predicates() {
        assert!(is_sea(0, 0));
        assert!(is_sea(1, 11));
        assert!(!is_sea(2, 5));
        assert!(is_river_water(2, 5));
        assert!(is_river_water(10, 6));
        assert!(!is_river_water(5, 5), "bridge column is not water");
        assert!(!is_river_water(7, 6), "bridge column is not water");
        assert!(is_navigable(0, 7));
        assert!(is_navigable(3, 6));
        assert!(!is_navigable(3, 4));
        assert!(is_hq_square(4, 0));
        assert!(is_hq_square(6, 11));
        assert!(!is_hq_square(5, 0));
        assert!(crosses_river(5, 6));
        assert!(crosses_river(7, 4));
        assert!(!crosses_river(6, 7));
        assert!(!crosses_river(4, 5));
    }

    #[test]
    fn test_kind_round_trip() {
        for kind in ALL_KINDS {
            assert_eq!(Kind::from_str(kind.to_str()), Some(kind));
        }
        assert_eq!(Kind::from_str("X"), None);
    }

    #[test]
    fn test_side_parsing() {
        assert_eq!(Side::from_str("red"), Some(Side::Red));
        assert_eq!(Side::from_str("BLUE"), Some(Side::Blue));
        assert_eq!(Side::from_str("green"), None);
        assert_eq!(Side::Red.opponent(), Side::Blue);
    }

    #[test]
    fn test_can_occupy() {
        assert!(can_occupy(Kind::Navy, 0, 4));
        assert!(!can_occupy(Kind::Navy, 4, 4));
        assert!(can_occupy(Kind::Navy, 3, 5));
        assert!(!can_occupy(Kind::Infantry, 0, 4));
        assert!(can_occupy(Kind::Infantry, 3, 6));
        assert!(can_occupy(Kind::Commander, 4, 0), "commander may enter HQ");
        assert!(!can_occupy(Kind::Tank, 4, 0), "only the commander enters HQ");
    }

    #[test]
    fn test_navy_capacity_classes() {
        let mut pieces = vec![Piece::new(1, Side::Red, Kind::Navy, 0, 1)];
        let mut af1 = Piece::new(2, Side::Red, Kind::AirForce, 0, 1);
        af1.carrier = Some(1);
        let mut af2 = Piece::new(3, Side::Red, Kind::AirForce, 0, 1);
        af2.carrier = Some(1);
        pieces.push(af1);
        pieces.push(af2);
        // 2 aircraft: ok
        assert!(carrier_capacity_valid(&pieces, 1, Kind::Navy));

        // aircraft + tank: ok
        pieces[2].kind = Kind::Tank;
        assert!(carrier_capacity_valid(&pieces, 1, Kind::Navy));

        // tank + person: not a legal combination
        pieces[1].kind = Kind::Infantry;
        assert!(!carrier_capacity_valid(&pieces, 1, Kind::Navy));

        // lone person: ok
        pieces.remove(2);
        assert!(carrier_capacity_valid(&pieces, 1, Kind::Navy));
    }

    #[test]
    fn test_airforce_never_carries_airforce() {
        assert!(!can_carry_kind(Kind::AirForce, Kind::AirForce));
        assert!(can_carry_kind(Kind::AirForce, Kind::Tank));
        assert!(can_carry_kind(Kind::AirForce, Kind::Commander));
    }

    #[test]
    fn test_hq_never_carried() {
        for kind in ALL_KINDS {
            assert!(!can_carry_kind(kind, Kind::Headquarters));
        }
    }

    #[test]
    fn test_commander_carriers() {
        assert!(can_carry_kind(Kind::Tank, Kind::Commander));
        assert!(can_carry_kind(Kind::Navy, Kind::Commander));
        assert!(can_carry_kind(Kind::AirForce, Kind::Commander));
        assert!(!can_carry_kind(Kind::Engineer, Kind::Commander));
    }

    #[test]
    fn test_engineer_ferry_cargo() {
        assert!(can_carry_kind(Kind::Engineer, Kind::Artillery));
        assert!(can_carry_kind(Kind::Engineer, Kind::AntiAir));
        assert!(can_carry_kind(Kind::Engineer, Kind::Missile));
        assert!(!can_carry_kind(Kind::Engineer, Kind::Tank));
        assert!(!can_carry_kind(Kind::Engineer, Kind::Infantry));
    }

    #[test]
    fn test_can_stack_tank_picks_up_infantry() {
        let tank = Piece::new(1, Side::Red, Kind::Tank, 4, 2);
        let inf = Piece::new(2, Side::Red, Kind::Infantry, 4, 3);
        let pieces = vec![tank, inf];
        assert!(can_stack(&pieces, &pieces[0], &pieces[1]));
        // Tank already carrying someone cannot take a second rider.
        let mut loaded = pieces.clone();
        loaded.push({
            let mut m = Piece::new(3, Side::Red, Kind::Militia, 4, 2);
            m.carrier = Some(1);
            m
        });
        assert!(!can_stack(&loaded, &loaded[0], &loaded[1]));
    }

    #[test]
    fn test_initial_setup_shape() {
        let pieces = initial_setup();
        assert_eq!(pieces.len(), 38);
        assert!(validate_state(&pieces));

        let red_cmd = pieces
            .iter()
            .filter(|p| p.side == Side::Red && p.kind == Kind::Commander)
            .count();
        let blue_cmd = pieces
            .iter()
            .filter(|p| p.side == Side::Blue && p.kind == Kind::Commander)
            .count();
        assert_eq!(red_cmd, 1);
        assert_eq!(blue_cmd, 1);

        // Navies start at sea, mirrored.
        assert!(pieces
            .iter()
            .any(|p| p.side == Side::Blue && p.kind == Kind::Navy && p.col == 0 && p.row == 10));
        assert!(pieces
            .iter()
            .any(|p| p.side == Side::Blue && p.kind == Kind::Navy && p.col == 0 && p.row == 8));

        // Every piece stands on terrain legal for its kind.
        for p in &pieces {
            assert!(can_occupy(p.kind, p.col, p.row), "{:?} misplaced", p);
        }
    }

    #[test]
    fn test_validate_catches_duplicates() {
        let mut pieces = initial_setup();
        pieces[1].id = pieces[0].id;
        assert!(validate_state_verbose(&pieces)
            .unwrap_err()
            .contains("duplicate"));
    }

    #[test]
    fn test_validate_catches_shared_square() {
        let mut pieces = initial_setup();
        pieces[1].col = pieces[14].col;
        pieces[1].row = pieces[14].row;
        assert!(validate_state_verbose(&pieces)
            .unwrap_err()
            .contains("occupied"));
    }

    #[test]
    fn test_piece_serde_field_names() {
        let p = Piece::new(7, Side::Blue, Kind::AirForce, 3, 7);
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains("\"player\":\"blue\""));
        assert!(json.contains("\"kind\":\"Af\""));
        assert!(json.contains("\"carrier_id\":null"));
        let back: Piece = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }
}
