use std::sync::atomic::{AtomicBool, Ordering};

use crate::attacks::{attackers_to_square, AttackCache};
use crate::board::{is_sea, on_board, piece_at, Kind, Piece, Side};

pub mod pst;
pub use pst::{pst, pst_phased};

// ==================== Piece values ====================

#[inline]
pub fn get_piece_value(kind: Kind) -> i32 {
    kind.value()
}

/// Material value with the heroic premium.
#[inline]
pub fn piece_material(p: &Piece) -> i32 {
    let v = p.kind.value();
    if p.hero {
        v * 3 / 2
    } else {
        v
    }
}

// ==================== Game phase ====================

/// Total non-Commander, non-HQ material of both armies at the start.
const FULL_MATERIAL: i32 = 9000;

/// 256 = full midgame, 0 = bare endgame.
pub fn compute_game_phase(pieces: &[Piece]) -> i32 {
    let total: i32 = pieces
        .iter()
        .filter(|p| p.kind != Kind::Commander && p.kind != Kind::Headquarters)
        .map(|p| p.kind.value())
        .sum();
    (total * 256 / FULL_MATERIAL).min(256)
}

// ==================== Evaluation backends ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalBackend {
    Auto,
    Cpu,
    WebGpu,
}

impl EvalBackend {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Some(EvalBackend::Auto),
            "cpu" => Some(EvalBackend::Cpu),
            "webgpu" => Some(EvalBackend::WebGpu),
            _ => None,
        }
    }

    /// Auto resolves to the CPU path; there is no compiled GPU kernel yet.
    pub fn resolved(&self) -> EvalBackend {
        match self {
            EvalBackend::Auto => EvalBackend::Cpu,
            other => *other,
        }
    }
}

static WEBGPU_NOTICE: AtomicBool = AtomicBool::new(false);

/// One position to score. The evaluator is defined over batches so a GPU
/// backend can be slotted in behind the same interface later.
pub struct EvalRequest<'a> {
    pub pieces: &'a [Piece],
    pub perspective: Side,
    pub cache: Option<&'a AttackCache>,
    pub side_to_move: Option<Side>,
}

pub fn score_batch(backend: EvalBackend, batch: &[EvalRequest<'_>]) -> Vec<i32> {
    if backend.resolved() == EvalBackend::WebGpu
        && !WEBGPU_NOTICE.swap(true, Ordering::Relaxed)
    {
        log::warn!("webgpu evaluator backend selected; batched path enabled, CPU fallback active");
    }
    batch
        .iter()
        .map(|req| board_score(req.pieces, req.perspective, req.cache, req.side_to_move))
        .collect()
}

pub fn score_single(backend: EvalBackend, req: EvalRequest<'_>) -> i32 {
    score_batch(backend, std::slice::from_ref(&req))
        .pop()
        .unwrap_or(0)
}

// ==================== Static evaluation ====================

/// Quadratic penalty for attackers bearing on one's own commander.
const CMD_ATTACKER_PENALTY: [i32; 7] = [0, 40, 120, 260, 450, 700, 1000];

/// Navy count is an objective in itself: losing the fleet is close to
/// losing the marine war, keeping both ships dominates the water.
const NAVY_STRAT: [i32; 3] = [-2000, 600, 2500];

/// Full positional score of `pieces` from `perspective`'s point of view.
/// `cache`, when valid, supplies per-square attacker counts; without it
/// the evaluator falls back to direct scans.
pub fn board_score(
    pieces: &[Piece],
    perspective: Side,
    cache: Option<&AttackCache>,
    side_to_move: Option<Side>,
) -> i32 {
    let phase = compute_game_phase(pieces);

    let threat_bonus = 350;
    let space_adv_weight = if phase > 128 { 4 } else { 6 };
    let space_center_bonus = if phase > 128 { 12 } else { 18 };
    let cmd_attack_weight = if phase > 128 { 150 } else { 110 };
    let tempo_bonus = 20;
    let contempt_bonus = 35;

    let mut score: i32 = 0;

    // Piece counts for the strategic terms.
    let mut my_navy = 0;
    let mut opp_navy = 0;
    let mut my_af = 0;
    let mut opp_af = 0;
    let mut my_land = 0;
    let mut opp_land = 0;
    let mut my_tank = 0;
    let mut opp_tank = 0;
    let mut my_count = 0;
    let mut opp_count = 0;

    let mut my_cmd: Option<&Piece> = None;
    let mut opp_cmd: Option<&Piece> = None;

    for p in pieces {
        let mine = p.side == perspective;
        if p.kind == Kind::Commander {
            if mine {
                my_cmd = Some(p);
            } else {
                opp_cmd = Some(p);
            }
            continue;
        }
        if p.kind == Kind::Headquarters {
            continue;
        }
        if mine {
            my_count += 1;
        } else {
            opp_count += 1;
        }
        match p.kind {
            Kind::Navy => {
                if mine {
                    my_navy += 1
                } else {
                    opp_navy += 1
                }
            }
            Kind::AirForce => {
                if mine {
                    my_af += 1
                } else {
                    opp_af += 1
                }
            }
            Kind::Tank => {
                if mine {
                    my_tank += 1
                } else {
                    opp_tank += 1
                }
            }
            _ => {}
        }
        if p.kind.is_land_force() {
            if mine {
                my_land += 1
            } else {
                opp_land += 1
            }
        }
    }

    let attackers = |col: i8, row: i8, side: Side| -> i32 {
        attackers_to_square(pieces, col, row, side, cache)
    };

    // Per-piece terms.
    for p in pieces {
        if p.kind == Kind::Headquarters {
            continue;
        }
        let mine = p.side == perspective;
        let sign = if mine { 1 } else { -1 };

        let mat = piece_material(p);
        let pst_score = pst_phased(p.kind, p.side, p.col, p.row, phase);

        // Threat on the enemy commander.
        let mut threat = 0;
        if p.kind != Kind::Commander && !p.hero {
            let target_cmd = if mine { opp_cmd } else { my_cmd };
            if let Some(oc) = target_cmd {
                if attackers(oc.col, oc.row, p.side) > 0
                    && crate::moves::moves(p, pieces).contains(&(oc.col, oc.row))
                {
                    threat = threat_bonus;
                }
            }
        }

        // Heroes press toward the enemy commander.
        let mut hero_bonus = 0;
        if p.hero {
            let target_cmd = if mine { opp_cmd } else { my_cmd };
            if let Some(ec) = target_cmd {
                let dist = (p.col - ec.col).abs() as i32 + (p.row - ec.row).abs() as i32;
                hero_bonus = (160 - dist * 18).max(0);
            }
        }

        // Space: advancement and the central box.
        let mut space = 0;
        if !matches!(p.kind, Kind::Commander | Kind::Navy) {
            let advance = if p.side == Side::Red {
                p.row as i32
            } else {
                11 - p.row as i32
            };
            space += advance * space_adv_weight;
            if (3..=7).contains(&p.col) && (4..=7).contains(&p.row) {
                space += space_center_bonus;
            }
        }

        // Hanging pieces.
        let mut hanging = 0;
        if p.kind != Kind::Commander && p.carrier.is_none() {
            let atk = attackers(p.col, p.row, p.side.opponent());
            let def = attackers(p.col, p.row, p.side);
            if atk > 0 && def == 0 {
                hanging = -(mat * 2 / 3);
            } else if atk > def && mat > 200 {
                hanging = -(mat / 4);
            }
        }

        // Kind-specific structure.
        let mut special = 0;
        match p.kind {
            Kind::Navy => {
                let atk = attackers(p.col, p.row, p.side.opponent());
                let def = attackers(p.col, p.row, p.side);
                special -= atk * 180;
                special += def * 70;
                if atk > def {
                    special -= (atk - def) * 140;
                }
                if is_sea(p.col, p.row) {
                    special += 25;
                }
                // Cargo raises the stakes of losing the hull.
                let cargo: i32 = crate::board::carried_children(pieces, p.id)
                    .map(piece_material)
                    .sum();
                if atk > def && cargo > 0 {
                    special -= cargo / 3;
                }
            }
            Kind::AirForce => {
                let atk = attackers(p.col, p.row, p.side.opponent());
                let def = attackers(p.col, p.row, p.side);
                special -= atk * 180;
                special += def * 65;
                if atk > def {
                    special -= (atk - def) * 300;
                }
                // Cross-domain pressure: a wing in strike range of an
                // enemy hull dominates the coast.
                for q in pieces.iter() {
                    if q.side != p.side && q.kind == Kind::Navy {
                        let reach = (p.col - q.col).abs().max((p.row - q.row).abs());
                        if reach <= 4 {
                            special += 45;
                        }
                    }
                }
            }
            Kind::AntiAir => {
                for q in pieces.iter() {
                    if q.side == p.side && q.kind == Kind::AirForce {
                        let dist = (q.col - p.col).abs() as i32 + (q.row - p.row).abs() as i32;
                        if dist <= 3 {
                            special += 15;
                        }
                        if dist <= 1 {
                            special += 10;
                        }
                    }
                }
            }
            Kind::Missile => {
                let target_cmd = if mine { opp_cmd } else { my_cmd };
                if let Some(ec) = target_cmd {
                    let dist = (p.col - ec.col).abs() as i32 + (p.row - ec.row).abs() as i32;
                    if dist <= 4 {
                        special += 35;
                    }
                    if dist <= 2 {
                        special += 25;
                    }
                }
            }
            Kind::Artillery => {
                // Ranged cross-domain pressure onto the sea lanes.
                for q in pieces.iter() {
                    if q.side != p.side
                        && q.kind == Kind::Navy
                        && (q.col == p.col || q.row == p.row)
                        && (p.col - q.col).abs() + (p.row - q.row).abs() <= 3
                    {
                        special += 30;
                    }
                }
            }
            _ => {}
        }

        // Discovered-attack potential: passengers riding toward the enemy
        // commander unload as fresh attackers.
        if p.carrier.is_some() {
            let target_cmd = if mine { opp_cmd } else { my_cmd };
            if let Some(ec) = target_cmd {
                let dist = (p.col - ec.col).abs() as i32 + (p.row - ec.row).abs() as i32;
                if dist <= 6 {
                    special += mat / 50 * (7 - dist);
                }
            }
        }

        let total = mat + pst_score * 2 + threat + hero_bonus + space + hanging + special;
        score += sign * total;
    }

    // Own commander safety.
    if let Some(cmd) = my_cmd {
        let n = attackers(cmd.col, cmd.row, perspective.opponent()).min(6) as usize;
        let mut cmd_penalty = CMD_ATTACKER_PENALTY[n];
        cmd_penalty = (cmd_penalty * (128 + phase)) / 256;
        score -= cmd_penalty;

        let mut shelter = 0;
        for dc in -1..=1i8 {
            for dr in -1..=1i8 {
                if dc == 0 && dr == 0 {
                    continue;
                }
                let (c, r) = (cmd.col + dc, cmd.row + dr);
                if !on_board(c, r) {
                    continue;
                }
                if let Some(occ) = piece_at(pieces, c, r) {
                    if occ.side == perspective {
                        shelter += 12;
                    }
                }
            }
        }
        score += (shelter * phase) / 256;

        // Escape squares the enemy does not cover.
        let mut escapes = 0;
        for (c, r) in crate::moves::moves(cmd, pieces) {
            if attackers(c, r, perspective.opponent()) == 0 {
                escapes += 1;
            }
        }
        if escapes <= 1 {
            score -= 80;
        }
        if escapes == 0 {
            score -= 150;
        }
    }

    // Pressure on the enemy commander.
    if let Some(cmd) = opp_cmd {
        let direct = attackers(cmd.col, cmd.row, perspective);
        let defenders = attackers(cmd.col, cmd.row, perspective.opponent());
        score += direct * cmd_attack_weight;
        score -= defenders * 18;

        let mut ring_att = 0;
        let mut ring_def = 0;
        let mut ring_escape = 0;
        for dc in -1..=1i8 {
            for dr in -1..=1i8 {
                if dc == 0 && dr == 0 {
                    continue;
                }
                let (c, r) = (cmd.col + dc, cmd.row + dr);
                if !on_board(c, r) {
                    continue;
                }
                ring_att += attackers(c, r, perspective);
                ring_def += attackers(c, r, perspective.opponent());
                let occ = piece_at(pieces, c, r);
                if occ.map_or(true, |o| o.side != perspective.opponent()) {
                    ring_escape += 1;
                }
            }
        }
        score += (ring_att - ring_def) * 18;
        score -= ring_escape * 12;
    }

    // Mobility proxy from the attack cache.
    if let Some(cache) = cache {
        if cache.valid {
            let my = cache.attacked_square_count[perspective.index()];
            let opp = cache.attacked_square_count[perspective.opponent().index()];
            let mob_weight = if phase > 128 { 3 } else { 5 };
            score += (my - opp) * mob_weight;
        }
    }

    // Pair synergies.
    if my_navy == 2 {
        score += 100;
    }
    if opp_navy == 2 {
        score -= 100;
    }
    if my_af == 2 {
        score += 80;
    }
    if opp_af == 2 {
        score -= 80;
    }
    if my_tank == 2 {
        score += 50;
    }
    if opp_tank == 2 {
        score -= 50;
    }

    // Structural presence.
    for p in pieces {
        let bonus = match p.kind {
            Kind::AntiAir => 14,
            Kind::Missile => 18,
            Kind::Navy => 10,
            _ => 0,
        };
        score += if p.side == perspective { bonus } else { -bonus };
    }

    // Strategic objectives.
    score += NAVY_STRAT[my_navy.min(2) as usize] - NAVY_STRAT[opp_navy.min(2) as usize];

    score += (my_af - opp_af) * 700;
    if my_af == 1 {
        score -= 450;
    }
    if opp_af == 1 {
        score += 450;
    }
    if my_af == 0 {
        score -= 1200;
    }
    if opp_af == 0 {
        score += 1200;
    }

    score += (my_land - opp_land) * 220;
    if my_land <= 2 {
        score -= 350;
    }
    if opp_land <= 2 {
        score += 350;
    }

    // Tempo.
    if let Some(stm) = side_to_move {
        score += if stm == perspective {
            tempo_bonus
        } else {
            -tempo_bonus
        };
    }

    // Trade conversion: when ahead in numbers, thinning the enemy army
    // converts the advantage.
    let diff = my_count - opp_count;
    if diff > 0 {
        let trade_bonus = diff * (20 - opp_count) * 3;
        if trade_bonus > 0 {
            score += trade_bonus;
        }
    } else if diff < 0 {
        let trade_bonus = (-diff) * (20 - my_count) * 3;
        if trade_bonus > 0 {
            score -= trade_bonus;
        }
    }

    score + contempt_bonus
}

/// Material + positional-only score used by the incremental quick eval.
pub fn quick_piece_score(p: &Piece) -> i32 {
    let phase_neutral = 192; // leaning midgame; incremental eval stays cheap
    piece_material(p) + pst_phased(p.kind, p.side, p.col, p.row, phase_neutral) * 2
}
