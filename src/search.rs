//! Alpha-beta search core.
//!
//! Scores live in a single perspective (the CPU side's), so the tree has
//! explicit max and min branches instead of negamax negation. The
//! transposition table, correction history and configuration are owned by
//! the [`crate::Engine`]; everything per-thread lives in a [`Searcher`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use once_cell::sync::Lazy;
use smallvec::SmallVec;

use crate::attacks::commander_attackers;
use crate::board::{piece_at, piece_by_id, Kind, Side, COLS, NUM_KINDS, ROWS};
use crate::evaluation::{board_score, EvalBackend, EvalRequest};
use crate::game::{check_terminal, GameMode};
use crate::moves::{all_moves_for, Move, MoveList};
use crate::Engine;

pub mod book;
pub mod corrhist;
pub mod mcts;
pub mod recognizer;
pub mod see;
pub mod smp;
pub mod state;
pub mod tt;
pub mod zobrist;

use self::recognizer::{special_outcome, RECOGNIZER_MAX_DEPTH};
use self::see::see;
use self::state::SearchState;
use self::tt::{TT_EXACT, TT_LOWER, TT_UPPER};
use self::zobrist::perspective_salt;

pub const MAX_PLY: usize = 32;
pub const INFTY: i32 = 999_999;
/// Terminal scores: 40 000 plus a depth bonus so faster wins rank higher.
pub const WIN_BASE: i32 = 40_000;
pub const WIN_DEPTH_BONUS: i32 = 100;
/// Scores at or beyond this are decisive; they bypass soft adjustments.
pub const DECISIVE: i32 = 30_000;

const Q_LIMIT: i32 = 6;
const DELTA_MARGIN: i32 = 200;

/// Wall-clock reads are throttled to one per 4096 nodes.
const TIME_CHECK_MASK: u64 = 4095;

// ============================================================================
// LMR reduction table
// ============================================================================

static LMR_TABLE: Lazy<[[i8; 64]; 64]> = Lazy::new(|| {
    let mut t = [[0i8; 64]; 64];
    for (d, row) in t.iter_mut().enumerate().skip(1) {
        for (m, cell) in row.iter_mut().enumerate().skip(1) {
            let r = (0.5 + (d as f32).ln() * (m as f32).ln() / 2.0).round();
            *cell = r.max(0.0) as i8;
        }
    }
    t
});

#[inline]
fn lmr_reduction(depth: i32, move_index: usize) -> i32 {
    let d = (depth.max(0) as usize).min(63);
    let m = move_index.min(63);
    LMR_TABLE[d][m] as i32
}

// ============================================================================
// Per-thread tables
// ============================================================================

type ContHistory = Box<[[[[[i16; ROWS as usize]; COLS as usize]; NUM_KINDS]; ROWS as usize]; COLS as usize]>;

/// Killer/history/continuation/counter/PV tables. One per worker; never
/// shared.
pub struct ThreadData {
    pub thread_id: usize,
    pub killers: [[Option<Move>; 2]; MAX_PLY],
    /// Butterfly history: [side][kind][col][row].
    pub history: Box<[[[[i32; ROWS as usize]; COLS as usize]; NUM_KINDS]; 2]>,
    /// Continuation history: [prev_col][prev_row][kind][col][row].
    pub cont_history: ContHistory,
    /// Counter move for the previous move's destination square.
    pub counter: [[Option<Move>; ROWS as usize]; COLS as usize],
    pub pv: Box<[[Option<Move>; MAX_PLY]; MAX_PLY]>,
    pub pv_len: [usize; MAX_PLY],
}

impl ThreadData {
    pub fn new(thread_id: usize) -> Self {
        ThreadData {
            thread_id,
            killers: [[None; 2]; MAX_PLY],
            history: Box::new([[[[0; ROWS as usize]; COLS as usize]; NUM_KINDS]; 2]),
            cont_history: Box::new(
                [[[[[0i16; ROWS as usize]; COLS as usize]; NUM_KINDS]; ROWS as usize];
                    COLS as usize],
            ),
            counter: [[None; ROWS as usize]; COLS as usize],
            pv: Box::new([[None; MAX_PLY]; MAX_PLY]),
            pv_len: [0; MAX_PLY],
        }
    }

    #[inline]
    fn history_score(&self, side: Side, kind: Kind, dc: i8, dr: i8) -> i32 {
        self.history[side.index()][kind.index()][dc as usize][dr as usize]
    }

    /// Gravity update keeps entries inside ±32000 without a hard clamp
    /// cliff.
    fn update_history(&mut self, side: Side, kind: Kind, dc: i8, dr: i8, bonus: i32) {
        let v = &mut self.history[side.index()][kind.index()][dc as usize][dr as usize];
        *v += bonus - *v * bonus.abs() / 32_000;
    }

    fn cont_history_score(&self, prev: Option<&Move>, kind: Kind, dc: i8, dr: i8) -> i32 {
        match prev {
            Some(p) if crate::board::on_board(p.dc, p.dr) => {
                self.cont_history[p.dc as usize][p.dr as usize][kind.index()][dc as usize]
                    [dr as usize] as i32
            }
            _ => 0,
        }
    }

    fn update_cont_history(&mut self, prev: Option<&Move>, kind: Kind, dc: i8, dr: i8, bonus: i32) {
        if let Some(p) = prev {
            if crate::board::on_board(p.dc, p.dr) {
                let v = &mut self.cont_history[p.dc as usize][p.dr as usize][kind.index()]
                    [dc as usize][dr as usize];
                let updated = *v as i32 + bonus - (*v as i32) * bonus.abs() / 32_000;
                *v = updated.clamp(-32_000, 32_000) as i16;
            }
        }
    }

    fn store_killer(&mut self, m: Move, ply: usize) {
        if ply >= MAX_PLY {
            return;
        }
        if self.killers[ply][0] != Some(m) {
            self.killers[ply][1] = self.killers[ply][0];
            self.killers[ply][0] = Some(m);
        }
    }

    pub fn reset(&mut self) {
        self.killers = [[None; 2]; MAX_PLY];
        for side in self.history.iter_mut() {
            for kind in side.iter_mut() {
                for col in kind.iter_mut() {
                    col.fill(0);
                }
            }
        }
        for col in self.cont_history.iter_mut() {
            for row in col.iter_mut() {
                for kind in row.iter_mut() {
                    for c in kind.iter_mut() {
                        c.fill(0);
                    }
                }
            }
        }
        self.counter = [[None; ROWS as usize]; COLS as usize];
        self.pv = Box::new([[None; MAX_PLY]; MAX_PLY]);
        self.pv_len = [0; MAX_PLY];
    }
}

// ============================================================================
// Searcher
// ============================================================================

/// One worker's complete search context. Created by the engine at the
/// start of a search, destroyed at the end.
pub struct Searcher<'a> {
    pub engine: &'a Engine,
    pub td: ThreadData,
    pub cpu_side: Side,
    pub mode: GameMode,
    pub deadline: Instant,
    pub stop: Option<&'a AtomicBool>,
    pub nodes: u64,
    pub backend: EvalBackend,
    /// Hashes of the current search path, seeded with the game history so
    /// repetition lines score as draws.
    pub hash_path: Vec<u64>,
    time_check_counter: u64,
    time_up_cache: bool,
    ply_eval: [i32; MAX_PLY + 4],
    tt_salt: u64,
}

impl<'a> Searcher<'a> {
    pub fn new(
        engine: &'a Engine,
        cpu_side: Side,
        mode: GameMode,
        deadline: Instant,
        stop: Option<&'a AtomicBool>,
        game_history: &[u64],
        thread_id: usize,
    ) -> Self {
        Searcher {
            engine,
            td: ThreadData::new(thread_id),
            cpu_side,
            mode,
            deadline,
            stop,
            nodes: 0,
            backend: engine.config().eval_backend,
            hash_path: game_history.to_vec(),
            time_check_counter: 0,
            time_up_cache: false,
            ply_eval: [0; MAX_PLY + 4],
            tt_salt: perspective_salt(cpu_side),
        }
    }

    /// Cooperative interruption: a throttled wall-clock read plus the
    /// shared stop flag.
    #[inline]
    pub fn time_up(&mut self) -> bool {
        if self.time_up_cache {
            return true;
        }
        self.time_check_counter += 1;
        if self.time_check_counter & TIME_CHECK_MASK != 0 {
            return false;
        }
        let up = Instant::now() > self.deadline
            || self
                .stop
                .map_or(false, |s| s.load(Ordering::Relaxed));
        if up {
            self.time_up_cache = true;
        }
        up
    }

    pub fn reset_time_state(&mut self) {
        self.time_check_counter = 0;
        self.time_up_cache = false;
    }

    #[inline]
    fn tt_key(&self, hash: u64) -> u64 {
        hash ^ self.tt_salt
    }

    fn path_is_threefold(&self, hash: u64) -> bool {
        self.hash_path.iter().rev().filter(|&&h| h == hash).count() >= 3
    }

    /// Corrected static eval in CPU perspective. The correction banks are
    /// stored from the side-to-move's point of view.
    fn corrected_eval(&self, st: &SearchState) -> i32 {
        let mat = corrhist::material_signature(&st.pieces, st.turn);
        let terr = corrhist::terrain_signature(&st.pieces, st.turn);
        let corr = self
            .engine
            .corrhist()
            .lock()
            .map(|ch| ch.correction(st.turn, st.hash, mat, terr))
            .unwrap_or(0);
        if st.turn == self.cpu_side {
            st.quick_eval + corr
        } else {
            st.quick_eval - corr
        }
    }

    fn full_eval(&self, st: &mut SearchState, perspective: Side) -> i32 {
        st.ensure_attack_cache();
        crate::evaluation::score_single(
            self.backend,
            EvalRequest {
                pieces: &st.pieces,
                perspective,
                cache: Some(&st.atk),
                side_to_move: Some(st.turn),
            },
        )
    }

    // ========================================================================
    // Move ordering
    // ========================================================================

    /// Score ladder: hash move, previous PV, captures by SEE, counter
    /// move, killers, then quiet history.
    pub fn order_moves(
        &self,
        st: &SearchState,
        moves: &MoveList,
        ply: usize,
        hash_move: Option<&Move>,
        pv_move: Option<&Move>,
        prev_move: Option<&Move>,
    ) -> MoveList {
        let counter = prev_move.and_then(|p| {
            if crate::board::on_board(p.dc, p.dr) {
                self.td.counter[p.dc as usize][p.dr as usize]
            } else {
                None
            }
        });

        let mut scored: SmallVec<[(i32, Move); 64]> = SmallVec::new();
        for &m in moves.iter() {
            let Some(piece) = piece_by_id(&st.pieces, m.pid) else {
                continue;
            };
            let target = piece_at(&st.pieces, m.dc, m.dr);

            let score = if hash_move == Some(&m) {
                3_000_000
            } else if pv_move == Some(&m) {
                2_500_000
            } else if let Some(t) = target.filter(|t| t.side != piece.side) {
                let victim = t.kind.value();
                let attacker = piece.kind.value().max(1);
                let mvv_lva = victim * 16 - attacker;
                let see_val = see(&st.pieces, m.dc, m.dr, piece.side, 0);
                if see_val >= 0 {
                    1_100_000 + mvv_lva * 4 + see_val
                } else {
                    520_000 + mvv_lva * 2 + see_val
                }
            } else if counter == Some(m) {
                95_000
            } else if ply < MAX_PLY && self.td.killers[ply][0] == Some(m) {
                90_000
            } else if ply < MAX_PLY && self.td.killers[ply][1] == Some(m) {
                89_000
            } else {
                self.td.history_score(piece.side, piece.kind, m.dc, m.dr)
                    + self.td.cont_history_score(prev_move, piece.kind, m.dc, m.dr)
            };
            scored.push((score, m));
        }
        scored.sort_unstable_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().map(|(_, m)| m).collect()
    }

    // ========================================================================
    // Quiescence
    // ========================================================================

    /// Captures-plus-evasions resolution beyond the nominal horizon,
    /// negamax-style from `perspective` (the side to move here).
    pub fn quiesce(
        &mut self,
        st: &mut SearchState,
        mut alpha: i32,
        beta: i32,
        perspective: Side,
        q_depth: i32,
    ) -> i32 {
        self.nodes += 1;

        let mut stand = if perspective == self.cpu_side {
            st.quick_eval
        } else {
            -st.quick_eval
        };
        if q_depth == 0 {
            let precise = self.full_eval(st, perspective);
            stand = (stand * 2 + precise) / 3;
        }

        // Fortress and objective recognition also fires here.
        if q_depth <= RECOGNIZER_MAX_DEPTH {
            if let Some(v) = special_outcome(&st.pieces, self.cpu_side, self.mode, 0) {
                return if perspective == self.cpu_side { v } else { -v };
            }
        }

        if stand >= beta {
            return beta;
        }
        if stand < alpha - DELTA_MARGIN - 800 {
            return alpha;
        }
        if alpha < stand {
            alpha = stand;
        }
        if q_depth >= Q_LIMIT {
            return alpha;
        }
        if self.time_up() {
            return alpha;
        }

        // Captures, SEE-ordered; plus commander evasions when the side to
        // move is under the gun.
        struct Cap {
            m: Move,
            see_val: i32,
            evasion: bool,
        }
        let mut caps: arrayvec::ArrayVec<Cap, 96> = arrayvec::ArrayVec::new();
        st.ensure_attack_cache();
        let in_danger = commander_attackers(&st.pieces, perspective, Some(&st.atk)) > 0;

        for m in all_moves_for(&st.pieces, perspective) {
            let piece = match piece_by_id(&st.pieces, m.pid) {
                Some(p) => p,
                None => continue,
            };
            let is_capture =
                piece_at(&st.pieces, m.dc, m.dr).is_some_and(|t| t.side != perspective);
            let is_evasion = in_danger && piece.kind == Kind::Commander;
            if !is_capture && !is_evasion {
                continue;
            }
            let see_val = if is_capture {
                see(&st.pieces, m.dc, m.dr, perspective, 0)
            } else {
                0
            };
            if caps.try_push(Cap {
                m,
                see_val,
                evasion: !is_capture,
            })
            .is_err()
            {
                break;
            }
        }
        caps.sort_unstable_by(|a, b| b.see_val.cmp(&a.see_val));

        for c in caps.iter() {
            if !c.evasion {
                // Losing captures are dropped past the first quiescence
                // ply; hopeless ones immediately.
                if c.see_val < 0 && q_depth >= 1 {
                    continue;
                }
                if c.see_val + stand + DELTA_MARGIN < alpha {
                    continue;
                }
            }
            let undo = st.make(&c.m);
            let score = -self.quiesce(st, -beta, -alpha, perspective.opponent(), q_depth + 1);
            st.unmake(undo);

            if score >= beta {
                return beta;
            }
            if score > alpha {
                alpha = score;
            }
        }
        alpha
    }

    /// Quiescence from a search node: max nodes call it directly, min
    /// nodes through negation, keeping the result in CPU perspective.
    fn quiesce_from_node(&mut self, st: &mut SearchState, alpha: i32, beta: i32) -> i32 {
        if st.turn == self.cpu_side {
            self.quiesce(st, alpha, beta, self.cpu_side, 0)
        } else {
            -self.quiesce(st, -beta, -alpha, self.cpu_side.opponent(), 0)
        }
    }

    // ========================================================================
    // Alpha-beta
    // ========================================================================

    pub fn alphabeta(
        &mut self,
        st: &mut SearchState,
        depth: i32,
        alpha: i32,
        beta: i32,
        ply: usize,
        null_ok: bool,
        prev_move: Option<Move>,
    ) -> i32 {
        self.hash_path.push(st.hash);
        let v = self.alphabeta_inner(st, depth, alpha, beta, ply, null_ok, prev_move);
        self.hash_path.pop();
        v
    }

    #[allow(clippy::too_many_arguments)]
    fn alphabeta_inner(
        &mut self,
        st: &mut SearchState,
        depth: i32,
        mut alpha: i32,
        mut beta: i32,
        ply: usize,
        null_ok: bool,
        prev_move: Option<Move>,
    ) -> i32 {
        if self.path_is_threefold(st.hash) {
            return 0;
        }

        self.nodes += 1;
        let node_is_max = st.turn == self.cpu_side;
        if ply < MAX_PLY {
            self.td.pv_len[ply] = ply;
        }

        // Runaway-extension guard.
        if ply >= MAX_PLY {
            return self.quiesce_from_node(st, alpha, beta);
        }

        let orig_alpha = alpha;
        let orig_beta = beta;
        let pv_node = beta - alpha > 1;

        // Terminal before anything else: the previous mover may have won.
        let last_mover = st.turn.opponent();
        if let Some(_result) = check_terminal(&st.pieces, last_mover, self.mode) {
            let base = WIN_BASE + depth * WIN_DEPTH_BONUS;
            return if last_mover == self.cpu_side { base } else { -base };
        }

        if depth <= RECOGNIZER_MAX_DEPTH {
            if let Some(v) = special_outcome(&st.pieces, self.cpu_side, self.mode, depth) {
                return v;
            }
        }

        if depth <= 0 {
            return self.quiesce_from_node(st, alpha, beta);
        }

        // Transposition probe.
        let key = self.tt_key(st.hash);
        let tte = self.engine.tt().probe(key);
        let mut hash_move: Option<Move> = None;
        if let Some(e) = tte {
            hash_move = e.best_move();
            if e.depth as i32 >= depth && !pv_node {
                let val = e.val as i32;
                match e.flag {
                    TT_EXACT => return val,
                    TT_LOWER if val > alpha => alpha = val,
                    TT_UPPER if val < beta => beta = val,
                    _ => {}
                }
                if alpha >= beta {
                    return val;
                }
            }
        }

        // Internal iterative reduction: one ply shallower when the table
        // has no move for us. Local search depth only; TT stores and the
        // pruning margins below keep the nominal depth.
        let mut search_depth = depth;
        if hash_move.is_none() && depth >= 6 && !pv_node {
            search_depth -= 1;
        }

        let static_eval = self.corrected_eval(st);

        // Improving flag: compare the side-to-move view with two plies ago.
        if ply == 0 {
            self.ply_eval = [0; MAX_PLY + 4];
        }
        let eval_stm = if node_is_max { static_eval } else { -static_eval };
        self.ply_eval[ply] = eval_stm;
        let improving = ply >= 2 && eval_stm > self.ply_eval[ply - 2];

        // All pruning switches off while either commander is under fire.
        st.ensure_attack_cache();
        let pre_cpu_cmd_atk = commander_attackers(&st.pieces, self.cpu_side, Some(&st.atk));
        let pre_opp_cmd_atk =
            commander_attackers(&st.pieces, self.cpu_side.opponent(), Some(&st.atk));
        let pruning_safe = pre_cpu_cmd_atk == 0 && pre_opp_cmd_atk == 0;

        // Reverse futility pruning.
        if pruning_safe && !pv_node && depth <= 4 {
            let margin = (if improving { 100 } else { 160 }) * depth + 80;
            if node_is_max && static_eval - margin >= beta {
                return static_eval;
            }
            if !node_is_max && static_eval + margin <= alpha {
                return static_eval;
            }
        }

        // Razoring: hopeless static eval drops straight to quiescence.
        if pruning_safe && !pv_node && depth <= 3 {
            let margin = 200 + 180 * (depth - 1);
            if node_is_max && static_eval + margin <= alpha {
                let v = self.quiesce_from_node(st, alpha, beta);
                if depth <= 1 || v <= alpha {
                    return v;
                }
            }
            if !node_is_max && static_eval - margin >= beta {
                let v = self.quiesce_from_node(st, alpha, beta);
                if depth <= 1 || v >= beta {
                    return v;
                }
            }
        }

        // Probcut: a reduced zero-window probe above beta.
        if pruning_safe && !pv_node && depth >= 5 && null_ok && beta.abs() < DECISIVE {
            let probcut_depth = (depth - 4).max(1);
            if node_is_max && static_eval >= beta + 200 {
                let pb = beta + 200;
                let v = self.alphabeta(st, probcut_depth, pb - 1, pb, ply, false, prev_move);
                if v >= pb {
                    return v;
                }
            }
            if !node_is_max && static_eval <= alpha - 200 {
                let pa = alpha - 200;
                let v = self.alphabeta(st, probcut_depth, pa, pa + 1, ply, false, prev_move);
                if v <= pa {
                    return v;
                }
            }
        }

        // Null move pruning, tuned for this board's volatility.
        if pruning_safe && null_ok && depth >= 3 && !pv_node {
            let stm_pieces = st.side_piece_count(st.turn) as i32;
            let zugzwang_risk = st.pieces.iter().all(|p| {
                p.side != st.turn
                    || matches!(
                        p.kind,
                        Kind::Infantry | Kind::Militia | Kind::Commander | Kind::Headquarters
                    )
            });
            if stm_pieces > 2 && !zugzwang_risk {
                let eval_margin = if node_is_max {
                    static_eval - beta
                } else {
                    alpha - static_eval
                };
                if eval_margin >= -64 {
                    let volatile_pos = pre_cpu_cmd_atk + pre_opp_cmd_atk > 0;
                    let mut r = 2;
                    if depth >= 10 && eval_margin >= 320 {
                        r = 4;
                    } else if depth >= 7 && eval_margin >= 140 {
                        r = 3;
                    }
                    if volatile_pos || stm_pieces <= 7 {
                        r = 2;
                    }
                    r = r.min(depth - 1);

                    st.make_null();
                    let null_val = if node_is_max {
                        self.alphabeta(st, depth - 1 - r, beta - 1, beta, ply + 1, false, prev_move)
                    } else {
                        self.alphabeta(st, depth - 1 - r, alpha, alpha + 1, ply + 1, false, prev_move)
                    };
                    st.unmake_null();

                    if node_is_max && null_val >= beta {
                        if depth >= 8 {
                            let verify = self
                                .alphabeta(st, depth - r - 1, beta - 1, beta, ply + 1, false, prev_move);
                            if verify >= beta {
                                return beta;
                            }
                        } else {
                            return beta;
                        }
                    }
                    if !node_is_max && null_val <= alpha {
                        if depth >= 8 {
                            let verify = self
                                .alphabeta(st, depth - r - 1, alpha, alpha + 1, ply + 1, false, prev_move);
                            if verify <= alpha {
                                return alpha;
                            }
                        } else {
                            return alpha;
                        }
                    }
                }
            }
        }

        let pre_my_navy = st.navy_count[self.cpu_side.index()];
        let moves = all_moves_for(&st.pieces, st.turn);
        if moves.is_empty() {
            st.ensure_attack_cache();
            return board_score(&st.pieces, self.cpu_side, Some(&st.atk), Some(st.turn));
        }

        let pv_move = if ply < MAX_PLY && self.td.pv_len[ply] > ply {
            self.td.pv[ply][ply]
        } else {
            None
        };
        let ordered = self.order_moves(
            st,
            &moves,
            ply,
            hash_move.as_ref(),
            pv_move.as_ref(),
            prev_move.as_ref(),
        );
        if ordered.is_empty() {
            st.ensure_attack_cache();
            return board_score(&st.pieces, self.cpu_side, Some(&st.atk), Some(st.turn));
        }

        let mut val = if node_is_max { -INFTY } else { INFTY };
        let mut best_move = ordered[0];
        let mut move_index = 0usize;
        let mut searched_quiets: SmallVec<[(Kind, i8, i8); 16]> = SmallVec::new();

        for m in ordered.iter() {
            if self.time_up() {
                break;
            }
            let piece = match piece_by_id(&st.pieces, m.pid) {
                Some(p) => *p,
                None => continue,
            };
            let target = piece_at(&st.pieces, m.dc, m.dr).copied();
            let is_capture = target.is_some_and(|t| t.side != st.turn);
            let captures_navy = is_capture && target.is_some_and(|t| t.kind == Kind::Navy);
            let is_critical_capture = is_capture
                && target.is_some_and(|t| {
                    matches!(
                        t.kind,
                        Kind::Commander
                            | Kind::Navy
                            | Kind::AirForce
                            | Kind::Artillery
                            | Kind::Tank
                            | Kind::Infantry
                    )
                });
            let mut full_depth = search_depth - 1 + i32::from(is_critical_capture && depth <= 4);
            if full_depth < 0 {
                full_depth = 0;
            }

            let is_killer = ply < MAX_PLY
                && (self.td.killers[ply][0] == Some(*m) || self.td.killers[ply][1] == Some(*m));
            let is_hash_move = hash_move == Some(*m);
            let is_quiet = !is_capture && !is_killer && !is_hash_move;

            // Late move pruning.
            if is_quiet && depth <= 4 && !pv_node && pruning_safe {
                let lmp_base = if improving { 5 } else { 3 };
                if move_index >= (lmp_base + depth * depth) as usize {
                    move_index += 1;
                    continue;
                }
            }

            // History-based pruning of repeatedly refuted quiets.
            if is_quiet && depth <= 6 && !pv_node && move_index > 1 && pruning_safe {
                let hval = self.td.history_score(st.turn, piece.kind, m.dc, m.dr);
                if hval < -55 * depth * depth {
                    move_index += 1;
                    continue;
                }
            }

            // Futility pruning on quiets at frontier depths.
            if is_quiet && !pv_node && depth <= 3 && pruning_safe {
                let margin = (if improving { 130 } else { 170 }) * depth + 80;
                if node_is_max && static_eval + margin <= alpha {
                    move_index += 1;
                    continue;
                }
                if !node_is_max && static_eval - margin >= beta {
                    move_index += 1;
                    continue;
                }
            }

            // SEE pruning for non-critical captures.
            if is_capture && !is_critical_capture && depth <= 4 && !pv_node && move_index > 0 {
                let see_val = see(&st.pieces, m.dc, m.dr, st.turn, 0);
                if see_val < -80 * depth {
                    move_index += 1;
                    continue;
                }
            }

            // Singular / double / negative extensions around the TT move.
            let mut se_extension = 0i32;
            if let Some(e) = tte {
                let tt_val = e.val as i32;
                if is_hash_move
                    && e.depth as i32 >= depth - 1
                    && depth >= 5
                    && tt_val.abs() < DECISIVE
                    && !self.time_up()
                {
                    // Verify singularity with a reduced exclusion search
                    // over the alternatives.
                    let sing_bound = if node_is_max { tt_val - 90 } else { tt_val + 90 };
                    let mut is_singular = true;
                    let mut tested = 0;
                    let mut near_miss = 0;
                    for om in ordered.iter() {
                        if om == m {
                            continue;
                        }
                        if tested >= 16 || self.time_up() {
                            break;
                        }
                        let undo = st.make(om);
                        let sv = if node_is_max {
                            self.alphabeta(st, depth - 2, sing_bound - 1, sing_bound, ply + 1, false, Some(*om))
                        } else {
                            self.alphabeta(st, depth - 2, sing_bound, sing_bound + 1, ply + 1, false, Some(*om))
                        };
                        st.unmake(undo);
                        tested += 1;
                        let refutes = if node_is_max {
                            sv >= sing_bound
                        } else {
                            sv <= sing_bound
                        };
                        if refutes {
                            is_singular = false;
                            break;
                        }
                        let close = if node_is_max {
                            sv >= sing_bound - 30
                        } else {
                            sv <= sing_bound + 30
                        };
                        if close {
                            near_miss += 1;
                        }
                    }
                    if is_singular {
                        let doubly = near_miss == 0 && tested >= 4 && !pv_node;
                        se_extension = if doubly { 2 } else { 1 };
                    }
                } else if !is_hash_move && depth >= 5 && tt_val.abs() < DECISIVE {
                    // Negative extension: the table already knows another
                    // move clears the bound here.
                    if node_is_max && e.flag == TT_LOWER {
                        if tt_val >= beta {
                            se_extension = -2;
                        } else if tt_val >= beta - 60 {
                            se_extension = -1;
                        }
                    }
                    if !node_is_max && e.flag == TT_UPPER {
                        if tt_val <= alpha {
                            se_extension = -2;
                        } else if tt_val <= alpha + 60 {
                            se_extension = -1;
                        }
                    }
                }
            }

            let undo = st.make(m);
            // Warm the child's TT cluster while we compute extensions.
            self.engine.tt().prefetch(self.tt_key(st.hash));

            // Rule-aware extensions, capped at +2.
            st.ensure_attack_cache();
            let post_cpu_cmd_atk = commander_attackers(&st.pieces, self.cpu_side, Some(&st.atk));
            let post_opp_cmd_atk =
                commander_attackers(&st.pieces, self.cpu_side.opponent(), Some(&st.atk));
            let post_my_navy = st.navy_count[self.cpu_side.index()];
            let mut rule_ext = 0;
            if pre_cpu_cmd_atk > 0 && post_cpu_cmd_atk < pre_cpu_cmd_atk {
                rule_ext += 1;
            }
            if node_is_max && post_opp_cmd_atk > 0 {
                rule_ext += 1;
            }
            if captures_navy {
                rule_ext += 1;
            }
            if pre_my_navy == 1 && post_my_navy == 1 && post_cpu_cmd_atk == 0 {
                rule_ext += 1;
            }
            if let Some(prev) = prev_move {
                if is_capture && m.dc == prev.dc && m.dr == prev.dr {
                    rule_ext += 1;
                }
            }
            if se_extension > 0 {
                rule_ext += se_extension;
            }
            rule_ext = rule_ext.min(2);

            let mut ext_depth = full_depth + rule_ext;
            if se_extension < 0 {
                ext_depth = (ext_depth + se_extension).max(0);
            }
            if ext_depth >= depth {
                ext_depth = depth - 1;
            }
            if ext_depth < 0 {
                ext_depth = 0;
            }

            let child;
            if move_index == 0 {
                child = self.alphabeta(st, ext_depth, alpha, beta, ply + 1, true, Some(*m));
            } else {
                // Late move reductions for late quiets, history-adjusted.
                let mut new_depth = ext_depth;
                if is_quiet && move_index >= 2 && depth >= 2 {
                    let mut r = lmr_reduction(depth, move_index);
                    if pv_node {
                        r -= 1;
                    }
                    if improving {
                        r -= 1;
                    }
                    if !improving && depth >= 6 {
                        r += 1;
                    }
                    r -= self.td.history_score(st.turn, piece.kind, m.dc, m.dr) / 6000;
                    if r < 0 {
                        r = 0;
                    }
                    new_depth = (ext_depth - r).max(1);
                }

                // PVS zero-window probe.
                let probe = if node_is_max {
                    self.alphabeta(st, new_depth, alpha, alpha + 1, ply + 1, true, Some(*m))
                } else {
                    self.alphabeta(st, new_depth, beta - 1, beta, ply + 1, true, Some(*m))
                };
                let mut c = probe;

                let lmr_fail = if node_is_max { c > alpha } else { c < beta };
                if new_depth < ext_depth && lmr_fail {
                    if pv_node {
                        c = self.alphabeta(st, ext_depth, alpha, beta, ply + 1, true, Some(*m));
                    } else if node_is_max {
                        c = self.alphabeta(st, ext_depth, alpha, alpha + 1, ply + 1, true, Some(*m));
                    } else {
                        c = self.alphabeta(st, ext_depth, beta - 1, beta, ply + 1, true, Some(*m));
                    }
                }
                if !lmr_fail || new_depth >= ext_depth {
                    let pvs_fail = c > alpha && c < beta;
                    if pvs_fail && pv_node {
                        c = self.alphabeta(st, ext_depth, alpha, beta, ply + 1, true, Some(*m));
                    }
                }
                child = c;
            }

            st.unmake(undo);

            if is_quiet {
                searched_quiets.push((piece.kind, m.dc, m.dr));
            }
            move_index += 1;

            if node_is_max {
                if child > val {
                    val = child;
                    best_move = *m;
                    self.record_pv(ply, *m);
                }
                alpha = alpha.max(val);
                if beta <= alpha {
                    self.on_beta_cutoff(st, m, &piece, is_capture, depth, ply, prev_move, &searched_quiets);
                    break;
                }
            } else {
                if child < val {
                    val = child;
                    best_move = *m;
                    self.record_pv(ply, *m);
                }
                beta = beta.min(val);
                if beta <= alpha {
                    self.on_beta_cutoff(st, m, &piece, is_capture, depth, ply, prev_move, &searched_quiets);
                    break;
                }
            }
        }

        if move_index == 0 {
            st.ensure_attack_cache();
            return board_score(&st.pieces, self.cpu_side, Some(&st.atk), Some(st.turn));
        }

        let flag = if val <= orig_alpha {
            TT_UPPER
        } else if val >= orig_beta {
            TT_LOWER
        } else {
            TT_EXACT
        };
        self.engine
            .tt()
            .store(key, depth, flag, val, Some(best_move));

        // Correction history learns only from exact, non-mate results,
        // from the side-to-move's perspective.
        if flag == TT_EXACT && depth >= 1 && val.abs() < DECISIVE {
            let raw_stm = if node_is_max {
                st.quick_eval
            } else {
                -st.quick_eval
            };
            let val_stm = if node_is_max { val } else { -val };
            let diff = val_stm - raw_stm;
            let mat = corrhist::material_signature(&st.pieces, st.turn);
            let terr = corrhist::terrain_signature(&st.pieces, st.turn);
            if let Ok(mut ch) = self.engine.corrhist().lock() {
                ch.update(st.turn, st.hash, mat, terr, depth, diff);
            }
        }

        val
    }

    fn record_pv(&mut self, ply: usize, m: Move) {
        if ply >= MAX_PLY {
            return;
        }
        self.td.pv[ply][ply] = Some(m);
        self.td.pv_len[ply] = ply + 1;
        if ply + 1 < MAX_PLY && self.td.pv_len[ply + 1] > ply + 1 {
            let child_len = self.td.pv_len[ply + 1];
            for i in ply + 1..child_len.min(MAX_PLY) {
                self.td.pv[ply][i] = self.td.pv[ply + 1][i];
            }
            self.td.pv_len[ply] = child_len;
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn on_beta_cutoff(
        &mut self,
        st: &SearchState,
        m: &Move,
        piece: &crate::board::Piece,
        is_capture: bool,
        depth: i32,
        ply: usize,
        prev_move: Option<Move>,
        searched_quiets: &[(Kind, i8, i8)],
    ) {
        if is_capture {
            return;
        }
        self.td.store_killer(*m, ply);
        let bonus = depth * depth;
        self.td
            .update_history(st.turn, piece.kind, m.dc, m.dr, bonus);
        self.td
            .update_cont_history(prev_move.as_ref(), piece.kind, m.dc, m.dr, bonus);
        for &(kind, dc, dr) in searched_quiets {
            if kind == piece.kind && dc == m.dc && dr == m.dr {
                continue;
            }
            self.td.update_history(st.turn, kind, dc, dr, -bonus);
            self.td
                .update_cont_history(prev_move.as_ref(), kind, dc, dr, -bonus);
        }
        if let Some(prev) = prev_move {
            if crate::board::on_board(prev.dc, prev.dr) {
                self.td.counter[prev.dc as usize][prev.dr as usize] = Some(*m);
            }
        }
    }
}
