//! Lazy-SMP driver and the iterative-deepening root controller.
//!
//! Workers share only the transposition table, the stop flag and the
//! deadlines; every killer/history/continuation table is private. Worker 0
//! runs the canonical move order and owns the stability bookkeeping;
//! helpers shuffle their early root moves and skip depth 1 on odd ids to
//! desynchronise the trees.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::board::{Piece, Side};
use crate::game::GameMode;
use crate::moves::{all_moves_for, Move, MoveList};
use crate::search::book::{
    opening_immediate_risk, OPENING_MIN_PIECES, VERY_EARLY_MIN_PIECES,
};
use crate::search::state::SearchState;
use crate::search::{Searcher, INFTY};
use crate::Engine;

/// Aspiration window: tight once the search is deep enough to trust the
/// previous score, wide before that.
fn aspiration_delta(depth: i32) -> i32 {
    if depth >= 5 {
        12
    } else {
        40
    }
}

/// State shared by all workers of one `pick_move` call.
pub struct SmpShared {
    pub stop: AtomicBool,
    pub best_score: AtomicI32,
    pub best: Mutex<Option<Move>>,
    pub hard_deadline: Instant,
    pub soft_deadline: Mutex<Instant>,
    pub stability: AtomicI32,
    last_best: Mutex<Option<Move>>,
}

impl SmpShared {
    pub fn new(hard_deadline: Instant, soft_deadline: Instant) -> Self {
        SmpShared {
            stop: AtomicBool::new(false),
            best_score: AtomicI32::new(-INFTY),
            best: Mutex::new(None),
            hard_deadline,
            soft_deadline: Mutex::new(soft_deadline),
            stability: AtomicI32::new(0),
            last_best: Mutex::new(None),
        }
    }

    fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Relaxed) || Instant::now() > self.hard_deadline
    }

    fn report(&self, m: Move, score: i32) {
        let mut best = self.best.lock().unwrap();
        if best.is_none() || score > self.best_score.load(Ordering::Relaxed) {
            self.best_score.store(score, Ordering::Relaxed);
            *best = Some(m);
        }
    }

    /// Worker-0 stability bookkeeping. A best-move change at depth >= 4
    /// buys a quarter of the remaining hard budget of extra soft time; a
    /// stable best past the soft deadline stops the search.
    fn track_stability(&self, best: Move, depth: i32) {
        let mut last = self.last_best.lock().unwrap();
        if *last == Some(best) {
            self.stability.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stability.store(0, Ordering::Relaxed);
            if depth >= 4 {
                let now = Instant::now();
                if now < self.hard_deadline {
                    let extension = (self.hard_deadline - now) / 4;
                    let mut soft = self.soft_deadline.lock().unwrap();
                    let extended = (*soft + extension).min(self.hard_deadline);
                    *soft = extended;
                }
            }
        }
        *last = Some(best);

        let stability = self.stability.load(Ordering::Relaxed);
        if stability >= 3 && depth >= 4 && Instant::now() > *self.soft_deadline.lock().unwrap() {
            self.stop.store(true, Ordering::Relaxed);
        }
    }
}

/// One worker's iterative-deepening loop over the shared root.
#[allow(clippy::too_many_arguments)]
pub fn smp_worker(
    engine: &Engine,
    pieces: &[Piece],
    cpu_side: Side,
    mode: GameMode,
    max_depth: i32,
    shared: &SmpShared,
    external_stop: Option<&AtomicBool>,
    game_history: &[u64],
    thread_id: usize,
) {
    let mut searcher = Searcher::new(
        engine,
        cpu_side,
        mode,
        shared.hard_deadline,
        external_stop,
        game_history,
        thread_id,
    );
    let mut root = SearchState::new(pieces, cpu_side, cpu_side);
    let mut all_moves = all_moves_for(pieces, cpu_side);
    if all_moves.is_empty() {
        return;
    }

    // Helpers shuffle their first few root moves, deterministically by id.
    if thread_id > 0 && all_moves.len() > 2 {
        let mut rng = StdRng::seed_from_u64(thread_id as u64 * 7919 + 42);
        let shuffle_count = all_moves.len().min(4 + thread_id);
        for i in 0..shuffle_count.saturating_sub(1) {
            let j = rng.gen_range(i..shuffle_count);
            all_moves.swap(i, j);
        }
    }

    let mut best = all_moves[0];
    let mut prev_score = 0i32;
    let opening_phase = pieces.len() >= OPENING_MIN_PIECES;
    let very_early = pieces.len() >= VERY_EARLY_MIN_PIECES;
    let base_risk = if opening_phase {
        opening_immediate_risk(pieces, cpu_side)
    } else {
        0
    };

    // Odd workers skip depth 1 to desynchronise the tree walks.
    let start_depth = 1 + (thread_id % 2) as i32;

    for cur_depth in start_depth..=max_depth {
        if shared.should_stop() {
            break;
        }
        // Every iterative-deepening pass ages the shared table; entries
        // stay probeable but lose replacement priority.
        if thread_id == 0 {
            engine.tt().bump_age();
        }

        let mut delta = aspiration_delta(cur_depth);
        let mut alpha = if cur_depth > start_depth {
            prev_score - delta
        } else {
            -INFTY
        };
        let mut beta = if cur_depth > start_depth {
            prev_score + delta
        } else {
            INFTY
        };

        let mut cur_best = best;
        let mut cur_best_val = -INFTY;
        let mut completed = false;

        loop {
            if shared.should_stop() {
                break;
            }
            cur_best_val = -INFTY;
            let mut cur_best_rank = -INFTY;
            cur_best = best;

            let root_hash = searcher.tt_key(root.hash);
            let tt_move = engine.tt().probe(root_hash).and_then(|e| e.best_move());
            let pv_move = if searcher.td.pv_len[0] > 0 {
                searcher.td.pv[0][0]
            } else {
                None
            };
            let hash_hint = tt_move.unwrap_or(best);
            let ordered = searcher.order_moves(
                &root,
                &all_moves,
                0,
                Some(&hash_hint),
                pv_move.as_ref(),
                None,
            );

            let mut window_alpha = alpha;
            let window_beta = beta;
            let mut root_move_idx = 0usize;

            for m in ordered.iter() {
                if shared.should_stop() || searcher.time_up() {
                    break;
                }
                let moved_kind = root
                    .pieces
                    .iter()
                    .find(|p| p.id == m.pid)
                    .map(|p| p.kind);
                let root_is_capture = crate::board::piece_at(&root.pieces, m.dc, m.dr)
                    .is_some_and(|t| t.side != cpu_side);

                let undo = root.make(m);

                let mut root_risk = 0;
                let mut opp_immediate_win = false;
                if opening_phase {
                    root_risk = opening_immediate_risk(&root.pieces, cpu_side);
                    opp_immediate_win = crate::game::has_immediate_winning_move(
                        &root.pieces,
                        cpu_side.opponent(),
                        mode,
                    );
                    if root_risk >= 1_000_000 {
                        // A line that hangs the commander outright never
                        // reaches ranking.
                        root.unmake(undo);
                        continue;
                    }
                }

                let val = if root_move_idx == 0 {
                    searcher.alphabeta(
                        &mut root,
                        cur_depth - 1,
                        window_alpha,
                        window_beta,
                        1,
                        true,
                        Some(*m),
                    )
                } else {
                    let mut v = searcher.alphabeta(
                        &mut root,
                        cur_depth - 1,
                        window_alpha,
                        window_alpha + 1,
                        1,
                        true,
                        Some(*m),
                    );
                    if v > window_alpha && v < window_beta {
                        v = searcher.alphabeta(
                            &mut root,
                            cur_depth - 1,
                            window_alpha,
                            window_beta,
                            1,
                            true,
                            Some(*m),
                        );
                    }
                    v
                };

                // Style ranking on top of the raw score in the opening:
                // avoid lines that hang wings, fleets or key land units.
                let mut style_penalty = 0;
                if opening_phase {
                    style_penalty += root_risk / if very_early { 3 } else { 6 };
                    if opp_immediate_win {
                        style_penalty += 250_000;
                    }
                    if very_early && root_risk > base_risk + 4500 {
                        style_penalty += 900;
                    }
                    if moved_kind == Some(crate::board::Kind::AirForce) && !root_is_capture {
                        style_penalty += if very_early { 280 } else { 120 };
                    }
                    if moved_kind == Some(crate::board::Kind::AirForce) && root_risk > base_risk {
                        style_penalty += 180;
                    }
                }
                let ranked = val - style_penalty;

                root.unmake(undo);

                if val > cur_best_val {
                    cur_best_val = val;
                }
                if ranked > cur_best_rank {
                    cur_best_rank = ranked;
                    cur_best = *m;
                }
                window_alpha = window_alpha.max(val);
                root_move_idx += 1;
                if val >= window_beta {
                    break;
                }
            }

            if shared.should_stop() || searcher.time_up() {
                break;
            }
            if cur_best_val == -INFTY {
                break; // every root move filtered out or interrupted
            }

            if cur_best_val <= alpha {
                // Fail low: widen downward only.
                delta = (delta as f32 * 1.44) as i32 + 5;
                alpha = (cur_best_val - delta).max(-INFTY);
            } else if cur_best_val >= beta {
                // Fail high: widen upward only.
                delta = (delta as f32 * 1.44) as i32 + 5;
                beta = (cur_best_val + delta).min(INFTY);
            } else {
                completed = true;
                break;
            }

            if delta > 800 {
                // Give up on the window; one clean full-width pass.
                alpha = -INFTY;
                beta = INFTY;
            }
        }

        if completed {
            best = cur_best;
            prev_score = cur_best_val;
            debug!(
                "worker {thread_id} depth {cur_depth} best {:?} score {prev_score} nodes {}",
                best, searcher.nodes
            );
            shared.report(best, prev_score);
            if thread_id == 0 {
                shared.track_stability(best, cur_depth);
            }
        }
    }
}

/// Multi-worker `pick_move` driver: share the TT and deadlines, join, and
/// report the collective best.
#[allow(clippy::too_many_arguments)]
pub fn smp_pick_move(
    engine: &Engine,
    pieces: &[Piece],
    cpu_side: Side,
    mode: GameMode,
    max_depth: i32,
    time_ms: u64,
    game_history: &[u64],
    external_stop: Option<&AtomicBool>,
) -> Option<Move> {
    let moves: MoveList = all_moves_for(pieces, cpu_side);
    if moves.is_empty() {
        return None;
    }
    if moves.len() == 1 {
        return Some(moves[0]);
    }

    let start = Instant::now();
    let hard = start + Duration::from_millis(time_ms);
    let soft = start + Duration::from_millis(time_ms * 55 / 100);
    let shared = SmpShared::new(hard, soft);

    let num_threads = engine.config().thread_count();
    if num_threads <= 1 {
        smp_worker(
            engine,
            pieces,
            cpu_side,
            mode,
            max_depth,
            &shared,
            external_stop,
            game_history,
            0,
        );
    } else {
        std::thread::scope(|scope| {
            for thread_id in 0..num_threads {
                let shared = &shared;
                scope.spawn(move || {
                    smp_worker(
                        engine,
                        pieces,
                        cpu_side,
                        mode,
                        max_depth,
                        shared,
                        external_stop,
                        game_history,
                        thread_id,
                    );
                });
            }
        });
    }

    // No fallback here: None means no worker completed an iteration, and
    // the caller decides what that is worth.
    let best = shared.best.lock().unwrap();
    *best
}
