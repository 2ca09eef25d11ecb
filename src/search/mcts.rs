//! Hybrid MCTS + alpha-beta root, used at the strongest setting.
//!
//! A two-level PUCT tree over the root moves: level-1 children are the
//! legal moves, expanded eagerly with hand-crafted policy priors; level-2
//! children appear lazily once a node has earned two visits. Leaf values
//! come from a shallow alpha-beta blended with the batched evaluator;
//! virtual loss keeps parallel workers out of each other's lines.

use std::sync::atomic::AtomicBool;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use log::debug;

use crate::board::{piece_at, piece_by_id, Kind, Piece, Side};
use crate::evaluation::{score_batch, EvalBackend, EvalRequest};
use crate::game::GameMode;
use crate::moves::{all_moves_for, Move};
use crate::search::see::see;
use crate::search::state::SearchState;
use crate::search::{Searcher, ThreadData, INFTY};
use crate::Engine;

const CPUCT: f32 = 1.8;
const VIRTUAL_LOSS: f32 = 0.35;
const POLICY_TEMPERATURE: f32 = 25.0;
const MAX_WORKERS: usize = 8;
const EVAL_BATCH_CPU: usize = 16;
const EVAL_BATCH_WEBGPU: usize = 128;
/// Leaf scores are squashed into [-1, 1] at this scale.
const VALUE_SCALE: f32 = 6000.0;

// ============================================================================
// Policy priors
// ============================================================================

/// Hand-crafted policy head: captures by MVV/LVA with SEE refinement,
/// central control, forward advance, butterfly history, and strong
/// commander threat/shelter shaping. Softmax with a sharp temperature.
pub fn policy_priors(
    moves: &[Move],
    pieces: &[Piece],
    player: Side,
    td: &ThreadData,
) -> Vec<f32> {
    if moves.is_empty() {
        return Vec::new();
    }

    let my_cmd = pieces
        .iter()
        .find(|p| p.side == player && p.kind == Kind::Commander);
    let opp_cmd = pieces
        .iter()
        .find(|p| p.side != player && p.kind == Kind::Commander);

    let mut raw: Vec<f32> = Vec::with_capacity(moves.len());
    for m in moves {
        let mut s = 0.0f32;
        let mover = piece_by_id(pieces, m.pid);

        if let Some(tgt) = piece_at(pieces, m.dc, m.dr).filter(|t| t.side != player) {
            let victim = tgt.kind.value() as f32;
            let attacker = mover.map_or(1.0, |p| p.kind.value().max(1) as f32);
            s += 300.0 + victim * 2.0 - attacker * 0.25;
            let sv = see(pieces, m.dc, m.dr, player, 0);
            s += if sv >= 0 {
                50.0 + sv as f32 * 0.05
            } else {
                sv as f32 * 0.02
            };
        }

        // Central control.
        let cdist = (m.dc as f32 - 5.0).abs() + (m.dr as f32 - 6.0).abs();
        s += (18.0 - cdist * 2.5).max(0.0);

        if let Some(p) = mover {
            // Forward advance.
            let adv = match player {
                Side::Red => (m.dr - p.row) as f32,
                Side::Blue => (p.row - m.dr) as f32,
            };
            s += adv * 3.5;

            // Butterfly history from the worker's own tables.
            s += td.history[player.index()][p.kind.index()][m.dc as usize][m.dr as usize] as f32
                * 0.008;

            // Commander threat shaping.
            if let Some(oc) = opp_cmd {
                let dist = (m.dc - oc.col).abs() + (m.dr - oc.row).abs();
                s += match dist {
                    0 => 800.0,
                    1 => 350.0,
                    2 => 180.0,
                    3 | 4 => 60.0,
                    _ => 0.0,
                };
            }

            // Own-commander shelter shaping.
            if let Some(mc) = my_cmd {
                let dist_to = (m.dc - mc.col).abs() + (m.dr - mc.row).abs();
                if p.kind == Kind::Commander {
                    s += 30.0;
                } else if dist_to <= 2 {
                    let dist_from = (p.col - mc.col).abs() + (p.row - mc.row).abs();
                    if dist_to < dist_from {
                        s += 40.0;
                    }
                }
            }
        }

        raw.push(s);
    }

    let max_s = raw.iter().cloned().fold(f32::MIN, f32::max);
    let mut sum = 0.0f32;
    for v in raw.iter_mut() {
        *v = ((*v - max_s) / POLICY_TEMPERATURE).exp();
        sum += *v;
    }
    if sum > 1e-9 {
        for v in raw.iter_mut() {
            *v /= sum;
        }
    }
    raw
}

// ============================================================================
// Tree
// ============================================================================

struct Level2Child {
    mv: Move,
    prior: f32,
    visits: i32,
    virtual_loss: i32,
    total_value: f32,
    state: SearchState,
}

struct Level1Child {
    mv: Move,
    prior: f32,
    visits: i32,
    virtual_loss: i32,
    total_value: f32,
    state: SearchState,
    expanded: bool,
    children: Vec<Level2Child>,
}

fn q_with_virtual_loss(total: f32, visits: i32, vloss: i32) -> f32 {
    let v = visits + vloss;
    if v <= 0 {
        return 0.0;
    }
    (total - VIRTUAL_LOSS * vloss as f32) / v as f32
}

struct Tree {
    children: Vec<Level1Child>,
    root_visits: i32,
}

struct SelectionPath {
    l1: usize,
    l2: Option<usize>,
    eval_state: SearchState,
    prev_move: Move,
}

fn select_path(tree: &mut Tree, opp_side: Side, td: &ThreadData) -> Option<SelectionPath> {
    if tree.children.is_empty() {
        return None;
    }
    let sqrt_root = (tree.root_visits.max(1) as f32).sqrt();
    let mut l1_idx = 0;
    let mut best_puct = f32::MIN;
    for (i, c) in tree.children.iter().enumerate() {
        let q = q_with_virtual_loss(c.total_value, c.visits, c.virtual_loss);
        let u = CPUCT * c.prior * sqrt_root / (1.0 + (c.visits + c.virtual_loss) as f32);
        if q + u > best_puct {
            best_puct = q + u;
            l1_idx = i;
        }
    }

    let expand_now = {
        let l1 = &tree.children[l1_idx];
        l1.visits >= 2 && !l1.expanded
    };
    if expand_now {
        let (l2_moves, l1_state) = {
            let l1 = &tree.children[l1_idx];
            (all_moves_for(&l1.state.pieces, opp_side), l1.state.clone())
        };
        let priors = policy_priors(&l2_moves, &l1_state.pieces, opp_side, td);
        let mut children = Vec::with_capacity(l2_moves.len());
        for (j, m) in l2_moves.iter().enumerate() {
            let mut state = l1_state.clone();
            let _ = state.make(m);
            children.push(Level2Child {
                mv: *m,
                prior: priors.get(j).copied().unwrap_or(0.0),
                visits: 0,
                virtual_loss: 0,
                total_value: 0.0,
                state,
            });
        }
        let l1 = &mut tree.children[l1_idx];
        l1.children = children;
        l1.expanded = true;
    }

    let l1 = &mut tree.children[l1_idx];
    l1.virtual_loss += 1;
    let mut sel = SelectionPath {
        l1: l1_idx,
        l2: None,
        eval_state: l1.state.clone(),
        prev_move: l1.mv,
    };

    if l1.visits >= 2 && !l1.children.is_empty() {
        let sqrt_l1 = ((l1.visits + l1.virtual_loss).max(1) as f32).sqrt();
        let mut l2_idx = 0;
        let mut best = f32::MIN;
        for (j, c2) in l1.children.iter().enumerate() {
            let q2 = q_with_virtual_loss(c2.total_value, c2.visits, c2.virtual_loss);
            let u2 = CPUCT * c2.prior * sqrt_l1 / (1.0 + (c2.visits + c2.virtual_loss) as f32);
            if q2 + u2 > best {
                best = q2 + u2;
                l2_idx = j;
            }
        }
        let l2 = &mut l1.children[l2_idx];
        l2.virtual_loss += 1;
        sel.l2 = Some(l2_idx);
        sel.eval_state = l2.state.clone();
        sel.prev_move = l2.mv;
    }
    Some(sel)
}

fn apply_leaf_result(tree: &mut Tree, sel: &SelectionPath, leaf_val: f32) {
    let Some(l1) = tree.children.get_mut(sel.l1) else {
        return;
    };
    if l1.virtual_loss > 0 {
        l1.virtual_loss -= 1;
    }
    if let Some(j) = sel.l2 {
        if let Some(l2) = l1.children.get_mut(j) {
            if l2.virtual_loss > 0 {
                l2.virtual_loss -= 1;
            }
            l2.visits += 1;
            // Level-2 nodes are opponent-to-move: flip the sign.
            l2.total_value -= leaf_val;
        }
    }
    l1.visits += 1;
    l1.total_value += leaf_val;
    tree.root_visits += 1;
}

fn rollback_virtual_loss(tree: &mut Tree, sel: &SelectionPath) {
    let Some(l1) = tree.children.get_mut(sel.l1) else {
        return;
    };
    if l1.virtual_loss > 0 {
        l1.virtual_loss -= 1;
    }
    if let Some(j) = sel.l2 {
        if let Some(l2) = l1.children.get_mut(j) {
            if l2.virtual_loss > 0 {
                l2.virtual_loss -= 1;
            }
        }
    }
}

// ============================================================================
// Root search
// ============================================================================

#[allow(clippy::too_many_arguments)]
pub fn mcts_ab_root_search(
    engine: &Engine,
    pieces: &[Piece],
    cpu_side: Side,
    mode: GameMode,
    ab_depth: i32,
    time_ms: u64,
    game_history: &[u64],
    external_stop: Option<&AtomicBool>,
) -> Option<Move> {
    let deadline = Instant::now() + Duration::from_millis(time_ms);
    let all_moves = all_moves_for(pieces, cpu_side);
    if all_moves.is_empty() {
        return None;
    }
    if all_moves.len() == 1 {
        return Some(all_moves[0]);
    }

    let root_state = SearchState::new(pieces, cpu_side, cpu_side);
    let seed_td = ThreadData::new(0);
    let priors = policy_priors(&all_moves, pieces, cpu_side, &seed_td);

    let mut children = Vec::with_capacity(all_moves.len());
    for (i, m) in all_moves.iter().enumerate() {
        let mut state = root_state.clone();
        let _ = state.make(m);
        children.push(Level1Child {
            mv: *m,
            prior: priors.get(i).copied().unwrap_or(0.0),
            visits: 0,
            virtual_loss: 0,
            total_value: 0.0,
            state,
            expanded: false,
            children: Vec::new(),
        });
    }

    let tree = Mutex::new(Tree {
        children,
        root_visits: 1,
    });
    let opp_side = cpu_side.opponent();
    let backend = engine.config().eval_backend.resolved();
    let use_webgpu = backend == EvalBackend::WebGpu;
    let batch_size = if use_webgpu {
        EVAL_BATCH_WEBGPU
    } else {
        EVAL_BATCH_CPU
    }
    .min(all_moves.len())
    .max(1);

    let worker = |worker_id: usize| {
        let mut searcher = Searcher::new(
            engine,
            cpu_side,
            mode,
            deadline,
            external_stop,
            game_history,
            worker_id,
        );
        loop {
            if searcher.time_up() || Instant::now() > deadline {
                break;
            }

            // Select a batch of paths under the tree lock.
            let mut selected: Vec<SelectionPath> = Vec::with_capacity(batch_size);
            {
                let mut t = tree.lock().unwrap();
                for _ in 0..batch_size {
                    match select_path(&mut t, opp_side, &searcher.td) {
                        Some(sel) => selected.push(sel),
                        None => break,
                    }
                }
            }
            if selected.is_empty() {
                break;
            }

            // Leaf alpha-beta values, outside the lock.
            let mut values: Vec<i32> = Vec::with_capacity(selected.len());
            let mut ok: Vec<bool> = Vec::with_capacity(selected.len());
            for sel in selected.iter_mut() {
                let v = searcher.alphabeta(
                    &mut sel.eval_state,
                    ab_depth,
                    -INFTY,
                    INFTY,
                    if sel.l2.is_some() { 2 } else { 1 },
                    true,
                    Some(sel.prev_move),
                );
                let valid = !searcher.time_up();
                values.push(v);
                ok.push(valid);
                if !valid {
                    break;
                }
            }
            while values.len() < selected.len() {
                values.push(0);
                ok.push(false);
            }

            // Blend in batched static evaluations.
            let mut reqs: Vec<EvalRequest<'_>> = Vec::new();
            let mut req_idx: Vec<usize> = Vec::new();
            for (i, sel) in selected.iter_mut().enumerate() {
                if !ok[i] {
                    continue;
                }
                sel.eval_state.ensure_attack_cache();
                req_idx.push(i);
            }
            for &i in req_idx.iter() {
                let sel = &selected[i];
                reqs.push(EvalRequest {
                    pieces: &sel.eval_state.pieces,
                    perspective: cpu_side,
                    cache: Some(&sel.eval_state.atk),
                    side_to_move: Some(sel.eval_state.turn),
                });
            }
            if !reqs.is_empty() {
                let batch_scores = score_batch(backend, &reqs);
                for (j, &i) in req_idx.iter().enumerate() {
                    let b = batch_scores.get(j).copied().unwrap_or(0);
                    values[i] = if use_webgpu {
                        (values[i] * 3 + b) / 4
                    } else {
                        (values[i] * 7 + b) / 8
                    };
                }
            }

            // Backpropagate under the lock.
            let mut t = tree.lock().unwrap();
            let mut any_applied = false;
            for (i, sel) in selected.iter().enumerate() {
                if !ok[i] {
                    rollback_virtual_loss(&mut t, sel);
                    continue;
                }
                let leaf_val = (values[i] as f32 / VALUE_SCALE).clamp(-1.0, 1.0);
                apply_leaf_result(&mut t, sel, leaf_val);
                any_applied = true;
            }
            if !any_applied && Instant::now() > deadline {
                break;
            }
        }
    };

    let mut num_workers = engine.config().thread_count().min(MAX_WORKERS);
    if time_ms <= 100 || all_moves.len() <= 2 {
        num_workers = 1;
    }

    if num_workers == 1 {
        worker(0);
    } else {
        std::thread::scope(|scope| {
            for id in 0..num_workers {
                let worker = &worker;
                scope.spawn(move || worker(id));
            }
        });
    }

    // Most-visited child, ties broken by mean value.
    let t = tree.lock().unwrap();
    let mut best_idx = 0;
    let mut best_visits = -1;
    let mut best_q = f32::MIN;
    for (i, c) in t.children.iter().enumerate() {
        let q = if c.visits > 0 {
            c.total_value / c.visits as f32
        } else {
            0.0
        };
        if c.visits > best_visits || (c.visits == best_visits && q > best_q) {
            best_visits = c.visits;
            best_q = q;
            best_idx = i;
        }
    }
    debug!(
        "mcts root: {} visits over {} children",
        t.root_visits,
        t.children.len()
    );
    if best_visits <= 0 {
        return None;
    }
    Some(t.children[best_idx].mv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::initial_setup;
    use crate::config::EngineConfig;

    fn engine() -> Engine {
        Engine::new(EngineConfig {
            tt_size_mb: 8,
            force_single_thread: true,
            ..Default::default()
        })
    }

    #[test]
    fn test_priors_form_a_distribution() {
        let pieces = initial_setup();
        let moves = all_moves_for(&pieces, Side::Red);
        let td = ThreadData::new(0);
        let priors = policy_priors(&moves, &pieces, Side::Red, &td);
        assert_eq!(priors.len(), moves.len());
        let sum: f32 = priors.iter().sum();
        assert!((sum - 1.0).abs() < 1e-3, "softmax must normalise: {sum}");
        assert!(priors.iter().all(|&p| p >= 0.0));
    }

    #[test]
    fn test_captures_get_sharp_priors() {
        let pieces = vec![
            Piece::new(1, Side::Red, Kind::Commander, 4, 0),
            Piece::new(2, Side::Blue, Kind::Commander, 5, 11),
            Piece::new(3, Side::Red, Kind::Tank, 4, 4),
            Piece::new(4, Side::Blue, Kind::Artillery, 4, 5),
        ];
        let moves = all_moves_for(&pieces, Side::Red);
        let td = ThreadData::new(0);
        let priors = policy_priors(&moves, &pieces, Side::Red, &td);
        let cap_idx = moves
            .iter()
            .position(|m| m.pid == 3 && m.dc == 4 && m.dr == 5)
            .unwrap();
        let max = priors.iter().cloned().fold(f32::MIN, f32::max);
        assert!(
            (priors[cap_idx] - max).abs() < 1e-6,
            "free artillery capture should top the policy"
        );
    }

    #[test]
    fn test_mcts_returns_legal_move() {
        let engine = engine();
        let pieces = initial_setup();
        let m = mcts_ab_root_search(
            &engine,
            &pieces,
            Side::Red,
            GameMode::Full,
            1,
            2500,
            &[],
            None,
        )
        .expect("mcts finds a move");
        assert!(all_moves_for(&pieces, Side::Red).contains(&m));
    }

    #[test]
    fn test_virtual_loss_arithmetic() {
        assert_eq!(q_with_virtual_loss(0.0, 0, 0), 0.0);
        let q = q_with_virtual_loss(1.0, 1, 1);
        assert!(q < 1.0, "virtual loss must drag q down: {q}");
    }
}
