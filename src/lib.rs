//! Commander Chess (Cờ Tư Lệnh) rule core and search engine.
//!
//! The [`Engine`] owns everything that was process-wide state in earlier
//! incarnations: the transposition arena, the correction-history banks,
//! the configuration and the sprite mapping. Sessions are plain
//! [`GameState`] values; every operation takes the engine by reference.

use std::sync::atomic::AtomicBool;
use std::sync::Mutex;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod attacks;
pub mod board;
pub mod config;
pub mod evaluation;
pub mod game;
pub mod moves;
pub mod search;

pub use board::{Kind, Piece, PieceList, Side};
pub use config::EngineConfig;
pub use game::{Difficulty, GameMode, GameState, LastMove};
pub use moves::Move;

use search::corrhist::CorrectionHistory;
use search::smp::smp_pick_move;
use search::tt::TranspositionTable;

// ============================================================================
// Errors
// ============================================================================

/// Tagged status codes for every public operation; the engine never
/// panics through its API. Display strings are the fixed user-visible
/// vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("piece not found")]
    PieceNotFound,
    #[error("not this piece's turn")]
    WrongTurn,
    #[error("illegal move")]
    IllegalMove,
    #[error("game is already over")]
    GameOver,
    #[error("bot could not find a legal move")]
    NoLegalMove,
    #[error("invalid state JSON")]
    InvalidStateJson,
    #[error("missing/invalid move")]
    InvalidInput,
    #[error("resource exhausted")]
    ResourceExhausted,
}

impl EngineError {
    /// Machine-readable kind, stable across display-string changes.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::PieceNotFound | EngineError::WrongTurn | EngineError::IllegalMove => {
                "illegal-move"
            }
            EngineError::GameOver => "game-over",
            EngineError::NoLegalMove => "no-legal-move",
            EngineError::InvalidStateJson | EngineError::InvalidInput => "invalid-input",
            EngineError::ResourceExhausted => "resource-exhausted",
        }
    }
}

// ============================================================================
// Serialized state
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedState {
    pub turn: Side,
    pub game_over: bool,
    pub result: String,
    pub has_last_move: bool,
    pub last_move: Option<Move>,
    pub last_move_capture: bool,
    pub last_move_player: Side,
    pub game_mode: GameMode,
    pub difficulty: Difficulty,
    pub pieces: Vec<Piece>,
    pub legal_moves: Vec<Move>,
    pub board: BoardDims,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BoardDims {
    pub cols: i8,
    pub rows: i8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveOutcome {
    pub capture: bool,
    pub game_over: bool,
}

// ============================================================================
// JSON adapter helpers
// ============================================================================

/// Accepts `{pid, dc, dr}`, `{piece_id, to_col, to_row}` or the compact
/// `"pid,dc,dr"` form.
pub fn parse_move_json(raw: &str) -> Result<Move, EngineError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(EngineError::InvalidInput);
    }

    if let Ok(v) = serde_json::from_str::<serde_json::Value>(raw) {
        let get = |k: &str| v.get(k).and_then(|x| x.as_i64());
        if let (Some(pid), Some(dc), Some(dr)) = (get("pid"), get("dc"), get("dr")) {
            return Ok(Move::new(pid as i32, dc as i8, dr as i8));
        }
        if let (Some(pid), Some(dc), Some(dr)) =
            (get("piece_id"), get("to_col"), get("to_row"))
        {
            return Ok(Move::new(pid as i32, dc as i8, dr as i8));
        }
        return Err(EngineError::InvalidInput);
    }

    let parts: Vec<&str> = raw.split(',').collect();
    if parts.len() == 3 {
        if let (Ok(pid), Ok(dc), Ok(dr)) = (
            parts[0].trim().parse::<i32>(),
            parts[1].trim().parse::<i8>(),
            parts[2].trim().parse::<i8>(),
        ) {
            return Ok(Move::new(pid, dc, dr));
        }
    }
    Err(EngineError::InvalidInput)
}

/// Deserialize a previously serialized session.
pub fn parse_state_json(raw: &str) -> Result<GameState, EngineError> {
    let state: GameState =
        serde_json::from_str(raw).map_err(|_| EngineError::InvalidStateJson)?;
    if !board::validate_state(&state.pieces) {
        return Err(EngineError::InvalidStateJson);
    }
    Ok(state)
}

// ============================================================================
// Engine
// ============================================================================

pub struct Engine {
    config: EngineConfig,
    tt: TranspositionTable,
    corrhist: Mutex<CorrectionHistory>,
    sprites: FxHashMap<String, String>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let config = config.normalize();
        let tt = TranspositionTable::new(config.tt_size_mb, !config.force_single_thread);
        if tt.is_degenerate() {
            log::warn!("{}: search will run without a transposition table", EngineError::ResourceExhausted);
        } else {
            log::info!(
                "transposition table ready: {} MiB, {} entries",
                tt.allocated_mb(),
                tt.capacity()
            );
        }
        Engine {
            config,
            tt,
            corrhist: Mutex::new(CorrectionHistory::default()),
            sprites: FxHashMap::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn tt(&self) -> &TranspositionTable {
        &self.tt
    }

    pub(crate) fn corrhist(&self) -> &Mutex<CorrectionHistory> {
        &self.corrhist
    }

    /// Err when the transposition arena could not be allocated at any
    /// fallback size. Search still works, just without memory.
    pub fn resource_status(&self) -> Result<(), EngineError> {
        if self.tt.is_degenerate() {
            Err(EngineError::ResourceExhausted)
        } else {
            Ok(())
        }
    }

    // ========================================================================
    // Session operations
    // ========================================================================

    /// Start a fresh game. Unknown mode or difficulty strings fall back to
    /// full battle at medium strength.
    pub fn new_game(&self, game_mode: &str, difficulty: &str) -> GameState {
        GameState::new(GameMode::from_str(game_mode), Difficulty::from_str(difficulty))
    }

    /// Validate and play one half-move for the side to move.
    pub fn apply_move(&self, state: &mut GameState, mv: Move) -> Result<MoveOutcome, EngineError> {
        state.apply(mv.pid, mv.dc, mv.dr)?;
        Ok(MoveOutcome {
            capture: state.last_move.map_or(false, |lm| lm.capture),
            game_over: state.game_over,
        })
    }

    /// Run the configured search for the side to move, then play the
    /// result.
    pub fn bot_move(&self, state: &mut GameState) -> Result<Move, EngineError> {
        if state.game_over {
            return Err(EngineError::GameOver);
        }
        let use_mcts = self.config.use_mcts || state.difficulty.uses_mcts();
        let m = self
            .pick_move(
                &state.pieces,
                state.turn,
                state.mode,
                state.difficulty.depth(),
                state.difficulty.time_limit_ms(),
                use_mcts,
                &state.position_history,
                None,
            )
            .ok_or(EngineError::NoLegalMove)?;
        state.apply(m.pid, m.dc, m.dr)?;
        Ok(m)
    }

    /// Select a move under a depth and wall-clock budget without touching
    /// the session. The hard deadline is never exceeded beyond the
    /// throttled time-check interval.
    #[allow(clippy::too_many_arguments)]
    pub fn pick_move(
        &self,
        pieces: &[Piece],
        side: Side,
        mode: GameMode,
        depth: i32,
        time_ms: u64,
        use_mcts: bool,
        game_history: &[u64],
        stop: Option<&AtomicBool>,
    ) -> Option<Move> {
        let all = moves::all_moves_for(pieces, side);
        if all.is_empty() {
            return None;
        }
        if all.len() == 1 {
            return Some(all[0]);
        }

        if self.config.use_opening_book {
            if let Some(book) = search::book::opening_book_pick(pieces, side, mode) {
                log::debug!("book move for {}: {:?}", side.to_str(), book);
                return Some(book);
            }
        }

        // Entries survive between searches; they are aged, not evicted.
        self.tt.bump_age();
        if let Ok(mut ch) = self.corrhist.lock() {
            ch.halve();
        }

        if use_mcts {
            let mcts_budget = time_ms * 7 / 10;
            let picked = search::mcts::mcts_ab_root_search(
                self,
                pieces,
                side,
                mode,
                self.config.mcts_ab_depth,
                mcts_budget,
                game_history,
                stop,
            );
            // Brief alpha-beta verification on the remaining budget; its
            // verdict overrides the tree statistics.
            let verify_budget = time_ms.saturating_sub(mcts_budget);
            if verify_budget >= 50 {
                if let Some(v) = smp_pick_move(
                    self,
                    pieces,
                    side,
                    mode,
                    depth.min(6),
                    verify_budget,
                    game_history,
                    stop,
                ) {
                    return Some(v);
                }
            }
            return picked.or(Some(all[0]));
        }

        smp_pick_move(self, pieces, side, mode, depth, time_ms, game_history, stop)
            .or(Some(all[0]))
    }

    /// Snapshot a session for the adapter layer: pieces, outcome, last
    /// move, and (while the game is live) the full legal-move list.
    pub fn serialize_state(&self, state: &GameState) -> SerializedState {
        let legal_moves = if state.game_over {
            Vec::new()
        } else {
            state.legal_moves().into_iter().collect()
        };
        SerializedState {
            turn: state.turn,
            game_over: state.game_over,
            result: state.result.clone(),
            has_last_move: state.last_move.is_some(),
            last_move: state.last_move.map(|lm| lm.mv),
            last_move_capture: state.last_move.map_or(false, |lm| lm.capture),
            last_move_player: state.last_move.map_or(Side::Red, |lm| lm.side),
            game_mode: state.mode,
            difficulty: state.difficulty,
            pieces: state.pieces.clone(),
            legal_moves,
            board: BoardDims {
                cols: board::COLS,
                rows: board::ROWS,
            },
        }
    }

    // ========================================================================
    // Sprites (supplied by a collaborator; empty mapping is fine)
    // ========================================================================

    pub fn piece_sprites(&self) -> &FxHashMap<String, String> {
        &self.sprites
    }

    pub fn set_piece_sprites(&mut self, sprites: FxHashMap<String, String>) {
        self.sprites = sprites;
    }
}

// Re-exported for integration tests and adapters that talk rules directly.
pub use game::{apply_move_rules, check_terminal, has_immediate_winning_move, promote_heroes};
pub use moves::{all_moves_for, moves as piece_moves};

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Engine {
        Engine::new(EngineConfig {
            tt_size_mb: 8,
            force_single_thread: true,
            ..Default::default()
        })
    }

    #[test]
    fn test_new_game_defaults() {
        let e = engine();
        let g = e.new_game("nonsense", "whatever");
        assert_eq!(g.mode, GameMode::Full);
        assert_eq!(g.difficulty, Difficulty::Medium);
        assert_eq!(g.pieces.len(), 38);
        assert_eq!(g.turn, Side::Red);
        assert!(!g.game_over);
    }

    #[test]
    fn test_apply_move_round_trip() {
        let e = engine();
        let mut g = e.new_game("full", "easy");
        let mv = g.legal_moves()[0];
        let outcome = e.apply_move(&mut g, mv).unwrap();
        assert!(!outcome.game_over);
        assert_eq!(g.turn, Side::Blue);
    }

    #[test]
    fn test_error_vocabulary() {
        assert_eq!(EngineError::PieceNotFound.to_string(), "piece not found");
        assert_eq!(EngineError::WrongTurn.to_string(), "not this piece's turn");
        assert_eq!(EngineError::IllegalMove.to_string(), "illegal move");
        assert_eq!(EngineError::GameOver.to_string(), "game is already over");
        assert_eq!(
            EngineError::NoLegalMove.to_string(),
            "bot could not find a legal move"
        );
        assert_eq!(
            EngineError::InvalidStateJson.to_string(),
            "invalid state JSON"
        );
        assert_eq!(EngineError::InvalidInput.to_string(), "missing/invalid move");
        assert_eq!(EngineError::IllegalMove.kind(), "illegal-move");
        assert_eq!(EngineError::InvalidStateJson.kind(), "invalid-input");
    }

    #[test]
    fn test_parse_move_json_variants() {
        assert_eq!(
            parse_move_json(r#"{"pid": 3, "dc": 4, "dr": 5}"#).unwrap(),
            Move::new(3, 4, 5)
        );
        assert_eq!(
            parse_move_json(r#"{"piece_id": 7, "to_col": 2, "to_row": 9}"#).unwrap(),
            Move::new(7, 2, 9)
        );
        assert_eq!(parse_move_json("3,4,5").unwrap(), Move::new(3, 4, 5));
        assert!(parse_move_json("{}").is_err());
        assert!(parse_move_json("").is_err());
    }

    #[test]
    fn test_state_json_round_trip() {
        let e = engine();
        let g = e.new_game("marine", "hard");
        let json = serde_json::to_string(&g).unwrap();
        let back = parse_state_json(&json).unwrap();
        assert_eq!(back.pieces, g.pieces);
        assert_eq!(back.turn, g.turn);
        assert_eq!(back.mode, GameMode::Marine);
        assert!(parse_state_json("not json").is_err());
    }

    #[test]
    fn test_serialize_state_shape() {
        let e = engine();
        let g = e.new_game("full", "medium");
        let s = e.serialize_state(&g);
        assert_eq!(s.pieces.len(), 38);
        assert!(!s.game_over);
        assert!(!s.legal_moves.is_empty());
        assert_eq!(s.board.cols, 11);
        assert_eq!(s.board.rows, 12);
        // Legal move list matches a fresh generation.
        assert_eq!(s.legal_moves.len(), g.legal_moves().len());
    }

    #[test]
    fn test_sprites_default_empty() {
        let mut e = engine();
        assert!(e.piece_sprites().is_empty());
        let mut map = FxHashMap::default();
        map.insert("red_C".to_string(), "aGVsbG8=".to_string());
        e.set_piece_sprites(map);
        assert_eq!(e.piece_sprites().len(), 1);
    }

    #[test]
    fn test_resource_status_ok_for_small_table() {
        let e = engine();
        assert!(e.resource_status().is_ok());
    }
}
