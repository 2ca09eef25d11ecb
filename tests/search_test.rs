//! Search-level properties: legality, determinism, deadlines, strength.

use std::time::{Duration, Instant};

use cotulenh::{Engine, EngineConfig, GameMode, Kind, Move, Piece, Side};

fn quiet_engine() -> Engine {
    Engine::new(EngineConfig {
        tt_size_mb: 8,
        force_single_thread: true,
        use_opening_book: false,
        ..Default::default()
    })
}

#[test]
fn picked_move_is_always_legal() {
    let e = quiet_engine();
    let g = e.new_game("full", "medium");
    let m = e
        .pick_move(
            &g.pieces,
            Side::Red,
            GameMode::Full,
            2,
            500,
            false,
            &g.position_history,
            None,
        )
        .expect("opening position has moves");
    assert!(g.legal_moves().contains(&m));
}

#[test]
fn single_thread_search_is_deterministic() {
    // Identical config and seeds on the single-threaded path produce
    // identical principal moves. Fresh engines so no table state leaks
    // between the runs, and a midgame position keeps the runs well inside
    // the budget.
    let position = || -> Vec<Piece> {
        vec![
            Piece::new(1, Side::Red, Kind::Commander, 4, 0),
            Piece::new(2, Side::Red, Kind::Headquarters, 5, 0),
            Piece::new(3, Side::Red, Kind::Tank, 5, 4),
            Piece::new(4, Side::Red, Kind::Infantry, 4, 3),
            Piece::new(5, Side::Red, Kind::Navy, 0, 3),
            Piece::new(6, Side::Blue, Kind::Commander, 5, 11),
            Piece::new(7, Side::Blue, Kind::Infantry, 6, 8),
            Piece::new(8, Side::Blue, Kind::Tank, 5, 7),
            Piece::new(9, Side::Blue, Kind::Navy, 0, 8),
            Piece::new(10, Side::Blue, Kind::AntiAir, 3, 9),
        ]
    };
    let pick = || {
        let e = quiet_engine();
        e.pick_move(
            &position(),
            Side::Red,
            GameMode::Full,
            3,
            30_000,
            false,
            &[],
            None,
        )
    };
    let a = pick();
    let b = pick();
    assert_eq!(a, b);
    assert!(a.is_some());
}

#[test]
fn hard_deadline_is_respected() {
    // Wall clock stays within the budget plus the throttled check
    // interval.
    let e = quiet_engine();
    let g = e.new_game("full", "medium");
    let budget = Duration::from_millis(300);
    let start = Instant::now();
    let _ = e.pick_move(
        &g.pieces,
        Side::Red,
        GameMode::Full,
        20,
        budget.as_millis() as u64,
        false,
        &g.position_history,
        None,
    );
    assert!(
        start.elapsed() < budget + Duration::from_millis(2200),
        "took {:?}",
        start.elapsed()
    );
}

#[test]
fn search_takes_the_hanging_navy() {
    // Tactics check: an undefended navy within reach must be taken (or
    // at minimum a capture must be chosen).
    let e = quiet_engine();
    let pieces = vec![
        Piece::new(1, Side::Red, Kind::Commander, 4, 0),
        Piece::new(2, Side::Blue, Kind::Commander, 5, 11),
        Piece::new(3, Side::Red, Kind::Navy, 2, 5),
        Piece::new(4, Side::Blue, Kind::Navy, 4, 5),
        Piece::new(5, Side::Blue, Kind::Infantry, 9, 9),
        Piece::new(6, Side::Red, Kind::Infantry, 9, 2),
    ];
    let m = e
        .pick_move(
            &pieces,
            Side::Red,
            GameMode::Full,
            3,
            3_000,
            false,
            &[],
            None,
        )
        .unwrap();
    assert_eq!(
        m,
        Move::new(3, 4, 5),
        "the free navy capture dominates everything else"
    );
}

#[test]
fn bot_finishes_a_marine_battle() {
    // The bot must find the game-ending navy kill in marine mode.
    let e = quiet_engine();
    let mut g = e.new_game("marine", "easy");
    g.pieces = vec![
        Piece::new(1, Side::Red, Kind::Commander, 4, 0),
        Piece::new(2, Side::Blue, Kind::Commander, 5, 11),
        Piece::new(3, Side::Red, Kind::Navy, 2, 5),
        Piece::new(4, Side::Blue, Kind::Navy, 4, 5),
        Piece::new(5, Side::Red, Kind::Navy, 0, 1),
        Piece::new(6, Side::Blue, Kind::Infantry, 9, 9),
    ];
    g.position_history.clear();

    let played = e.bot_move(&mut g).expect("bot finds a move");
    assert_eq!(played, Move::new(3, 4, 5), "sink the last enemy navy");
    assert!(g.game_over);
    assert_eq!(g.result, "red wins — Naval division destroyed!");
}

#[test]
fn bot_rejects_finished_games() {
    let e = quiet_engine();
    let mut g = e.new_game("full", "easy");
    g.game_over = true;
    assert!(e.bot_move(&mut g).is_err());
}

#[test]
fn mcts_path_returns_legal_move() {
    let e = quiet_engine();
    let g = e.new_game("full", "medium");
    let m = e
        .pick_move(
            &g.pieces,
            Side::Red,
            GameMode::Full,
            4,
            600,
            true,
            &g.position_history,
            None,
        )
        .expect("hybrid root finds a move");
    assert!(g.legal_moves().contains(&m));
}

#[test]
fn book_move_survives_safety_filter() {
    // With the book enabled the very first pick comes straight from it
    // and must of course be legal.
    let e = Engine::new(EngineConfig {
        tt_size_mb: 8,
        force_single_thread: true,
        use_opening_book: true,
        ..Default::default()
    });
    let g = e.new_game("full", "medium");
    let m = e
        .pick_move(
            &g.pieces,
            Side::Red,
            GameMode::Full,
            2,
            300,
            false,
            &g.position_history,
            None,
        )
        .unwrap();
    assert!(g.legal_moves().contains(&m));
}

#[test]
fn two_bots_play_a_short_game() {
    // A miniature self-play smoke test: alternate bot moves at the easy
    // setting and require a legal, consistent session throughout.
    let e = Engine::new(EngineConfig {
        tt_size_mb: 8,
        force_single_thread: true,
        ..Default::default()
    });
    let mut g = e.new_game("full", "easy");
    // Keep this quick: trim the per-move budget via direct picks.
    for _ in 0..6 {
        if g.game_over {
            break;
        }
        let m = e
            .pick_move(
                &g.pieces,
                g.turn,
                g.mode,
                2,
                250,
                false,
                &g.position_history,
                None,
            )
            .expect("live game has moves");
        e.apply_move(&mut g, m).unwrap();
        assert!(cotulenh::board::validate_state(&g.pieces));
    }
}
