use crate::evaluation::EvalBackend;

/// Engine tuning knobs. Every field has a sensible default and an optional
/// `COTULENH_*` environment override so deployments can be tuned without a
/// rebuild.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Force the MCTS-AB root regardless of difficulty.
    pub use_mcts: bool,
    pub use_opening_book: bool,
    /// Transposition table budget; clamped to at least 8 MiB.
    pub tt_size_mb: usize,
    pub max_depth: i32,
    pub time_limit_ms: u64,
    /// Leaf alpha-beta depth inside the MCTS root.
    pub mcts_ab_depth: i32,
    /// Disables the worker pool and the TT stripe locks.
    pub force_single_thread: bool,
    pub eval_backend: EvalBackend,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            use_mcts: false,
            use_opening_book: true,
            tt_size_mb: 256,
            max_depth: 6,
            time_limit_ms: 3000,
            mcts_ab_depth: 3,
            force_single_thread: false,
            eval_backend: EvalBackend::Auto,
        }
    }
}

fn env_bool(name: &str) -> Option<bool> {
    std::env::var(name).ok().map(|v| {
        matches!(
            v.to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_num<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

impl EngineConfig {
    /// Defaults overlaid with any `COTULENH_*` environment variables.
    pub fn from_env() -> Self {
        let mut cfg = EngineConfig::default();
        if let Some(v) = env_bool("COTULENH_USE_MCTS") {
            cfg.use_mcts = v;
        }
        if let Some(v) = env_bool("COTULENH_USE_OPENING_BOOK") {
            cfg.use_opening_book = v;
        }
        if let Some(v) = env_num::<usize>("COTULENH_TT_SIZE_MB") {
            cfg.tt_size_mb = v;
        }
        if let Some(v) = env_num::<i32>("COTULENH_MAX_DEPTH") {
            cfg.max_depth = v;
        }
        if let Some(v) = env_num::<u64>("COTULENH_TIME_LIMIT_MS") {
            cfg.time_limit_ms = v;
        }
        if let Some(v) = env_num::<i32>("COTULENH_MCTS_AB_DEPTH") {
            cfg.mcts_ab_depth = v;
        }
        if let Some(v) = env_bool("COTULENH_FORCE_SINGLE_THREAD") {
            cfg.force_single_thread = v;
        }
        if let Some(v) = std::env::var("COTULENH_EVAL_BACKEND")
            .ok()
            .and_then(|s| EvalBackend::from_str(&s))
        {
            cfg.eval_backend = v;
        }
        cfg.normalize()
    }

    /// Clamp interdependent fields into their contracts. Restricted
    /// runtimes (single-thread) also cap the TT budget.
    pub fn normalize(mut self) -> Self {
        self.tt_size_mb = self.tt_size_mb.max(8);
        if self.force_single_thread {
            self.tt_size_mb = self.tt_size_mb.min(128);
        }
        self.max_depth = self.max_depth.max(1);
        self.mcts_ab_depth = self.mcts_ab_depth.max(1);
        self
    }

    /// Worker pool size under this config.
    pub fn thread_count(&self) -> usize {
        if self.force_single_thread {
            return 1;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(8)
    }
}
