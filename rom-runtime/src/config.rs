/// How per-object variable tables are synchronized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableStrategy {
    /// Every read, write and grow takes the object's own lock.
    Synchronized,
    /// Reads are lock-free, in-place writes are validated against a generation
    /// stamp, and only growing the table is exclusive.
    #[default]
    Stamped,
}

/// The knobs of one runtime instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// The variable table synchronization strategy.
    pub variable_strategy: TableStrategy,
    /// Whether resolved methods are cached per (class, name).
    pub method_cache: bool,
    /// The initial safe level.
    pub safe_level: u8,
    /// How many symbols the interner makes room for up front.
    pub initial_symbol_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            variable_strategy: TableStrategy::default(),
            method_cache: true,
            safe_level: 0,
            initial_symbol_capacity: 256,
        }
    }
}

impl RuntimeConfig {
    pub fn with_variable_strategy(mut self, strategy: TableStrategy) -> Self {
        self.variable_strategy = strategy;
        self
    }

    pub fn with_method_cache(mut self, enabled: bool) -> Self {
        self.method_cache = enabled;
        self
    }

    pub fn with_safe_level(mut self, level: u8) -> Self {
        self.safe_level = level;
        self
    }

    pub fn with_initial_symbol_capacity(mut self, cap: usize) -> Self {
        self.initial_symbol_capacity = cap;
        self
    }
}
