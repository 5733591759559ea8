//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Token estimation and input budget constants
pub mod tokens {
    /// Characters per estimated token
    pub const CHARS_PER_TOKEN: usize = 4;

    /// Default input budget for explanation, formatting, tagging, classification
    pub const DEFAULT_MAX_INPUT: usize = 12_000;

    /// Input budget for free-form code generation
    pub const GENERATION_MAX_INPUT: usize = 200_000;

    /// Input budget for solution generation (title + description + language)
    pub const SOLUTION_MAX_INPUT: usize = 16_000;

    /// Output cap for code-producing operations
    pub const CODE_MAX_OUTPUT: u32 = 8_192;

    /// Output cap for short answers (explanations on the secondary provider, chat)
    pub const DEFAULT_MAX_OUTPUT: u32 = 2_048;
}

/// Secondary-provider budgets (smaller context, truncated inputs)
pub mod secondary {
    /// Explanation input budget in estimated tokens
    pub const EXPLAIN_MAX_INPUT: usize = 8_000;

    /// Characters of code sent for explanation
    pub const EXPLAIN_TRUNCATE_CHARS: usize = 4_000;

    /// Explanation output cap
    pub const EXPLAIN_MAX_OUTPUT: u32 = 1_500;

    /// Tag suggestion input budget in estimated tokens
    pub const TAGS_MAX_INPUT: usize = 6_000;

    /// Characters of code sent for tagging
    pub const TAGS_TRUNCATE_CHARS: usize = 3_000;

    /// Tag suggestion output cap
    pub const TAGS_MAX_OUTPUT: u32 = 100;

    /// Requests allowed per sliding window
    pub const REQUESTS_PER_WINDOW: u32 = 8;

    /// Sliding window length (seconds)
    pub const WINDOW_SECS: u64 = 60;
}

/// Chunking constants
pub mod chunk {
    /// Fraction of the token budget a single chunk may use
    pub const FILL_RATIO: f64 = 0.9;

    /// Smallest chunk window in characters
    pub const MIN_WINDOW_CHARS: usize = 1_000;

    /// Largest overlap between neighbouring chunks in characters
    pub const MAX_OVERLAP_CHARS: usize = 400;

    /// Overlap as a fraction of the window (window / OVERLAP_DIVISOR)
    pub const OVERLAP_DIVISOR: usize = 10;
}

/// Retry executor constants
pub mod retry {
    /// Total attempts including the first
    pub const MAX_ATTEMPTS: u32 = 3;

    /// Exponential backoff base (seconds, raised to attempt - 1)
    pub const BACKOFF_BASE: f64 = 1.5;

    /// Maximum backoff before jitter (seconds)
    pub const BACKOFF_MAX_SECS: f64 = 8.0;

    /// Upper bound of the uniform jitter (seconds)
    pub const JITTER_MAX_SECS: f64 = 0.5;
}

/// Network constants
pub mod network {
    /// Default per-call timeout (seconds)
    pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

    /// Connection establishment timeout (seconds)
    pub const CONNECTION_TIMEOUT_SECS: u64 = 30;

    /// Concurrent in-flight provider calls
    pub const MAX_CONCURRENT_REQUESTS: usize = 16;
}

/// Tag and chat limits
pub mod limits {
    /// Tags returned after merging chunk results
    pub const MAX_TAGS: usize = 5;

    /// Chat history turns forwarded to the provider
    pub const CHAT_HISTORY_TURNS: usize = 20;

    /// Items listed per section in heuristic explanations
    pub const FALLBACK_LIST_ITEMS: usize = 5;
}

/// Truncation notice appended to length-limited completions
pub const TRUNCATION_NOTE: &str = "\n\n[Note: Response may be incomplete due to length limits]";
