pub mod error;
pub mod estimate;
pub mod output;
pub mod prompt;
pub mod rate_limit;
pub mod recall;
pub mod vagueness;
