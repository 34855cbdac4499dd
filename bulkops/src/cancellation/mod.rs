//! Cooperative cancellation of bulk runs.

mod token;

pub use token::CancellationToken;
