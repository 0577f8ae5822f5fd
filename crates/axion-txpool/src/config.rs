//! Pool configuration.

use axion_types::Address;
use std::time::Duration;
use tracing::warn;

/// Configuration parameters of the transaction pool.
#[derive(Debug, Clone)]
pub struct Config {
    /// Addresses that should be treated by default as local
    pub locals: Vec<Address>,
    /// Whether local transaction handling should be disabled
    pub no_locals: bool,
    /// Journal of local transactions to survive node restarts; empty
    /// disables journaling
    pub journal: String,
    /// Time interval to regenerate the local transaction journal
    pub rejournal: Duration,

    /// Minimum gas price to enforce for acceptance into the pool
    pub price_limit: u64,
    /// Minimum price bump percentage to replace an already existing
    /// transaction (nonce)
    pub price_bump: u64,

    /// Number of executable transaction slots guaranteed per account
    pub account_slots: u64,
    /// Maximum number of executable transaction slots for all accounts
    pub global_slots: u64,
    /// Maximum number of non-executable transaction slots permitted per
    /// account
    pub account_queue: u64,
    /// Maximum number of non-executable transaction slots for all accounts
    pub global_queue: u64,

    /// Maximum amount of time non-executable transactions are queued
    pub lifetime: Duration,
    /// How often the queue is scanned for lifetime violations
    pub eviction_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            locals: Vec::new(),
            no_locals: false,
            journal: "transactions.journal".to_string(),
            rejournal: Duration::from_secs(60 * 60),
            price_limit: 1,
            price_bump: 10,
            account_slots: 16,
            global_slots: 4096,
            account_queue: 64,
            global_queue: 1024,
            lifetime: Duration::from_secs(3 * 60 * 60),
            eviction_interval: Duration::from_secs(60),
        }
    }
}

impl Config {
    /// Clamp unreasonable values to sane defaults, warning about each.
    pub fn sanitize(mut self) -> Self {
        let defaults = Config::default();
        if self.rejournal < Duration::from_secs(1) {
            warn!(provided = ?self.rejournal, updated = ?defaults.rejournal, "sanitizing invalid txpool journal time");
            self.rejournal = defaults.rejournal;
        }
        if self.price_limit < 1 {
            warn!(provided = self.price_limit, updated = defaults.price_limit, "sanitizing invalid txpool price limit");
            self.price_limit = defaults.price_limit;
        }
        if self.price_bump < 1 {
            warn!(provided = self.price_bump, updated = defaults.price_bump, "sanitizing invalid txpool price bump");
            self.price_bump = defaults.price_bump;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_clamps_zeroes() {
        let config = Config {
            price_limit: 0,
            price_bump: 0,
            rejournal: Duration::from_millis(1),
            ..Default::default()
        }
        .sanitize();

        let defaults = Config::default();
        assert_eq!(config.price_limit, defaults.price_limit);
        assert_eq!(config.price_bump, defaults.price_bump);
        assert_eq!(config.rejournal, defaults.rejournal);
    }

    #[test]
    fn test_sanitize_keeps_explicit_capacity_choices() {
        // Capacity knobs are policy, not sanity; zero queues are legitimate
        let config = Config {
            account_slots: 5,
            global_queue: 0,
            ..Default::default()
        }
        .sanitize();
        assert_eq!(config.account_slots, 5);
        assert_eq!(config.global_queue, 0);
    }
}
