#![allow(dead_code)]
//! Shared integration test utilities.
//!
//! Import with:
//! ```ignore
//! mod common;
//! use common::*;
//! ```

use promise_stage::Promise;
use std::sync::{Arc, Mutex, Once};
use std::thread;
use tracing_subscriber::EnvFilter;

static INIT_LOGGING: Once = Once::new();

/// Installs a test-writer subscriber once per test binary. `RUST_LOG`
/// overrides the default `info` filter.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_thread_names(true)
            .with_target(true)
            .with_ansi(false)
            .try_init();
    });
}

/// Stand-in for a lookup that has already finished.
pub fn get_user_name() -> Promise<String> {
    Promise::completed("kewne".to_string())
}

pub fn current_thread_name() -> String {
    thread::current().name().unwrap_or("<unnamed>").to_string()
}

/// Records which stages ran, in order, and on which thread.
#[derive(Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<(String, String)>>>,
}

impl Journal {
    pub fn record(&self, stage: &str) {
        self.entries
            .lock()
            .unwrap()
            .push((stage.to_string(), current_thread_name()));
    }

    pub fn stages(&self) -> Vec<String> {
        self.entries.lock().unwrap().iter().map(|(stage, _)| stage.clone()).collect()
    }

    pub fn threads(&self) -> Vec<String> {
        self.entries.lock().unwrap().iter().map(|(_, thread)| thread.clone()).collect()
    }
}
