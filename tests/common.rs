// tests/common.rs
use std::sync::Once;

static INIT: Once = Once::new();

// Initializes logging (and .env, when present) for integration tests.
// Uses std::sync::Once to ensure it only runs once across all tests.
pub fn setup() {
    INIT.call_once(|| {
        dotenv::dotenv().ok();
        env_logger::builder().is_test(true).try_init().ok();
    });
}
