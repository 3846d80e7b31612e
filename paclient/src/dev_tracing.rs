//! Development helper: initialize tracing subscriber when `RUST_LOG` is set.
//!
//! Examples and tests can call `paclient::dev_tracing::init_tracing()` to
//! enable structured logging for debugging. Never call this from library
//! code that runs inside an embedding application -- installing a global
//! subscriber is the application's decision, not this crate's.
pub fn init_tracing() {
    use std::env;

    if env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }
}
