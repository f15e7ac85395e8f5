pub mod builders;
pub mod fake_runner;
pub mod fake_simulation;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Upper bound for a single integration test step.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Install a per-test tracing subscriber once per test binary.
///
/// Output is captured by the harness and only shown for failing tests.
/// Filter directives come from `SIMBATCH_LOG` (as in the binary), falling
/// back to `simbatch=info`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env("SIMBATCH_LOG")
            .unwrap_or_else(|_| EnvFilter::new("simbatch=info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Await `f`, failing the test after [`TEST_TIMEOUT`].
///
/// Guards against a hung child process or a cancel signal that never fires.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(TEST_TIMEOUT, f).await {
        Ok(value) => value,
        Err(_) => panic!("test step did not finish within {TEST_TIMEOUT:?}"),
    }
}
