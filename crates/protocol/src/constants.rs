//! Protocol constants shared by every stage of the relay.

use std::time::Duration;

/// Fixed upload part size: 512 KiB, the largest part the remote accepts.
pub const PART_SIZE: usize = 512 * 1024;

/// Files strictly larger than this use big-file mode (10 MiB).
pub const BIG_FILE_THRESHOLD: u64 = 10 * 1024 * 1024;

/// Hard ceiling for a single relayed file (2 GiB).
pub const MAX_FILE_SIZE: u64 = 2 * 1024 * 1024 * 1024;

/// Maximum number of artifacts in one group send.
pub const MAX_BATCH: usize = 8;

/// Default relay queue capacity, in chunks.
pub const RELAY_CAPACITY: usize = 5;

/// Concurrent part commits in big-file mode.
pub const BIG_MODE_WORKERS: usize = 3;

/// Concurrent part commits in small-file mode.
pub const SMALL_MODE_WORKERS: usize = 1;

/// Attempts per remote call before giving up.
pub const MAX_ATTEMPTS: u32 = 3;

/// Extra sleep added on top of a rate-limit hint.
pub const RATE_LIMIT_MARGIN: Duration = Duration::from_secs(1);

/// Fixed backoff after a non-rate-limit failure.
pub const RETRY_BACKOFF: Duration = Duration::from_secs(2);

/// Timeout applied to every single remote call.
pub const REMOTE_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Interval between status renders. Kept below the remote UI edit rate limit.
pub const STATUS_INTERVAL: Duration = Duration::from_millis(2500);

/// Trailing window for rolling throughput.
pub const SPEED_WINDOW: Duration = Duration::from_secs(8);

/// Samples retained per direction for throughput measurement.
pub const SPEED_SAMPLE_CAP: usize = 30;
