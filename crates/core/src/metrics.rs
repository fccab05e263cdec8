//! Metric names and descriptions.
//!
//! Every stage records through the `metrics` facade using the constants
//! below; the daemon installs the Prometheus recorder and calls
//! [`describe_all`] once.
//!
//! Naming: `sbomer_` prefix, stage name, then `_total` for counters and
//! `_seconds` for durations.

// --- label keys ---

/// Outcome label key (`success`, `failed`, `requeued`, `malformed`)
pub const LABEL_RESULT: &str = "result";

/// Discovery scope label key (`all`, `group:<id>`)
pub const LABEL_SCOPE: &str = "scope";

// --- discovery scheduler ---

/// Projects seen in listing pages (counter)
pub const FETCHER_PROJECTS_DISCOVERED_TOTAL: &str = "sbomer_fetcher_projects_discovered_total";

/// Work items that failed to publish (counter)
pub const FETCHER_PUBLISH_FAILURES_TOTAL: &str = "sbomer_fetcher_publish_failures_total";

/// Completed discovery passes (counter, label: result)
pub const FETCHER_PASSES_TOTAL: &str = "sbomer_fetcher_passes_total";

/// Projects dropped by the topic filter (counter)
pub const FETCHER_PROJECTS_FILTERED_TOTAL: &str = "sbomer_fetcher_projects_filtered_total";

// --- job processor ---

/// Processed work items (counter, label: result)
pub const PROCESSOR_ITEMS_TOTAL: &str = "sbomer_processor_items_total";

/// End-to-end time of one work item (histogram, seconds)
pub const PROCESSOR_ITEM_DURATION_SECONDS: &str = "sbomer_processor_item_duration_seconds";

/// Scan requests lost after the SBOM was persisted (counter)
pub const PROCESSOR_SCAN_REQUESTS_LOST_TOTAL: &str = "sbomer_processor_scan_requests_lost_total";

// --- daemon ---

/// Daemon uptime (gauge, seconds)
pub const DAEMON_UPTIME_SECONDS: &str = "sbomer_daemon_uptime_seconds";

/// Item duration buckets. Clones and syft runs dominate, so 1s to 30min.
pub const ITEM_DURATION_BUCKETS: [f64; 9] =
    [1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 900.0, 1800.0];

/// Registers HELP text for every metric. Call once after the recorder is
/// installed.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!(
        FETCHER_PROJECTS_DISCOVERED_TOTAL,
        "Projects returned by the repository platform listing"
    );
    describe_counter!(
        FETCHER_PUBLISH_FAILURES_TOTAL,
        "Work items that could not be published to the discovery queue"
    );
    describe_counter!(FETCHER_PASSES_TOTAL, "Discovery passes by outcome");
    describe_counter!(
        FETCHER_PROJECTS_FILTERED_TOTAL,
        "Projects skipped by the include/exclude topic filter"
    );

    describe_counter!(PROCESSOR_ITEMS_TOTAL, "Work items processed by outcome");
    describe_histogram!(
        PROCESSOR_ITEM_DURATION_SECONDS,
        "Time to take one work item from delivery to acknowledgement"
    );
    describe_counter!(
        PROCESSOR_SCAN_REQUESTS_LOST_TOTAL,
        "Scan request events that failed to publish after the SBOM was stored"
    );

    describe_gauge!(DAEMON_UPTIME_SECONDS, "sbomer daemon uptime in seconds");
}
