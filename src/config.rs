//! Tunable resource policy constants.
//!
//! None of these values affect correctness; they trade memory and request
//! count for latency. They are passed in at construction time rather than
//! baked in as globals, so a library embedder can run several configurations
//! side by side in one process.

use std::time::Duration;

/// Resource policy constants shared by the parser, extractor, proxy, and
/// gateway.
#[derive(Debug, Clone, Copy)]
pub struct PolicyConfig {
    /// Maximum payload size the proxy relay will forward before rejecting
    /// with 413 (default: 500 MiB).
    pub proxy_max_response_bytes: u64,

    /// Archive size above which range-parse mode (directory-only fetch) is
    /// preferred over a full download (default: 20 MiB).
    pub range_parse_threshold_bytes: u64,

    /// Per-entry preview size limit; larger entries return `TooLarge`
    /// instead of being decoded (default: 25 MiB).
    pub preview_limit_bytes: u64,

    /// Ceiling for in-memory decompression of a raw (non-preview)
    /// download; larger STORED entries must stream through the proxy, and
    /// larger DEFLATE entries are rejected outright (default: 100 MiB).
    pub raw_decompress_ceiling_bytes: u64,

    /// Number of lines a text/code preview is truncated to (default:
    /// 5,000 lines).
    pub code_preview_line_limit: usize,

    /// Deadline for a direct or proxied HEAD probe (default: ~15s).
    pub head_probe_timeout: Duration,

    /// Deadline for the 1-byte ranged GET probe (default: ~10s).
    pub range_probe_timeout: Duration,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        const MIB: u64 = 1024 * 1024;
        Self {
            proxy_max_response_bytes: 500 * MIB,
            range_parse_threshold_bytes: 20 * MIB,
            preview_limit_bytes: 25 * MIB,
            raw_decompress_ceiling_bytes: 100 * MIB,
            code_preview_line_limit: 5_000,
            head_probe_timeout: Duration::from_secs(15),
            range_probe_timeout: Duration::from_secs(10),
        }
    }
}

/// Selection-size policy for [`crate::zip::archiver::SurgicalArchiver`]:
/// above these thresholds, a caller-visible confirmation hook is invoked
/// before fetching begins.
#[derive(Debug, Clone, Copy)]
pub struct SelectionPolicy {
    /// Total uncompressed bytes above which confirmation is required.
    pub confirm_above_bytes: u64,
    /// Entry count above which confirmation is required.
    pub confirm_above_entries: usize,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        const MIB: u64 = 1024 * 1024;
        Self {
            confirm_above_bytes: 200 * MIB,
            confirm_above_entries: 50,
        }
    }
}
