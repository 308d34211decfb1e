//! Defines the metric keys and labels used throughout the index.
//!
//! Using a central module for these constants helps prevent typos and ensures
//! consistency across the codebase.

// --- Metric Keys ---

/// Tracks the total number of user-initiated operations.
///
/// Labels:
/// - `type`: "insert", "delete", "get_value", "conditional_insert", "scan"
pub const OPERATIONS_TOTAL: &str = "stratum_operations_total";

/// Tracks the total number of garbage collection cycles run.
pub const GC_CYCLES_TOTAL: &str = "stratum_gc_cycles_total";

/// Tracks the total number of retired nodes reclaimed by garbage collection.
pub const GC_RECLAIMED_NODES_TOTAL: &str = "stratum_gc_reclaimed_nodes_total";

/// Tracks the total number of bytes reclaimed by garbage collection.
pub const GC_RECLAIMED_BYTES_TOTAL: &str = "stratum_gc_reclaimed_bytes_total";

/// A gauge representing the current estimated memory usage of the index in
/// bytes (live plus retired-but-unreclaimed nodes).
pub const MEMORY_USAGE_BYTES: &str = "stratum_memory_usage_bytes";

// --- Label Keys ---

pub const LABEL_OPERATION_TYPE: &str = "type";
