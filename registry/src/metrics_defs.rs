//! Metrics definitions for the registry.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
}

#[derive(Debug, Clone, Copy)]
pub struct MetricDef {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub description: &'static str,
}

pub const HISTORY_SLOTS_RECONCILED: MetricDef = MetricDef {
    name: "history.slots_reconciled",
    metric_type: MetricType::Counter,
    description: "Number of history slots updated by bucket reconciliation",
};

pub const HISTORY_SLOTS_SEEDED: MetricDef = MetricDef {
    name: "history.slots_seeded",
    metric_type: MetricType::Counter,
    description: "Number of history slots seeded for _new tags at creation",
};

pub const HISTORY_TAGS_DROPPED: MetricDef = MetricDef {
    name: "history.tags_dropped",
    metric_type: MetricType::Counter,
    description: "Removed tags with no paired addition, dropped from reconciliation",
};

pub const SNAPSHOT_WRITE_DURATION: MetricDef = MetricDef {
    name: "store.snapshot_write.duration",
    metric_type: MetricType::Histogram,
    description: "Time to persist a store snapshot in seconds",
};

// TODO: all metrics must be added here for now, this can be done dynamically with a macro in the future.
pub const ALL_METRICS: &[MetricDef] = &[
    HISTORY_SLOTS_RECONCILED,
    HISTORY_SLOTS_SEEDED,
    HISTORY_TAGS_DROPPED,
    SNAPSHOT_WRITE_DURATION,
];

/// Registers descriptions for every metric with the installed recorder.
pub fn describe_all() {
    for def in ALL_METRICS {
        match def.metric_type {
            MetricType::Counter => metrics::describe_counter!(def.name, def.description),
            MetricType::Gauge => metrics::describe_gauge!(def.name, def.description),
            MetricType::Histogram => metrics::describe_histogram!(def.name, def.description),
        }
    }
}
