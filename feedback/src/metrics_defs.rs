//! Metrics definitions for the feedback portal.

use shared::metrics_defs::{MetricDef, MetricType};

pub const RESOLUTIONS: MetricDef = MetricDef {
    name: "referrer.resolutions",
    metric_type: MetricType::Counter,
    description: "Form requests by resolved context. Tagged with outcome: generic, lab, experiment.",
};

pub const RESOLUTION_DURATION: MetricDef = MetricDef {
    name: "referrer.resolution.duration",
    metric_type: MetricType::Histogram,
    description: "Time spent resolving a referrer against the catalog in seconds",
};

pub const LOOKUP_FAILURES: MetricDef = MetricDef {
    name: "referrer.lookup.failures",
    metric_type: MetricType::Counter,
    description: "Catalog lookups that failed and fell back to the generic form. Tagged with strategy.",
};

pub const SUBMISSIONS: MetricDef = MetricDef {
    name: "feedback.submissions",
    metric_type: MetricType::Counter,
    description: "Feedback writes to the data service. Tagged with outcome: accepted, rejected.",
};

pub const NOTIFICATIONS: MetricDef = MetricDef {
    name: "feedback.notifications",
    metric_type: MetricType::Counter,
    description: "Notification emails. Tagged with outcome: sent, failed.",
};

pub const ALL_METRICS: &[MetricDef] = &[
    RESOLUTIONS,
    RESOLUTION_DURATION,
    LOOKUP_FAILURES,
    SUBMISSIONS,
    NOTIFICATIONS,
];
