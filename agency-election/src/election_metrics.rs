use tracing::info;

pub struct Metric {
    pub name: &'static str,
    description: &'static str,
}

pub const COUNTERS: [Metric; 3] = [
    LEADER_ELECTION_CLAIMS_TOTAL,
    LEADER_ELECTION_LOST_RACES_TOTAL,
    LEADER_ELECTION_ERRORS_TOTAL,
];
pub const GAUGES: [Metric; 1] = [LEADER_ELECTION_STATE];

pub const LEADER_ELECTION_STATE: Metric = Metric {
    name: "agency_leader_election_state",
    description: "Leader election state of this process (0=follower,1=leader)",
};

pub const LEADER_ELECTION_CLAIMS_TOTAL: Metric = Metric {
    name: "agency_leader_election_claims_total",
    description: "Total number of committed claim or renewal transactions",
};

pub const LEADER_ELECTION_LOST_RACES_TOTAL: Metric = Metric {
    name: "agency_leader_election_lost_races_total",
    description: "Total number of claim transactions rejected by a failed precondition",
};

pub const LEADER_ELECTION_ERRORS_TOTAL: Metric = Metric {
    name: "agency_leader_election_errors_total",
    description: "Total number of election updates that ended with an error",
};

/// Describe every election metric to the installed recorder.
pub fn init_metrics() {
    info!("registering leader election metrics");

    for metric in COUNTERS {
        metrics::describe_counter!(metric.name, metric.description);
        let _counter = metrics::counter!(metric.name);
    }

    for metric in GAUGES {
        metrics::describe_gauge!(metric.name, metric.description);
        let _gauge = metrics::gauge!(metric.name);
    }
}
