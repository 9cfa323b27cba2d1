//! 可达性监控引擎
//!
//! 维护主机目标集合，周期性探测主端点与管理端点，并推导每台主机的健康分类。

pub mod classify;
pub mod policy;
pub mod prober;
pub mod registry;
pub mod scheduler;
pub mod snapshot;
pub mod target;

pub use classify::{Classification, Classifier};
pub use policy::{EligibilityPolicy, GateDecision, ProbeGate, ThrottlePolicy};
pub use prober::{PingProber, Prober};
pub use registry::{validate_address, ProbePlan, ProbeTicket, TargetRef, TargetRegistry};
pub use scheduler::{
    CycleCallback, CycleReport, CycleScheduler, ProbeCallback, ProbeEvent, Scheduler,
    SchedulerSettings, SchedulerState, SchedulerStatus,
};
pub use snapshot::{
    export_records, format_age, load_snapshot, save_snapshot, snapshot, ExportRecord, LastSeen,
    SnapshotEntry, StatusDocument,
};
pub use target::{Endpoint, EndpointKind, EndpointState, HostRow, Target};
