pub mod activity;
pub mod bot;
pub mod coordination;
pub mod pathways;
pub mod virality;

pub use activity::{AccountActivity, ActivityIndex};
pub use bot::{BotDetector, BotMetrics};
pub use coordination::{CoordinationDetector, CoordinationGroup};
pub use pathways::{
    InterventionPoint, InterventionPriority, MisinformationPathway, PathwayTracer,
};
pub use virality::{ViralityMetrics, ViralityScorer};
