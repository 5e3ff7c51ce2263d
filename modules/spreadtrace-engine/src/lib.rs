pub mod analyzer;
pub mod sources;
pub mod summary;

pub use analyzer::{overall_virality, AnalysisResult, Analyzer};
pub use sources::{fetch_all, DataSource, FetchReport, JsonFileSource};
pub use summary::{risk_level, AnalysisSummary, SummaryCounts};
