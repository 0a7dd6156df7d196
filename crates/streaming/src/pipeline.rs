use foundation::FeatureCollection;

use crate::protocol::{
    IndicatorTable, LodTier, NaturalFamily, history_path, indicator_path, natural_path,
};
use crate::request::RequestToken;
use crate::source::{DataSource, FetchError};

/// One backend read the engine needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchKind {
    History {
        year: i32,
    },
    Natural {
        family: NaturalFamily,
        tier: LodTier,
        limit: u32,
    },
    Indicator {
        slug: &'static str,
    },
}

impl FetchKind {
    pub fn path(&self) -> String {
        match self {
            FetchKind::History { year } => history_path(*year),
            FetchKind::Natural {
                family,
                tier,
                limit,
            } => natural_path(*family, *tier, *limit),
            FetchKind::Indicator { slug } => indicator_path(slug),
        }
    }
}

/// A fetch request stamped with the token of its family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchJob {
    pub token: RequestToken,
    pub kind: FetchKind,
}

impl FetchJob {
    pub fn new(token: RequestToken, kind: FetchKind) -> Self {
        Self { token, kind }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchPayload {
    Features(FeatureCollection),
    Indicators(IndicatorTable),
}

/// A completed job, delivered back to the engine in any order.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    pub job: FetchJob,
    pub result: Result<FetchPayload, FetchError>,
}

impl FetchOutcome {
    pub fn new(job: FetchJob, result: Result<FetchPayload, FetchError>) -> Self {
        Self { job, result }
    }

    /// Outcome for a feature-collection job.
    pub fn features(job: FetchJob, result: Result<FeatureCollection, FetchError>) -> Self {
        Self::new(job, result.map(FetchPayload::Features))
    }

    pub fn indicators(job: FetchJob, result: Result<IndicatorTable, FetchError>) -> Self {
        Self::new(job, result.map(FetchPayload::Indicators))
    }
}

/// Pending jobs waiting for the host to pick them up.
#[derive(Debug, Default)]
pub struct FetchOutbox {
    jobs: Vec<FetchJob>,
}

impl FetchOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, job: FetchJob) {
        self.jobs.push(job);
    }

    pub fn extend(&mut self, jobs: impl IntoIterator<Item = FetchJob>) {
        self.jobs.extend(jobs);
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn pending(&self) -> &[FetchJob] {
        &self.jobs
    }

    /// Hands every queued job to the caller, oldest first.
    pub fn take(&mut self) -> Vec<FetchJob> {
        std::mem::take(&mut self.jobs)
    }
}

/// Runs one job against `source`.
pub async fn execute<S: DataSource + ?Sized>(source: &S, job: FetchJob) -> FetchOutcome {
    match &job.kind {
        FetchKind::History { year } => {
            let result = source.history(*year).await;
            FetchOutcome::features(job, result)
        }
        FetchKind::Natural {
            family,
            tier,
            limit,
        } => {
            let result = source.natural(*family, *tier, *limit).await;
            FetchOutcome::features(job, result)
        }
        FetchKind::Indicator { slug } => {
            let result = source.indicators(slug).await;
            FetchOutcome::indicators(job, result)
        }
    }
}
