//! Job API that reports `running` for a fixed number of samples.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use offerwatch_lib::api::ApiError;
use offerwatch_lib::poller::{JobApi, JobStatus};

pub struct MockJobApi {
    running_samples: usize,
    pub triggers: AtomicUsize,
    pub samples: AtomicUsize,
}

impl MockJobApi {
    pub fn finishing_after(running_samples: usize) -> Self {
        Self {
            running_samples,
            triggers: AtomicUsize::new(0),
            samples: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl JobApi for MockJobApi {
    async fn trigger_import(&self) -> Result<(), ApiError> {
        self.triggers.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn import_status(&self) -> Result<JobStatus, ApiError> {
        let sample = self.samples.fetch_add(1, Ordering::SeqCst);
        Ok(JobStatus {
            running: sample < self.running_samples,
            last_run: None,
            stats: None,
        })
    }
}
