//! In-memory job store.
//!
//! The durable job-record store is an external collaborator; this store
//! implements the same query surface (get, list-with-filter, delete) over a
//! `RwLock<HashMap>` for the local driver and tests. Rows are mutated only
//! through [`Orchestrator::apply_status`](crate::orchestrator::Orchestrator),
//! never written directly by callers.

use std::collections::HashMap;

use cutline_models::{JobId, JobStatus, RenderJob};
use tokio::sync::RwLock;
use tracing::info;

use crate::error::{RenderJobError, RenderResult};

/// Filter for job listings.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub project_id: Option<String>,
}

/// Pagination window for job listings.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

/// Job store backed by memory.
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, RenderJob>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new job row. Fails if the id already exists.
    pub async fn create(&self, job: RenderJob) -> RenderResult<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.job_id) {
            return Err(RenderJobError::validation(format!(
                "job {} already exists",
                job.job_id
            )));
        }
        info!(job_id = %job.job_id, "created job row");
        jobs.insert(job.job_id.clone(), job);
        Ok(())
    }

    /// Get a job by id.
    pub async fn get(&self, job_id: &JobId) -> RenderResult<RenderJob> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| RenderJobError::job_not_found(job_id.as_str()))
    }

    /// Replace an existing job row.
    pub async fn update(&self, job: RenderJob) -> RenderResult<()> {
        let mut jobs = self.jobs.write().await;
        if !jobs.contains_key(&job.job_id) {
            return Err(RenderJobError::job_not_found(job.job_id.as_str()));
        }
        jobs.insert(job.job_id.clone(), job);
        Ok(())
    }

    /// List jobs matching a filter, newest first, paginated.
    pub async fn list(&self, filter: &JobFilter, page: Page) -> RenderResult<Vec<RenderJob>> {
        let jobs = self.jobs.read().await;
        let mut matching: Vec<RenderJob> = jobs
            .values()
            .filter(|job| {
                filter.status.map_or(true, |status| job.status == status)
                    && filter
                        .project_id
                        .as_deref()
                        .map_or(true, |project| job.project_id == project)
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .collect())
    }

    /// Delete a job row. Returns whether a row was removed.
    pub async fn delete(&self, job_id: &JobId) -> RenderResult<bool> {
        Ok(self.jobs.write().await.remove(job_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cutline_models::RenderPreset;

    fn job(id: &str, project: &str) -> RenderJob {
        RenderJob::new(
            JobId::from_string(id),
            project,
            "timeline-1",
            1,
            RenderPreset::default(),
        )
    }

    #[tokio::test]
    async fn test_create_get_delete() {
        let store = JobStore::new();
        store.create(job("j1", "p1")).await.unwrap();
        assert!(store.create(job("j1", "p1")).await.is_err());

        let fetched = store.get(&JobId::from_string("j1")).await.unwrap();
        assert_eq!(fetched.project_id, "p1");

        assert!(store.delete(&JobId::from_string("j1")).await.unwrap());
        assert!(!store.delete(&JobId::from_string("j1")).await.unwrap());
        assert!(store.get(&JobId::from_string("j1")).await.is_err());
    }

    #[tokio::test]
    async fn test_list_filter_and_pagination() {
        let store = JobStore::new();
        for i in 0..5 {
            store.create(job(&format!("j{i}"), "p1")).await.unwrap();
        }
        let mut other = job("jx", "p2");
        other.status = JobStatus::Failed;
        store.create(other).await.unwrap();

        let all = store
            .list(&JobFilter::default(), Page::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 6);

        let failed = store
            .list(
                &JobFilter {
                    status: Some(JobStatus::Failed),
                    ..Default::default()
                },
                Page::default(),
            )
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].job_id.as_str(), "jx");

        let p1_page = store
            .list(
                &JobFilter {
                    project_id: Some("p1".into()),
                    ..Default::default()
                },
                Page {
                    limit: 2,
                    offset: 2,
                },
            )
            .await
            .unwrap();
        assert_eq!(p1_page.len(), 2);
    }
}
