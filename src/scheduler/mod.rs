//! Sizes each cycle's worker pool from current host load.
//!
//! Only cores that are currently idle are claimed, so polling backs off when
//! the host is busy with other work. The budget never drops below one.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sysinfo::System;
use tracing::debug;

/// Configuration for the availability-aware scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// A core counts as idle below this utilisation percentage (default: 10.0)
    pub idle_threshold_percent: f32,

    /// Sampling window in milliseconds (default: 1000)
    pub sample_window_ms: u64,

    /// Optional hard cap on the worker pool
    pub max_workers: Option<usize>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            idle_threshold_percent: 10.0,
            sample_window_ms: 1000,
            max_workers: None,
        }
    }
}

impl SchedulerConfig {
    pub fn sample_window(&self) -> Duration {
        Duration::from_millis(self.sample_window_ms)
    }
}

/// Source of per-core utilisation samples.
#[async_trait]
pub trait CpuSampler {
    /// Utilisation of each core, in percent, measured over `window`.
    async fn per_core_usage(&self, window: Duration) -> Vec<f32>;
}

/// Samples the host CPUs through sysinfo.
#[derive(Debug, Default)]
pub struct SysinfoSampler;

#[async_trait]
impl CpuSampler for SysinfoSampler {
    async fn per_core_usage(&self, window: Duration) -> Vec<f32> {
        let mut sys = System::new();

        // Usage is computed between two refreshes.
        sys.refresh_cpu_usage();
        tokio::time::sleep(window.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL)).await;
        sys.refresh_cpu_usage();

        sys.cpus().iter().map(|cpu| cpu.cpu_usage()).collect()
    }
}

pub struct Scheduler {
    sampler: Arc<dyn CpuSampler + Send + Sync>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_sampler(Arc::new(SysinfoSampler), config)
    }

    pub fn with_sampler(sampler: Arc<dyn CpuSampler + Send + Sync>, config: SchedulerConfig) -> Self {
        Self { sampler, config }
    }

    /// Number of workers to run this cycle: idle cores, at least one.
    pub async fn available_concurrency(&self) -> usize {
        let usage = self
            .sampler
            .per_core_usage(self.config.sample_window())
            .await;

        let idle = count_idle(&usage, self.config.idle_threshold_percent);
        let budget = match self.config.max_workers {
            Some(max) => idle.min(max),
            None => idle,
        }
        .max(1);

        debug!(
            cores = usage.len(),
            idle,
            budget,
            "Sampled CPU usage {:?}",
            usage
        );

        budget
    }
}

fn count_idle(usage: &[f32], threshold: f32) -> usize {
    usage.iter().filter(|&&u| u < threshold).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSampler(Vec<f32>);

    #[async_trait]
    impl CpuSampler for FixedSampler {
        async fn per_core_usage(&self, _window: Duration) -> Vec<f32> {
            self.0.clone()
        }
    }

    fn scheduler(usage: Vec<f32>, config: SchedulerConfig) -> Scheduler {
        Scheduler::with_sampler(Arc::new(FixedSampler(usage)), config)
    }

    #[tokio::test]
    async fn test_counts_idle_cores() {
        let s = scheduler(vec![2.0, 50.0, 9.9, 10.0, 0.0], SchedulerConfig::default());
        assert_eq!(s.available_concurrency().await, 3);
    }

    #[tokio::test]
    async fn test_fully_loaded_host_still_gets_one_worker() {
        let s = scheduler(vec![99.0, 100.0, 87.5, 45.0], SchedulerConfig::default());
        assert_eq!(s.available_concurrency().await, 1);
    }

    #[test]
    fn test_no_cpus_reported_still_gets_one_worker() {
        let s = scheduler(vec![], SchedulerConfig::default());
        assert_eq!(tokio_test::block_on(s.available_concurrency()), 1);
    }

    #[tokio::test]
    async fn test_max_workers_caps_budget() {
        let config = SchedulerConfig {
            max_workers: Some(2),
            ..Default::default()
        };
        let s = scheduler(vec![0.0; 8], config);
        assert_eq!(s.available_concurrency().await, 2);
    }

    #[tokio::test]
    async fn test_zero_max_workers_still_floors_at_one() {
        let config = SchedulerConfig {
            max_workers: Some(0),
            ..Default::default()
        };
        let s = scheduler(vec![0.0; 4], config);
        assert_eq!(s.available_concurrency().await, 1);
    }

    #[tokio::test]
    async fn test_custom_threshold() {
        let config = SchedulerConfig {
            idle_threshold_percent: 20.0,
            ..Default::default()
        };
        let s = scheduler(vec![15.0, 19.0, 25.0], config);
        assert_eq!(s.available_concurrency().await, 2);
    }

    #[tokio::test]
    async fn test_sysinfo_sampler_reports_cores() {
        let usage = SysinfoSampler
            .per_core_usage(Duration::from_millis(1))
            .await;
        assert!(!usage.is_empty());
        assert!(usage.iter().all(|u| *u >= 0.0));
    }
}
