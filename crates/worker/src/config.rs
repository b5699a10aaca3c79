use std::path::PathBuf;
use std::time::Duration;

use imagen_core::admission::DEFAULT_MAX_QUEUE_SIZE;

/// Default hard wall-clock limit for one job attempt.
const DEFAULT_JOB_TIMEOUT_SECS: u64 = 600;

/// Default retention window for settled job results.
const DEFAULT_RESULT_TTL_SECS: u64 = 3600;

const DEFAULT_ENGINE_URL: &str = "http://localhost:7860";
const DEFAULT_WORKER_NAME: &str = "imagen-worker";

/// Worker configuration loaded from environment variables.
///
/// Every field has a default suitable for local development; unparsable
/// numbers fall back to the default.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Base directory; artifact paths in results are relative to it.
    pub data_dir: PathBuf,
    /// Where generated images are written.
    pub outputs_dir: PathBuf,
    /// Root of the reference asset store.
    pub reference_dir: PathBuf,
    /// Image used when a job sets `ip_strength` without references.
    pub legacy_reference: PathBuf,
    /// Base URL of the inference server.
    pub engine_url: String,
    /// Consumer name reported to admission control.
    pub worker_name: String,
    pub max_queue_size: usize,
    pub job_timeout: Duration,
    pub result_ttl: Duration,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var            | Default                          |
    /// |--------------------|----------------------------------|
    /// | `DATA_DIR`         | `.`                              |
    /// | `OUTPUTS_DIR`      | `$DATA_DIR/outputs`              |
    /// | `REFERENCE_DIR`    | `$DATA_DIR/reference`            |
    /// | `LEGACY_REFERENCE` | `$REFERENCE_DIR/legacy_ref.png`  |
    /// | `ENGINE_URL`       | `http://localhost:7860`          |
    /// | `WORKER_NAME`      | `imagen-worker`                  |
    /// | `MAX_QUEUE_SIZE`   | `100`                            |
    /// | `JOB_TIMEOUT_SECS` | `600`                            |
    /// | `RESULT_TTL_SECS`  | `3600`                           |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = PathBuf::from(get("DATA_DIR").unwrap_or_else(|| ".".into()));
        let outputs_dir = get("OUTPUTS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("outputs"));
        let reference_dir = get("REFERENCE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("reference"));
        let legacy_reference = get("LEGACY_REFERENCE")
            .map(PathBuf::from)
            .unwrap_or_else(|| reference_dir.join("legacy_ref.png"));

        let engine_url = get("ENGINE_URL").unwrap_or_else(|| DEFAULT_ENGINE_URL.into());
        let worker_name = get("WORKER_NAME").unwrap_or_else(|| DEFAULT_WORKER_NAME.into());

        let max_queue_size: usize = get("MAX_QUEUE_SIZE")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_QUEUE_SIZE);
        let job_timeout_secs: u64 = get("JOB_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_JOB_TIMEOUT_SECS);
        let result_ttl_secs: u64 = get("RESULT_TTL_SECS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_RESULT_TTL_SECS);

        Self {
            data_dir,
            outputs_dir,
            reference_dir,
            legacy_reference,
            engine_url,
            worker_name,
            max_queue_size,
            job_timeout: Duration::from_secs(job_timeout_secs),
            result_ttl: Duration::from_secs(result_ttl_secs),
        }
    }
}
