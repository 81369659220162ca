//! Server configuration.

/// Configuration for the sync endpoints.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Page size of `GET /sync/queue` when the query names none.
    pub default_page_size: usize,
    /// Upper bound on the page size a query may request.
    pub max_page_size: usize,
    /// Number of trigger jobs kept for lookup.
    pub job_history: usize,
}

impl ServerConfig {
    /// Creates a configuration with default limits.
    pub fn new() -> Self {
        Self {
            default_page_size: 50,
            max_page_size: 500,
            job_history: 256,
        }
    }

    /// Sets the default page size.
    pub fn with_default_page_size(mut self, size: usize) -> Self {
        self.default_page_size = size.max(1);
        self
    }

    /// Sets the maximum page size.
    pub fn with_max_page_size(mut self, size: usize) -> Self {
        self.max_page_size = size.max(1);
        self
    }

    /// Sets how many jobs are remembered.
    pub fn with_job_history(mut self, jobs: usize) -> Self {
        self.job_history = jobs.max(1);
        self
    }

    /// Page size for a query that asked for `requested` items.
    pub fn page_size(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}
