use tokio::runtime::{Builder, Handle, Runtime};

use crate::error::ProviderError;

/// Dedicated runtime every instance of the provider runs on.
///
/// Built once by the provider factory. Dropping the context shuts the
/// runtime down in the background.
pub struct RuntimeContext {
    runtime: Option<Runtime>,
    handle: Handle,
}

impl RuntimeContext {
    pub fn new(worker_threads: Option<usize>) -> Result<Self, ProviderError> {
        let mut builder = Builder::new_multi_thread();
        builder.enable_all().thread_name("bootwire-worker");
        if let Some(threads) = worker_threads {
            builder.worker_threads(threads.max(1));
        }
        let runtime = builder.build().map_err(ProviderError::RuntimeBuild)?;
        let handle = runtime.handle().clone();

        tracing::debug!(?worker_threads, "RuntimeContext initialized");

        Ok(Self {
            runtime: Some(runtime),
            handle,
        })
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }
}

impl Drop for RuntimeContext {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
            tracing::debug!("RuntimeContext shut down");
        }
    }
}
