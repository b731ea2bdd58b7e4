//! Executor for running async embedding operations from synchronous code.

use std::future::Future;
use std::sync::{Arc, mpsc};

use tokio::runtime::Builder as TokioRuntimeBuilder;

use crate::embedding::embedder::{EmbedInputType, Embedder};
use crate::error::{QuarryError, Result};

/// Owns a small tokio runtime on which embedder futures are driven.
#[derive(Clone)]
pub struct EmbedderExecutor {
    runtime: Arc<tokio::runtime::Runtime>,
}

impl EmbedderExecutor {
    /// Create a new embedder executor with a tokio runtime.
    pub fn new() -> Result<Self> {
        let runtime = TokioRuntimeBuilder::new_multi_thread()
            .worker_threads(2)
            .thread_name("quarry-embedder")
            .enable_all()
            .build()
            .map_err(|err| {
                QuarryError::internal(format!("failed to initialize embedder runtime: {err}"))
            })?;
        Ok(Self {
            runtime: Arc::new(runtime),
        })
    }

    /// Run an async future and wait for its result.
    ///
    /// Safe to call from inside another tokio runtime: the future runs on this
    /// executor's own workers and the caller only blocks on a channel.
    pub fn run<F, T>(&self, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let handle = self.runtime.handle().clone();
        handle.spawn(async move {
            let _ = tx.send(future.await);
        });
        rx.recv()
            .map_err(|err| QuarryError::internal(format!("embedder task channel closed: {err}")))?
    }

    /// Embed `text` with `embedder`, blocking until the provider answers.
    pub fn embed(
        &self,
        embedder: &Arc<dyn Embedder>,
        text: &str,
        input_type: EmbedInputType,
    ) -> Result<Vec<f32>> {
        let embedder = Arc::clone(embedder);
        let text = text.to_owned();
        self.run(async move { embedder.embed(&text, input_type).await })
    }
}

impl std::fmt::Debug for EmbedderExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbedderExecutor").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::any::Any;

    use async_trait::async_trait;

    use super::*;

    #[derive(Debug)]
    struct LengthEmbedder;

    #[async_trait]
    impl Embedder for LengthEmbedder {
        async fn embed(&self, text: &str, input_type: EmbedInputType) -> Result<Vec<f32>> {
            tokio::task::yield_now().await;
            let marker = match input_type {
                EmbedInputType::Document => 0.0,
                EmbedInputType::Query => 1.0,
            };
            Ok(vec![text.len() as f32, marker])
        }

        fn name(&self) -> &str {
            "length"
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_embed_blocks_until_result() {
        let executor = EmbedderExecutor::new().unwrap();
        let embedder: Arc<dyn Embedder> = Arc::new(LengthEmbedder);
        let v = executor
            .embed(&embedder, "abcd", EmbedInputType::Query)
            .unwrap();
        assert_eq!(v, vec![4.0, 1.0]);
    }

    #[test]
    fn test_run_propagates_errors() {
        let executor = EmbedderExecutor::new().unwrap();
        let result: Result<()> =
            executor.run(async { Err(QuarryError::embedding_provider("unavailable")) });
        assert!(result.unwrap_err().is_retryable());
    }
}
