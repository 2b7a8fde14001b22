use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

use crate::models::error::AppError;
use crate::services::networks::{StyleNetwork, TransformNetwork};

/// Loaded networks. Cheap to clone; both handles are read-only after load.
#[derive(Clone)]
pub struct ModelHandles {
    pub style: Arc<dyn StyleNetwork>,
    pub transform: Arc<dyn TransformNetwork>,
}

#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self) -> Result<ModelHandles, AppError>;
}

type LoadFuture = Shared<BoxFuture<'static, Result<ModelHandles, AppError>>>;

enum RegistryState {
    Empty,
    Loading { attempt: u64, future: LoadFuture },
    Ready(ModelHandles),
}

/// Lazily loads the style and transform networks once and hands out the
/// cached handles afterwards.
///
/// Concurrent first callers share one in-flight load and all observe its
/// outcome. The load runs in its own task and settles the registry itself, so
/// it completes even when every caller stops waiting. A failed load is not
/// cached; the next caller starts a new attempt.
pub struct ModelRegistry {
    loader: Arc<dyn ModelLoader>,
    state: Arc<Mutex<RegistryState>>,
    attempts: AtomicU64,
}

impl ModelRegistry {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            state: Arc::new(Mutex::new(RegistryState::Empty)),
            attempts: AtomicU64::new(0),
        }
    }

    pub async fn ensure_loaded(&self) -> Result<ModelHandles, AppError> {
        let future = {
            let mut state = self.state.lock();
            match &*state {
                RegistryState::Ready(handles) => return Ok(handles.clone()),
                RegistryState::Loading { future, .. } => future.clone(),
                RegistryState::Empty => {
                    let attempt = self.attempts.fetch_add(1, Ordering::AcqRel) + 1;
                    let future = self.start_load(attempt);
                    *state = RegistryState::Loading {
                        attempt,
                        future: future.clone(),
                    };
                    future
                }
            }
        };

        future.await
    }

    fn start_load(&self, attempt: u64) -> LoadFuture {
        tracing::info!(attempt, "Loading style transfer models");
        let loader = self.loader.clone();
        let state = Arc::downgrade(&self.state);
        let task_state = state.clone();

        let task = tokio::spawn(async move {
            let result = loader.load().await;
            if let Some(state) = task_state.upgrade() {
                settle(&state, attempt, &result);
            }
            result
        });

        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    let result = Err(AppError::ModelLoadError(format!("Model load task failed: {}", e)));
                    if let Some(state) = state.upgrade() {
                        settle(&state, attempt, &result);
                    }
                    result
                }
            }
        }
        .boxed()
        .shared()
    }

    pub fn is_loaded(&self) -> bool {
        matches!(&*self.state.lock(), RegistryState::Ready(_))
    }

    /// Number of load attempts started so far.
    pub fn load_count(&self) -> u64 {
        self.attempts.load(Ordering::Acquire)
    }
}

fn settle(state: &Mutex<RegistryState>, attempt: u64, result: &Result<ModelHandles, AppError>) {
    let mut state = state.lock();
    let settles_this_attempt =
        matches!(&*state, RegistryState::Loading { attempt: current, .. } if *current == attempt);
    if !settles_this_attempt {
        return;
    }
    *state = match result {
        Ok(handles) => {
            tracing::info!(attempt, "Models loaded successfully");
            RegistryState::Ready(handles.clone())
        }
        Err(e) => {
            tracing::error!(attempt, error = %e, "Model load failed");
            RegistryState::Empty
        }
    };
}
