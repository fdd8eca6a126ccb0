use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::classification::Classifier;
use crate::error::ClassifyError;
use crate::models::{ClassificationResult, RawImage, RequestToken};

/// What observers of a [`Coordinator`] see.
#[derive(Debug, Clone)]
pub enum ClassificationState {
    Idle,
    Running(RequestToken),
    Ready(Arc<ClassificationResult>),
    Failed(Arc<ClassifyError>),
}

impl ClassificationState {
    pub fn is_idle(&self) -> bool {
        matches!(self, ClassificationState::Idle)
    }

    pub fn result(&self) -> Option<&ClassificationResult> {
        match self {
            ClassificationState::Ready(result) => Some(result),
            _ => None,
        }
    }
}

struct Shared {
    state: ClassificationState,
    issued: u64,
    /// Token whose result may still be published. `None` after clear.
    outstanding: Option<RequestToken>,
    observers: Vec<UnboundedSender<ClassificationState>>,
}

impl Shared {
    /// Apply and publish a transition. Called with the lock held, so every
    /// observer sees transitions in the order they were applied.
    fn transition(&mut self, next: ClassificationState) {
        self.state = next.clone();
        self.observers.retain(|tx| tx.send(next.clone()).is_ok());
    }
}

/// Runs classifications off the calling thread and publishes only the
/// result of the most recent request.
///
/// Stale work is not interrupted. When an older pipeline finishes after a
/// newer `submit` (or a `clear`), its token no longer matches and the result
/// is dropped.
pub struct Coordinator {
    classifier: Arc<Classifier>,
    runtime: Handle,
    shared: Arc<Mutex<Shared>>,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
}

impl Coordinator {
    pub fn new(classifier: Arc<Classifier>, runtime: Handle) -> Self {
        Self {
            classifier,
            runtime,
            shared: Arc::new(Mutex::new(Shared {
                state: ClassificationState::Idle,
                issued: 0,
                outstanding: None,
                observers: Vec::new(),
            })),
            in_flight: Mutex::new(Vec::new()),
        }
    }

    pub fn classifier(&self) -> &Arc<Classifier> {
        &self.classifier
    }

    /// Start classifying `image` and return immediately.
    pub fn submit(&self, image: RawImage) -> RequestToken {
        let token = {
            let mut shared = lock(&self.shared);
            shared.issued += 1;
            let token = RequestToken(shared.issued);
            shared.outstanding = Some(token);
            shared.transition(ClassificationState::Running(token));
            token
        };
        tracing::debug!(%token, "classification submitted");

        let classifier = self.classifier.clone();
        let shared = self.shared.clone();
        let task = self.runtime.spawn(async move {
            let work = tokio::task::spawn_blocking(move || classifier.classify(&image));
            let outcome = match work.await {
                Ok(outcome) => outcome,
                Err(e) => Err(ClassifyError::Internal(format!(
                    "classification task failed: {}",
                    e
                ))),
            };
            complete(&shared, token, outcome);
        });

        let mut in_flight = lock(&self.in_flight);
        in_flight.retain(|task| !task.is_finished());
        in_flight.push(task);

        token
    }

    /// Return to `Idle`. In-flight work keeps running but its result is dropped.
    pub fn clear(&self) {
        let mut shared = lock(&self.shared);
        shared.outstanding = None;
        if !shared.state.is_idle() {
            shared.transition(ClassificationState::Idle);
        }
    }

    pub fn state(&self) -> ClassificationState {
        lock(&self.shared).state.clone()
    }

    /// Token of the request whose result is still awaited, if any.
    pub fn current_token(&self) -> Option<RequestToken> {
        lock(&self.shared).outstanding
    }

    /// Receive every state transition applied after this call, in order.
    pub fn subscribe(&self) -> UnboundedReceiver<ClassificationState> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.shared).observers.push(tx);
        rx
    }

    /// Wait for every pipeline submitted so far to finish, stale ones included.
    pub async fn settle(&self) {
        loop {
            let tasks = std::mem::take(&mut *lock(&self.in_flight));
            if tasks.is_empty() {
                break;
            }
            for task in tasks {
                if let Err(e) = task.await {
                    tracing::error!(error = %e, "classification task aborted");
                }
            }
        }
    }

    /// Teardown: drain in-flight work, then reset to `Idle`.
    pub async fn shutdown(&self) {
        self.settle().await;
        self.clear();
    }
}

fn complete(
    shared: &Mutex<Shared>,
    token: RequestToken,
    outcome: Result<ClassificationResult, ClassifyError>,
) {
    let mut shared = lock(shared);
    if shared.outstanding != Some(token) {
        tracing::debug!(%token, current = ?shared.outstanding, "discarding stale result");
        return;
    }
    shared.outstanding = None;

    let next = match outcome {
        Ok(result) => ClassificationState::Ready(Arc::new(result)),
        Err(e) => {
            tracing::warn!(%token, error = %e, "classification failed");
            ClassificationState::Failed(Arc::new(e))
        }
    };
    shared.transition(next);
}

// Shared state is only ever replaced whole, so a poisoned lock still holds a valid value.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
