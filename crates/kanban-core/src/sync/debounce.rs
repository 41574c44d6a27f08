//! Trailing-edge debounce timer

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct TimerState {
    generation: u64,
    armed: Option<CancellationToken>,
}

/// Runs only the last of a burst of scheduled tasks, `window` after it was scheduled
///
/// Re-scheduling restarts the window. Once a task starts running it is no
/// longer cancellable through the debouncer.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    state: Arc<Mutex<TimerState>>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: Arc::new(Mutex::new(TimerState::default())),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Arm the timer for `task`, replacing any task still waiting
    pub fn schedule<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let generation = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(previous) = state.armed.replace(token.clone()) {
                previous.cancel();
            }
            state.generation += 1;
            state.generation
        };

        let window = self.window;
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(window) => {}
            }
            {
                let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
                if state.generation == generation {
                    state.armed = None;
                }
            }
            task.await;
        });
    }

    /// Drop the waiting task, returning whether one was armed
    pub fn cancel(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match state.armed.take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .armed
            .is_some()
    }
}
