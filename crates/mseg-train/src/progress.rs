//! Progress tracking and callbacks for training runs.
//!
//! Callbacks receive one [`ProgressInfo`] per epoch after validation.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Progress information for one training epoch.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Epoch number, starting at 1.
    pub epoch: usize,
    /// Maximum number of epochs.
    pub total_epochs: Option<usize>,
    /// Mean training loss over the epoch.
    pub train_loss: f64,
    /// Mean validation loss over the epoch.
    pub val_loss: f64,
    /// Time elapsed since start.
    pub elapsed: Duration,
    /// Estimated remaining time.
    pub estimated_remaining: Option<Duration>,
    /// Current learning rate.
    pub learning_rate: f64,
    /// Additional metrics.
    pub metrics: Vec<(String, f64)>,
}

impl ProgressInfo {
    /// Create new progress information.
    pub fn new(
        epoch: usize,
        total_epochs: Option<usize>,
        train_loss: f64,
        val_loss: f64,
        elapsed: Duration,
        learning_rate: f64,
    ) -> Self {
        Self {
            epoch,
            total_epochs,
            train_loss,
            val_loss,
            elapsed,
            estimated_remaining: None,
            learning_rate,
            metrics: Vec::new(),
        }
    }

    /// Calculate progress percentage.
    pub fn progress_percent(&self) -> Option<f64> {
        self.total_epochs
            .map(|total| (self.epoch as f64 / total as f64) * 100.0)
    }

    /// Calculate estimated remaining time.
    pub fn calculate_remaining(&mut self) {
        if let Some(total) = self.total_epochs {
            if self.epoch > 0 {
                let per_epoch = self.elapsed.as_secs_f64() / self.epoch as f64;
                let remaining = total.saturating_sub(self.epoch);
                self.estimated_remaining = Some(Duration::from_secs_f64(per_epoch * remaining as f64));
            }
        }
    }

    /// Add a custom metric.
    pub fn add_metric(&mut self, name: impl Into<String>, value: f64) {
        self.metrics.push((name.into(), value));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Progress callback trait for monitoring training.
pub trait ProgressCallback: Send + Sync {
    /// Called after every epoch.
    fn on_progress(&self, info: &ProgressInfo);

    /// Called when training starts.
    fn on_start(&self) {}

    /// Called when training completes successfully.
    fn on_complete(&self, _info: &ProgressInfo) {}

    /// Called when training fails.
    fn on_error(&self, _error: &str) {}
}

/// Console progress callback that logs to tracing.
#[derive(Debug, Clone)]
pub struct ConsoleProgressCallback {
    /// Log interval (epochs).
    pub log_interval: usize,
}

impl Default for ConsoleProgressCallback {
    fn default() -> Self {
        Self { log_interval: 1 }
    }
}

impl ConsoleProgressCallback {
    /// Create a new console progress callback.
    pub fn new(log_interval: usize) -> Self {
        Self {
            log_interval: log_interval.max(1),
        }
    }
}

impl ProgressCallback for ConsoleProgressCallback {
    fn on_progress(&self, info: &ProgressInfo) {
        if info.epoch % self.log_interval == 0 || info.total_epochs == Some(info.epoch) {
            let remaining = info
                .estimated_remaining
                .map(|d| format!("{:.2}s", d.as_secs_f64()))
                .unwrap_or_else(|| "N/A".to_string());

            tracing::info!(
                "Epoch {}/{} ({:.1}%) | train_loss: {:.6} | val_loss: {:.6} | LR: {:.2e} | Elapsed: {:.2}s | ETA: {}",
                info.epoch,
                info.total_epochs.map(|n| n.to_string()).unwrap_or_else(|| "?".to_string()),
                info.progress_percent().unwrap_or(0.0),
                info.train_loss,
                info.val_loss,
                info.learning_rate,
                info.elapsed.as_secs_f64(),
                remaining
            );

            for (name, value) in &info.metrics {
                tracing::info!("  {}: {:.6}", name, value);
            }
        }
    }

    fn on_start(&self) {
        tracing::info!("Training started");
    }

    fn on_complete(&self, info: &ProgressInfo) {
        tracing::info!(
            "Training completed after {} epochs in {:.2}s, best val_loss: {:.6}",
            info.epoch,
            info.elapsed.as_secs_f64(),
            info.val_loss
        );
    }

    fn on_error(&self, error: &str) {
        tracing::error!("Training failed: {}", error);
    }
}

/// History callback that records all progress information.
#[derive(Debug, Clone, Default)]
pub struct HistoryCallback {
    history: Arc<Mutex<Vec<ProgressInfo>>>,
}

impl HistoryCallback {
    /// Create a new history callback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the recorded history.
    pub fn get_history(&self) -> Vec<ProgressInfo> {
        lock(&self.history).clone()
    }

    /// Clear the history.
    pub fn clear(&self) {
        lock(&self.history).clear();
    }
}

impl ProgressCallback for HistoryCallback {
    fn on_progress(&self, info: &ProgressInfo) {
        lock(&self.history).push(info.clone());
    }
}

#[derive(Debug)]
struct EarlyStoppingState {
    best_loss: f64,
    counter: usize,
    should_stop: bool,
}

impl Default for EarlyStoppingState {
    fn default() -> Self {
        Self {
            best_loss: f64::INFINITY,
            counter: 0,
            should_stop: false,
        }
    }
}

/// Early stopping on the validation loss (mode min).
///
/// An epoch improves when `val_loss < best - min_delta`. Training stops once
/// `patience` consecutive epochs did not improve.
#[derive(Debug, Clone)]
pub struct EarlyStoppingCallback {
    /// Minimum decrease counted as an improvement.
    pub min_delta: f64,
    /// Number of epochs to wait for improvement.
    pub patience: usize,
    state: Arc<Mutex<EarlyStoppingState>>,
}

impl EarlyStoppingCallback {
    /// Create a new early stopping callback.
    pub fn new(min_delta: f64, patience: usize) -> Self {
        Self {
            min_delta: min_delta.abs(),
            patience,
            state: Arc::new(Mutex::new(EarlyStoppingState::default())),
        }
    }

    /// Check if should stop.
    pub fn should_stop(&self) -> bool {
        lock(&self.state).should_stop
    }

    /// Whether `val_loss` would improve on the best loss seen so far.
    pub fn improves(&self, val_loss: f64) -> bool {
        val_loss < lock(&self.state).best_loss - self.min_delta
    }

    /// Best validation loss seen so far.
    pub fn best_loss(&self) -> f64 {
        lock(&self.state).best_loss
    }

    /// Reset early stopping state.
    pub fn reset(&self) {
        *lock(&self.state) = EarlyStoppingState::default();
    }
}

impl ProgressCallback for EarlyStoppingCallback {
    fn on_progress(&self, info: &ProgressInfo) {
        let improved = self.improves(info.val_loss);
        let mut state = lock(&self.state);

        if improved {
            state.best_loss = info.val_loss;
            state.counter = 0;
        } else {
            state.counter += 1;
        }

        if state.counter >= self.patience && !state.should_stop {
            state.should_stop = true;
            tracing::info!(
                "Early stopping: no val_loss improvement for {} epochs (best: {:.6}, current: {:.6})",
                self.patience,
                state.best_loss,
                info.val_loss
            );
        }
    }
}

/// Progress tracker that manages multiple callbacks.
#[derive(Clone)]
pub struct ProgressTracker {
    callbacks: Vec<Arc<dyn ProgressCallback>>,
    start_time: Arc<Mutex<Option<Instant>>>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self {
            callbacks: Vec::new(),
            start_time: Arc::new(Mutex::new(None)),
        }
    }
}

impl ProgressTracker {
    /// Create a new progress tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a callback.
    pub fn add_callback(&mut self, callback: Arc<dyn ProgressCallback>) {
        self.callbacks.push(callback);
    }

    /// Start tracking.
    pub fn start(&self) {
        *lock(&self.start_time) = Some(Instant::now());
        for callback in &self.callbacks {
            callback.on_start();
        }
    }

    /// Time since [`start`](Self::start).
    pub fn elapsed(&self) -> Duration {
        lock(&self.start_time).map(|t| t.elapsed()).unwrap_or(Duration::ZERO)
    }

    /// Report a finished epoch.
    pub fn update(&self, mut info: ProgressInfo) -> ProgressInfo {
        info.elapsed = self.elapsed();
        info.calculate_remaining();
        for callback in &self.callbacks {
            callback.on_progress(&info);
        }
        info
    }

    /// Complete tracking.
    pub fn complete(&self, info: &ProgressInfo) {
        for callback in &self.callbacks {
            callback.on_complete(info);
        }
    }

    /// Report error.
    pub fn error(&self, error: &str) {
        for callback in &self.callbacks {
            callback.on_error(error);
        }
    }
}
