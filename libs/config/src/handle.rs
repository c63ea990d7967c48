//! Hot configuration handle
//!
//! Readers take a cheap `Arc` snapshot per decision; writers publish a whole validated
//! replacement. A value that fails validation is never published.

use crate::error::{SettingsError, SettingsResult, Validate};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

pub struct ConfigHandle<T> {
    sender: Arc<watch::Sender<Arc<T>>>,
    receiver: watch::Receiver<Arc<T>>,
}

impl<T> Clone for ConfigHandle<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
        }
    }
}

impl<T: Validate + Send + Sync + 'static> ConfigHandle<T> {
    pub fn new(initial: T) -> SettingsResult<Self> {
        initial.validate()?;
        let (sender, receiver) = watch::channel(Arc::new(initial));
        Ok(Self {
            sender: Arc::new(sender),
            receiver,
        })
    }

    /// Snapshot of the current value
    pub fn current(&self) -> Arc<T> {
        self.receiver.borrow().clone()
    }

    /// Receiver notified on every published update
    pub fn subscribe(&self) -> watch::Receiver<Arc<T>> {
        self.receiver.clone()
    }

    pub fn update(&self, next: T) -> SettingsResult<()> {
        next.validate()?;
        self.sender
            .send(Arc::new(next))
            .map_err(|_| SettingsError::Closed)?;
        info!("Configuration updated");
        Ok(())
    }

    /// Clone, modify and publish
    pub fn modify<F>(&self, edit: F) -> SettingsResult<()>
    where
        T: Clone,
        F: FnOnce(&mut T),
    {
        let mut next = (*self.current()).clone();
        edit(&mut next);
        self.update(next)
    }
}
