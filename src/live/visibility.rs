use std::sync::Arc;

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Shared page/tab visibility signal that bindings follow.
#[derive(Clone)]
pub struct PageVisibility {
    sender: Arc<watch::Sender<Visibility>>,
}

impl PageVisibility {
    pub fn new() -> Self {
        let (sender, _receiver) = watch::channel(Visibility::Visible);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn set(&self, visibility: Visibility) {
        let changed = self.sender.send_if_modified(|current| {
            if *current == visibility {
                false
            } else {
                *current = visibility;
                true
            }
        });
        if changed {
            tracing::debug!("Page visibility changed to {:?}", visibility);
        }
    }

    pub fn current(&self) -> Visibility {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Visibility> {
        self.sender.subscribe()
    }
}

impl Default for PageVisibility {
    fn default() -> Self {
        Self::new()
    }
}
