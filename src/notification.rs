//! Global notification slot and the listeners that dismiss it.

use std::sync::Arc;

use tokio::sync::watch;

/// Single global notification slot. Cloning shares the slot.
#[derive(Clone)]
pub struct Notifications {
    slot: Arc<watch::Sender<Option<String>>>,
}

impl Default for Notifications {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifications {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { slot: Arc::new(tx) }
    }

    /// Replace the current notification (`None` clears it)
    pub fn set_notification(&self, message: Option<String>) {
        self.slot.send_replace(message);
    }

    pub fn set(&self, message: impl Into<String>) {
        self.set_notification(Some(message.into()));
    }

    pub fn clear(&self) {
        self.set_notification(None);
    }

    pub fn current(&self) -> Option<String> {
        self.slot.borrow().clone()
    }

    /// Observe changes to the slot
    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.slot.subscribe()
    }
}

/// Where a click landed, relative to the notification element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickTarget {
    /// Inside the notification message
    Notification,
    /// Anywhere else on the page
    Elsewhere,
}

/// A passive listener that clears the notification when its trigger fires
#[derive(Debug)]
struct Listener {
    name: &'static str,
    active: bool,
}

impl Listener {
    fn new(name: &'static str) -> Self {
        Self { name, active: true }
    }

    fn fire(&self, notifications: &Notifications) {
        if self.active {
            tracing::debug!("{} listener cleared the notification", self.name);
            notifications.clear();
        }
    }
}

/// Outside-click and navigation listeners
pub struct Dismissal {
    notifications: Notifications,
    click: Listener,
    navigation: Listener,
}

impl Dismissal {
    pub fn new(notifications: Notifications) -> Self {
        Self {
            notifications,
            click: Listener::new("click"),
            navigation: Listener::new("navigation"),
        }
    }

    pub fn on_click(&self, target: ClickTarget) {
        if target == ClickTarget::Elsewhere {
            self.click.fire(&self.notifications);
        }
    }

    pub fn on_navigation(&self) {
        self.navigation.fire(&self.notifications);
    }

    pub fn cancel_click(&mut self) {
        self.click.active = false;
    }

    pub fn cancel_navigation(&mut self) {
        self.navigation.active = false;
    }

    pub fn cancel(&mut self) {
        self.cancel_click();
        self.cancel_navigation();
    }
}
