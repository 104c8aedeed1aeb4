use std::sync::Arc;
use tokio::sync::RwLock;

/// Ordered list of subscribers with identity-based membership.
///
/// Two handles are the same subscriber when they point at the same
/// allocation.
pub struct SubscriberList<T: ?Sized> {
    items: RwLock<Vec<Arc<T>>>,
}

impl<T: ?Sized> SubscriberList<T> {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(Vec::new()),
        }
    }

    /// Append a subscriber. Returns `false` if it was already registered.
    pub async fn add(&self, item: Arc<T>) -> bool {
        let mut items = self.items.write().await;
        if items.iter().any(|existing| same(existing, &item)) {
            return false;
        }
        items.push(item);
        true
    }

    /// Returns `false` if the subscriber was not registered.
    pub async fn remove(&self, item: &Arc<T>) -> bool {
        let mut items = self.items.write().await;
        let before = items.len();
        items.retain(|existing| !same(existing, item));
        items.len() != before
    }

    /// Current subscribers in registration order.
    ///
    /// Delivery iterates over a snapshot so a subscriber may (un)register
    /// without deadlocking.
    pub async fn snapshot(&self) -> Vec<Arc<T>> {
        self.items.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }
}

impl<T: ?Sized> Default for SubscriberList<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn same<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
