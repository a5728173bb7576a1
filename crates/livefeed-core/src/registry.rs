//! Subscription registry.
//!
//! The registry holds, per category, the callbacks interested in that
//! category's payloads. Entries are kept in registration order. Dispatch
//! works on a snapshot of the list, so callbacks may subscribe or unsubscribe
//! (including themselves) while they are being invoked.

use dashmap::DashMap;
use livefeed_protocol::{Category, Payload, Topic, UnknownCategory};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use thiserror::Error;
use tracing::debug;

/// Unique identifier of one subscription entry.
pub type SubscriptionId = u64;

/// Callback invoked with each payload of the subscribed category.
pub type Callback = Arc<dyn Fn(&Payload) + Send + Sync>;

/// Registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Category name is not one the channel routes.
    #[error("Invalid category: {0}")]
    InvalidCategory(#[from] UnknownCategory),
}

/// One registered callback.
#[derive(Clone)]
pub(crate) struct Entry {
    pub(crate) id: SubscriptionId,
    pub(crate) callback: Callback,
    pub(crate) active: Arc<AtomicBool>,
}

impl Entry {
    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// Per-category callback registry.
pub struct Registry {
    entries: DashMap<Category, Vec<Entry>>,
    next_id: AtomicU64,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: DashMap::new(),
            next_id: AtomicU64::new(1),
        })
    }

    /// Register `callback` under `category`.
    ///
    /// Each call creates an independent entry, even for the same closure.
    /// The returned [`Subscription`] removes exactly this entry.
    pub fn subscribe<F>(self: &Arc<Self>, category: Category, callback: F) -> Subscription
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let active = Arc::new(AtomicBool::new(true));

        let mut list = self.entries.entry(category).or_default();
        list.push(Entry {
            id,
            callback: Arc::new(callback),
            active: Arc::clone(&active),
        });
        debug!(
            category = %category,
            subscription = id,
            subscribers = list.len(),
            "Subscribed"
        );
        drop(list);

        Subscription {
            id,
            category,
            active,
            registry: Arc::downgrade(self),
        }
    }

    /// Register a callback by category name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidCategory`] if `name` is not a known
    /// category.
    pub fn subscribe_named<F>(
        self: &Arc<Self>,
        name: &str,
        callback: F,
    ) -> Result<Subscription, RegistryError>
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        let category = name.parse::<Category>()?;
        Ok(self.subscribe(category, callback))
    }

    /// Register a callback that receives the typed payload of `T`'s category.
    pub fn subscribe_to<T, F>(self: &Arc<Self>, callback: F) -> Subscription
    where
        T: Topic,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subscribe(T::CATEGORY, move |payload| {
            if let Some(typed) = T::from_payload(payload) {
                callback(typed);
            }
        })
    }

    /// Remove every entry in every category.
    ///
    /// Outstanding [`Subscription`] handles become inactive; calling
    /// `unsubscribe` on them afterwards is a no-op.
    pub fn unsubscribe_all(&self) {
        let mut removed = 0;
        for category in Category::ALL {
            if let Some((_, list)) = self.entries.remove(&category) {
                for entry in &list {
                    entry.active.store(false, Ordering::SeqCst);
                }
                removed += list.len();
            }
        }
        debug!(removed, "Unsubscribed all");
    }

    fn remove(&self, category: Category, id: SubscriptionId) {
        if let Some(mut list) = self.entries.get_mut(&category) {
            list.retain(|entry| entry.id != id);
            debug!(
                category = %category,
                subscription = id,
                subscribers = list.len(),
                "Unsubscribed"
            );
        }
        self.entries.remove_if(&category, |_, list| list.is_empty());
    }

    /// Copy of the live entries for `category`, in registration order.
    pub(crate) fn snapshot(&self, category: Category) -> Vec<Entry> {
        self.entries
            .get(&category)
            .map(|list| list.clone())
            .unwrap_or_default()
    }

    /// Number of active callbacks for a category.
    #[must_use]
    pub fn subscriber_count(&self, category: Category) -> usize {
        self.entries.get(&category).map_or(0, |list| list.len())
    }

    /// Whether no category has any subscriber.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|list| list.is_empty())
    }

    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            dashboard: self.subscriber_count(Category::Dashboard),
            order: self.subscriber_count(Category::Order),
            risk: self.subscriber_count(Category::Risk),
        }
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("stats", &self.stats())
            .finish()
    }
}

/// Registry statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegistryStats {
    /// Subscribers to `dashboard`.
    pub dashboard: usize,
    /// Subscribers to `order`.
    pub order: usize,
    /// Subscribers to `risk`.
    pub risk: usize,
}

impl RegistryStats {
    /// Total number of subscriptions.
    #[must_use]
    pub fn total(&self) -> usize {
        self.dashboard + self.order + self.risk
    }
}

/// Capability that removes one registry entry.
///
/// Dropping the handle does not unsubscribe. Clones share the same entry.
#[derive(Clone)]
pub struct Subscription {
    id: SubscriptionId,
    category: Category,
    active: Arc<AtomicBool>,
    registry: Weak<Registry>,
}

impl Subscription {
    /// Identifier of the entry.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Category of the entry.
    #[must_use]
    pub fn category(&self) -> Category {
        self.category
    }

    /// Whether the entry is still registered.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Remove the entry.
    ///
    /// Returns `true` on the call that actually removed it; later calls are
    /// no-ops returning `false`.
    pub fn unsubscribe(&self) -> bool {
        if !self.active.swap(false, Ordering::SeqCst) {
            return false;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.category, self.id);
        }
        true
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("category", &self.category)
            .field("active", &self.is_active())
            .finish()
    }
}
