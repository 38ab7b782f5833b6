//! Local-first wishlist with server reconciliation.
//!
//! The wishlist is a membership set keyed by product id. Unlike the cart,
//! its failure stance is fail-open: a failed sync keeps the local set, and
//! removal always takes effect locally even when the backend call fails.
//! A wishlist that is briefly stale is harmless; one that vanishes on a
//! flaky connection is not.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use clementine_core::ProductId;

use crate::error::ApiError;
use crate::http::ApiClient;
use crate::notify::{Notification, Notifier};
use crate::storage::{ProfileStore, keys};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WishlistBody<'a> {
    product_id: &'a ProductId,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredWishlist {
    products: Vec<ProductId>,
}

/// Locally cached, server-reconciled wishlist.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct WishlistCache {
    inner: Arc<WishlistInner>,
}

struct WishlistInner {
    api: ApiClient,
    store: ProfileStore,
    notifier: Arc<dyn Notifier>,
    products: RwLock<Vec<ProductId>>,
}

impl WishlistCache {
    /// Create the cache, seeding membership from storage.
    #[must_use]
    pub fn new(api: ApiClient, store: ProfileStore, notifier: Arc<dyn Notifier>) -> Self {
        let seeded = store
            .get(keys::WISHLIST)
            .and_then(|raw| match serde_json::from_str::<StoredWishlist>(&raw) {
                Ok(stored) => Some(stored.products),
                Err(err) => {
                    warn!(error = %err, "Persisted wishlist is corrupt, starting empty");
                    None
                }
            })
            .unwrap_or_default();

        Self {
            inner: Arc::new(WishlistInner {
                api,
                store,
                notifier,
                products: RwLock::new(dedupe(seeded)),
            }),
        }
    }

    /// Current wishlist membership, in insertion order.
    #[must_use]
    pub fn product_ids(&self) -> Vec<ProductId> {
        self.inner.products.read().clone()
    }

    /// Whether a product is on the wishlist.
    #[must_use]
    pub fn contains(&self, product_id: &ProductId) -> bool {
        self.inner.products.read().iter().any(|p| p == product_id)
    }

    /// Refetch the authoritative wishlist and replace local state with it.
    ///
    /// On failure the local set is kept as-is; the user is told the sync
    /// did not happen, nothing more.
    #[instrument(skip(self))]
    pub async fn load(&self) {
        match self.inner.api.get_json::<Vec<ProductId>>("/wishlist").await {
            Ok(products) => self.inner.replace(dedupe(products)),
            Err(err) => {
                warn!(error = %err, "Wishlist resync failed, keeping local state");
                self.inner
                    .notifier
                    .notify(Notification::error("Could not sync wishlist."));
            }
        }
    }

    /// Add a product to the wishlist, backend first.
    ///
    /// Local state only changes once the backend has accepted the add.
    ///
    /// # Errors
    ///
    /// Returns an error (after emitting an error notification) if the
    /// backend rejects the add; local state is unchanged.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn add(&self, product_id: &ProductId) -> Result<(), ApiError> {
        let body = WishlistBody { product_id };
        if let Err(err) = self.inner.api.post_unit("/wishlist/add", &body).await {
            self.inner
                .notifier
                .notify(Notification::error(err.user_message()));
            return Err(err);
        }

        {
            let mut products = self.inner.products.write();
            if !products.iter().any(|p| p == product_id) {
                products.push(product_id.clone());
            }
        }
        self.inner.persist();
        self.inner
            .notifier
            .notify(Notification::success("Added to wishlist!"));
        Ok(())
    }

    /// Remove a product from the wishlist.
    ///
    /// The backend is told, but the local removal stands either way; a
    /// backend failure downgrades the notification to a warning. Removal
    /// of an absent product is a no-op on the local set.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn remove(&self, product_id: &ProductId) {
        let body = WishlistBody { product_id };
        let backend = self.inner.api.post_unit("/wishlist/remove", &body).await;

        self.inner
            .products
            .write()
            .retain(|p| p != product_id);
        self.inner.persist();

        match backend {
            Ok(()) => self
                .inner
                .notifier
                .notify(Notification::success("Removed from wishlist.")),
            Err(err) => {
                warn!(error = %err, "Wishlist remove not confirmed by backend");
                self.inner.notifier.notify(Notification::warning(
                    "Removed locally; the change may not have reached the server.",
                ));
            }
        }
    }
}

impl WishlistInner {
    fn replace(&self, products: Vec<ProductId>) {
        *self.products.write() = products;
        self.persist();
    }

    /// Mirror the in-memory set to storage (write-through).
    fn persist(&self) {
        let stored = StoredWishlist {
            products: self.products.read().clone(),
        };
        match serde_json::to_string(&stored) {
            Ok(serialized) => {
                if let Err(err) = self.store.set(keys::WISHLIST, serialized) {
                    warn!(error = %err, "Failed to persist wishlist");
                }
            }
            Err(err) => warn!(error = %err, "Failed to serialize wishlist"),
        }
    }
}

fn dedupe(products: Vec<ProductId>) -> Vec<ProductId> {
    let mut seen = std::collections::HashSet::new();
    products
        .into_iter()
        .filter(|p| seen.insert(p.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RecordingNotifier;

    fn cache(dir: &std::path::Path) -> WishlistCache {
        let store = ProfileStore::open(dir, "default").expect("open store");
        let api = ApiClient::new(&url::Url::parse("http://localhost:9").expect("url"));
        WishlistCache::new(api, store, RecordingNotifier::shared())
    }

    #[test]
    fn test_dedupe_keeps_first_occurrence() {
        let products = dedupe(vec![
            ProductId::new("p-1"),
            ProductId::new("p-2"),
            ProductId::new("p-1"),
        ]);
        assert_eq!(products, vec![ProductId::new("p-1"), ProductId::new("p-2")]);
    }

    #[test]
    fn test_persistence_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let wishlist = cache(dir.path());
            wishlist
                .inner
                .replace(vec![ProductId::new("p-1"), ProductId::new("p-2")]);
        }

        let reloaded = cache(dir.path());
        assert!(reloaded.contains(&ProductId::new("p-1")));
        assert!(reloaded.contains(&ProductId::new("p-2")));
        assert!(!reloaded.contains(&ProductId::new("p-3")));
    }

    #[test]
    fn test_corrupt_persisted_wishlist_starts_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ProfileStore::open(dir.path(), "default").expect("open store");
        store.set(keys::WISHLIST, "not json").expect("set");

        let wishlist = cache(dir.path());
        assert!(wishlist.product_ids().is_empty());
    }
}
