//! Local-first shopping cart with server reconciliation.
//!
//! The server owns cart truth; this cache keeps a locally persisted copy
//! for instant display and converges on the server after every mutation by
//! refetching the whole cart ("resync") rather than merging partial
//! results. Simplicity over efficiency, deliberately.
//!
//! Failure stance is fail-safe: when a resync fails, the local cart is
//! emptied rather than risking a stale or wrong total on screen. Mutations
//! are not serialized against each other; if two race, the last resync to
//! complete wins, and the next resync self-corrects.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use clementine_core::{OrderId, ProductId};

use crate::catalog::CatalogClient;
use crate::error::ApiError;
use crate::http::ApiClient;
use crate::notify::{Notification, Notifier, UndoAction};
use crate::storage::{ProfileStore, keys};

/// One product in the cart, with its display snapshot captured at add time.
///
/// A quantity of zero is equivalent to absence; such lines are dropped,
/// never retained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    /// Product this line refers to; unique within a cart.
    pub product_id: ProductId,
    /// Number of units, always >= 1 in cache state.
    pub quantity: u32,
    /// Denormalized display data.
    pub product: crate::catalog::ProductSnapshot,
}

/// Persisted envelope for the cart, so a reload before the next resync
/// still shows the last known state.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredCart {
    saved_at: DateTime<Utc>,
    lines: Vec<CartLine>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LineBody<'a> {
    product_id: &'a ProductId,
    #[serde(skip_serializing_if = "Option::is_none")]
    quantity: Option<u32>,
}

#[derive(Debug, Serialize)]
struct CouponBody<'a> {
    code: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderConfirmation {
    order_id: OrderId,
}

/// Locally cached, server-reconciled shopping cart.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct CartCache {
    inner: Arc<CartInner>,
}

struct CartInner {
    api: ApiClient,
    catalog: CatalogClient,
    store: ProfileStore,
    notifier: Arc<dyn Notifier>,
    lines: RwLock<Vec<CartLine>>,
}

impl CartCache {
    /// Create the cache, seeding state from storage.
    ///
    /// A missing or corrupt persisted cart yields an empty one; the first
    /// [`CartCache::load`] replaces whatever was seeded anyway.
    #[must_use]
    pub fn new(
        api: ApiClient,
        catalog: CatalogClient,
        store: ProfileStore,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let seeded = store
            .get(keys::CART)
            .and_then(|raw| match serde_json::from_str::<StoredCart>(&raw) {
                Ok(stored) => Some(stored.lines),
                Err(err) => {
                    warn!(error = %err, "Persisted cart is corrupt, starting empty");
                    None
                }
            })
            .unwrap_or_default();

        Self {
            inner: Arc::new(CartInner {
                api,
                catalog,
                store,
                notifier,
                lines: RwLock::new(normalize_lines(seeded)),
            }),
        }
    }

    /// Current cart lines.
    #[must_use]
    pub fn lines(&self) -> Vec<CartLine> {
        self.inner.lines.read().clone()
    }

    /// Sum of `quantity * unit price` over all lines.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.inner
            .lines
            .read()
            .iter()
            .map(|line| line.product.price.amount * Decimal::from(line.quantity))
            .sum()
    }

    // =========================================================================
    // Server reconciliation
    // =========================================================================

    /// Refetch the authoritative cart and replace local state with it.
    ///
    /// On failure the local cart is emptied (never show a cart that might
    /// be wrong after a failed sync) and an error notification is emitted.
    #[instrument(skip(self))]
    pub async fn load(&self) {
        match self.inner.api.get_json::<Vec<CartLine>>("/cart").await {
            Ok(lines) => self.inner.replace(lines),
            Err(err) => {
                warn!(error = %err, "Cart resync failed, emptying local cart");
                self.inner.replace(Vec::new());
                self.inner
                    .notifier
                    .notify(Notification::error("Failed to load cart."));
            }
        }
    }

    /// Add `quantity` units of a product, then resync.
    ///
    /// The success notification carries the product snapshot and an undo
    /// descriptor that removes the product again.
    ///
    /// # Errors
    ///
    /// Returns an error (after emitting an error notification) if the
    /// snapshot fetch or the add request fails; local state then remains
    /// as of the last successful resync.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn add(&self, product_id: &ProductId, quantity: u32) -> Result<(), ApiError> {
        let snapshot = match self.inner.catalog.get_product(product_id).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                self.inner
                    .notifier
                    .notify(Notification::error("Failed to add item to cart."));
                return Err(err);
            }
        };

        let body = LineBody {
            product_id,
            quantity: Some(quantity),
        };
        if let Err(err) = self.inner.api.post_unit("/cart/add", &body).await {
            self.inner
                .notifier
                .notify(Notification::error(err.user_message()));
            return Err(err);
        }

        self.load().await;

        self.inner.notifier.notify(
            Notification::success("Item added to cart!")
                .with_product(snapshot)
                .with_undo(UndoAction::CartAdd {
                    product_id: product_id.clone(),
                }),
        );
        Ok(())
    }

    /// Remove a product entirely, then resync.
    ///
    /// # Errors
    ///
    /// Returns an error (after notifying) if the remove request fails.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn remove(&self, product_id: &ProductId) -> Result<(), ApiError> {
        let body = LineBody {
            product_id,
            quantity: None,
        };
        if let Err(err) = self.inner.api.post_unit("/cart/remove", &body).await {
            self.inner
                .notifier
                .notify(Notification::error(err.user_message()));
            return Err(err);
        }

        self.load().await;
        self.inner
            .notifier
            .notify(Notification::success("Item removed from cart."));
        Ok(())
    }

    /// Set a product's quantity, then resync.
    ///
    /// A quantity of zero is passed through; the backend interprets it as
    /// removal.
    ///
    /// # Errors
    ///
    /// Returns an error (after notifying) if the update request fails.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn update(&self, product_id: &ProductId, quantity: u32) -> Result<(), ApiError> {
        let body = LineBody {
            product_id,
            quantity: Some(quantity),
        };
        if let Err(err) = self.inner.api.post_unit("/cart/update", &body).await {
            self.inner
                .notifier
                .notify(Notification::error(err.user_message()));
            return Err(err);
        }

        self.load().await;
        self.inner
            .notifier
            .notify(Notification::success("Cart updated."));
        Ok(())
    }

    /// Apply a coupon code to the cart, then resync.
    ///
    /// # Errors
    ///
    /// Returns an error (after notifying) if the coupon is rejected.
    #[instrument(skip(self))]
    pub async fn apply_coupon(&self, code: &str) -> Result<(), ApiError> {
        let body = CouponBody { code };
        if let Err(err) = self.inner.api.post_unit("/cart/apply-coupon", &body).await {
            self.inner
                .notifier
                .notify(Notification::error(err.user_message()));
            return Err(err);
        }

        self.load().await;
        self.inner
            .notifier
            .notify(Notification::success("Coupon applied."));
        Ok(())
    }

    /// Place an order for the current cart, then clear it locally.
    ///
    /// The order-placement flow empties the server cart, so no round trip
    /// is spent confirming that; the local clear is immediate.
    ///
    /// # Errors
    ///
    /// Returns an error (after notifying) if order placement fails; the
    /// cart is left untouched.
    #[instrument(skip(self))]
    pub async fn place_order(&self) -> Result<OrderId, ApiError> {
        let confirmation: OrderConfirmation =
            match self.inner.api.post_json("/orders", &serde_json::json!({})).await {
                Ok(confirmation) => confirmation,
                Err(err) => {
                    self.inner
                        .notifier
                        .notify(Notification::error(err.user_message()));
                    return Err(err);
                }
            };

        self.clear();
        self.inner
            .notifier
            .notify(Notification::success("Order placed!"));
        Ok(confirmation.order_id)
    }

    /// Clear local state without a server round trip.
    pub fn clear(&self) {
        self.inner.replace(Vec::new());
    }

    /// Resolve an undo descriptor against the cart's public API.
    ///
    /// # Errors
    ///
    /// Returns an error if the reversing operation fails.
    pub async fn apply_undo(&self, action: &UndoAction) -> Result<(), ApiError> {
        match action {
            UndoAction::CartAdd { product_id } => self.remove(product_id).await,
        }
    }
}

impl CartInner {
    /// Replace in-memory state and mirror it to storage (write-through).
    fn replace(&self, lines: Vec<CartLine>) {
        let lines = normalize_lines(lines);
        let stored = StoredCart {
            saved_at: Utc::now(),
            lines: lines.clone(),
        };

        match serde_json::to_string(&stored) {
            Ok(serialized) => {
                if let Err(err) = self.store.set(keys::CART, serialized) {
                    warn!(error = %err, "Failed to persist cart");
                }
            }
            Err(err) => warn!(error = %err, "Failed to serialize cart"),
        }

        *self.lines.write() = lines;
    }
}

/// Enforce cart invariants on a freshly received line set: zero-quantity
/// lines are dropped and duplicate product ids collapse to the first
/// occurrence.
fn normalize_lines(lines: Vec<CartLine>) -> Vec<CartLine> {
    let mut seen = HashSet::new();
    lines
        .into_iter()
        .filter(|line| line.quantity > 0)
        .filter(|line| seen.insert(line.product_id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RecordingNotifier;
    use clementine_core::{CurrencyCode, Price};

    fn snapshot(id: &str, cents: i64) -> crate::catalog::ProductSnapshot {
        crate::catalog::ProductSnapshot {
            id: ProductId::new(id),
            name: format!("Product {id}"),
            price: Price::new(Decimal::new(cents, 2), CurrencyCode::USD),
            image_url: None,
        }
    }

    fn line(id: &str, quantity: u32, cents: i64) -> CartLine {
        CartLine {
            product_id: ProductId::new(id),
            quantity,
            product: snapshot(id, cents),
        }
    }

    fn cache(dir: &std::path::Path) -> CartCache {
        let store = ProfileStore::open(dir, "default").expect("open store");
        let api = ApiClient::new(&url::Url::parse("http://localhost:9").expect("url"));
        CartCache::new(
            api.clone(),
            CatalogClient::new(api),
            store,
            RecordingNotifier::shared(),
        )
    }

    #[test]
    fn test_normalize_drops_zero_quantity() {
        let normalized = normalize_lines(vec![line("p-1", 2, 500), line("p-2", 0, 300)]);
        assert_eq!(normalized.len(), 1);
        assert!(normalized.iter().all(|l| l.quantity >= 1));
    }

    #[test]
    fn test_normalize_deduplicates_by_product_id() {
        let normalized = normalize_lines(vec![
            line("p-1", 2, 500),
            line("p-1", 5, 500),
            line("p-2", 1, 300),
        ]);
        assert_eq!(normalized.len(), 2);
        assert_eq!(normalized.first().map(|l| l.quantity), Some(2));
    }

    #[test]
    fn test_persistence_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let cart = cache(dir.path());
            cart.inner
                .replace(vec![line("p-1", 2, 1999), line("p-2", 1, 500)]);
        }

        // A fresh cache over the same store shows the last known cart
        // before any resync has run.
        let reloaded = cache(dir.path());
        assert_eq!(
            reloaded.lines(),
            vec![line("p-1", 2, 1999), line("p-2", 1, 500)]
        );
    }

    #[test]
    fn test_corrupt_persisted_cart_starts_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ProfileStore::open(dir.path(), "default").expect("open store");
        store.set(keys::CART, "{broken").expect("set");

        let cart = cache(dir.path());
        assert!(cart.lines().is_empty());
    }

    #[test]
    fn test_subtotal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cart = cache(dir.path());
        cart.inner
            .replace(vec![line("p-1", 2, 1999), line("p-2", 1, 500)]);

        // 2 * 19.99 + 1 * 5.00
        assert_eq!(cart.subtotal(), Decimal::new(4498, 2));
    }

    #[test]
    fn test_clear_empties_and_persists() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cart = cache(dir.path());
        cart.inner.replace(vec![line("p-1", 2, 1999)]);

        cart.clear();
        assert!(cart.lines().is_empty());

        let reloaded = cache(dir.path());
        assert!(reloaded.lines().is_empty());
    }
}
