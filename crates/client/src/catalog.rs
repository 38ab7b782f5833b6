//! Product display snapshots.
//!
//! Cart lines and notifications carry a denormalized snapshot of the
//! product they refer to (name, unit price, image) so they can render
//! without another round trip. Snapshots are fetched from the backend and
//! cached for five minutes.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde::{Deserialize, Serialize};
use tracing::debug;

use clementine_core::{Price, ProductId};

use crate::error::ApiError;
use crate::http::ApiClient;

/// Display data for a product, captured at fetch time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSnapshot {
    /// Product identifier.
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// Unit price.
    pub price: Price,
    /// Image reference, when the product has one.
    pub image_url: Option<String>,
}

/// Client for product snapshot lookups, cached for 5 minutes.
#[derive(Clone)]
pub struct CatalogClient {
    inner: Arc<CatalogInner>,
}

struct CatalogInner {
    api: ApiClient,
    cache: Cache<ProductId, ProductSnapshot>,
}

impl CatalogClient {
    /// Create a new catalog client on top of an API client.
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();

        Self {
            inner: Arc::new(CatalogInner { api, cache }),
        }
    }

    /// Get the display snapshot for a product.
    ///
    /// # Errors
    ///
    /// Returns an error if the product is unknown or the request fails.
    pub async fn get_product(&self, id: &ProductId) -> Result<ProductSnapshot, ApiError> {
        if let Some(snapshot) = self.inner.cache.get(id).await {
            debug!(product_id = %id, "Cache hit for product snapshot");
            return Ok(snapshot);
        }

        let snapshot: ProductSnapshot = self
            .inner
            .api
            .get_json(&format!("/products/{id}"))
            .await?;

        self.inner
            .cache
            .insert(id.clone(), snapshot.clone())
            .await;

        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clementine_core::CurrencyCode;
    use rust_decimal::Decimal;

    #[test]
    fn test_snapshot_wire_shape() {
        let json = serde_json::json!({
            "id": "p-42",
            "name": "Terracotta Planter",
            "price": {"amount": "19.99", "currencyCode": "USD"},
            "imageUrl": "https://img.example/p-42.jpg",
        });

        let snapshot: ProductSnapshot = serde_json::from_value(json).expect("deserialize");
        assert_eq!(snapshot.id, ProductId::new("p-42"));
        assert_eq!(snapshot.price.amount, Decimal::new(1999, 2));
        assert_eq!(snapshot.price.currency_code, CurrencyCode::USD);
        assert_eq!(
            snapshot.image_url.as_deref(),
            Some("https://img.example/p-42.jpg")
        );
    }

    #[test]
    fn test_snapshot_missing_image_is_none() {
        let json = serde_json::json!({
            "id": "p-7",
            "name": "Enamel Mug",
            "price": {"amount": "12.00", "currencyCode": "USD"},
        });

        let snapshot: ProductSnapshot = serde_json::from_value(json).expect("deserialize");
        assert_eq!(snapshot.image_url, None);
    }
}
