//! Wishlist commands.
//!
//! # Usage
//!
//! ```bash
//! clementine wishlist show
//! clementine wishlist add p-42
//! clementine wishlist remove p-42
//! ```

use clementine_client::error::ApiError;
use clementine_client::state::AppState;
use clementine_core::ProductId;

/// Sync the wishlist and print its members.
pub async fn show(state: &AppState) {
    state.wishlist.load().await;

    let products = state.wishlist.product_ids();
    if products.is_empty() {
        tracing::info!("Wishlist is empty");
        return;
    }

    for product_id in &products {
        tracing::info!("{product_id}");
    }
}

/// Add a product to the wishlist.
pub async fn add(state: &AppState, product_id: &str) -> Result<(), ApiError> {
    state.wishlist.add(&ProductId::new(product_id)).await
}

/// Remove a product from the wishlist.
pub async fn remove(state: &AppState, product_id: &str) {
    state.wishlist.remove(&ProductId::new(product_id)).await;
}
