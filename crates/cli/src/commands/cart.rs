//! Cart commands.
//!
//! # Usage
//!
//! ```bash
//! clementine cart show
//! clementine cart add p-42 --quantity 2
//! clementine cart update p-42 3
//! clementine cart remove p-42
//! clementine cart coupon WELCOME10
//! clementine order place
//! ```

use clementine_client::error::ApiError;
use clementine_client::state::AppState;
use clementine_core::ProductId;

/// Sync the cart and print its lines and subtotal.
pub async fn show(state: &AppState) {
    state.cart.load().await;

    let lines = state.cart.lines();
    if lines.is_empty() {
        tracing::info!("Cart is empty");
        return;
    }

    for line in &lines {
        tracing::info!(
            "{} x{} - {} ({})",
            line.product.name,
            line.quantity,
            line.product.price.display(),
            line.product_id
        );
    }
    tracing::info!("Subtotal: {}", state.cart.subtotal());
}

/// Add a product to the cart.
pub async fn add(state: &AppState, product_id: &str, quantity: u32) -> Result<(), ApiError> {
    state
        .cart
        .add(&ProductId::new(product_id), quantity)
        .await
}

/// Remove a product from the cart.
pub async fn remove(state: &AppState, product_id: &str) -> Result<(), ApiError> {
    state.cart.remove(&ProductId::new(product_id)).await
}

/// Set a product's quantity.
pub async fn update(state: &AppState, product_id: &str, quantity: u32) -> Result<(), ApiError> {
    state
        .cart
        .update(&ProductId::new(product_id), quantity)
        .await
}

/// Empty the local cart.
pub fn clear(state: &AppState) {
    state.cart.clear();
    tracing::info!("Cart cleared");
}

/// Apply a coupon code.
pub async fn coupon(state: &AppState, code: &str) -> Result<(), ApiError> {
    state.cart.apply_coupon(code).await
}

/// Place an order for the current cart.
pub async fn place_order(state: &AppState) -> Result<(), ApiError> {
    let order_id = state.cart.place_order().await?;
    tracing::info!("Order id: {order_id}");
    Ok(())
}
