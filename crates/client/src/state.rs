//! Wiring of the client components into one application state.
//!
//! Construction order matters: the session manager must be installed on
//! the API client before any cache issues a request, and a persisted
//! session is restored before the first sync so the bearer token is
//! already attached.

use std::sync::Arc;

use crate::cart::CartCache;
use crate::catalog::CatalogClient;
use crate::config::ClientConfig;
use crate::http::ApiClient;
use crate::notify::Notifier;
use crate::session::SessionManager;
use crate::storage::{ProfileStore, StoreError};
use crate::wishlist::WishlistCache;

/// Fully wired client state: one API client, one session, one store, and
/// the caches on top.
///
/// Cheap to clone; clones share all components.
#[derive(Clone)]
pub struct AppState {
    /// Configuration the state was built from.
    pub config: ClientConfig,
    /// Per-profile persistent store.
    pub store: ProfileStore,
    /// Backend API client with the interceptor chain installed.
    pub api: ApiClient,
    /// Session manager (login, refresh, logout).
    pub session: SessionManager,
    /// Product snapshot lookups.
    pub catalog: CatalogClient,
    /// Shopping cart cache.
    pub cart: CartCache,
    /// Wishlist cache.
    pub wishlist: WishlistCache,
}

impl AppState {
    /// Build and wire all components.
    ///
    /// Restores any persisted session, so the returned state is ready to
    /// issue authenticated requests immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the profile store cannot be opened.
    pub fn new(config: ClientConfig, notifier: Arc<dyn Notifier>) -> Result<Self, StoreError> {
        let store = ProfileStore::open(&config.state_dir, &config.profile)?;
        let api = ApiClient::new(&config.api_base_url);

        let session = SessionManager::new(api.clone(), store.clone(), Arc::clone(&notifier));
        session.install(&api);
        api.set_error_notifier(Arc::clone(&notifier));
        session.restore_from_storage();

        let catalog = CatalogClient::new(api.clone());
        let cart = CartCache::new(
            api.clone(),
            catalog.clone(),
            store.clone(),
            Arc::clone(&notifier),
        );
        let wishlist = WishlistCache::new(api.clone(), store.clone(), notifier);

        Ok(Self {
            config,
            store,
            api,
            session,
            catalog,
            cart,
            wishlist,
        })
    }

    /// Reconcile both caches with the backend.
    pub async fn sync(&self) {
        self.cart.load().await;
        self.wishlist.load().await;
    }
}
