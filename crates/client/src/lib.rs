//! Clementine client library.
//!
//! Local-first client for the Clementine shop backend. The library owns the
//! three stateful concerns every frontend shell (CLI today, anything
//! tomorrow) needs but must never reimplement:
//!
//! - **Session** - bearer-token lifecycle with transparent refresh-and-retry
//!   on expired tokens ([`session::SessionManager`])
//! - **Cart** - locally persisted, server-reconciled shopping cart
//!   ([`cart::CartCache`])
//! - **Wishlist** - locally persisted product membership set
//!   ([`wishlist::WishlistCache`])
//!
//! Everything reaches the backend through one [`http::ApiClient`], whose
//! interceptor chain the session manager hooks at startup: a request
//! decorator attaches the bearer token, a response-recovery handler turns a
//! 401 into at most one silent refresh plus one retry. User-visible outcomes
//! flow through a [`notify::Notifier`] sink supplied by the embedding shell.
//!
//! [`state::AppState::new`] wires all of this together.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod catalog;
pub mod config;
pub mod error;
pub mod http;
pub mod notify;
pub mod session;
pub mod state;
pub mod storage;
pub mod wishlist;
