//! JSON REST API for Vitae.
//!
//! Exposes an axum [`Router`] backed by any
//! [`vitae_core::store::ProfileStore`] plus a
//! [`vitae_core::store::MatchLookup`] collaborator. Auth, TLS, and transport
//! concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", vitae_api::api_router(state.clone()))
//! ```

pub mod entities;
pub mod error;
pub mod profiles;
pub mod reviews;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post, put},
};
use vitae_core::store::{MatchLookup, ProfileStore};

pub use error::ApiError;

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all API handlers.
pub struct ApiState<S, M> {
  pub store:   Arc<S>,
  pub matcher: Arc<M>,
}

// Manual impl so `S` and `M` need not be `Clone` themselves.
impl<S, M> Clone for ApiState<S, M> {
  fn clone(&self) -> Self {
    Self {
      store:   Arc::clone(&self.store),
      matcher: Arc::clone(&self.matcher),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S, M>(state: ApiState<S, M>) -> Router<()>
where
  S: ProfileStore + 'static,
  S::Error: Into<vitae_core::Error>,
  M: MatchLookup + 'static,
{
  Router::new()
    // Entities
    .route("/entities", post(entities::create::<S, M>))
    .route(
      "/entities/{entity_type}/{logical_id}",
      get(entities::get_one::<S, M>).put(entities::update::<S, M>),
    )
    // Profiles
    .route("/profiles/{owner_id}", get(profiles::list::<S, M>))
    // Reviews
    .route(
      "/reviews/{version_id}/candidates",
      put(reviews::ingest::<S, M>),
    )
    .route("/reviews/{version_id}/items", get(reviews::items::<S, M>))
    .route(
      "/reviews/{version_id}/decisions",
      get(reviews::decisions::<S, M>).post(reviews::record::<S, M>),
    )
    .route("/reviews/{version_id}/apply", post(reviews::apply::<S, M>))
    .route(
      "/reviews/{version_id}/apply-new",
      post(reviews::apply_new::<S, M>),
    )
    .with_state(state)
}

// ─── Integration tests ────────────────────────────────────────────────────────
