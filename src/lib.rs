//! ATGeo Marker: geographic markers on the AT Protocol.
//!
//! Two services share this crate:
//! - **web** (`atgeo-marker`): OAuth login and marker creation for the
//!   browser client, backed by a SQLite session store.
//! - **appview** (`atgeo-appview`): aggregates a user's marker records and
//!   the entries they reference into display-ready views.

pub mod appview;
pub mod atproto;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod lexicon;
pub mod oauth;
pub mod store;
pub mod web;
