//! Core photobox library (auth, credentials, uploads, gallery, sign-out).

pub mod auth;
pub mod backend;
pub mod config;
pub mod credentials;
pub mod gallery;
pub mod images;
pub mod kv;
pub mod logging;
pub mod signout;
pub mod upload;
