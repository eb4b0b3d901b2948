//! Parlato serves a realtime-voice web console: it issues short-lived
//! credentials for the upstream voice API and server-renders the client
//! application, either through a live development bridge or from prebuilt
//! production artifacts.

pub mod application;
pub mod config;
pub mod infra;
