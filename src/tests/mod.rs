//! tests/mod.rs
//! Pruebas del servicio (DB SQLite temporal + gateway simulado con httpmock).

mod handler_tests;
mod inbound_tests;
mod support;
