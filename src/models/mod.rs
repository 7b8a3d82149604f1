//! models/mod.rs
//! Módulo raíz para modelos/estructuras compartidas.

pub mod campaign_model;
pub mod chat_model;
pub mod instance_model;
pub mod webhook_model;
