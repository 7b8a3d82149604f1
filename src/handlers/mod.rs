//! handlers/mod.rs
//! Módulo que agrupa los distintos handlers (instancias, despacho, eventos entrantes).

pub mod dispatch_handler;
pub mod identity;
pub mod inbound_handler;
pub mod instance_handler;
