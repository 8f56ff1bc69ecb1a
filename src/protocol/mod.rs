//! Protocolo de conexión persistente
//!
//! Mensajes compartidos por el relay (servidor) y el cliente del dispositivo.

pub mod messages;

pub use messages::*;

/// Código de cierre WebSocket para violaciones de protocolo
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;
