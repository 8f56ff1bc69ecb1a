//! Sesión por conexión
//!
//! El relay guarda una sesión por conexión, indexada por su id. La
//! clasificación (rol y vehículo) sólo cambia dentro del relay al procesar
//! el HELLO.

use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::protocol::Role;

pub type ConnectionId = u64;

/// Frame pendiente de escribir en el socket
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Conectado, esperando el HELLO
    AwaitingHello,
    /// HELLO aceptado e INIT enviado
    Joined { scooter_id: Uuid, role: Role },
}

#[derive(Debug)]
pub struct ConnectionSession {
    pub id: ConnectionId,
    pub phase: SessionPhase,
    outbox: UnboundedSender<Outbound>,
}

impl ConnectionSession {
    pub fn new(id: ConnectionId, outbox: UnboundedSender<Outbound>) -> Self {
        Self {
            id,
            phase: SessionPhase::AwaitingHello,
            outbox,
        }
    }

    pub fn outbox(&self) -> UnboundedSender<Outbound> {
        self.outbox.clone()
    }
}

/// Enviar un frame si la conexión sigue abierta
pub(crate) fn deliver(outbox: &UnboundedSender<Outbound>, frame: Outbound) -> bool {
    if outbox.is_closed() {
        return false;
    }
    outbox.send(frame).is_ok()
}
