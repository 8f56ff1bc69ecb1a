//! Modelo de User
//!
//! Sólo los campos que consume el ciclo de alquiler: crédito y membresía.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

/// Nivel de membresía - mapea al ENUM membership_tier
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq, Default)]
#[sqlx(type_name = "membership_tier", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MembershipTier {
    #[default]
    None,
    Small,
    Medium,
    Allin,
}

/// Estado de la membresía - mapea al ENUM membership_status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq, Default)]
#[sqlx(type_name = "membership_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    Active,
    #[default]
    Inactive,
}

/// Membresía embebida en el usuario
#[derive(Debug, Clone, Copy, Serialize, Deserialize, FromRow, PartialEq, Eq, Default)]
pub struct Membership {
    #[sqlx(rename = "membership_tier")]
    pub tier: MembershipTier,
    #[sqlx(rename = "membership_status")]
    pub status: MembershipStatus,
}

impl Membership {
    pub fn active(tier: MembershipTier) -> Self {
        Self {
            tier,
            status: MembershipStatus::Active,
        }
    }

    /// Nivel que realmente aplica: una membresía inactiva no descuenta
    pub fn effective_tier(&self) -> MembershipTier {
        match self.status {
            MembershipStatus::Active => self.tier,
            MembershipStatus::Inactive => MembershipTier::None,
        }
    }
}

/// User - mapea a la tabla users
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    /// Saldo en la misma unidad que el coste de los alquileres
    pub credit: i64,
    #[sqlx(flatten)]
    pub membership: Membership,
}

impl User {
    pub fn new(name: impl Into<String>, credit: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            email: None,
            credit,
            membership: Membership::default(),
        }
    }

    pub fn with_membership(mut self, membership: Membership) -> Self {
        self.membership = membership;
        self
    }
}
