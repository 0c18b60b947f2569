//! Energy network selection.
//!
//! `NetType` is a **configuration** type: it names which network family the
//! run uses and deserializes from the experiment file as a lowercase string
//! (`net_type = "vanilla"`). The CLI resolves it once into a concrete
//! generic instantiation of the trainer; nothing dispatches on it per call.

use serde::{Deserialize, Serialize};

/// Energy network family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetType {
    /// Strided ConvNet for 32x32-style images.
    Vanilla,
    /// ConvNet with non-local attention blocks.
    Nonlocal,
    /// MLP over 2D toy points.
    Toy,
}

impl NetType {
    /// Whether this network consumes image-shaped states.
    pub fn is_image(&self) -> bool {
        !matches!(self, Self::Toy)
    }
}

impl std::fmt::Display for NetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vanilla => write!(f, "vanilla"),
            Self::Nonlocal => write!(f, "nonlocal"),
            Self::Toy => write!(f, "toy"),
        }
    }
}
