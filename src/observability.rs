pub mod logging;

use crate::runtime::Role;
use serde::Serialize;

/// Liveness response served at `/healthz`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthzStatus {
    pub healthy: bool,
    pub roles: Vec<Role>,
}

impl HealthzStatus {
    pub fn new(roles: &[Role]) -> Self {
        Self {
            healthy: true,
            roles: roles.to_vec(),
        }
    }
}
