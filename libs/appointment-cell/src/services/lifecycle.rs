// libs/appointment-cell/src/services/lifecycle.rs
use tracing::{debug, warn};

use crate::models::{AppointmentError, AppointmentStatus};

/// Owns the appointment status state machine. Every status write goes
/// through `validate_status_transition`; completed and cancelled are
/// terminal, and a paid completed appointment accepts no writes at all.
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    pub fn validate_status_transition(
        &self,
        current_status: &AppointmentStatus,
        new_status: &AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!(
            "Validating status transition from {} to {}",
            current_status, new_status
        );

        let valid_transitions = self.get_valid_transitions(current_status);
        if !valid_transitions.contains(new_status) {
            warn!(
                "Invalid status transition attempted: {} -> {}",
                current_status, new_status
            );
            return Err(AppointmentError::InvalidStatusTransition(*current_status));
        }

        Ok(())
    }

    pub fn get_valid_transitions(
        &self,
        current_status: &AppointmentStatus,
    ) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Scheduled => vec![
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
            ],
            // Terminal states
            AppointmentStatus::Completed => vec![],
            AppointmentStatus::Cancelled => vec![],
        }
    }
}

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use AppointmentStatus::*;

    #[test]
    fn scheduled_can_complete_or_cancel() {
        let lifecycle = AppointmentLifecycleService::new();
        assert!(lifecycle.validate_status_transition(&Scheduled, &Completed).is_ok());
        assert!(lifecycle.validate_status_transition(&Scheduled, &Cancelled).is_ok());
    }

    #[test]
    fn completed_is_terminal() {
        let lifecycle = AppointmentLifecycleService::new();
        assert!(lifecycle.validate_status_transition(&Completed, &Scheduled).is_err());
        assert!(lifecycle.validate_status_transition(&Completed, &Cancelled).is_err());
    }

    #[test]
    fn cancelled_is_terminal() {
        let lifecycle = AppointmentLifecycleService::new();
        assert!(lifecycle.validate_status_transition(&Cancelled, &Scheduled).is_err());
        assert!(lifecycle.validate_status_transition(&Cancelled, &Completed).is_err());
    }

    #[test]
    fn no_self_transition() {
        let lifecycle = AppointmentLifecycleService::new();
        assert!(lifecycle.validate_status_transition(&Scheduled, &Scheduled).is_err());
    }
}
