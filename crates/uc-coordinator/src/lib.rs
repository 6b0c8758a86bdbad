//! # Session coordinator (C7)
//!
//! Elects itself deterministically per epoch (§4.5), scans `Confirmed`
//! events across every running chain worker, and drives the setup/ack/begin
//! handshake that opens a TSS session. See §4.5 and §6.

pub mod coordinator;
pub mod epoch;
pub mod error;
pub mod oracle;
pub mod participants;
pub mod validator_set;

pub use coordinator::{Coordinator, CoordinatorConfig};
pub use epoch::{coordinator_for_epoch, coordinator_for_height, epoch_for_height, DEFAULT_COORDINATOR_RANGE};
pub use error::CoordinatorError;
pub use oracle::{FixedGasPriceOracle, GasPriceOracle, HttpGasPriceOracle};
pub use participants::{eligible_participants, select_sign_subset, threshold_for};
pub use validator_set::{HttpValidatorSetSource, ValidatorInfo, ValidatorSetCache, ValidatorSetSource, ValidatorStatus};
