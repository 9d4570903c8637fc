pub mod error;
pub mod types;

pub use error::{IndexError, Result};
pub use types::{
    FedoraId, IndexRecord, Operation, format_instant, from_epoch_millis, to_epoch_millis,
};
