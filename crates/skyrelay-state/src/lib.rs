pub mod record;
pub mod store;
pub mod versioned;

pub use record::AircraftRecord;
pub use store::StateStore;
pub use versioned::VersionedField;
