pub mod fixtures;
pub mod types;

pub use fixtures::ReferenceData;
pub use types::{CallRecord, Contact, Feature, HealthReminder, HelpRequest, HelpStatus, PensionInfo};
