pub mod config;
pub mod draft;
pub mod error;
pub mod form;
pub mod pricing;
pub mod session;
pub mod storage;
pub mod workflow;

// Re-export commonly used types
pub use config::{BookingConfig, DEFAULT_DRAFT_KEY, DraftLimits};
pub use draft::{DraftStore, LoadOutcome, SaveOutcome};
pub use error::{BookingError, Result, StorageError};
pub use form::{
    CeremonyOrder, CeremonyType, FieldUpdate, FormField, FormSnapshot, HearseRoute, PackageType,
    ServiceType, merge_with_defaults,
};
pub use pricing::{
    CemeteryCategory, LineItem, LineItemKind, PriceBreakdown, PriceTable, calculate_breakdown,
    calculate_total,
};
pub use session::{BookingSession, SessionView};
pub use storage::{FileKeyValueStore, InMemoryKeyValueStore, KeyValueStore};
pub use workflow::{Navigation, Step, StepIndicator, StepStatus, Wizard};
