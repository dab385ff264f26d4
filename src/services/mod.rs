//! Record store services. Each owns a pool handle and one entity's rules.

pub mod asset_service;
pub mod evidence_service;
pub mod service_record_service;
pub mod verification_service;

pub use asset_service::AssetService;
pub use evidence_service::EvidenceService;
pub use service_record_service::ServiceRecordService;
pub use verification_service::VerificationService;
