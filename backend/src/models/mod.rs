//! Data models module.
//!
//! Row-backed domain entities for the lending and compliance schemas.
//! Each model maps manually from a `PgRow`, keeping enum columns as plain
//! VARCHARs in the database.

pub mod application;
pub mod audit;
pub mod borrower;
pub mod condition;
pub mod decision;
pub mod document;
pub mod hmda;
pub mod kb;

// Re-export shared enums
pub use shared::models::enums::{
    ApplicationStage, CollectionMethod, ComplianceStatus, ConditionSeverity, ConditionStatus,
    DecisionType, DocumentStatus, DocumentType, EmploymentStatus, LoanType, UserRole,
};

pub use application::{Application, ApplicationBorrower, ApplicationFinancials, RateLock};
pub use audit::{AuditEvent, AuditViolation};
pub use borrower::Borrower;
pub use condition::Condition;
pub use decision::Decision;
pub use document::{Document, DocumentExtraction};
pub use hmda::{HmdaDemographic, HmdaLoanData};
pub use kb::{KbChunk, KbDocument};
