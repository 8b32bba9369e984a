use serde::{Deserialize, Serialize};

#[cfg(feature = "backend")]
use sqlx::Type;

/// Lifecycle stage of a mortgage application.
///
/// The stage machine is enforced server-side; see the lifecycle service for
/// the permitted transitions. `closed`, `denied` and `withdrawn` are
/// terminal: no further lifecycle writes are accepted once reached.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "backend", derive(Type))]
#[cfg_attr(feature = "backend", sqlx(type_name = "VARCHAR", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStage {
    Inquiry,
    Prequalification,
    Application,
    Processing,
    Underwriting,
    ConditionalApproval,
    ClearToClose,
    Closed,
    Denied,
    Withdrawn,
}

impl ApplicationStage {
    /// Terminal stages accept no further stage transitions or lifecycle
    /// writes. `clear_to_close` is intentionally not terminal so that the
    /// status endpoint keeps reporting pending actions there.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ApplicationStage::Closed | ApplicationStage::Denied | ApplicationStage::Withdrawn
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStage::Inquiry => "inquiry",
            ApplicationStage::Prequalification => "prequalification",
            ApplicationStage::Application => "application",
            ApplicationStage::Processing => "processing",
            ApplicationStage::Underwriting => "underwriting",
            ApplicationStage::ConditionalApproval => "conditional_approval",
            ApplicationStage::ClearToClose => "clear_to_close",
            ApplicationStage::Closed => "closed",
            ApplicationStage::Denied => "denied",
            ApplicationStage::Withdrawn => "withdrawn",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "inquiry" => Some(ApplicationStage::Inquiry),
            "prequalification" => Some(ApplicationStage::Prequalification),
            "application" => Some(ApplicationStage::Application),
            "processing" => Some(ApplicationStage::Processing),
            "underwriting" => Some(ApplicationStage::Underwriting),
            "conditional_approval" => Some(ApplicationStage::ConditionalApproval),
            "clear_to_close" => Some(ApplicationStage::ClearToClose),
            "closed" => Some(ApplicationStage::Closed),
            "denied" => Some(ApplicationStage::Denied),
            "withdrawn" => Some(ApplicationStage::Withdrawn),
            _ => None,
        }
    }
}

impl std::fmt::Display for ApplicationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Domain role resolved from the identity provider's realm roles.
///
/// When a token carries several realm roles the most privileged one wins,
/// in the order `admin > ceo > underwriter > loan_officer > borrower >
/// prospect`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Ceo,
    Underwriter,
    LoanOfficer,
    Borrower,
    Prospect,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Ceo => "ceo",
            UserRole::Underwriter => "underwriter",
            UserRole::LoanOfficer => "loan_officer",
            UserRole::Borrower => "borrower",
            UserRole::Prospect => "prospect",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(UserRole::Admin),
            "ceo" => Some(UserRole::Ceo),
            "underwriter" => Some(UserRole::Underwriter),
            "loan_officer" => Some(UserRole::LoanOfficer),
            "borrower" => Some(UserRole::Borrower),
            "prospect" => Some(UserRole::Prospect),
            _ => None,
        }
    }

    /// Lower rank means more privileged; used to pick the winning role out
    /// of a token's realm-role list.
    pub fn privilege_rank(&self) -> u8 {
        match self {
            UserRole::Admin => 0,
            UserRole::Ceo => 1,
            UserRole::Underwriter => 2,
            UserRole::LoanOfficer => 3,
            UserRole::Borrower => 4,
            UserRole::Prospect => 5,
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Loan products offered on the platform.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "backend", derive(Type))]
#[cfg_attr(feature = "backend", sqlx(type_name = "VARCHAR", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum LoanType {
    // snake_case would yield "conventional30"; the wire value keeps the
    // underscore before the term.
    #[cfg_attr(feature = "backend", sqlx(rename = "conventional_30"))]
    #[serde(rename = "conventional_30")]
    Conventional30,
    #[cfg_attr(feature = "backend", sqlx(rename = "conventional_15"))]
    #[serde(rename = "conventional_15")]
    Conventional15,
    Fha,
    Va,
    Jumbo,
    Usda,
}

impl LoanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanType::Conventional30 => "conventional_30",
            LoanType::Conventional15 => "conventional_15",
            LoanType::Fha => "fha",
            LoanType::Va => "va",
            LoanType::Jumbo => "jumbo",
            LoanType::Usda => "usda",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "conventional_30" => Some(LoanType::Conventional30),
            "conventional_15" => Some(LoanType::Conventional15),
            "fha" => Some(LoanType::Fha),
            "va" => Some(LoanType::Va),
            "jumbo" => Some(LoanType::Jumbo),
            "usda" => Some(LoanType::Usda),
            _ => None,
        }
    }

    pub fn all() -> &'static [LoanType] {
        &[
            LoanType::Conventional30,
            LoanType::Conventional15,
            LoanType::Fha,
            LoanType::Va,
            LoanType::Jumbo,
            LoanType::Usda,
        ]
    }
}

impl std::fmt::Display for LoanType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Employment status of a borrower; drives the document requirement matrix.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "backend", derive(Type))]
#[cfg_attr(feature = "backend", sqlx(type_name = "VARCHAR", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum EmploymentStatus {
    W2Employee,
    SelfEmployed,
    Retired,
    Unemployed,
    Other,
}

impl EmploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmploymentStatus::W2Employee => "w2_employee",
            EmploymentStatus::SelfEmployed => "self_employed",
            EmploymentStatus::Retired => "retired",
            EmploymentStatus::Unemployed => "unemployed",
            EmploymentStatus::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "w2_employee" => Some(EmploymentStatus::W2Employee),
            "self_employed" => Some(EmploymentStatus::SelfEmployed),
            "retired" => Some(EmploymentStatus::Retired),
            "unemployed" => Some(EmploymentStatus::Unemployed),
            "other" => Some(EmploymentStatus::Other),
            _ => None,
        }
    }

    pub fn all() -> &'static [EmploymentStatus] {
        &[
            EmploymentStatus::W2Employee,
            EmploymentStatus::SelfEmployed,
            EmploymentStatus::Retired,
            EmploymentStatus::Unemployed,
            EmploymentStatus::Other,
        ]
    }
}

impl std::fmt::Display for EmploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of document uploaded against an application.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "backend", derive(Type))]
#[cfg_attr(feature = "backend", sqlx(type_name = "VARCHAR", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    W2,
    PayStub,
    TaxReturn,
    BankStatement,
    Id,
    PropertyAppraisal,
    Insurance,
    Other,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::W2 => "w2",
            DocumentType::PayStub => "pay_stub",
            DocumentType::TaxReturn => "tax_return",
            DocumentType::BankStatement => "bank_statement",
            DocumentType::Id => "id",
            DocumentType::PropertyAppraisal => "property_appraisal",
            DocumentType::Insurance => "insurance",
            DocumentType::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "w2" => Some(DocumentType::W2),
            "pay_stub" => Some(DocumentType::PayStub),
            "tax_return" => Some(DocumentType::TaxReturn),
            "bank_statement" => Some(DocumentType::BankStatement),
            "id" => Some(DocumentType::Id),
            "property_appraisal" => Some(DocumentType::PropertyAppraisal),
            "insurance" => Some(DocumentType::Insurance),
            "other" => Some(DocumentType::Other),
            _ => None,
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Processing and triage status of an uploaded document.
///
/// Upload drives `uploaded -> processing -> processing_complete |
/// processing_failed`; loan-officer triage then moves a processed document
/// through `pending_review -> accepted | flagged_for_resubmission |
/// rejected`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "backend", derive(Type))]
#[cfg_attr(feature = "backend", sqlx(type_name = "VARCHAR", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Uploaded,
    Processing,
    ProcessingComplete,
    ProcessingFailed,
    PendingReview,
    Accepted,
    FlaggedForResubmission,
    Rejected,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Uploaded => "uploaded",
            DocumentStatus::Processing => "processing",
            DocumentStatus::ProcessingComplete => "processing_complete",
            DocumentStatus::ProcessingFailed => "processing_failed",
            DocumentStatus::PendingReview => "pending_review",
            DocumentStatus::Accepted => "accepted",
            DocumentStatus::FlaggedForResubmission => "flagged_for_resubmission",
            DocumentStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "uploaded" => Some(DocumentStatus::Uploaded),
            "processing" => Some(DocumentStatus::Processing),
            "processing_complete" => Some(DocumentStatus::ProcessingComplete),
            "processing_failed" => Some(DocumentStatus::ProcessingFailed),
            "pending_review" => Some(DocumentStatus::PendingReview),
            "accepted" => Some(DocumentStatus::Accepted),
            "flagged_for_resubmission" => Some(DocumentStatus::FlaggedForResubmission),
            "rejected" => Some(DocumentStatus::Rejected),
            _ => None,
        }
    }

    /// Extraction has finished, successfully or not.
    pub fn is_terminal_processed(&self) -> bool {
        matches!(
            self,
            DocumentStatus::ProcessingComplete | DocumentStatus::ProcessingFailed
        )
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// When in the lifecycle an underwriting condition must be satisfied.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "backend", derive(Type))]
#[cfg_attr(feature = "backend", sqlx(type_name = "VARCHAR", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum ConditionSeverity {
    PriorToApproval,
    PriorToDocs,
    PriorToClosing,
    PriorToFunding,
}

impl ConditionSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionSeverity::PriorToApproval => "prior_to_approval",
            ConditionSeverity::PriorToDocs => "prior_to_docs",
            ConditionSeverity::PriorToClosing => "prior_to_closing",
            ConditionSeverity::PriorToFunding => "prior_to_funding",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "prior_to_approval" => Some(ConditionSeverity::PriorToApproval),
            "prior_to_docs" => Some(ConditionSeverity::PriorToDocs),
            "prior_to_closing" => Some(ConditionSeverity::PriorToClosing),
            "prior_to_funding" => Some(ConditionSeverity::PriorToFunding),
            _ => None,
        }
    }

    /// Only late-lifecycle conditions may be waived.
    pub fn is_waivable(&self) -> bool {
        matches!(
            self,
            ConditionSeverity::PriorToClosing | ConditionSeverity::PriorToFunding
        )
    }
}

impl std::fmt::Display for ConditionSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of an underwriting condition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "backend", derive(Type))]
#[cfg_attr(feature = "backend", sqlx(type_name = "VARCHAR", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum ConditionStatus {
    Open,
    Responded,
    UnderReview,
    Cleared,
    Waived,
    Escalated,
}

impl ConditionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionStatus::Open => "open",
            ConditionStatus::Responded => "responded",
            ConditionStatus::UnderReview => "under_review",
            ConditionStatus::Cleared => "cleared",
            ConditionStatus::Waived => "waived",
            ConditionStatus::Escalated => "escalated",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "open" => Some(ConditionStatus::Open),
            "responded" => Some(ConditionStatus::Responded),
            "under_review" => Some(ConditionStatus::UnderReview),
            "cleared" => Some(ConditionStatus::Cleared),
            "waived" => Some(ConditionStatus::Waived),
            "escalated" => Some(ConditionStatus::Escalated),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConditionStatus::Cleared | ConditionStatus::Waived)
    }
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recorded underwriting decision type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "backend", derive(Type))]
#[cfg_attr(feature = "backend", sqlx(type_name = "VARCHAR", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    Approved,
    ConditionalApproval,
    Suspended,
    Denied,
}

impl DecisionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionType::Approved => "approved",
            DecisionType::ConditionalApproval => "conditional_approval",
            DecisionType::Suspended => "suspended",
            DecisionType::Denied => "denied",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "approved" => Some(DecisionType::Approved),
            "conditional_approval" => Some(DecisionType::ConditionalApproval),
            "suspended" => Some(DecisionType::Suspended),
            "denied" => Some(DecisionType::Denied),
            _ => None,
        }
    }
}

impl std::fmt::Display for DecisionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How an HMDA demographic field value was obtained.
///
/// Precedence resolves upsert conflicts: a value collected by a
/// higher-precedence method overwrites one collected by a lower-precedence
/// method, never the reverse.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CollectionMethod {
    SelfReported,
    DocumentExtraction,
    VisualObservation,
    NotProvided,
}

impl CollectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionMethod::SelfReported => "self_reported",
            CollectionMethod::DocumentExtraction => "document_extraction",
            CollectionMethod::VisualObservation => "visual_observation",
            CollectionMethod::NotProvided => "not_provided",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "self_reported" => Some(CollectionMethod::SelfReported),
            "document_extraction" => Some(CollectionMethod::DocumentExtraction),
            "visual_observation" => Some(CollectionMethod::VisualObservation),
            "not_provided" => Some(CollectionMethod::NotProvided),
            _ => None,
        }
    }

    /// Higher wins on conflicting upserts.
    pub fn precedence(&self) -> u8 {
        match self {
            CollectionMethod::NotProvided => 0,
            CollectionMethod::VisualObservation => 0,
            CollectionMethod::DocumentExtraction => 1,
            CollectionMethod::SelfReported => 2,
        }
    }
}

impl std::fmt::Display for CollectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Verdict of a single compliance check, ordered worst-first for the
/// combined runner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceStatus {
    Pass,
    ConditionalPass,
    Warning,
    Fail,
}

impl ComplianceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplianceStatus::Pass => "PASS",
            ComplianceStatus::ConditionalPass => "CONDITIONAL_PASS",
            ComplianceStatus::Warning => "WARNING",
            ComplianceStatus::Fail => "FAIL",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PASS" => Some(ComplianceStatus::Pass),
            "CONDITIONAL_PASS" => Some(ComplianceStatus::ConditionalPass),
            "WARNING" => Some(ComplianceStatus::Warning),
            "FAIL" => Some(ComplianceStatus::Fail),
            _ => None,
        }
    }

    /// Higher is worse; the combined verdict is the maximum.
    pub fn severity_rank(&self) -> u8 {
        match self {
            ComplianceStatus::Pass => 0,
            ComplianceStatus::ConditionalPass => 1,
            ComplianceStatus::Warning => 2,
            ComplianceStatus::Fail => 3,
        }
    }
}

impl std::fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
