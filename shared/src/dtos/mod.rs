pub mod applications;
pub mod audit;
pub mod chat;
pub mod conditions;
pub mod decisions;
pub mod documents;
pub mod hmda;
