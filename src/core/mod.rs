pub mod approval;
pub mod dispatch;
pub mod hub;
pub mod supervisor;
pub mod system;
pub mod triage;
