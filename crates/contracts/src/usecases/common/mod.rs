pub mod report_kind;
pub mod report_request;

pub use report_kind::ReportKind;
pub use report_request::{ReportRequest, ReportTrigger};
