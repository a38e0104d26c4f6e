pub mod input_sheet;
pub mod pipeline;

pub use pipeline::{CancelFlag, ReportContext, ReportExecutor, ReportRegistry};
