pub mod common;
pub mod u601_unit_day_report;
pub mod u602_ad_spend_report;
pub mod u603_balance_report;
pub mod u604_fin_week_report;
