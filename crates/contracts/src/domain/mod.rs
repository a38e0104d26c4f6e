pub mod a101_store;
pub mod a102_service_account;
pub mod a103_user;
