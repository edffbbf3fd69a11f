pub mod blob_store;
pub mod decoder;
pub mod disk_store;
pub mod keys;
pub mod s3_store;
pub mod sniffer;
pub mod upload_service;
pub mod validator;
