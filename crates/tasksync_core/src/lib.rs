pub mod config;
pub mod dispatch;
pub mod error;
pub mod model;
pub mod permissions;
pub mod report_utils;
pub mod session;
pub mod storage;
pub mod store;
pub mod task_api;
pub mod update;
