// Library for tests to access modules

pub mod agent;
pub mod aggregation;
pub mod config;
pub mod indicator;
pub mod loopback;
pub mod models;
pub mod routes;
pub mod storage_repo;
pub mod version;
