pub mod collection;
pub mod db;
pub mod kv;
pub mod storage;
