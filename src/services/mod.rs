pub mod detection;
pub mod export;
pub mod imagery;
pub mod inference;
pub mod jobs;
pub mod storage;
pub mod worker;
