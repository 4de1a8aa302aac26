pub mod inference;
pub mod storage;
pub mod tiles;
