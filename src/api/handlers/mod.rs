pub mod detection;
pub mod export;
pub mod health;
pub mod imagery;
pub mod pages;
pub mod uploads;
