pub mod forex;
pub mod health;
pub mod portfolio;
pub mod risk;
