pub mod health;
pub mod recall;
