pub mod accounts;
pub mod email;
pub mod health;
pub mod registrations;
