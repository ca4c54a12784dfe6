pub mod events;
pub mod health;
pub mod publish;
pub mod slots;
