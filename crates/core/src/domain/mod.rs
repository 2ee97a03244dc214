pub mod intent;
pub mod search;
pub mod state;
