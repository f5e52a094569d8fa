pub mod common;
mod token_manager_flow;
