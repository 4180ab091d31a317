pub mod listen;
pub mod register;
