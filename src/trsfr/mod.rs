pub mod listen;
pub mod relay;
pub mod serve;
pub mod state;
pub mod vsock;
