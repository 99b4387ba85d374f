//! RFC 6455 wire mechanics: opcodes, frames, masking, reassembly and the
//! client side of the upgrade handshake.

pub mod assembler;
pub mod frame;
pub mod handshake;
pub mod mask;
pub mod opcode;

pub use frame::{Frame, MAX_CONTROL_FRAME_PAYLOAD};
pub use handshake::{UpgradeRequest, UpgradeResponse, WS_GUID, compute_accept_key, generate_key};
pub use opcode::OpCode;
