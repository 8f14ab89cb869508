/*!

  The wire format of the virtual machine. Instructions are 2, 4, or 6 bytes long and are
  decoded bytewise out of the shared RAM:

    Byte 0: bits[7:2] opcode, bit 1 operand-1 mode, bit 0 operand-2 mode
    Byte 1: low nibble operand-1 location, high nibble operand-2 location
    0, 2, or 4 further bytes of big-endian 16 bit immediates, in operand order

  One design decision that needed to be made is whether to model a decoded instruction
  as an enum with one variant per opcode carrying its operands. Since the scheduler
  re-decodes straight out of RAM on every dispatch (the instruction stream is legally
  self-modifying), decoded values would be stale the moment a warrior writes over its
  own code. Instead, decoding is a family of pure functions over `(memory, address)`,
  and the `Instruction` struct exists only at the edges: the encoder, the assembler,
  and diagnostics.

*/

mod binary;
mod instruction;
pub mod assembly;

pub use binary::{
  decode_instruction,
  encode_instruction,
  immediate_address,
  immediate_count,
  instruction_size,
  opcode,
  operand1_location,
  operand1_mode,
  operand2_location,
  operand2_mode,
  Instruction,
  Operand
};
pub use instruction::{
  AccessMode,
  Location,
  OpCode,
  MAX_ASSIGNED_OPCODE,
  MAX_BINARY_OPCODE,
  MAX_UNARY_OPCODE
};
