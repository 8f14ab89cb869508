/*!
  This module is responsible for the encoding and decoding of binary instructions.

  The decoding half is a set of pure, stateless functions over `(memory, address)`; they
  assume the RAM is addressed for all valid `u16` values, i.e. 0 to 2^16 - 1. Every bit
  pattern decodes to something, so decoding can never fault; only execution can.

  The wire format is:

    Byte 0: bits[7:2] opcode, bit 1 operand-1 mode, bit 0 operand-2 mode
            (0 DIRECT, 1 RELATIVE)
    Byte 1: bits[3:0] operand-1 location, bits[7:4] operand-2 location
    0, 2, or 4 further bytes: big-endian 16 bit immediates for the operands whose
            location is IMD or PIMD, laid out contiguously in operand order.

  An immediate slot is assigned by position among the immediate operands, not by the
  operand's own index: when operand 1 is not immediate but operand 2 is, operand 2's
  immediate still occupies the first slot at `addr + 2`.
*/
use std::fmt::{Display, Formatter};

use super::{AccessMode, Location, OpCode};

pub fn opcode(memory: &[u8], address: u16) -> OpCode {
  OpCode::from(memory[address as usize] >> 2)
}

pub fn operand1_mode(memory: &[u8], address: u16) -> AccessMode {
  AccessMode::from_bit((memory[address as usize] & 0x02) >> 1)
}

pub fn operand2_mode(memory: &[u8], address: u16) -> AccessMode {
  AccessMode::from_bit(memory[address as usize] & 0x01)
}

pub fn operand1_location(memory: &[u8], address: u16) -> Location {
  Location::from(memory[address.wrapping_add(1) as usize] & 0x0F)
}

pub fn operand2_location(memory: &[u8], address: u16) -> Location {
  Location::from((memory[address.wrapping_add(1) as usize] & 0xF0) >> 4)
}

/// The number of operands (0, 1, or 2) whose location occupies an immediate slot.
pub fn immediate_count(memory: &[u8], address: u16) -> u8 {
  let mut count = 0u8;
  if operand1_location(memory, address).is_immediate() {
    count += 1;
  }
  if operand2_location(memory, address).is_immediate() {
    count += 1;
  }
  count
}

/**
  The address of the immediate slot serving the given operand: 0 when `operand` is not a
  valid operand index or the instruction carries no immediates; otherwise `address + 2`
  for the first slot, or `address + 4` when operand 2 is asked for and both operands are
  immediate. The offset depends only on the count and position of immediate operands.
*/
pub fn immediate_address(memory: &[u8], address: u16, operand: u8) -> u16 {
  if operand != 1 && operand != 2 {
    return 0;
  }
  let count = immediate_count(memory, address);
  if count == 0 {
    return 0;
  }
  match operand == 2 && count == 2 {
    true  => address.wrapping_add(4),
    false => address.wrapping_add(2),
  }
}

/// The encoded size of the instruction at `address`: 2 header bytes plus 2 per
/// immediate slot.
pub fn instruction_size(memory: &[u8], address: u16) -> u16 {
  2 + 2 * immediate_count(memory, address) as u16
}


// region Unencoded instructions and the encoder

/// One unencoded operand: its addressing mode, its location code, and the word occupying
/// an immediate slot when the location is IMD or PIMD.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct Operand {
  pub mode:      AccessMode,
  pub location:  Location,
  pub immediate: u16,
}

impl Operand {

  pub fn direct(location: Location) -> Operand {
    Operand { mode: AccessMode::Direct, location, immediate: 0 }
  }

  pub fn relative(location: Location) -> Operand {
    Operand { mode: AccessMode::Relative, location, immediate: 0 }
  }

  pub fn immediate(value: u16) -> Operand {
    Operand { mode: AccessMode::Direct, location: Location::IMD, immediate: value }
  }

  pub fn short_pointer(value: u16, mode: AccessMode) -> Operand {
    Operand { mode, location: Location::PIMD, immediate: value }
  }

  /// The filler for an operand slot an instruction does not use.
  pub fn none() -> Operand {
    Operand { mode: AccessMode::Direct, location: Location::NONE, immediate: 0 }
  }

}

impl Display for Operand {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let name: &'static str = self.location.into();
    match self.location {

      location if location.is_register() => {
        write!(f, "{}", name.to_lowercase())
      }

      Location::PAX | Location::PBX | Location::PCX => {
        // PAX..PCX sit 4 codes above AX..CX.
        let register = Location::from(self.location.code() - 4);
        let register_name: &'static str = register.into();
        match self.mode {
          AccessMode::Direct   => write!(f, "[{}]", register_name.to_lowercase()),
          AccessMode::Relative => write!(f, "[ip+{}]", register_name.to_lowercase()),
        }
      }

      Location::IMD => {
        write!(f, "0x{:04x}", self.immediate)
      }

      Location::PIMD => {
        match self.mode {
          AccessMode::Direct   => write!(f, "[0x{:04x}]", self.immediate),
          AccessMode::Relative => write!(f, "[ip+0x{:04x}]", self.immediate),
        }
      }

      _ => {
        write!(f, "_")
      }

    }
  }
}


/// Holds the unencoded components of an instruction.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct Instruction {
  pub opcode:   OpCode,
  pub operand1: Operand,
  pub operand2: Operand,
}

impl Display for Instruction {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self.opcode.arity() {
      2 => write!(f, "{} {}, {}", self.opcode, self.operand1, self.operand2),
      1 => write!(f, "{} {}", self.opcode, self.operand1),
      _ => write!(f, "{}", self.opcode),
    }
  }
}

/**
  Encodes the instruction into its byte form. It is the caller's responsibility to leave
  unused operand slots as `Operand::none()`; the encoder emits whatever location codes it
  is given, consistency with the decoder being fixed by the shared `Location` table.
*/
pub fn encode_instruction(instruction: &Instruction) -> Vec<u8> {
  let mut bytes = Vec::with_capacity(6);
  bytes.push(
    (instruction.opcode.code() << 2)
      | (instruction.operand1.mode.bit() << 1)
      | instruction.operand2.mode.bit()
  );
  bytes.push(
    (instruction.operand1.location.code() & 0x0F)
      | (instruction.operand2.location.code() << 4)
  );
  for operand in &[instruction.operand1, instruction.operand2] {
    if operand.location.is_immediate() {
      bytes.extend_from_slice(&operand.immediate.to_be_bytes());
    }
  }
  bytes
}

/// Decodes the instruction at `address` back into its unencoded components. Total: any
/// byte pattern produces an `Instruction`, possibly with the `Illegal` opcode or NONE
/// locations.
pub fn decode_instruction(memory: &[u8], address: u16) -> Instruction {
  let decode_operand = |index: u8, location: Location, mode: AccessMode| {
    let immediate = match location.is_immediate() {
      true => {
        let slot = immediate_address(memory, address, index);
        let high = memory[slot as usize] as u16;
        let low  = memory[slot.wrapping_add(1) as usize] as u16;
        (high << 8) | low
      }
      false => 0,
    };
    Operand { mode, location, immediate }
  };

  Instruction {
    opcode:   opcode(memory, address),
    operand1: decode_operand(
      1,
      operand1_location(memory, address),
      operand1_mode(memory, address)
    ),
    operand2: decode_operand(
      2,
      operand2_location(memory, address),
      operand2_mode(memory, address)
    ),
  }
}

// endregion
