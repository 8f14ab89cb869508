
use strum_macros::{Display as StrumDisplay, EnumString, IntoStaticStr};
use num_enum::{FromPrimitive, IntoPrimitive};

/**
  Opcodes of the virtual machine.

  Rust stores enum variants as bytes. As in C, enum values are represented by consecutive
  natural numbers and can be treated as numeric types. Therefore, we group the
  two-operand, one-operand, and zero-operand opcodes together so that a given opcode's
  arity can be determined with a trivial comparison. Consequently, the order the opcodes
  are listed below is significant. Order-dependencies:
      ```
      OpCode::arity()
      Game::exec_instruction()
      ```
  The code space is 6 bits wide; every unassigned pattern falls through to `Illegal`,
  which keeps decoding total and faults at execution instead.
*/
#[derive(
StrumDisplay, IntoStaticStr, EnumString, FromPrimitive, IntoPrimitive,
Clone,        Copy,          Eq, PartialEq,  Debug,        Hash
)]
#[repr(u8)]
pub enum OpCode {
  // Two-operand opcodes //
  #[strum(serialize = "mov")]
  Mov,               // mov( dst, src )
  #[strum(serialize = "add")]
  Add,               // add( dst, src )
  #[strum(serialize = "sub")]
  Sub,               // sub( dst, src )
  #[strum(serialize = "swp")]
  Swp,               // swp( a, b )
  #[strum(serialize = "jnz")]
  Jnz,               // jnz( target, condition )
  #[strum(serialize = "js")]
  Js,                // js( target, condition )
  // Opcode 6

  // One-operand opcodes //
  #[strum(serialize = "neg")]
  Neg,               // neg( target )
  #[strum(serialize = "jmp")]
  Jmp,               // jmp( target )
  #[strum(serialize = "fork")]
  Fork,              // fork( entry )
  // Opcode 9

  // Zero-operand opcodes //
  #[strum(serialize = "nop")]
  Nop,
  #[strum(serialize = "hlt")]
  Hlt,
  // Opcode 11

  // The unassigned remainder of the 6 bit code space //
  #[strum(serialize = "illegal")]
  #[num_enum(default)]
  Illegal = 63,
}

pub const MAX_BINARY_OPCODE:   u8 = 6u8;
pub const MAX_UNARY_OPCODE:    u8 = 9u8;
pub const MAX_ASSIGNED_OPCODE: u8 = 11u8;

impl OpCode {
  pub fn code(&self) -> u8 {
    Into::<u8>::into(*self)
  }

  pub fn arity(&self) -> u8 {
    match self.code() {
      value if value < MAX_BINARY_OPCODE => 2,
      value if value < MAX_UNARY_OPCODE  => 1,
      _value => 0
    }
  }

  pub fn is_assigned(&self) -> bool {
    self.code() < MAX_ASSIGNED_OPCODE
  }
}


/// Per-operand addressing mode, one header bit each.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum AccessMode {
  Direct,
  Relative,
}

impl AccessMode {
  /// The header encodes RELATIVE as a set bit.
  pub fn from_bit(bit: u8) -> AccessMode {
    match bit != 0 {
      true  => AccessMode::Relative,
      false => AccessMode::Direct,
    }
  }

  pub fn bit(&self) -> u8 {
    match self {
      AccessMode::Direct   => 0,
      AccessMode::Relative => 1,
    }
  }
}


/**
  The decoded kind of an operand, one 4 bit code each. The grouping is fixed by the wire
  format and the numeric assignment below must stay consistent between the encoder and
  the decoder: register halves, whole registers, the instruction pointer, the
  register-indirect pointers, the immediate kinds, and the NONE sentinel, in that order.
  Every nibble value maps to a variant, so decoding is total.
*/
#[allow(non_camel_case_types)]
#[derive(
StrumDisplay, IntoStaticStr, EnumString, FromPrimitive, IntoPrimitive,
Clone,        Copy,          Eq, PartialEq,  Debug,        Hash
)]
#[repr(u8)]
pub enum Location {
  AL,     // low half of ax
  AH,     // high half of ax
  BL,
  BH,
  CL,
  CH,
  AX,     // code 6
  BX,
  CX,
  IP,     // read-only binding
  PAX,    // memory addressed through ax
  PBX,
  PCX,
  IMD,    // immediate slot after the header
  PIMD,   // short pointer stored in an immediate slot
  #[num_enum(default)]
  NONE,   // code 15
}

impl Location {
  pub fn code(&self) -> u8 {
    Into::<u8>::into(*self)
  }

  /// True for the locations that occupy a 2 byte immediate slot after the header.
  pub fn is_immediate(&self) -> bool {
    match self {
      Location::IMD | Location::PIMD => true,
      _ => false
    }
  }

  /// True for the direct register bindings, i.e. the locations a bare register name in
  /// assembly may denote.
  pub fn is_register(&self) -> bool {
    self.code() <= Location::IP.code()
  }
}
