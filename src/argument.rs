/*!

  Resolution of one decoded operand into an addressable handle, plus the width-aware
  read/write/sign/negate/swap operations the opcode effects are built from.

  A resolved handle is a tagged variant over the six width classes: whole register, low
  half, high half, 16 bit memory pair, default-8 memory, and the unresolved sentinel. A
  register target is carried as an explicit selector resolved through the thread's
  accessors on every access, never as a pointer into the thread. A memory target is a
  bare 16 bit address into the match-wide RAM, which the caller passes in by reference
  together with the thread.

  Writing through an IMD operand mutates the instruction stream itself; self-modifying
  code is a legal, intended effect of the wire format.

*/

use crate::bytecode;
use crate::bytecode::{AccessMode, Location};
use crate::fault::Fault;
use crate::memory::Memory;
use crate::register::Register;
use crate::thread::Thread;

/// The resolved target of an operand.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Target {
  /// All 16 bits of a register.
  Whole(Register),
  /// The low 8 bits of a register; the high 8 are preserved on writes.
  LowHalf(Register),
  /// The high 8 bits of a register; the low 8 are preserved on writes.
  HighHalf(Register),
  /// A memory pair that is always 16 bits wide; byte-forcing is ignored. Immediate
  /// slots resolve here.
  Mem16(u16),
  /// A memory pair that honors forced-8-bit writes. Register-indirect and
  /// short-pointer operands resolve here.
  Mem(u16),
  /// No target. Reads and writes through this fault with `InvalidAccess`.
  Unresolved,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Argument {
  target:    Target,
  read_only: bool,
}

impl Argument {

  // region Construction

  /**
    Resolves operand `operand` (1 or 2) of the instruction at the thread's IP. Fails
    with `InvalidOperandIndex` for any other index and with `InvalidLocation` when the
    decoded location is the NONE sentinel.
  */
  pub fn resolve(thread: &Thread, memory: &Memory, operand: u8) -> Result<Argument, Fault> {
    let (location, mode) = match operand {
      1 => (
        bytecode::operand1_location(memory.bytes(), thread.ip),
        bytecode::operand1_mode(memory.bytes(), thread.ip),
      ),
      2 => (
        bytecode::operand2_location(memory.bytes(), thread.ip),
        bytecode::operand2_mode(memory.bytes(), thread.ip),
      ),
      index => {
        return Err(Fault::InvalidOperandIndex(index));
      }
    };

    let mut read_only = false;
    let target = match location {

      Location::AL => Target::LowHalf(Register::Ax),
      Location::AH => Target::HighHalf(Register::Ax),
      Location::BL => Target::LowHalf(Register::Bx),
      Location::BH => Target::HighHalf(Register::Bx),
      Location::CL => Target::LowHalf(Register::Cx),
      Location::CH => Target::HighHalf(Register::Cx),

      Location::AX => Target::Whole(Register::Ax),
      Location::BX => Target::Whole(Register::Bx),
      Location::CX => Target::Whole(Register::Cx),

      Location::IP => {
        read_only = true;
        Target::Whole(Register::Ip)
      }

      Location::PAX => Target::Mem(Argument::indirect(thread, mode, thread.ax)),
      Location::PBX => Target::Mem(Argument::indirect(thread, mode, thread.bx)),
      Location::PCX => Target::Mem(Argument::indirect(thread, mode, thread.cx)),

      Location::IMD => {
        Target::Mem16(bytecode::immediate_address(memory.bytes(), thread.ip, operand))
      }

      Location::PIMD => {
        // The short-pointer tier: only the low byte of the word in the immediate slot
        // participates, so DIRECT addressing reaches addresses 0-255 only.
        let slot = bytecode::immediate_address(memory.bytes(), thread.ip, operand);
        let pointer = memory.read_word(slot) & 0x00FF;
        Target::Mem(Argument::indirect(thread, mode, pointer))
      }

      Location::NONE => {
        return Err(Fault::InvalidLocation);
      }

    };

    Ok(Argument { target, read_only })
  }

  /// A handle with no target, as an instruction dispatch defect would leave behind.
  pub fn unresolved() -> Argument {
    Argument { target: Target::Unresolved, read_only: false }
  }

  //  The RELATIVE displacement is the stored 16 bit value reinterpreted as signed;
  //  two's-complement wraparound makes the signed add a plain wrapping add.
  fn indirect(thread: &Thread, mode: AccessMode, displacement: u16) -> u16 {
    match mode {
      AccessMode::Direct   => displacement,
      AccessMode::Relative => thread.ip.wrapping_add(displacement),
    }
  }

  // endregion

  // region Access

  pub fn read(&self, thread: &Thread, memory: &Memory) -> Result<u16, Fault> {
    match self.target {
      Target::Whole(register)    => Ok(thread.get(register)),
      Target::LowHalf(register)  => Ok(thread.get(register) & 0x00FF),
      Target::HighHalf(register) => Ok(thread.get(register) >> 8),
      Target::Mem(address)
      | Target::Mem16(address)   => Ok(memory.read_word(address)),
      Target::Unresolved         => Err(Fault::InvalidAccess),
    }
  }

  /**
    Writes the value through the handle and returns the written value. A half-register
    write preserves the other half. A memory write with `force_byte` stores only the
    low 8 bits into the single byte at the address; without it (or through a `Mem16`
    target, which ignores forcing) the store is a big-endian 16 bit pair. Every memory
    write stamps the acting thread's pid into the ownership map for each byte written;
    register writes never touch it.
  */
  pub fn write(
    &self,
    thread: &mut Thread,
    memory: &mut Memory,
    value: u16,
    force_byte: bool
  ) -> Result<u16, Fault>
  {
    if self.read_only {
      return Err(Fault::ReadOnlyViolation);
    }
    match self.target {

      Target::Whole(register) => {
        thread.set(register, value);
        Ok(value)
      }

      Target::LowHalf(register) => {
        let value = value & 0x00FF;
        thread.set(register, (thread.get(register) & 0xFF00) | value);
        Ok(value)
      }

      Target::HighHalf(register) => {
        let value = value << 8;
        thread.set(register, (thread.get(register) & 0x00FF) | value);
        Ok(value)
      }

      Target::Mem(address) if force_byte => {
        memory.set(address, value as u8, thread.pid);
        Ok(value & 0x00FF)
      }

      Target::Mem(address)
      | Target::Mem16(address) => {
        memory.write_word(address, value, thread.pid);
        Ok(value)
      }

      Target::Unresolved => Err(Fault::InvalidAccess),

    }
  }

  /**
    Exchanges the values of two handles. The other side is read before anything is
    written, so the exchange stays correct when both operands denote overlapping memory.
    The write back into `self` is byte-forced exactly when the other side is a memory
    operand; the other side's write never is.
  */
  pub fn swap(
    &self,
    other: &Argument,
    thread: &mut Thread,
    memory: &mut Memory
  ) -> Result<(), Fault>
  {
    let other_value = other.read(thread, memory)?;
    let own_value   = self.read(thread, memory)?;
    other.write(thread, memory, own_value, false)?;
    self.write(thread, memory, other_value, other.is_memory())?;
    Ok(())
  }

  /**
    Reads the current width's most significant bit directly from the live value without
    a full `read()`: bit 15 for 16 bit targets, bit 7 for half registers. An unresolved
    handle has no sign.
  */
  pub fn sign(&self, thread: &Thread, memory: &Memory) -> bool {
    match self.target {
      // Big-endian: the byte at the address carries the sign for both memory widths.
      Target::Mem(address)
      | Target::Mem16(address)   => (memory.get(address) & 0x80) != 0,
      Target::Whole(register)
      | Target::HighHalf(register) => (thread.get(register) & 0x8000) != 0,
      Target::LowHalf(register)  => (thread.get(register) & 0x0080) != 0,
      Target::Unresolved         => false,
    }
  }

  /**
    Two's-complement negation in place, written back with the given forcing. The two
    branches avoid the overflow at the minimal negative value, which negates to itself:
        negate(0x0000) == 0x0000
        negate(0x8000) == 0x8000
        negate(0x0001) == 0xFFFF
  */
  pub fn negate(
    &self,
    thread: &mut Thread,
    memory: &mut Memory,
    force_byte: bool
  ) -> Result<u16, Fault>
  {
    let mut value = self.read(thread, memory)?;
    value = match self.sign(thread, memory) {
      true  => !(value.wrapping_sub(1)),
      false => (!value).wrapping_add(1),
    };
    self.write(thread, memory, value, force_byte)
  }

  // endregion

  // region Classification

  /// True for half registers and default-8 memory. Default memory is width-ambiguous by
  /// design; the instruction decides the write width.
  pub fn is_8bit(&self) -> bool {
    match self.target {
      Target::Mem(_) | Target::LowHalf(_) | Target::HighHalf(_) => true,
      _ => false
    }
  }

  pub fn is_memory(&self) -> bool {
    match self.target {
      Target::Mem(_) | Target::Mem16(_) => true,
      _ => false
    }
  }

  pub fn is_register(&self) -> bool {
    !self.is_memory()
  }

  pub fn is_read_only(&self) -> bool {
    self.read_only
  }

  pub fn target(&self) -> Target {
    self.target
  }

  // endregion

}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::bytecode::{encode_instruction, Instruction, OpCode, Operand};
  use crate::memory::UNOWNED;

  //  Plants an instruction at `entry` whose operand 1 has the given location and mode,
  //  and returns a thread parked on it.
  fn fixture(
    memory: &mut Memory,
    entry: u16,
    location: Location,
    mode: AccessMode,
    immediate: u16
  ) -> Thread
  {
    let instruction = Instruction {
      opcode:   OpCode::Mov,
      operand1: Operand { mode, location, immediate },
      operand2: Operand::none(),
    };
    memory.load_image(entry, &encode_instruction(&instruction), 0);
    Thread::new(1, entry)
  }

  #[test]
  fn whole_register_round_trips() {
    let mut memory = Memory::new();
    let mut thread = fixture(&mut memory, 0x100, Location::BX, AccessMode::Direct, 0);
    let argument = Argument::resolve(&thread, &memory, 1).unwrap();
    assert!(argument.is_register());
    assert!(!argument.is_8bit());
    argument.write(&mut thread, &mut memory, 0xCAFE, false).unwrap();
    assert_eq!(argument.read(&thread, &memory).unwrap(), 0xCAFE);
    assert_eq!(thread.bx, 0xCAFE);
  }

  #[test]
  fn half_registers_preserve_the_other_half() {
    let mut memory = Memory::new();
    let mut thread = fixture(&mut memory, 0x100, Location::AL, AccessMode::Direct, 0);
    thread.ax = 0xABCD;
    let low = Argument::resolve(&thread, &memory, 1).unwrap();
    assert!(low.is_8bit());
    assert_eq!(low.read(&thread, &memory).unwrap(), 0x00CD);
    assert_eq!(low.write(&mut thread, &mut memory, 0x1234, false).unwrap(), 0x0034);
    assert_eq!(thread.ax, 0xAB34);

    let mut thread = fixture(&mut memory, 0x100, Location::AH, AccessMode::Direct, 0);
    thread.ax = 0xABCD;
    let high = Argument::resolve(&thread, &memory, 1).unwrap();
    assert_eq!(high.read(&thread, &memory).unwrap(), 0x00AB);
    high.write(&mut thread, &mut memory, 0x0012, false).unwrap();
    assert_eq!(thread.ax, 0x12CD);
  }

  #[test]
  fn the_instruction_pointer_binding_is_read_only() {
    let mut memory = Memory::new();
    let mut thread = fixture(&mut memory, 0x100, Location::IP, AccessMode::Direct, 0);
    let argument = Argument::resolve(&thread, &memory, 1).unwrap();
    assert!(argument.is_read_only());
    assert_eq!(argument.read(&thread, &memory).unwrap(), 0x100);
    assert_eq!(
      argument.write(&mut thread, &mut memory, 0, false),
      Err(Fault::ReadOnlyViolation)
    );
  }

  #[test]
  fn register_indirect_resolves_direct_and_relative() {
    let mut memory = Memory::new();
    let mut thread = fixture(&mut memory, 0x100, Location::PBX, AccessMode::Direct, 0);
    thread.bx = 0x2000;
    let direct = Argument::resolve(&thread, &memory, 1).unwrap();
    assert_eq!(direct.target(), Target::Mem(0x2000));

    // RELATIVE adds the register as a signed displacement to IP.
    let mut thread = fixture(&mut memory, 0x100, Location::PBX, AccessMode::Relative, 0);
    thread.bx = 0xFFFE; // -2
    let relative = Argument::resolve(&thread, &memory, 1).unwrap();
    assert_eq!(relative.target(), Target::Mem(0x00FE));
  }

  #[test]
  fn memory_round_trips_all_values_across_the_wrap() {
    let mut memory = Memory::new();
    let mut thread = fixture(&mut memory, 0x100, Location::PCX, AccessMode::Direct, 0);
    thread.cx = 0xFFFF;
    let argument = Argument::resolve(&thread, &memory, 1).unwrap();
    for value in 0u16..=0xFFFF {
      argument.write(&mut thread, &mut memory, value, false).unwrap();
      assert_eq!(argument.read(&thread, &memory).unwrap(), value);
    }
    // The pair spans addresses 0xFFFF and 0x0000.
    argument.write(&mut thread, &mut memory, 0x1234, false).unwrap();
    assert_eq!(memory.get(0xFFFF), 0x12);
    assert_eq!(memory.get(0x0000), 0x34);
  }

  #[test]
  fn forced_byte_writes_leave_the_neighbor_untouched() {
    let mut memory = Memory::new();
    let mut thread = fixture(&mut memory, 0x100, Location::PAX, AccessMode::Direct, 0);
    thread.ax = 0x3000;
    memory.set(0x3001, 0x77, 0);
    let argument = Argument::resolve(&thread, &memory, 1).unwrap();
    assert_eq!(argument.write(&mut thread, &mut memory, 0xAB42, true).unwrap(), 0x0042);
    assert_eq!(memory.get(0x3000), 0x42);
    assert_eq!(memory.get(0x3001), 0x77);
    assert_eq!(memory.owner(0x3000), 1);
    assert_eq!(memory.owner(0x3001), UNOWNED);
  }

  #[test]
  fn immediate_operands_bind_the_instruction_stream() {
    let mut memory = Memory::new();
    let mut thread = fixture(&mut memory, 0x100, Location::IMD, AccessMode::Direct, 0xBEEF);
    let argument = Argument::resolve(&thread, &memory, 1).unwrap();
    assert_eq!(argument.target(), Target::Mem16(0x102));
    assert_eq!(argument.read(&thread, &memory).unwrap(), 0xBEEF);
    // Writing through an immediate rewrites the instruction's own bytes, and byte
    // forcing is ignored for this class.
    argument.write(&mut thread, &mut memory, 0x0102, true).unwrap();
    assert_eq!(memory.get(0x102), 0x01);
    assert_eq!(memory.get(0x103), 0x02);
  }

  #[test]
  fn short_pointers_truncate_to_the_low_byte() {
    let mut memory = Memory::new();
    let thread = fixture(&mut memory, 0x100, Location::PIMD, AccessMode::Direct, 0x12AB);
    let argument = Argument::resolve(&thread, &memory, 1).unwrap();
    // Only the low byte of 0x12AB participates: the address is 0x00AB, not 0x12AB.
    assert_eq!(argument.target(), Target::Mem(0x00AB));

    let thread = fixture(&mut memory, 0x100, Location::PIMD, AccessMode::Relative, 0x0004);
    let argument = Argument::resolve(&thread, &memory, 1).unwrap();
    assert_eq!(argument.target(), Target::Mem(0x0104));
  }

  #[test]
  fn none_and_bad_indices_fail_resolution() {
    let mut memory = Memory::new();
    let thread = fixture(&mut memory, 0x100, Location::NONE, AccessMode::Direct, 0);
    assert_eq!(
      Argument::resolve(&thread, &memory, 1).unwrap_err(),
      Fault::InvalidLocation
    );
    assert_eq!(
      Argument::resolve(&thread, &memory, 0).unwrap_err(),
      Fault::InvalidOperandIndex(0)
    );
    assert_eq!(
      Argument::resolve(&thread, &memory, 3).unwrap_err(),
      Fault::InvalidOperandIndex(3)
    );
  }

  #[test]
  fn unresolved_handles_fault_on_access() {
    let mut memory = Memory::new();
    let mut thread = Thread::new(1, 0);
    let argument = Argument::unresolved();
    assert_eq!(argument.read(&thread, &memory), Err(Fault::InvalidAccess));
    assert_eq!(
      argument.write(&mut thread, &mut memory, 0, false),
      Err(Fault::InvalidAccess)
    );
    assert!(!argument.sign(&thread, &memory));
  }

  #[test]
  fn negate_matches_the_twos_complement_contract() {
    let mut memory = Memory::new();
    let mut thread = fixture(&mut memory, 0x100, Location::PAX, AccessMode::Direct, 0);
    thread.ax = 0x4000;
    let argument = Argument::resolve(&thread, &memory, 1).unwrap();
    for (input, expected) in &[(0x0000u16, 0x0000u16), (0x8000, 0x8000), (0x0001, 0xFFFF)] {
      argument.write(&mut thread, &mut memory, *input, false).unwrap();
      assert_eq!(argument.negate(&mut thread, &mut memory, false).unwrap(), *expected);
      assert_eq!(argument.read(&thread, &memory).unwrap(), *expected);
    }
  }

  #[test]
  fn sign_reads_the_width_bit_without_a_full_read() {
    let mut memory = Memory::new();
    let mut thread = fixture(&mut memory, 0x100, Location::CL, AccessMode::Direct, 0);
    thread.cx = 0x0080;
    let low = Argument::resolve(&thread, &memory, 1).unwrap();
    assert!(low.sign(&thread, &memory));
    thread.cx = 0x8000;
    assert!(!low.sign(&thread, &memory));

    let thread = fixture(&mut memory, 0x100, Location::PIMD, AccessMode::Direct, 0x0040);
    memory.set(0x0040, 0x80, 0);
    let mem = Argument::resolve(&thread, &memory, 1).unwrap();
    assert!(mem.sign(&thread, &memory));
  }

  #[test]
  fn swap_widths_follow_the_other_side() {
    //  A default-8 memory operand swapped with a register half: the memory side's write
    //  is 16 bits wide because the other side is a register, regardless of its own
    //  8 bit width.
    let mut memory = Memory::new();
    let mut thread = fixture(&mut memory, 0x100, Location::PAX, AccessMode::Direct, 0);
    thread.ax = 0x5000;
    thread.bx = 0x0033;
    memory.write_word(0x5000, 0x1122, 0);
    let mem = Argument::resolve(&thread, &memory, 1).unwrap();

    // Resolve bl against a second planted instruction so both handles coexist.
    let mut probe = fixture(&mut memory, 0x200, Location::BL, AccessMode::Direct, 0);
    probe.bx = thread.bx;
    let low = Argument::resolve(&probe, &memory, 1).unwrap();

    mem.swap(&low, &mut thread, &mut memory).unwrap();
    // bl received the memory word's low byte; the memory pair received 0x0033 in full
    // 16 bit width, clobbering the byte after the address.
    assert_eq!(thread.bx & 0x00FF, 0x0022);
    assert_eq!(memory.read_word(0x5000), 0x0033);
  }

  #[test]
  fn swap_between_memory_operands_forces_the_writeback_byte() {
    let mut memory = Memory::new();
    let mut thread = fixture(&mut memory, 0x100, Location::PAX, AccessMode::Direct, 0);
    thread.ax = 0x6000;
    thread.bx = 0x7000;
    memory.write_word(0x6000, 0x0102, 0);
    memory.write_word(0x7000, 0x0304, 0);
    let first = Argument::resolve(&thread, &memory, 1).unwrap();

    let mut probe = fixture(&mut memory, 0x300, Location::PBX, AccessMode::Direct, 0);
    probe.bx = thread.bx;
    let second = Argument::resolve(&probe, &memory, 1).unwrap();

    first.swap(&second, &mut thread, &mut memory).unwrap();
    // The other side took a full 16 bit store; the write back into `first` was forced
    // to a single byte because the other side is memory.
    assert_eq!(memory.read_word(0x7000), 0x0102);
    assert_eq!(memory.get(0x6000), 0x04);
    assert_eq!(memory.get(0x6001), 0x02);
  }

  #[test]
  fn register_writes_never_stamp_ownership() {
    let mut memory = Memory::new();
    let mut thread = fixture(&mut memory, 0x100, Location::CX, AccessMode::Direct, 0);
    let argument = Argument::resolve(&thread, &memory, 1).unwrap();
    argument.write(&mut thread, &mut memory, 0x9999, false).unwrap();
    assert_eq!(memory.owned_count(1), 0);
  }
}
